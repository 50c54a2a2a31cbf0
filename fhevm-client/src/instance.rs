//! The capability interface every backend session exposes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;

use crate::eip712::Eip712Payload;
use crate::error::Result;
use crate::input::EncryptedInput;
use crate::keys::KeyPair;
use crate::types::{ClearValue, Handle, HandleContractPair, SealedInput, TypedValue};

/// Everything a backend needs to serve one user decryption call.
#[derive(Clone)]
pub struct UserDecryptRequest {
    pub pairs: Vec<HandleContractPair>,
    pub private_key: String,
    pub public_key: String,
    pub signature: Bytes,
    pub contracts: Vec<Address>,
    pub user: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl fmt::Debug for UserDecryptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDecryptRequest")
            .field("pairs", &self.pairs)
            .field("public_key", &self.public_key)
            .field("contracts", &self.contracts)
            .field("user", &self.user)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish_non_exhaustive()
    }
}

/// An established cryptographic session bound to one network.
///
/// Backends:
/// - `MockInstance`: in-process simulated coprocessor for local chains
/// - `RelayerInstance`: production, relayer-backed
#[async_trait]
pub trait FhevmInstance: Send + Sync {
    /// Host chain this session is bound to.
    fn chain_id(&self) -> u64;

    /// Whether ciphertexts live only in this process rather than on chain.
    ///
    /// Handles and proofs from such a backend mean nothing to a real node.
    fn is_in_process(&self) -> bool {
        false
    }

    /// Encrypt `values` for `contract`, submitted by `user`.
    ///
    /// Returns one handle per value, in order, plus a single validity proof.
    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[TypedValue],
    ) -> Result<SealedInput>;

    fn generate_keypair(&self) -> KeyPair;

    fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Payload>;

    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<Handle, ClearValue>>;

    async fn public_decrypt(&self, contract: Address, handle: Handle) -> Result<ClearValue>;
}

/// Convenience constructors on shared instances.
pub trait FhevmInstanceExt {
    /// Start a new encrypted input batch for `(contract, user)`.
    fn create_encrypted_input(&self, contract: Address, user: Address) -> EncryptedInput;
}

impl FhevmInstanceExt for Arc<dyn FhevmInstance> {
    fn create_encrypted_input(&self, contract: Address, user: Address) -> EncryptedInput {
        EncryptedInput::new(self.clone(), contract, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn debug_hides_private_key() {
        let req = UserDecryptRequest {
            pairs: vec![HandleContractPair::new(B256::ZERO, Address::ZERO)],
            private_key: "deadbeef".into(),
            public_key: "cafe".into(),
            signature: Bytes::new(),
            contracts: vec![Address::ZERO],
            user: Address::ZERO,
            start_timestamp: 0,
            duration_days: 1,
        };
        let printed = format!("{req:?}");
        assert!(printed.contains("cafe"));
        assert!(!printed.contains("deadbeef"));
    }
}
