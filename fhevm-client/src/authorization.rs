//! Decryption authorization and the decryption calls themselves.
//!
//! User decryption needs a [`DecryptionGrant`]: an ephemeral key pair plus the
//! user's EIP-712 signature over `(public key, contracts, start, duration)`.
//! Public decryption needs nothing, but must only be used for ciphertexts the
//! contract has made publicly decryptable; that policy belongs to the caller.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, Bytes};
use log::{debug, info};

use crate::eip712::TypedDataSigner;
use crate::error::{FhevmError, Result};
use crate::instance::{FhevmInstance, UserDecryptRequest};
use crate::keys::KeyPair;
use crate::types::{ClearValue, Handle, HandleContractPair};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Signed consent to decrypt handles of `contracts` during a time window.
///
/// Owned by one decryption flow; not persisted.
#[derive(Clone, Debug)]
pub struct DecryptionGrant {
    pub keypair: KeyPair,
    pub signature: Bytes,
    pub signer: Address,
    pub contracts: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl DecryptionGrant {
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contracts.contains(contract)
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build and sign a fresh decryption grant.
///
/// The signature step may wait on a human; a rejection is returned as
/// `Authorization` and the ephemeral key pair is dropped with it.
pub async fn authorize(
    instance: &dyn FhevmInstance,
    signer: &dyn TypedDataSigner,
    contracts: &[Address],
    duration_days: u64,
) -> Result<DecryptionGrant> {
    let keypair = instance.generate_keypair();
    let start_timestamp = unix_now();
    let payload = instance
        .create_eip712(&keypair.public_key, contracts, start_timestamp, duration_days)
        .map_err(FhevmError::into_authorization)?;

    let signer_address = signer.address();
    debug!(
        "requesting decryption signature from {} for {} contract(s)",
        signer_address,
        contracts.len()
    );
    let signature = signer
        .sign_typed_data(&payload)
        .await
        .map_err(FhevmError::into_authorization)?;
    info!(
        "decryption grant signed by {} valid for {} day(s)",
        signer_address, duration_days
    );

    Ok(DecryptionGrant {
        keypair,
        signature,
        signer: signer_address,
        contracts: contracts.to_vec(),
        start_timestamp,
        duration_days,
    })
}

/// Decrypt `requests` on behalf of `owner` using `grant`.
///
/// All or nothing: any rejection, or a response missing a requested handle,
/// fails the whole call.
pub async fn decrypt(
    instance: &dyn FhevmInstance,
    grant: &DecryptionGrant,
    requests: &[HandleContractPair],
    owner: Address,
) -> Result<HashMap<Handle, ClearValue>> {
    if requests.is_empty() {
        return Ok(HashMap::new());
    }
    if let Some(outside) = requests.iter().find(|r| !grant.covers(&r.contract_address)) {
        return Err(FhevmError::Decryption(format!(
            "contract {} is not covered by the decryption grant",
            outside.contract_address
        )));
    }
    if unix_now() >= grant.expires_at() {
        return Err(FhevmError::Decryption(
            "decryption grant has expired".into(),
        ));
    }

    let request = UserDecryptRequest {
        pairs: requests.to_vec(),
        private_key: grant.keypair.private_key.clone(),
        public_key: grant.keypair.public_key.clone(),
        signature: grant.signature.clone(),
        contracts: grant.contracts.clone(),
        user: owner,
        start_timestamp: grant.start_timestamp,
        duration_days: grant.duration_days,
    };
    let results = instance
        .user_decrypt(&request)
        .await
        .map_err(FhevmError::into_decryption)?;

    if let Some(missing) = requests.iter().find(|r| !results.contains_key(&r.handle)) {
        return Err(FhevmError::Decryption(format!(
            "backend returned no value for handle {}",
            missing.handle
        )));
    }
    Ok(results)
}

/// Decrypt a publicly decryptable ciphertext. No grant involved.
pub async fn decrypt_public(
    instance: &dyn FhevmInstance,
    contract: Address,
    handle: Handle,
) -> Result<ClearValue> {
    instance
        .public_decrypt(contract, handle)
        .await
        .map_err(FhevmError::into_decryption)
}
