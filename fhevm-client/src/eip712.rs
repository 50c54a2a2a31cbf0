//! EIP-712 authorization payloads for user decryption, and the signing
//! capability that consents to them.

use std::borrow::Cow;

use alloy_primitives::{Address, Bytes, Signature, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{FhevmError, Result};
use crate::keys;

pub const DOMAIN_NAME: &str = "Decryption";
pub const DOMAIN_VERSION: &str = "1";
pub const PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

sol! {
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainSpec {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptPermit {
    pub public_key: Bytes,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

/// Typed-data value `{ domain, types, message }` a wallet signs to authorize
/// decryption of handles owned by `contract_addresses`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip712Payload {
    pub domain: DomainSpec,
    pub message: DecryptPermit,
}

impl Eip712Payload {
    pub fn new(
        chain_id: u64,
        verifying_contract: Address,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Self> {
        if contracts.is_empty() {
            return Err(FhevmError::Authorization(
                "at least one contract address is required".into(),
            ));
        }
        if duration_days == 0 {
            return Err(FhevmError::Authorization(
                "duration must be at least one day".into(),
            ));
        }
        let public_key = keys::decode_key(public_key)?;
        Ok(Self {
            domain: DomainSpec {
                name: DOMAIN_NAME.into(),
                version: DOMAIN_VERSION.into(),
                chain_id,
                verifying_contract,
            },
            message: DecryptPermit {
                public_key: Bytes::copy_from_slice(&public_key),
                contract_addresses: contracts.to_vec(),
                start_timestamp,
                duration_days,
            },
        })
    }

    fn sol_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Owned(self.domain.name.clone())),
            Some(Cow::Owned(self.domain.version.clone())),
            Some(U256::from(self.domain.chain_id)),
            Some(self.domain.verifying_contract),
            None,
        )
    }

    /// The digest a signer signs: `keccak256(0x1901 || domainSeparator || structHash)`.
    pub fn signing_hash(&self) -> B256 {
        let message = UserDecryptRequestVerification {
            publicKey: self.message.public_key.clone(),
            contractAddresses: self.message.contract_addresses.clone(),
            startTimestamp: U256::from(self.message.start_timestamp),
            durationDays: U256::from(self.message.duration_days),
        };
        message.eip712_signing_hash(&self.sol_domain())
    }

    pub fn types() -> Value {
        json!({
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"},
            ],
            PRIMARY_TYPE: [
                {"name": "publicKey", "type": "bytes"},
                {"name": "contractAddresses", "type": "address[]"},
                {"name": "startTimestamp", "type": "uint256"},
                {"name": "durationDays", "type": "uint256"},
            ],
        })
    }

    /// `eth_signTypedData_v4` JSON for external wallets.
    pub fn to_json(&self) -> Value {
        json!({
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract,
            },
            "types": Self::types(),
            "primaryType": PRIMARY_TYPE,
            "message": {
                "publicKey": self.message.public_key,
                "contractAddresses": self.message.contract_addresses,
                "startTimestamp": self.message.start_timestamp.to_string(),
                "durationDays": self.message.duration_days.to_string(),
            },
        })
    }
}

/// Recover the address that produced `signature` over `payload`.
pub fn recover_signer(payload: &Eip712Payload, signature: &[u8]) -> Result<Address> {
    let signature = Signature::try_from(signature)
        .map_err(|e| FhevmError::Authorization(format!("malformed signature: {e}")))?;
    signature
        .recover_address_from_prehash(&payload.signing_hash())
        .map_err(|e| FhevmError::Authorization(format!("signature recovery failed: {e}")))
}

/// A capability able to produce typed-data signatures.
///
/// Implementations backed by a wallet may prompt a human and may be
/// rejected; rejection must come back as an error, never a retry.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Returns the 65-byte `r || s || v` signature.
    async fn sign_typed_data(&self, payload: &Eip712Payload) -> Result<Bytes>;
}

#[async_trait]
impl TypedDataSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy_signer::Signer::address(self)
    }

    async fn sign_typed_data(&self, payload: &Eip712Payload) -> Result<Bytes> {
        let signature = SignerSync::sign_hash_sync(self, &payload.signing_hash())
            .map_err(|e| FhevmError::Authorization(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;
    use alloy_primitives::address;

    const CONTRACT: Address = address!("00000000000000000000000000000000000000c1");
    const VERIFIER: Address = address!("1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC");

    fn payload(start: u64) -> Eip712Payload {
        let kp = generate_keypair();
        Eip712Payload::new(31337, VERIFIER, &kp.public_key, &[CONTRACT], start, 365).unwrap()
    }

    #[test]
    fn rejects_empty_contract_set_and_zero_duration() {
        let kp = generate_keypair();
        assert!(Eip712Payload::new(1, VERIFIER, &kp.public_key, &[], 0, 1).is_err());
        assert!(Eip712Payload::new(1, VERIFIER, &kp.public_key, &[CONTRACT], 0, 0).is_err());
    }

    #[test]
    fn signing_hash_binds_every_field() {
        let p = payload(1_700_000_000);
        let mut later = p.clone();
        later.message.start_timestamp += 1;
        let mut other_chain = p.clone();
        other_chain.domain.chain_id = 1;
        assert_ne!(p.signing_hash(), later.signing_hash());
        assert_ne!(p.signing_hash(), other_chain.signing_hash());
        assert_eq!(p.signing_hash(), p.clone().signing_hash());
    }

    #[tokio::test]
    async fn local_signer_round_trip() {
        let signer = PrivateKeySigner::random();
        let p = payload(1_700_000_000);
        let sig = TypedDataSigner::sign_typed_data(&signer, &p).await.unwrap();
        assert_eq!(sig.len(), 65);
        assert_eq!(
            recover_signer(&p, &sig).unwrap(),
            TypedDataSigner::address(&signer)
        );

        let mut tampered = p.clone();
        tampered.message.duration_days = 1;
        assert_ne!(
            recover_signer(&tampered, &sig).unwrap(),
            TypedDataSigner::address(&signer)
        );
    }

    #[test]
    fn json_shape_for_wallets() {
        let json = payload(5).to_json();
        assert_eq!(json["primaryType"], PRIMARY_TYPE);
        assert_eq!(json["domain"]["name"], "Decryption");
        assert_eq!(json["message"]["durationDays"], "365");
        assert_eq!(json["types"][PRIMARY_TYPE].as_array().unwrap().len(), 4);
    }

    #[test]
    fn malformed_signature_is_authorization_error() {
        let err = recover_signer(&payload(0), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, FhevmError::Authorization(_)));
    }
}
