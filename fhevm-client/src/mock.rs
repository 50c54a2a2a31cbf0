//! Simulated fhEVM backend for local development chains.
//!
//! Stands in for the coprocessor, ACL, input verifier and KMS of a real
//! deployment: ciphertexts are plaintexts kept in process, but every access
//! rule a production backend enforces is enforced here too (input proof
//! binding, ACL membership, grant window, contract set, signer identity).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::authorization::{unix_now, SECONDS_PER_DAY};
use crate::config::MockChainConfig;
use crate::eip712::{recover_signer, Eip712Payload};
use crate::error::{FhevmError, Result};
use crate::instance::{FhevmInstance, UserDecryptRequest};
use crate::keys::{self, KeyPair};
use crate::network::NetworkReader;
use crate::types::{ClearValue, Handle, SealedInput, TypedValue};

// Domain separators for the simulated coprocessor's hashes.
pub const DOMAIN_INPUT_HANDLE: u8 = 0x20;
pub const DOMAIN_INPUT_PROOF: u8 = 0x21;
pub const DOMAIN_COMPUTED_HANDLE: u8 = 0x22;

/// Handle layout version (byte 31).
pub const HANDLE_VERSION: u8 = 0;

/// Domain-separated SHA-256: H(domain_byte || data).
pub fn hash_with_domain(domain: u8, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([domain]);
    hasher.update(data);
    hasher.finalize().into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InputOrigin {
    contract: Address,
    user: Address,
}

#[derive(Clone, Debug)]
struct StoredCiphertext {
    value: TypedValue,
    origin: Option<InputOrigin>,
    allowed: HashSet<Address>,
    publicly_decryptable: bool,
}

#[derive(Default)]
struct MockState {
    ciphertexts: HashMap<Handle, StoredCiphertext>,
    nonce: u64,
}

/// In-process simulated backend.
pub struct MockInstance {
    config: MockChainConfig,
    state: Mutex<MockState>,
    clock_offset: AtomicU64,
}

impl MockInstance {
    pub fn new(config: MockChainConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MockState::default()),
            clock_offset: AtomicU64::new(0),
        }
    }

    /// Bind to a local node, checking it reports the expected chain id.
    pub async fn connect(config: MockChainConfig, reader: &dyn NetworkReader) -> Result<Self> {
        let chain_id = reader.chain_id().await?;
        if chain_id != config.chain_id {
            return Err(FhevmError::Network(format!(
                "simulated backend expects chain {}, {} reports {}",
                config.chain_id, config.rpc_url, chain_id
            )));
        }
        info!(
            "simulated fhEVM backend bound to {} (chain {})",
            config.rpc_url, chain_id
        );
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &MockChainConfig {
        &self.config
    }

    /// Simulated wall clock (unix seconds).
    pub fn now(&self) -> u64 {
        unix_now().saturating_add(self.clock_offset.load(Ordering::Relaxed))
    }

    /// Move the simulated clock forward.
    pub fn advance_time(&self, seconds: u64) {
        self.clock_offset.fetch_add(seconds, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `digest[0..21] || index || chain_id (8, BE) || type || version`
    fn make_handle(&self, domain: u8, seed: &[u8], index: u8, value: &TypedValue) -> Handle {
        let mut data = seed.to_vec();
        data.push(index);
        data.push(value.type_code());
        let digest = hash_with_domain(domain, &data);

        let mut handle = [0u8; 32];
        handle[..21].copy_from_slice(&digest[..21]);
        handle[21] = index;
        handle[22..30].copy_from_slice(&self.config.chain_id.to_be_bytes());
        handle[30] = value.type_code();
        handle[31] = HANDLE_VERSION;
        B256::from(handle)
    }

    fn proof_digest(contract: Address, user: Address, handles: &[Handle]) -> [u8; 32] {
        let mut data = Vec::with_capacity(40 + handles.len() * 32);
        data.extend_from_slice(contract.as_slice());
        data.extend_from_slice(user.as_slice());
        for h in handles {
            data.extend_from_slice(h.as_slice());
        }
        hash_with_domain(DOMAIN_INPUT_PROOF, &data)
    }

    /// `num_handles || num_signers (1) || handles || attestation`
    fn encode_proof(contract: Address, user: Address, handles: &[Handle]) -> Bytes {
        let mut buf = Vec::with_capacity(2 + handles.len() * 32 + 32);
        buf.push(handles.len() as u8);
        buf.push(1);
        for h in handles {
            buf.extend_from_slice(h.as_slice());
        }
        buf.extend_from_slice(&Self::proof_digest(contract, user, handles));
        Bytes::from(buf)
    }

    fn decode_proof(proof: &[u8]) -> Result<(Vec<Handle>, [u8; 32])> {
        let invalid = || FhevmError::Encryption("malformed input proof".into());
        if proof.len() < 2 {
            return Err(invalid());
        }
        let count = proof[0] as usize;
        if proof[1] != 1 || proof.len() != 2 + count * 32 + 32 {
            return Err(invalid());
        }
        let handles = proof[2..2 + count * 32]
            .chunks_exact(32)
            .map(B256::from_slice)
            .collect();
        let mut attestation = [0u8; 32];
        attestation.copy_from_slice(&proof[2 + count * 32..]);
        Ok((handles, attestation))
    }

    /// Contract-side verification of an external input (`FHE.fromExternal`).
    ///
    /// Checks the proof attests `handle` for exactly `(contract, user)` and
    /// grants `contract` access to the ciphertext.
    pub fn verify_input(
        &self,
        handle: Handle,
        proof: &[u8],
        contract: Address,
        user: Address,
    ) -> Result<TypedValue> {
        let (handles, attestation) = Self::decode_proof(proof)?;
        if !handles.contains(&handle) {
            return Err(FhevmError::Encryption(format!(
                "input proof does not cover handle {handle}"
            )));
        }
        if Self::proof_digest(contract, user, &handles) != attestation {
            return Err(FhevmError::Encryption(
                "input proof was not issued for this contract and user".into(),
            ));
        }

        let mut state = self.lock();
        let stored = state
            .ciphertexts
            .get_mut(&handle)
            .ok_or_else(|| FhevmError::Encryption(format!("unknown handle {handle}")))?;
        if stored.origin != Some(InputOrigin { contract, user }) {
            return Err(FhevmError::Encryption(
                "handle was not encrypted for this contract and user".into(),
            ));
        }
        stored.allowed.insert(contract);
        Ok(stored.value)
    }

    /// Encrypt a constant on the coprocessor side (`FHE.asEuintXX`).
    pub fn trivial_encrypt(&self, value: TypedValue) -> Handle {
        let mut state = self.lock();
        state.nonce += 1;
        let handle = self.make_handle(DOMAIN_COMPUTED_HANDLE, &state.nonce.to_be_bytes(), 0, &value);
        state.ciphertexts.insert(
            handle,
            StoredCiphertext {
                value,
                origin: None,
                allowed: HashSet::new(),
                publicly_decryptable: false,
            },
        );
        handle
    }

    /// Homomorphic addition of a plaintext scalar; yields a fresh handle with an empty ACL.
    pub fn add(&self, handle: Handle, rhs: u64) -> Result<Handle> {
        let value = {
            let state = self.lock();
            let stored = state
                .ciphertexts
                .get(&handle)
                .ok_or_else(|| FhevmError::Encryption(format!("unknown handle {handle}")))?;
            stored.value.wrapping_add(rhs).ok_or_else(|| {
                FhevmError::Encryption("addition is undefined for encrypted booleans".into())
            })?
        };
        Ok(self.trivial_encrypt(value))
    }

    /// `FHE.allow(handle, account)`.
    pub fn allow(&self, handle: Handle, account: Address) -> Result<()> {
        let mut state = self.lock();
        let stored = state
            .ciphertexts
            .get_mut(&handle)
            .ok_or_else(|| FhevmError::Encryption(format!("unknown handle {handle}")))?;
        stored.allowed.insert(account);
        Ok(())
    }

    /// `FHE.makePubliclyDecryptable(handle)`.
    pub fn allow_for_decryption(&self, handle: Handle) -> Result<()> {
        let mut state = self.lock();
        let stored = state
            .ciphertexts
            .get_mut(&handle)
            .ok_or_else(|| FhevmError::Encryption(format!("unknown handle {handle}")))?;
        stored.publicly_decryptable = true;
        Ok(())
    }

    pub fn is_allowed(&self, handle: Handle, account: Address) -> bool {
        self.lock()
            .ciphertexts
            .get(&handle)
            .is_some_and(|c| c.allowed.contains(&account))
    }

    pub fn is_publicly_decryptable(&self, handle: Handle) -> bool {
        self.lock()
            .ciphertexts
            .get(&handle)
            .is_some_and(|c| c.publicly_decryptable)
    }

    fn check_grant(&self, request: &UserDecryptRequest) -> Result<()> {
        let now = self.now();
        let expires = request
            .start_timestamp
            .saturating_add(request.duration_days.saturating_mul(SECONDS_PER_DAY));
        if now < request.start_timestamp {
            return Err(FhevmError::Decryption("request is not valid yet".into()));
        }
        if now >= expires {
            return Err(FhevmError::Decryption("request has expired".into()));
        }

        let derived = keys::public_key_for(&request.private_key)
            .map_err(FhevmError::into_decryption)?;
        if derived != request.public_key.trim_start_matches("0x") {
            return Err(FhevmError::Decryption(
                "private key does not match public key".into(),
            ));
        }

        let payload = self
            .create_eip712(
                &request.public_key,
                &request.contracts,
                request.start_timestamp,
                request.duration_days,
            )
            .map_err(FhevmError::into_decryption)?;
        let signer =
            recover_signer(&payload, &request.signature).map_err(FhevmError::into_decryption)?;
        if signer != request.user {
            return Err(FhevmError::Decryption(format!(
                "signature was produced by {signer}, not {}",
                request.user
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FhevmInstance for MockInstance {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn is_in_process(&self) -> bool {
        true
    }

    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[TypedValue],
    ) -> Result<SealedInput> {
        if values.is_empty() || values.len() > u8::MAX as usize {
            return Err(FhevmError::Encryption(format!(
                "batch must hold 1..=255 values, got {}",
                values.len()
            )));
        }
        let mut state = self.lock();
        state.nonce += 1;
        let mut seed = Vec::with_capacity(48);
        seed.extend_from_slice(contract.as_slice());
        seed.extend_from_slice(user.as_slice());
        seed.extend_from_slice(&state.nonce.to_be_bytes());

        let origin = InputOrigin { contract, user };
        let handles: Vec<Handle> = values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let handle = self.make_handle(DOMAIN_INPUT_HANDLE, &seed, i as u8, value);
                state.ciphertexts.insert(
                    handle,
                    StoredCiphertext {
                        value: *value,
                        origin: Some(origin),
                        allowed: HashSet::new(),
                        publicly_decryptable: false,
                    },
                );
                handle
            })
            .collect();
        debug!("simulated encryption of {} value(s)", handles.len());

        Ok(SealedInput {
            input_proof: Self::encode_proof(contract, user, &handles),
            handles,
        })
    }

    fn generate_keypair(&self) -> KeyPair {
        keys::generate_keypair()
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<Eip712Payload> {
        Eip712Payload::new(
            self.config.chain_id,
            self.config.kms_verifier_address,
            public_key,
            contracts,
            start_timestamp,
            duration_days,
        )
    }

    async fn user_decrypt(
        &self,
        request: &UserDecryptRequest,
    ) -> Result<HashMap<Handle, ClearValue>> {
        self.check_grant(request)?;

        let state = self.lock();
        let mut results = HashMap::with_capacity(request.pairs.len());
        for pair in &request.pairs {
            if !request.contracts.contains(&pair.contract_address) {
                return Err(FhevmError::Decryption(format!(
                    "contract {} is not part of the signed request",
                    pair.contract_address
                )));
            }
            let stored = state.ciphertexts.get(&pair.handle).ok_or_else(|| {
                FhevmError::Decryption(format!("unknown handle {}", pair.handle))
            })?;
            if !stored.allowed.contains(&request.user) {
                return Err(FhevmError::Decryption(format!(
                    "{} is not allowed to decrypt {}",
                    request.user, pair.handle
                )));
            }
            if !stored.allowed.contains(&pair.contract_address) {
                return Err(FhevmError::Decryption(format!(
                    "contract {} is not allowed to use {}",
                    pair.contract_address, pair.handle
                )));
            }
            results.insert(pair.handle, ClearValue::from(stored.value));
        }
        Ok(results)
    }

    async fn public_decrypt(&self, contract: Address, handle: Handle) -> Result<ClearValue> {
        debug!("public decryption of {handle} for {contract}");
        let state = self.lock();
        match state.ciphertexts.get(&handle) {
            Some(stored) if stored.publicly_decryptable => Ok(ClearValue::from(stored.value)),
            Some(_) => Err(FhevmError::Decryption(format!(
                "{handle} is not publicly decryptable"
            ))),
            None => Err(FhevmError::Decryption(format!("unknown handle {handle}"))),
        }
    }
}
