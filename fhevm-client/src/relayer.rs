//! Production backend: the relayer SDK and the instances it creates.
//!
//! The SDK is described by a JSON manifest published at a fixed location.
//! Once fetched, every encryption and decryption call is forwarded to the
//! relayer service named in the network configuration.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{NetworkConfig, SDK_CDN_URL};
use crate::eip712::Eip712Payload;
use crate::error::{FhevmError, Result};
use crate::http;
use crate::instance::{FhevmInstance, UserDecryptRequest};
use crate::keys::{self, KeyPair};
use crate::loader::SdkSource;
use crate::network::Connectivity;
use crate::types::{ClearValue, Handle, SealedInput, TypedValue};

/// The capability object the loader yields.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// One-time backend initialization. The loader guarantees a single call.
    async fn init(&self) -> Result<()>;

    /// Default production network configuration shipped with the SDK.
    fn default_config(&self) -> NetworkConfig;

    async fn create_instance(
        &self,
        config: NetworkConfig,
        network: Connectivity,
    ) -> Result<Arc<dyn FhevmInstance>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkManifest {
    pub version: String,
    pub sepolia: NetworkConfig,
}

/// Fetches the SDK manifest over HTTP.
pub struct HttpSdkSource {
    url: String,
}

impl HttpSdkSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for HttpSdkSource {
    fn default() -> Self {
        Self::new(SDK_CDN_URL)
    }
}

#[async_trait]
impl SdkSource for HttpSdkSource {
    async fn fetch(&self) -> Result<Arc<dyn RelayerSdk>> {
        let manifest: SdkManifest = http::get_json(self.url.clone())
            .await
            .map_err(FhevmError::Load)?;
        info!("relayer SDK {} loaded from {}", manifest.version, self.url);
        Ok(Arc::new(HttpRelayerSdk::new(manifest)))
    }
}

pub struct HttpRelayerSdk {
    manifest: SdkManifest,
}

impl HttpRelayerSdk {
    pub fn new(manifest: SdkManifest) -> Self {
        Self { manifest }
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

#[async_trait]
impl RelayerSdk for HttpRelayerSdk {
    async fn init(&self) -> Result<()> {
        let url = format!("{}/v1/keyurl", self.manifest.sepolia.relayer_url);
        let _: Value = http::get_json(url).await.map_err(FhevmError::Load)?;
        debug!("relayer key material reachable");
        Ok(())
    }

    fn default_config(&self) -> NetworkConfig {
        self.manifest.sepolia.clone()
    }

    async fn create_instance(
        &self,
        config: NetworkConfig,
        network: Connectivity,
    ) -> Result<Arc<dyn FhevmInstance>> {
        let chain_id = network.reader().chain_id().await?;
        if chain_id != config.chain_id {
            return Err(FhevmError::Network(format!(
                "relayer is configured for chain {}, network reports {}",
                config.chain_id, chain_id
            )));
        }
        info!(
            "relayer instance created for chain {} via {}",
            chain_id, config.relayer_url
        );
        Ok(Arc::new(RelayerInstance::new(config)))
    }
}

#[derive(Deserialize)]
struct UserDecryptResponse {
    results: HashMap<String, ClearValue>,
}

#[derive(Deserialize)]
struct PublicDecryptResponse {
    value: ClearValue,
}

/// Instance backed by the relayer HTTP API.
///
/// This backend does not encrypt on the client. [`FhevmInstance::encrypt`]
/// sends the cleartext values to the relayer service, which encrypts them
/// and returns handles plus the input proof. Only use it with a relayer you
/// trust to see the plaintext.
pub struct RelayerInstance {
    config: NetworkConfig,
}

impl RelayerInstance {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.relayer_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl FhevmInstance for RelayerInstance {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Posts the cleartext `values` to the relayer's `input-proof` endpoint.
    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[TypedValue],
    ) -> Result<SealedInput> {
        let body = json!({
            "contractAddress": contract,
            "userAddress": user,
            "contractChainId": self.config.chain_id,
            "values": values,
        });
        http::post_json(self.endpoint("input-proof"), body)
            .await
            .map_err(FhevmError::Encryption)
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
        // Decryption requests are verified on the gateway chain, not the host.
        Eip712Payload::new(
            self.config.gateway_chain_id,
            self.config.verifying_contract_address_decryption,
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
        let body = json!({
            "handleContractPairs": request.pairs,
            "requestValidity": {
                "startTimestamp": request.start_timestamp.to_string(),
                "durationDays": request.duration_days.to_string(),
            },
            "contractsChainId": self.config.chain_id.to_string(),
            "contractAddresses": request.contracts,
            "userAddress": request.user,
            "signature": hex::encode(&request.signature),
            "publicKey": request.public_key.trim_start_matches("0x"),
        });
        let resp: UserDecryptResponse = http::post_json(self.endpoint("user-decrypt"), body)
            .await
            .map_err(FhevmError::Decryption)?;

        resp.results
            .into_iter()
            .map(|(handle, value)| {
                let handle = handle.parse::<B256>().map_err(|e| {
                    FhevmError::Decryption(format!("relayer returned bad handle {handle}: {e}"))
                })?;
                Ok((handle, value))
            })
            .collect()
    }

    async fn public_decrypt(&self, contract: Address, handle: Handle) -> Result<ClearValue> {
        let body = json!({
            "contractAddress": contract,
            "handle": handle,
        });
        let resp: PublicDecryptResponse = http::post_json(self.endpoint("public-decrypt"), body)
            .await
            .map_err(FhevmError::Decryption)?;
        Ok(resp.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;
    use alloy_primitives::address;

    #[test]
    fn manifest_parses() {
        let raw = json!({
            "version": "0.2.0",
            "sepolia": NetworkConfig::sepolia(),
        });
        let manifest: SdkManifest = serde_json::from_value(raw).unwrap();
        let sdk = HttpRelayerSdk::new(manifest);
        assert_eq!(sdk.version(), "0.2.0");
        assert_eq!(sdk.default_config(), NetworkConfig::sepolia());
    }

    #[test]
    fn endpoints_join_cleanly() {
        let mut config = NetworkConfig::sepolia();
        config.relayer_url = "https://relayer.example/".into();
        let instance = RelayerInstance::new(config);
        assert_eq!(
            instance.endpoint("input-proof"),
            "https://relayer.example/v1/input-proof"
        );
    }

    #[test]
    fn eip712_domain_uses_decryption_verifier() {
        let instance = RelayerInstance::new(NetworkConfig::sepolia());
        let kp = generate_keypair();
        let contract = address!("00000000000000000000000000000000000000c1");
        let payload = instance
            .create_eip712(&kp.public_key, &[contract], 10, 1)
            .unwrap();
        assert_eq!(payload.domain.chain_id, 55815);
        assert_ne!(payload.domain.chain_id, instance.chain_id());
        assert_eq!(
            payload.domain.verifying_contract,
            NetworkConfig::sepolia().verifying_contract_address_decryption
        );
    }
}
