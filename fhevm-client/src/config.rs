use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Fixed location of the relayer SDK manifest, fetched at most once per process.
pub const SDK_CDN_URL: &str = "https://cdn.zama.ai/relayer-sdk-js/0.2.0/relayer-sdk-manifest.json";

/// Network id reserved for local development chains (Hardhat / Anvil).
pub const DEV_CHAIN_ID: u64 = 31337;

/// Local endpoint the simulated backend is bound to.
pub const LOCAL_RPC_URL: &str = "http://localhost:8545";

/// Sepolia network id.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Production relayer network configuration.
///
/// The relayer SDK ships a default (Sepolia) value; the instance factory
/// merges it with the caller's connectivity handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub acl_contract_address: Address,
    pub kms_contract_address: Address,
    pub input_verifier_contract_address: Address,
    /// EIP-712 verifying contract for user decryption requests.
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    /// Host chain the confidential contracts live on.
    pub chain_id: u64,
    /// Gateway chain id; the relayer backend signs decryption requests over it.
    pub gateway_chain_id: u64,
    pub relayer_url: String,
}

impl NetworkConfig {
    pub fn sepolia() -> Self {
        Self {
            acl_contract_address: address!("687820221192C5B662b25367F70076A37bc79b6c"),
            kms_contract_address: address!("1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC"),
            input_verifier_contract_address: address!("bc91f3daD1A5F19F8390c400196e58073B6a0BC4"),
            verifying_contract_address_decryption: address!(
                "b6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"
            ),
            verifying_contract_address_input_verification: address!(
                "7048C39f048125eDa9d678AEbaDfB22F7900a29F"
            ),
            chain_id: SEPOLIA_CHAIN_ID,
            gateway_chain_id: 55815,
            relayer_url: "https://relayer.testnet.zama.cloud".into(),
        }
    }
}

/// Configuration of the simulated (mock) backend used against local chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}

impl Default for MockChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: LOCAL_RPC_URL.into(),
            chain_id: DEV_CHAIN_ID,
            acl_address: address!("50157CFfD6bBFA2DECe204a89ec419c23ef5755D"),
            input_verifier_address: address!("901F8942346f7AB3a01F6D7613119Bca447Bb030"),
            kms_verifier_address: address!("1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_defaults_target_local_chain() {
        let cfg = MockChainConfig::default();
        assert_eq!(cfg.chain_id, DEV_CHAIN_ID);
        assert_eq!(cfg.rpc_url, "http://localhost:8545");
        assert_eq!(
            cfg.acl_address,
            "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn network_config_uses_camel_case_keys() {
        let json = serde_json::to_value(NetworkConfig::sepolia()).unwrap();
        assert_eq!(json["chainId"], 11155111);
        assert_eq!(json["gatewayChainId"], 55815);
        assert!(json["relayerUrl"].as_str().unwrap().starts_with("https://"));

        let back: NetworkConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, NetworkConfig::sepolia());
    }

    #[test]
    fn mock_config_metadata_keys() {
        let json = serde_json::to_value(MockChainConfig::default()).unwrap();
        assert!(json.get("ACLAddress").is_some());
        assert!(json.get("KMSVerifierAddress").is_some());
        assert!(json.get("inputVerifierAddress").is_some());
    }
}
