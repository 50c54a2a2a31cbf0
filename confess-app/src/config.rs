use std::path::PathBuf;

use alloy_primitives::address;
use alloy_signer_local::PrivateKeySigner;
use fhevm_client::config::{DEV_CHAIN_ID, LOCAL_RPC_URL, SEPOLIA_CHAIN_ID};
use log::warn;

use crate::addresses::AddressBook;
use crate::error::{AppError, Result};

/// Client configuration, assembled from CLI flags and the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub rpc_url: String,
    /// Queried from the node when not given.
    pub chain_id: Option<u64>,
    /// Hex private key of the session account. Without one the client is read-only.
    pub private_key: Option<String>,
    /// Deployment address book; the built-in one only knows the local chain.
    pub addresses: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: LOCAL_RPC_URL.into(),
            chain_id: None,
            private_key: None,
            addresses: None,
        }
    }
}

impl AppConfig {
    pub fn signer(&self) -> Result<PrivateKeySigner> {
        match &self.private_key {
            Some(key) => key
                .trim()
                .parse::<PrivateKeySigner>()
                .map_err(|e| AppError::InvalidConfig(format!("private key: {e}"))),
            None => {
                warn!("no private key configured, using an ephemeral read-only account");
                Ok(PrivateKeySigner::random())
            }
        }
    }

    pub fn address_book(&self) -> Result<AddressBook> {
        match &self.addresses {
            Some(path) => AddressBook::load(path),
            None => {
                let mut book = AddressBook::default();
                // First contract deployed by the default Hardhat account.
                book.insert(
                    DEV_CHAIN_ID,
                    address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
                );
                Ok(book)
            }
        }
    }
}

/// Display name for a chain id.
pub fn network_name(chain_id: Option<u64>) -> String {
    match chain_id {
        Some(SEPOLIA_CHAIN_ID) => "Sepolia".into(),
        Some(DEV_CHAIN_ID) => "Local".into(),
        Some(id) => format!("Chain {id}"),
        None => "Not connected".into(),
    }
}
