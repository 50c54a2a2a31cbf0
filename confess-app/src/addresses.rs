//! Per-chain deployment addresses of the ChainConfess contract.
//!
//! Format: `{"31337": {"address": "0x…"}, "11155111": {"address": "0x…"}}`.

use std::collections::BTreeMap;
use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEntry {
    pub address: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressBook {
    entries: BTreeMap<String, DeploymentEntry>,
}

impl AddressBook {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::InvalidConfig(format!("address book: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn lookup(&self, chain_id: u64) -> Option<Address> {
        self.entries.get(&chain_id.to_string()).map(|e| e.address)
    }

    /// Like [`lookup`](Self::lookup), but a missing entry is an error.
    pub fn require(&self, chain_id: u64) -> Result<Address> {
        self.lookup(chain_id).ok_or(AppError::NoContract(chain_id))
    }

    pub fn insert(&mut self, chain_id: u64, address: Address) {
        self.entries
            .insert(chain_id.to_string(), DeploymentEntry { address });
    }

    pub fn chains(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().filter_map(|k| k.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn parses_deployments_file() {
        let book = AddressBook::from_json(
            r#"{
                "31337": {"address": "0x5FbDB2315678afecb367f032d93F642f64180aa3"},
                "11155111": {"address": "0x0000000000000000000000000000000000000011"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            book.lookup(31337),
            Some(address!("5FbDB2315678afecb367f032d93F642f64180aa3"))
        );
        assert!(book.lookup(1).is_none());
        assert!(matches!(book.require(1), Err(AppError::NoContract(1))));
        assert_eq!(book.chains().collect::<Vec<_>>(), vec![11155111, 31337]);
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(AddressBook::from_json(r#"{"1": {"address": "0x12"}}"#).is_err());
    }

    #[test]
    fn insert_then_lookup() {
        let mut book = AddressBook::default();
        book.insert(5, Address::with_last_byte(5));
        assert_eq!(book.lookup(5), Some(Address::with_last_byte(5)));
    }
}
