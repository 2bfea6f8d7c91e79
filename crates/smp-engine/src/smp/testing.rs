//! An in-memory [`BondStore`] for tests and demos. Not meant for production
//! use — the engine intentionally ships no persistent implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use super::storage::{BondStore, StoreError};
use super::types::BondInfo;

#[derive(Default)]
pub struct MemoryBondStore {
    bonds: RwLock<HashMap<String, BondInfo>>,
}

impl MemoryBondStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BondStore for MemoryBondStore {
    fn find(&self, peer: &str) -> Result<BondInfo, StoreError> {
        self.bonds
            .read()
            .unwrap()
            .get(peer)
            .copied()
            .ok_or_else(|| StoreError::NotFound(peer.to_string()))
    }

    fn save(&self, peer: &str, bond: &BondInfo) -> Result<(), StoreError> {
        self.bonds.write().unwrap().insert(peer.to_string(), *bond);
        Ok(())
    }

    fn exists(&self, peer: &str) -> bool {
        self.bonds.read().unwrap().contains_key(peer)
    }

    fn delete(&self, peer: &str) -> Result<(), StoreError> {
        self.bonds
            .write()
            .unwrap()
            .remove(peer)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(peer.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_bond() {
        let store = MemoryBondStore::new();
        assert!(!store.exists("aabbccddeeff"));

        let bond = BondInfo {
            long_term_key: [9u8; 16],
            ediv: 42,
            rand: 7,
            legacy: false,
        };
        store.save("aabbccddeeff", &bond).unwrap();
        assert!(store.exists("aabbccddeeff"));
        assert_eq!(store.find("aabbccddeeff").unwrap(), bond);

        store.delete("aabbccddeeff").unwrap();
        assert!(!store.exists("aabbccddeeff"));
        assert!(store.find("aabbccddeeff").is_err());
    }
}
