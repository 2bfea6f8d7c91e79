//! Bond persistence boundary.
//!
//! The engine ships no default persistent implementation — the embedding
//! application owns wherever bonds actually live (disk, a database, a
//! secure element). [`testing::MemoryBondStore`](super::testing::MemoryBondStore)
//! is provided for tests and demos only.

use thiserror::Error;

use super::types::BondInfo;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no bond found for peer {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Keyed by the lowercase hex-encoded remote device address
/// ([`crate::addr::BdAddr::to_hex`]).
pub trait BondStore: Send + Sync {
    fn find(&self, peer: &str) -> Result<BondInfo, StoreError>;
    fn save(&self, peer: &str, bond: &BondInfo) -> Result<(), StoreError>;
    fn exists(&self, peer: &str) -> bool;
    fn delete(&self, peer: &str) -> Result<(), StoreError>;
}
