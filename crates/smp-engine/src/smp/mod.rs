//! Security Manager Protocol: pairing, bonding, and the crypto toolbox
//! behind them.
//!
//! This module implements the Bluetooth Security Manager Protocol for LE:
//! - PDU parsing/serialization ([`codec`])
//! - the cryptographic toolbox ([`crypto`])
//! - per-peer pairing session state ([`context`])
//! - pairing-method selection ([`pairing_type`])
//! - the reactive state machine that ties it together ([`manager`])

mod codec;
mod constants;
mod context;
mod crypto;
mod manager;
mod pairing_type;
mod storage;
pub mod testing;
mod types;

pub use codec::{CodecError, Pdu};
pub use context::PairingContext;
pub use manager::{HandleOutcome, Manager};
pub use pairing_type::determine_pairing_type;
pub use storage::{BondStore, StoreError};
pub use types::{
    AuthData, AuthRequirements, BondInfo, IoCapability, PairingConfig, PairingEvent,
    PairingMethod, PairingState, SmpError,
};
