//! A standalone implementation of the Bluetooth LE Security Manager Protocol
//! (SMP): pairing, bonding, and the cryptographic toolbox behind them.
//!
//! This crate owns PDU parsing, the crypto primitives, pairing-method
//! selection, and the per-peer pairing state machine. It does not own a
//! transport: callers hand inbound PDU bytes to a [`smp::Manager`] and get
//! outbound PDU bytes and events back.

pub mod addr;
pub mod error;
pub mod smp;

pub use addr::{AddressType, BdAddr};
pub use smp::{
    AuthData, AuthRequirements, BondInfo, BondStore, HandleOutcome, IoCapability, Manager,
    PairingConfig, PairingEvent, PairingMethod, PairingState, Pdu, SmpError,
};
