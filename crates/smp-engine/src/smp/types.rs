//! Core data types for the Security Manager Protocol engine.

use thiserror::Error;

use super::constants::*;
use crate::addr::BdAddr;

/// Errors surfaced by the SMP engine. The wire-mapped variants correspond to
/// the SMP `Pairing Failed` reason codes (Core Spec v5.0 Vol 3 Part H §3.5.5);
/// the remaining variants never cross the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmpError {
    #[error("passkey entry failed")]
    PasskeyEntryFailed,
    #[error("out of band data not available")]
    OobNotAvailable,
    #[error("authentication requirements not met")]
    AuthenticationRequirements,
    #[error("confirm value failed to match")]
    ConfirmValueFailed,
    #[error("pairing not supported")]
    PairingNotSupported,
    #[error("encryption key size below minimum")]
    EncryptionKeySize,
    #[error("command not supported")]
    CommandNotSupported,
    #[error("unspecified reason")]
    UnspecifiedReason,
    #[error("repeated attempts")]
    RepeatedAttempts,
    #[error("invalid parameters")]
    InvalidParameters,
    #[error("DHKey check failed")]
    DhKeyCheckFailed,
    #[error("numeric comparison failed")]
    NumericComparisonFailed,
    #[error("BR/EDR pairing in progress")]
    BrEdrPairingInProgress,
    #[error("cross-transport key derivation not allowed")]
    CrossTransportKeyNotAllowed,

    #[error("codec error: {0}")]
    Codec(#[from] super::codec::CodecError),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid pairing state for this operation")]
    InvalidState,
    #[error("bond store error: {0}")]
    Store(#[from] super::storage::StoreError),
    #[error("no bond found for this peer")]
    NotPaired,
}

impl SmpError {
    /// Maps a `Pairing Failed` reason byte to its error variant. Unknown
    /// reason codes map to `UnspecifiedReason` rather than panicking, since a
    /// reserved/future code is still a valid thing for a peer to send us.
    pub fn from_reason(reason: u8) -> Self {
        match reason {
            SMP_REASON_PASSKEY_ENTRY_FAILED => SmpError::PasskeyEntryFailed,
            SMP_REASON_OOB_NOT_AVAILABLE => SmpError::OobNotAvailable,
            SMP_REASON_AUTHENTICATION_REQUIREMENTS => SmpError::AuthenticationRequirements,
            SMP_REASON_CONFIRM_VALUE_FAILED => SmpError::ConfirmValueFailed,
            SMP_REASON_PAIRING_NOT_SUPPORTED => SmpError::PairingNotSupported,
            SMP_REASON_ENCRYPTION_KEY_SIZE => SmpError::EncryptionKeySize,
            SMP_REASON_COMMAND_NOT_SUPPORTED => SmpError::CommandNotSupported,
            SMP_REASON_REPEATED_ATTEMPTS => SmpError::RepeatedAttempts,
            SMP_REASON_INVALID_PARAMETERS => SmpError::InvalidParameters,
            SMP_REASON_DHKEY_CHECK_FAILED => SmpError::DhKeyCheckFailed,
            SMP_REASON_NUMERIC_COMPARISON_FAILED => SmpError::NumericComparisonFailed,
            SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS => SmpError::BrEdrPairingInProgress,
            SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED => SmpError::CrossTransportKeyNotAllowed,
            _ => SmpError::UnspecifiedReason,
        }
    }

    /// The reason byte to send in an outbound `Pairing Failed` PDU. Errors
    /// with no wire representation collapse to `UnspecifiedReason`.
    pub fn to_reason(&self) -> u8 {
        match self {
            SmpError::PasskeyEntryFailed => SMP_REASON_PASSKEY_ENTRY_FAILED,
            SmpError::OobNotAvailable => SMP_REASON_OOB_NOT_AVAILABLE,
            SmpError::AuthenticationRequirements => SMP_REASON_AUTHENTICATION_REQUIREMENTS,
            SmpError::ConfirmValueFailed => SMP_REASON_CONFIRM_VALUE_FAILED,
            SmpError::PairingNotSupported => SMP_REASON_PAIRING_NOT_SUPPORTED,
            SmpError::EncryptionKeySize => SMP_REASON_ENCRYPTION_KEY_SIZE,
            SmpError::CommandNotSupported => SMP_REASON_COMMAND_NOT_SUPPORTED,
            SmpError::RepeatedAttempts => SMP_REASON_REPEATED_ATTEMPTS,
            SmpError::InvalidParameters => SMP_REASON_INVALID_PARAMETERS,
            SmpError::DhKeyCheckFailed => SMP_REASON_DHKEY_CHECK_FAILED,
            SmpError::NumericComparisonFailed => SMP_REASON_NUMERIC_COMPARISON_FAILED,
            SmpError::BrEdrPairingInProgress => SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS,
            SmpError::CrossTransportKeyNotAllowed => SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED,
            _ => SMP_REASON_UNSPECIFIED_REASON,
        }
    }
}

pub type SmpResult<T> = Result<T, SmpError>;

/// Device IO capability, as advertised in a pairing request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCapability {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    NoInputNoOutput,
    KeyboardDisplay,
}

impl IoCapability {
    pub fn to_u8(self) -> u8 {
        match self {
            IoCapability::DisplayOnly => SMP_IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => SMP_IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => SMP_IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => SMP_IO_CAPABILITY_KEYBOARD_DISPLAY,
        }
    }

    /// `None` for reserved values (`>= 0x05`); callers that hit a reserved
    /// value fall back to Just Works rather than unwrapping this.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_IO_CAPABILITY_DISPLAY_ONLY => Some(IoCapability::DisplayOnly),
            SMP_IO_CAPABILITY_DISPLAY_YES_NO => Some(IoCapability::DisplayYesNo),
            SMP_IO_CAPABILITY_KEYBOARD_ONLY => Some(IoCapability::KeyboardOnly),
            SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT => Some(IoCapability::NoInputNoOutput),
            SMP_IO_CAPABILITY_KEYBOARD_DISPLAY => Some(IoCapability::KeyboardDisplay),
            _ => None,
        }
    }
}

/// The association model selected for a pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMethod {
    JustWorks,
    PasskeyEntry,
    NumericComparison,
    Oob,
}

/// Authentication requirements bits (Core Spec v5.0 Vol 3 Part H Table 2.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthRequirements {
    pub bonding: bool,
    pub mitm: bool,
    pub secure_connections: bool,
    pub keypress: bool,
    pub ct2: bool,
}

impl AuthRequirements {
    pub fn secure() -> Self {
        Self {
            bonding: true,
            mitm: true,
            secure_connections: true,
            keypress: false,
            ct2: false,
        }
    }

    pub fn to_u8(self) -> u8 {
        let mut v = 0u8;
        if self.bonding {
            v |= SMP_AUTH_REQ_BONDING;
        }
        if self.mitm {
            v |= SMP_AUTH_REQ_MITM;
        }
        if self.secure_connections {
            v |= SMP_AUTH_REQ_SC;
        }
        if self.keypress {
            v |= SMP_AUTH_REQ_KEYPRESS;
        }
        if self.ct2 {
            v |= SMP_AUTH_REQ_CT2;
        }
        v
    }

    pub fn from_u8(v: u8) -> Self {
        Self {
            bonding: v & SMP_AUTH_REQ_BONDING != 0,
            mitm: v & SMP_AUTH_REQ_MITM != 0,
            secure_connections: v & SMP_AUTH_REQ_SC != 0,
            keypress: v & SMP_AUTH_REQ_KEYPRESS != 0,
            ct2: v & SMP_AUTH_REQ_CT2 != 0,
        }
    }
}

/// The 6-byte IO-capability/AuthReq/key-size/key-distribution block shared by
/// `PairingRequest` and `PairingResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingConfig {
    pub io_capability: u8,
    pub oob_data_flag: u8,
    pub auth_req: u8,
    pub max_key_size: u8,
    pub initiator_key_dist: u8,
    pub responder_key_dist: u8,
}

impl PairingConfig {
    pub fn to_bytes(self) -> [u8; 6] {
        [
            self.io_capability,
            self.oob_data_flag,
            self.auth_req,
            self.max_key_size,
            self.initiator_key_dist,
            self.responder_key_dist,
        ]
    }

    pub fn from_bytes(b: &[u8; 6]) -> Self {
        Self {
            io_capability: b[0],
            oob_data_flag: b[1],
            auth_req: b[2],
            max_key_size: b[3],
            initiator_key_dist: b[4],
            responder_key_dist: b[5],
        }
    }

    pub fn auth_requirements(&self) -> AuthRequirements {
        AuthRequirements::from_u8(self.auth_req)
    }
}

/// Everything needed to restart encryption with a previously paired peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BondInfo {
    pub long_term_key: [u8; 16],
    pub ediv: u16,
    pub rand: u64,
    pub legacy: bool,
}

/// Application-supplied input for association models that need it.
#[derive(Debug, Clone, Default)]
pub struct AuthData {
    pub passkey: Option<u32>,
    pub oob_data: Option<[u8; 16]>,
}

/// Ordered pairing session state. Monotonic: once `Finished` or `Error`, a
/// context accepts no further PDUs without starting fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Init,
    WaitPairingResponse,
    WaitPublicKey,
    WaitConfirm,
    WaitRandom,
    WaitDhKeyCheck,
    Finished,
    Error,
}

/// Notifications the [`super::Manager`] emits to the embedding application
/// as a pairing session progresses.
#[derive(Debug, Clone)]
pub enum PairingEvent {
    DisplayPasskey(BdAddr, u32),
    PasskeyRequest(BdAddr),
    NumericComparisonRequest(BdAddr, u32),
    PairingComplete(BdAddr),
    PairingFailed(BdAddr, SmpError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_byte_round_trips_for_wire_variants() {
        let cases = [
            SmpError::PasskeyEntryFailed,
            SmpError::OobNotAvailable,
            SmpError::AuthenticationRequirements,
            SmpError::ConfirmValueFailed,
            SmpError::PairingNotSupported,
            SmpError::EncryptionKeySize,
            SmpError::CommandNotSupported,
            SmpError::RepeatedAttempts,
            SmpError::InvalidParameters,
            SmpError::DhKeyCheckFailed,
            SmpError::NumericComparisonFailed,
            SmpError::BrEdrPairingInProgress,
            SmpError::CrossTransportKeyNotAllowed,
        ];
        for err in cases {
            assert_eq!(SmpError::from_reason(err.to_reason()), err);
        }
    }

    #[test]
    fn unknown_reason_byte_is_unspecified() {
        assert_eq!(SmpError::from_reason(0xFF), SmpError::UnspecifiedReason);
    }

    #[test]
    fn io_capability_reserved_values_are_none() {
        assert!(IoCapability::from_u8(0x05).is_none());
        assert!(IoCapability::from_u8(0xFF).is_none());
        assert_eq!(IoCapability::from_u8(0x01), Some(IoCapability::DisplayYesNo));
    }

    #[test]
    fn pairing_config_round_trips() {
        let cfg = PairingConfig {
            io_capability: 0x01,
            oob_data_flag: 0x00,
            auth_req: 0x0D,
            max_key_size: 16,
            initiator_key_dist: 0x03,
            responder_key_dist: 0x03,
        };
        let bytes = cfg.to_bytes();
        assert_eq!(PairingConfig::from_bytes(&bytes), cfg);
    }

    #[test]
    fn auth_requirements_round_trip() {
        let req = AuthRequirements::secure();
        assert_eq!(AuthRequirements::from_u8(req.to_u8()), req);
    }
}
