//! Pairing-method selection (Core Spec v5.0 Vol 3 Part H §2.3.5.1, Tables
//! 2.6, 2.7, 2.8).

use super::types::{IoCapability, PairingMethod};

const SC_TABLE: [[PairingMethod; 5]; 5] = {
    use PairingMethod::*;
    [
        [JustWorks, JustWorks, PasskeyEntry, JustWorks, PasskeyEntry],
        [JustWorks, NumericComparison, PasskeyEntry, JustWorks, NumericComparison],
        [PasskeyEntry, PasskeyEntry, PasskeyEntry, JustWorks, PasskeyEntry],
        [JustWorks, JustWorks, JustWorks, JustWorks, JustWorks],
        [PasskeyEntry, NumericComparison, PasskeyEntry, JustWorks, NumericComparison],
    ]
};

const LEGACY_TABLE: [[PairingMethod; 5]; 5] = {
    use PairingMethod::*;
    [
        [JustWorks, JustWorks, PasskeyEntry, JustWorks, PasskeyEntry],
        [JustWorks, JustWorks, PasskeyEntry, JustWorks, PasskeyEntry],
        [PasskeyEntry, PasskeyEntry, PasskeyEntry, JustWorks, PasskeyEntry],
        [JustWorks, JustWorks, JustWorks, JustWorks, JustWorks],
        [PasskeyEntry, PasskeyEntry, PasskeyEntry, JustWorks, PasskeyEntry],
    ]
};

/// Selects the association model for a pairing session.
///
/// `local`/`remote` are the raw IO capability bytes each side advertised;
/// `local_mitm`/`remote_mitm` are the MITM bits of their AuthReq fields;
/// `legacy` is true unless both sides set the Secure Connections AuthReq bit.
pub fn determine_pairing_type(
    local_io_cap: u8,
    remote_io_cap: u8,
    local_mitm: bool,
    remote_mitm: bool,
    legacy: bool,
    local_oob: bool,
    remote_oob: bool,
) -> PairingMethod {
    if legacy && local_oob && remote_oob {
        return PairingMethod::Oob;
    }
    if local_oob || remote_oob {
        return PairingMethod::Oob;
    }
    if !local_mitm && !remote_mitm {
        return PairingMethod::JustWorks;
    }

    let (Some(local), Some(remote)) = (
        IoCapability::from_u8(local_io_cap),
        IoCapability::from_u8(remote_io_cap),
    ) else {
        log::warn!(
            "determine_pairing_type: reserved IO capability (local={:#04x}, remote={:#04x}), falling back to Just Works",
            local_io_cap,
            remote_io_cap
        );
        return PairingMethod::JustWorks;
    };

    let table = if legacy { &LEGACY_TABLE } else { &SC_TABLE };
    table[remote as usize][local as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_mitm_is_always_just_works() {
        assert_eq!(
            determine_pairing_type(0x02, 0x02, false, false, false, false, false),
            PairingMethod::JustWorks
        );
    }

    #[test]
    fn both_oob_selects_oob() {
        assert_eq!(
            determine_pairing_type(0x00, 0x00, true, true, false, true, true),
            PairingMethod::Oob
        );
    }

    #[test]
    fn one_sided_oob_selects_oob_even_for_sc() {
        // Unlike the both-sides-and-legacy rule above, a single side
        // advertising OOB selects OOB unconditionally, SC included.
        assert_eq!(
            determine_pairing_type(0x00, 0x00, true, true, false, true, false),
            PairingMethod::Oob
        );
        assert_eq!(
            determine_pairing_type(0x00, 0x00, true, true, false, false, true),
            PairingMethod::Oob
        );
    }

    #[test]
    fn reserved_io_capability_falls_back_to_just_works() {
        assert_eq!(
            determine_pairing_type(0x07, 0x01, true, true, false, false, false),
            PairingMethod::JustWorks
        );
    }

    #[test]
    fn sc_display_yes_no_both_is_numeric_comparison() {
        assert_eq!(
            determine_pairing_type(0x01, 0x01, true, true, false, false, false),
            PairingMethod::NumericComparison
        );
    }

    #[test]
    fn legacy_display_yes_no_both_is_just_works_not_numeric_comparison() {
        // Table 2.7 (legacy) has no Numeric Comparison entries at all.
        assert_eq!(
            determine_pairing_type(0x01, 0x01, true, true, true, false, false),
            PairingMethod::JustWorks
        );
    }

    #[test]
    fn keyboard_only_selects_passkey_entry() {
        assert_eq!(
            determine_pairing_type(0x02, 0x00, true, true, false, false, false),
            PairingMethod::PasskeyEntry
        );
    }

    #[test]
    fn no_input_no_output_is_always_just_works_when_mitm_requested() {
        for other in 0..5u8 {
            assert_eq!(
                determine_pairing_type(0x03, other, true, true, false, false, false),
                PairingMethod::JustWorks
            );
            assert_eq!(
                determine_pairing_type(other, 0x03, true, true, false, false, false),
                PairingMethod::JustWorks
            );
        }
    }
}
