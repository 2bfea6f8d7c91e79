//! Bluetooth device addresses.

use std::fmt;

/// The type of a Bluetooth LE device address, as carried in
/// `IdentityAddressInformation` and used to build the `A`/`B` operands of
/// the SMP crypto toolbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => 0x00,
            AddressType::Random => 0x01,
        }
    }
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => AddressType::Random,
            _ => AddressType::Public,
        }
    }
}

/// A 6-byte Bluetooth device address, stored little-endian as it appears on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex encoding used as the bonding-store key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5], self.bytes[4], self.bytes[3], self.bytes[2], self.bytes[1],
            self.bytes[0]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_key_is_lowercase() {
        let addr = BdAddr::new([0xAB, 0xCD, 0xEF, 0x01, 0x02, 0x03]);
        assert_eq!(addr.to_hex(), "abcdef010203");
    }

    #[test]
    fn display_reverses_byte_order() {
        let addr = BdAddr::new([0xA6, 0xA5, 0xA4, 0xA3, 0xA2, 0xA1]);
        assert_eq!(format!("{}", addr), "A1:A2:A3:A4:A5:A6");
    }

    #[test]
    fn address_type_round_trips() {
        assert_eq!(u8::from(AddressType::Public), 0x00);
        assert_eq!(u8::from(AddressType::Random), 0x01);
        assert_eq!(AddressType::from(0x00), AddressType::Public);
        assert_eq!(AddressType::from(0x01), AddressType::Random);
    }
}
