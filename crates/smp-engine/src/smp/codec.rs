//! SMP PDU wire format: parsing, serialization, and the byte-swap
//! convention the crypto toolbox expects its operands in.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::constants::*;
use super::types::PairingConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty PDU")]
    Empty,
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
    #[error("wrong payload length for opcode {opcode:#04x}: expected {expected}, got {got}")]
    WrongLength {
        opcode: u8,
        expected: usize,
        got: usize,
    },
}

/// A single parsed SMP PDU, tagged by opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    PairingRequest(PairingConfig),
    PairingResponse(PairingConfig),
    PairingConfirm([u8; 16]),
    PairingRandom([u8; 16]),
    PairingFailed(u8),
    EncryptionInformation([u8; 16]),
    MasterIdentification { ediv: u16, rand: u64 },
    IdentityInformation([u8; 16]),
    IdentityAddressInformation { addr_type: u8, addr: [u8; 6] },
    SigningInformation([u8; 16]),
    SecurityRequest(u8),
    PairingPublicKey([u8; 64]),
    PairingDhKeyCheck([u8; 16]),
    KeypressNotification(u8),
}

impl Pdu {
    pub fn opcode(&self) -> u8 {
        match self {
            Pdu::PairingRequest(_) => SMP_PAIRING_REQUEST,
            Pdu::PairingResponse(_) => SMP_PAIRING_RESPONSE,
            Pdu::PairingConfirm(_) => SMP_PAIRING_CONFIRM,
            Pdu::PairingRandom(_) => SMP_PAIRING_RANDOM,
            Pdu::PairingFailed(_) => SMP_PAIRING_FAILED,
            Pdu::EncryptionInformation(_) => SMP_ENCRYPTION_INFORMATION,
            Pdu::MasterIdentification { .. } => SMP_MASTER_IDENTIFICATION,
            Pdu::IdentityInformation(_) => SMP_IDENTITY_INFORMATION,
            Pdu::IdentityAddressInformation { .. } => SMP_IDENTITY_ADDRESS_INFORMATION,
            Pdu::SigningInformation(_) => SMP_SIGNING_INFORMATION,
            Pdu::SecurityRequest(_) => SMP_SECURITY_REQUEST,
            Pdu::PairingPublicKey(_) => SMP_PAIRING_PUBLIC_KEY,
            Pdu::PairingDhKeyCheck(_) => SMP_PAIRING_DHK_CHECK,
            Pdu::KeypressNotification(_) => SMP_PAIRING_KEYPRESS_NOTIFICATION,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Pdu, CodecError> {
        let (&opcode, payload) = data.split_first().ok_or(CodecError::Empty)?;

        let expect = |expected: usize| -> Result<(), CodecError> {
            if payload.len() != expected {
                Err(CodecError::WrongLength {
                    opcode,
                    expected,
                    got: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        let fixed16 = |p: &[u8]| -> [u8; 16] {
            let mut out = [0u8; 16];
            out.copy_from_slice(p);
            out
        };

        match opcode {
            SMP_PAIRING_REQUEST => {
                expect(6)?;
                Ok(Pdu::PairingRequest(PairingConfig::from_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            SMP_PAIRING_RESPONSE => {
                expect(6)?;
                Ok(Pdu::PairingResponse(PairingConfig::from_bytes(
                    payload.try_into().unwrap(),
                )))
            }
            SMP_PAIRING_CONFIRM => {
                expect(16)?;
                Ok(Pdu::PairingConfirm(fixed16(payload)))
            }
            SMP_PAIRING_RANDOM => {
                expect(16)?;
                Ok(Pdu::PairingRandom(fixed16(payload)))
            }
            SMP_PAIRING_FAILED => {
                expect(1)?;
                Ok(Pdu::PairingFailed(payload[0]))
            }
            SMP_ENCRYPTION_INFORMATION => {
                expect(16)?;
                Ok(Pdu::EncryptionInformation(fixed16(payload)))
            }
            SMP_MASTER_IDENTIFICATION => {
                expect(10)?;
                let ediv = LittleEndian::read_u16(&payload[0..2]);
                let rand = LittleEndian::read_u64(&payload[2..10]);
                Ok(Pdu::MasterIdentification { ediv, rand })
            }
            SMP_IDENTITY_INFORMATION => {
                expect(16)?;
                Ok(Pdu::IdentityInformation(fixed16(payload)))
            }
            SMP_IDENTITY_ADDRESS_INFORMATION => {
                expect(7)?;
                let mut addr = [0u8; 6];
                addr.copy_from_slice(&payload[1..7]);
                Ok(Pdu::IdentityAddressInformation {
                    addr_type: payload[0],
                    addr,
                })
            }
            SMP_SIGNING_INFORMATION => {
                expect(16)?;
                Ok(Pdu::SigningInformation(fixed16(payload)))
            }
            SMP_SECURITY_REQUEST => {
                expect(1)?;
                Ok(Pdu::SecurityRequest(payload[0]))
            }
            SMP_PAIRING_PUBLIC_KEY => {
                expect(64)?;
                let mut key = [0u8; 64];
                key.copy_from_slice(payload);
                Ok(Pdu::PairingPublicKey(key))
            }
            SMP_PAIRING_DHK_CHECK => {
                expect(16)?;
                Ok(Pdu::PairingDhKeyCheck(fixed16(payload)))
            }
            SMP_PAIRING_KEYPRESS_NOTIFICATION => {
                expect(1)?;
                Ok(Pdu::KeypressNotification(payload[0]))
            }
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        match self {
            Pdu::PairingRequest(cfg) | Pdu::PairingResponse(cfg) => {
                out.extend_from_slice(&cfg.to_bytes());
            }
            Pdu::PairingConfirm(v) | Pdu::PairingRandom(v) => out.extend_from_slice(v),
            Pdu::PairingFailed(reason) => out.push(*reason),
            Pdu::EncryptionInformation(ltk) => out.extend_from_slice(ltk),
            Pdu::MasterIdentification { ediv, rand } => {
                let mut buf = [0u8; 10];
                LittleEndian::write_u16(&mut buf[0..2], *ediv);
                LittleEndian::write_u64(&mut buf[2..10], *rand);
                out.extend_from_slice(&buf);
            }
            Pdu::IdentityInformation(irk) => out.extend_from_slice(irk),
            Pdu::IdentityAddressInformation { addr_type, addr } => {
                out.push(*addr_type);
                out.extend_from_slice(addr);
            }
            Pdu::SigningInformation(csrk) => out.extend_from_slice(csrk),
            Pdu::SecurityRequest(auth_req) => out.push(*auth_req),
            Pdu::PairingPublicKey(key) => out.extend_from_slice(key),
            Pdu::PairingDhKeyCheck(check) => out.extend_from_slice(check),
            Pdu::KeypressNotification(kind) => out.push(*kind),
        }
        out
    }
}

/// Reverses a byte slice. The crypto toolbox functions are specified over
/// big-endian operands but the wire and `p256`/`aes` both deal in the
/// natural little-endian byte order SMP otherwise uses, so every crypto call
/// site swaps its inputs/outputs through this at the boundary.
pub fn swap_buf(input: &[u8]) -> Vec<u8> {
    input.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> PairingConfig {
        PairingConfig {
            io_capability: 0x01,
            oob_data_flag: 0x00,
            auth_req: 0x0D,
            max_key_size: 16,
            initiator_key_dist: 0x03,
            responder_key_dist: 0x03,
        }
    }

    #[test]
    fn swap_buf_is_an_involution() {
        let data = b"0123456789abcdef".to_vec();
        assert_eq!(swap_buf(&swap_buf(&data)), data);
    }

    #[test]
    fn round_trips_every_opcode() {
        let pdus = vec![
            Pdu::PairingRequest(sample_config()),
            Pdu::PairingResponse(sample_config()),
            Pdu::PairingConfirm([1u8; 16]),
            Pdu::PairingRandom([2u8; 16]),
            Pdu::PairingFailed(0x04),
            Pdu::EncryptionInformation([3u8; 16]),
            Pdu::MasterIdentification {
                ediv: 0x1234,
                rand: 0x0123_4567_89ab_cdef,
            },
            Pdu::IdentityInformation([4u8; 16]),
            Pdu::IdentityAddressInformation {
                addr_type: 0x01,
                addr: [5, 6, 7, 8, 9, 10],
            },
            Pdu::SigningInformation([6u8; 16]),
            Pdu::SecurityRequest(0x01),
            Pdu::PairingPublicKey([7u8; 64]),
            Pdu::PairingDhKeyCheck([8u8; 16]),
            Pdu::KeypressNotification(0x02),
        ];
        for pdu in pdus {
            let bytes = pdu.serialize();
            assert_eq!(Pdu::parse(&bytes).unwrap(), pdu);
        }
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Pdu::parse(&[SMP_PAIRING_CONFIRM, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            CodecError::WrongLength {
                opcode: SMP_PAIRING_CONFIRM,
                expected: 16,
                got: 2
            }
        );
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert_eq!(
            Pdu::parse(&[0xFF, 0x00]).unwrap_err(),
            CodecError::UnknownOpcode(0xFF)
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(Pdu::parse(&[]).unwrap_err(), CodecError::Empty);
    }
}
