//! Per-peer pairing session state and the crypto checks that close over it.

use crate::addr::{AddressType, BdAddr};

use super::codec::swap_buf;
use super::crypto::{self, KeyPair};
use super::types::{AuthData, BondInfo, PairingConfig, PairingMethod, PairingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// The full mutable state of one in-progress (or finished) pairing session
/// with a single peer.
pub struct PairingContext {
    pub role: Role,
    pub state: PairingState,

    pub local_addr: BdAddr,
    pub local_addr_type: AddressType,
    pub remote_addr: BdAddr,
    pub remote_addr_type: AddressType,

    pub local_config: PairingConfig,
    pub remote_config: Option<PairingConfig>,

    pub legacy: bool,
    pub method: Option<PairingMethod>,
    pub auth_data: AuthData,
    pub passkey_iteration: u32,

    pub local_random: Option<[u8; 16]>,
    pub remote_random: Option<[u8; 16]>,
    pub remote_confirm: Option<[u8; 16]>,

    keypair: Option<KeyPair>,
    pub remote_public_key: Option<[u8; 64]>,
    pub dhkey: Option<[u8; 32]>,
    pub mac_key: Option<[u8; 16]>,
    pub remote_dhkey_check: Option<[u8; 16]>,

    pub bond: BondInfo,

    /// Legacy key-distribution bookkeeping: `EncryptionInformation` and
    /// `MasterIdentification` arrive as two separate PDUs after `Finished`,
    /// in either order, and the bond is only persisted once both have
    /// landed.
    pub ltk_received: bool,
    pub ediv_rand_received: bool,
}

impl PairingContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: Role,
        local_addr: BdAddr,
        local_addr_type: AddressType,
        remote_addr: BdAddr,
        remote_addr_type: AddressType,
        local_config: PairingConfig,
        auth_data: AuthData,
    ) -> Self {
        Self {
            role,
            state: PairingState::Init,
            local_addr,
            local_addr_type,
            remote_addr,
            remote_addr_type,
            local_config,
            remote_config: None,
            legacy: true,
            method: None,
            auth_data,
            passkey_iteration: 0,
            local_random: None,
            remote_random: None,
            remote_confirm: None,
            keypair: None,
            remote_public_key: None,
            dhkey: None,
            mac_key: None,
            remote_dhkey_check: None,
            bond: BondInfo::default(),
            ltk_received: false,
            ediv_rand_received: false,
        }
    }

    fn addr_bytes(addr: &BdAddr, addr_type: AddressType) -> [u8; 7] {
        let mut out = [0u8; 7];
        out[0..6].copy_from_slice(addr.as_slice());
        out[6] = addr_type.into();
        out
    }

    /// The initiator's device address + type, regardless of which side we
    /// are (needed to build the `preq`/`pres`-relative operands of c1/f6).
    fn initiator_addr(&self) -> [u8; 7] {
        match self.role {
            Role::Initiator => Self::addr_bytes(&self.local_addr, self.local_addr_type),
            Role::Responder => Self::addr_bytes(&self.remote_addr, self.remote_addr_type),
        }
    }

    fn responder_addr(&self) -> [u8; 7] {
        match self.role {
            Role::Initiator => Self::addr_bytes(&self.remote_addr, self.remote_addr_type),
            Role::Responder => Self::addr_bytes(&self.local_addr, self.local_addr_type),
        }
    }

    fn initiator_config(&self) -> PairingConfig {
        match self.role {
            Role::Initiator => self.local_config,
            Role::Responder => self.remote_config.expect("remote config not yet received"),
        }
    }

    fn responder_config(&self) -> PairingConfig {
        match self.role {
            Role::Initiator => self.remote_config.expect("remote config not yet received"),
            Role::Responder => self.local_config,
        }
    }

    pub(super) fn responder_random(&self) -> [u8; 16] {
        match self.role {
            Role::Initiator => self.remote_random.expect("remote random not yet received"),
            Role::Responder => self.local_random.expect("local random not generated yet"),
        }
    }

    pub(super) fn initiator_random(&self) -> [u8; 16] {
        match self.role {
            Role::Initiator => self.local_random.expect("local random not generated yet"),
            Role::Responder => self.remote_random.expect("remote random not yet received"),
        }
    }

    pub fn ensure_keypair(&mut self) -> [u8; 64] {
        if self.keypair.is_none() {
            self.keypair = Some(KeyPair::generate());
        }
        self.keypair.as_ref().unwrap().public_bytes()
    }

    pub fn local_public_key(&self) -> Option<[u8; 64]> {
        self.keypair.as_ref().map(|kp| kp.public_bytes())
    }

    /// CVE-2020-26558 guard: true if the peer reflected our own public key
    /// back at us.
    pub fn remote_key_is_reflection(&self) -> bool {
        match (self.local_public_key(), self.remote_public_key) {
            (Some(local), Some(remote)) => crypto::public_keys_equal(&local, &remote),
            _ => false,
        }
    }

    /// The legacy TK (or the OOB value) for the negotiated association
    /// model. Just Works uses an all-zero TK.
    pub fn legacy_tk(&self) -> [u8; 16] {
        match self.method {
            Some(PairingMethod::PasskeyEntry) => {
                crypto::passkey_to_tk(self.auth_data.passkey.unwrap_or(0))
            }
            Some(PairingMethod::Oob) => self.auth_data.oob_data.unwrap_or([0u8; 16]),
            _ => [0u8; 16],
        }
    }

    /// Legacy pairing confirm value, c1(TK, r, preq, pres, iat, rat, ia, ra).
    pub fn legacy_confirm(&self, r: &[u8; 16]) -> [u8; 16] {
        let preq = self.initiator_config().to_bytes_with_opcode(0x01);
        let pres = self.responder_config().to_bytes_with_opcode(0x02);
        let ia = self.initiator_addr();
        let ra = self.responder_addr();
        let tk = self.legacy_tk();
        crypto::c1(
            &tk,
            r,
            &preq,
            &pres,
            ia[6],
            ra[6],
            ia[0..6].try_into().unwrap(),
            ra[0..6].try_into().unwrap(),
        )
    }

    pub fn check_legacy_confirm(&self) -> bool {
        match (self.remote_random, self.remote_confirm) {
            (Some(r), Some(confirm)) => self.legacy_confirm(&r) == confirm,
            _ => false,
        }
    }

    /// The public key's X-coordinate, byte-swapped for use as an f4/g2
    /// operand (the crypto toolbox consumes big-endian operands; the wire
    /// and the X-coordinate as stored here are little-endian). The DHKey
    /// path (`calc_mac_ltk`/`KeyPair::diffie_hellman`) does not go through
    /// this swap — only the X-coordinate-as-confirm/numeric-comparison
    /// operand does.
    fn public_key_x(key: &[u8; 64]) -> [u8; 32] {
        let mut x = [0u8; 32];
        x.copy_from_slice(&swap_buf(&key[0..32]));
        x
    }

    /// Secure Connections confirm value, with z = 0 for Just Works / Numeric
    /// Comparison, or `0x80 | passkey_bit` for a Passkey Entry round.
    pub fn generate_confirm(&self, local_random: &[u8; 16], z: u8) -> Option<[u8; 16]> {
        let local_pub = self.local_public_key()?;
        let remote_pub = self.remote_public_key?;
        let (kax, kbx) = (Self::public_key_x(&local_pub), Self::public_key_x(&remote_pub));
        Some(crypto::f4(&kax, &kbx, local_random, z))
    }

    pub fn check_confirm(&self, z: u8) -> bool {
        let (Some(remote_random), Some(remote_confirm)) = (self.remote_random, self.remote_confirm)
        else {
            return false;
        };
        let (Some(local_pub), Some(remote_pub)) = (self.local_public_key(), self.remote_public_key)
        else {
            return false;
        };
        let (kax, kbx) = (Self::public_key_x(&local_pub), Self::public_key_x(&remote_pub));
        crypto::f4(&kbx, &kax, &remote_random, z) == remote_confirm
    }

    pub fn passkey_bit(&self) -> u8 {
        let passkey = self.auth_data.passkey.unwrap_or(0);
        0x80 | (((passkey >> self.passkey_iteration) & 1) as u8)
    }

    /// Derives the DHKey via ECDH, then MacKey and LTK via f5. Populates
    /// `self.bond` and `self.mac_key`.
    pub fn calc_mac_ltk(&mut self) -> Option<()> {
        let remote_pub = self.remote_public_key?;
        let dhkey = self.keypair.as_ref()?.diffie_hellman(&remote_pub).ok()?;
        self.dhkey = Some(dhkey);

        let na = self.initiator_random();
        let nb = self.responder_random();
        let a1 = self.initiator_addr();
        let a2 = self.responder_addr();
        let (mac_key, ltk) = crypto::f5(&dhkey, &na, &nb, &a1, &a2);

        self.mac_key = Some(mac_key);
        self.bond = BondInfo {
            long_term_key: ltk,
            ediv: 0,
            rand: 0,
            legacy: false,
        };
        Some(())
    }

    fn dhkey_check_operand(&self, passkey_or_oob: Option<u32>) -> [u8; 16] {
        match self.method {
            Some(PairingMethod::PasskeyEntry) => {
                crypto::passkey_to_tk(passkey_or_oob.unwrap_or(0))
            }
            Some(PairingMethod::Oob) => self.auth_data.oob_data.unwrap_or([0u8; 16]),
            _ => [0u8; 16],
        }
    }

    /// Builds our own outbound DHKey check value.
    pub fn own_dhkey_check(&self) -> Option<[u8; 16]> {
        let mac_key = self.mac_key?;
        let local_random = self.local_random?;
        let remote_random = self.remote_random?;
        let io_cap = [
            self.local_config.auth_req,
            self.local_config.oob_data_flag,
            self.local_config.io_capability,
        ];
        let a1 = Self::addr_bytes(&self.local_addr, self.local_addr_type);
        let a2 = Self::addr_bytes(&self.remote_addr, self.remote_addr_type);
        let r = self.dhkey_check_operand(self.auth_data.passkey);
        Some(crypto::f6(
            &mac_key,
            &local_random,
            &remote_random,
            &r,
            &io_cap,
            &a1,
            &a2,
        ))
    }

    /// Verifies the inbound DHKey check against what the peer should have
    /// computed with their own capability bits and address.
    pub fn check_dhkey_check(&self) -> bool {
        let (Some(mac_key), Some(local_random), Some(remote_random), Some(remote_config), Some(expected)) = (
            self.mac_key,
            self.local_random,
            self.remote_random,
            self.remote_config,
            self.remote_dhkey_check,
        ) else {
            return false;
        };
        let io_cap = [
            remote_config.auth_req,
            remote_config.oob_data_flag,
            remote_config.io_capability,
        ];
        let a1 = Self::addr_bytes(&self.remote_addr, self.remote_addr_type);
        let a2 = Self::addr_bytes(&self.local_addr, self.local_addr_type);
        let r = self.dhkey_check_operand(self.auth_data.passkey);
        let calculated = crypto::f6(
            &mac_key,
            &remote_random,
            &local_random,
            &r,
            &io_cap,
            &a1,
            &a2,
        );
        calculated == expected
    }

    /// Numeric Comparison display value, g2(U, V, X, Y) mod 10^6.
    pub fn numeric_comparison_value(&self) -> Option<u32> {
        let local_pub = self.local_public_key()?;
        let remote_pub = self.remote_public_key?;
        let local_random = self.local_random?;
        let remote_random = self.remote_random?;
        let (initiator_random, responder_random) = match self.role {
            Role::Initiator => (local_random, remote_random),
            Role::Responder => (remote_random, local_random),
        };
        let (kax, kbx) = (Self::public_key_x(&local_pub), Self::public_key_x(&remote_pub));
        let (u, v) = match self.role {
            Role::Initiator => (kax, kbx),
            Role::Responder => (kbx, kax),
        };
        Some(crypto::g2(&u, &v, &initiator_random, &responder_random))
    }
}

impl PairingConfig {
    fn to_bytes_with_opcode(self, opcode: u8) -> [u8; 7] {
        let mut out = [0u8; 7];
        out[0] = opcode;
        out[1..7].copy_from_slice(&self.to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PairingConfig {
        PairingConfig {
            io_capability: 0x03,
            oob_data_flag: 0x00,
            auth_req: 0x01,
            max_key_size: 16,
            initiator_key_dist: 0x03,
            responder_key_dist: 0x03,
        }
    }

    fn two_contexts() -> (PairingContext, PairingContext) {
        let local_addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let remote_addr = BdAddr::new([6, 5, 4, 3, 2, 1]);
        let initiator = PairingContext::new(
            Role::Initiator,
            local_addr,
            AddressType::Public,
            remote_addr,
            AddressType::Public,
            config(),
            AuthData::default(),
        );
        let responder = PairingContext::new(
            Role::Responder,
            remote_addr,
            AddressType::Public,
            local_addr,
            AddressType::Public,
            config(),
            AuthData::default(),
        );
        (initiator, responder)
    }

    #[test]
    fn legacy_just_works_confirm_matches_between_peers() {
        let (mut initiator, mut responder) = two_contexts();
        initiator.remote_config = Some(config());
        responder.remote_config = Some(config());
        initiator.method = Some(PairingMethod::JustWorks);
        responder.method = Some(PairingMethod::JustWorks);

        let r = [7u8; 16];
        assert_eq!(initiator.legacy_confirm(&r), responder.legacy_confirm(&r));
    }

    #[test]
    fn sc_confirm_round_trips() {
        let (mut initiator, mut responder) = two_contexts();
        initiator.remote_config = Some(config());
        responder.remote_config = Some(config());

        let ikey = initiator.ensure_keypair();
        let rkey = responder.ensure_keypair();
        initiator.remote_public_key = Some(rkey);
        responder.remote_public_key = Some(ikey);

        let nb = [3u8; 16];
        responder.local_random = Some(nb);
        let confirm = responder.generate_confirm(&nb, 0).unwrap();

        initiator.remote_random = Some(nb);
        initiator.remote_confirm = Some(confirm);
        assert!(initiator.check_confirm(0));
    }

    #[test]
    fn mac_ltk_matches_between_peers() {
        let (mut initiator, mut responder) = two_contexts();
        let ikey = initiator.ensure_keypair();
        let rkey = responder.ensure_keypair();
        initiator.remote_public_key = Some(rkey);
        responder.remote_public_key = Some(ikey);

        initiator.local_random = Some([1u8; 16]);
        responder.remote_random = Some([1u8; 16]);
        responder.local_random = Some([2u8; 16]);
        initiator.remote_random = Some([2u8; 16]);

        initiator.calc_mac_ltk().unwrap();
        responder.calc_mac_ltk().unwrap();

        assert_eq!(initiator.bond.long_term_key, responder.bond.long_term_key);
        assert_eq!(initiator.mac_key, responder.mac_key);
    }

    #[test]
    fn reflected_public_key_is_flagged() {
        let (mut initiator, _responder) = two_contexts();
        let key = initiator.ensure_keypair();
        initiator.remote_public_key = Some(key);
        assert!(initiator.remote_key_is_reflection());
    }

    #[test]
    fn public_key_x_is_byte_swapped_before_use_as_a_crypto_operand() {
        let mut key = [0u8; 64];
        for (i, b) in key[0..32].iter_mut().enumerate() {
            *b = i as u8;
        }
        let x = PairingContext::public_key_x(&key);
        let expected: Vec<u8> = (0u8..32).rev().collect();
        assert_eq!(x.to_vec(), expected);
    }
}
