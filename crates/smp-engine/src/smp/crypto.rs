//! The SMP cryptographic toolbox: c1, s1, f4, f5, f6, g2 (Core Spec v5.0
//! Vol 3 Part H §2.2), built on AES-128, AES-CMAC (RFC 4493), and ECDH over
//! NIST P-256.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, PublicKey};
use rand_core::OsRng;

/// Fixed salt used by f5 (Core Spec v5.0 Vol 3 Part H §2.2.7).
const F5_SALT: [u8; 16] = [
    0x6C, 0x88, 0x83, 0x91, 0xAA, 0xF5, 0xA5, 0x38, 0x60, 0x37, 0x0B, 0xDB, 0x5A, 0x60, 0x83, 0xBE,
];
/// `keyID` operand of f5, the ASCII bytes "btle".
const F5_KEY_ID: [u8; 4] = [0x62, 0x74, 0x6c, 0x65];
/// `Length` operand of f5: 256 bits of combined MacKey||LTK output.
const F5_LENGTH: [u8; 2] = [0x01, 0x00];

/// A local ECDH keypair for one pairing session.
pub struct KeyPair {
    secret: EphemeralSecret,
    public_point: [u8; 64],
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let encoded = secret.public_key().to_encoded_point(false);
        let mut public_point = [0u8; 64];
        public_point.copy_from_slice(&encoded.as_bytes()[1..65]);
        Self {
            secret,
            public_point,
        }
    }

    /// The raw 64-byte (X || Y) public key, as carried in `PairingPublicKey`.
    pub fn public_bytes(&self) -> [u8; 64] {
        self.public_point
    }

    /// Computes the shared DHKey (the X-coordinate of the shared point)
    /// against a peer's raw 64-byte public key.
    pub fn diffie_hellman(&self, remote_public: &[u8; 64]) -> Result<[u8; 32], CryptoError> {
        let remote = decode_public_key(remote_public)?;
        let shared = self.secret.diffie_hellman(&remote);
        let mut dhkey = [0u8; 32];
        dhkey.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(dhkey)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid remote public key")]
    InvalidPublicKey,
}

fn decode_public_key(raw: &[u8; 64]) -> Result<PublicKey, CryptoError> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(raw);
    let encoded = EncodedPoint::from_bytes(sec1).map_err(|_| CryptoError::InvalidPublicKey)?;
    PublicKey::from_encoded_point(&encoded)
        .into_option()
        .ok_or(CryptoError::InvalidPublicKey)
}

/// Returns `true` if two raw public keys are byte-identical — the
/// CVE-2020-26558 guard against a peer reflecting our own public key back
/// at us.
pub fn public_keys_equal(a: &[u8; 64], b: &[u8; 64]) -> bool {
    a == b
}

/// Single-block AES-128 encryption, `e(key, data)` in Core Spec notation.
fn aes_encrypt_block(key: &[u8; 16], data: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.encrypt_block(&mut block);
    block.into()
}

/// AES-CMAC (RFC 4493) over an arbitrary-length message.
pub fn aes_cmac(key: &[u8], message: &[u8]) -> [u8; 16] {
    let mut mac = Cmac::<Aes128>::new_from_slice(key).expect("AES-CMAC key must be 16 bytes");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Legacy pairing confirm value generator, c1(k, r, preq, pres, iat, rat, ia, ra).
#[allow(clippy::too_many_arguments)]
pub fn c1(
    k: &[u8; 16],
    r: &[u8; 16],
    preq: &[u8; 7],
    pres: &[u8; 7],
    iat: u8,
    rat: u8,
    ia: &[u8; 6],
    ra: &[u8; 6],
) -> [u8; 16] {
    let mut p1 = [0u8; 16];
    p1[0..7].copy_from_slice(pres);
    p1[7..14].copy_from_slice(preq);
    p1[14] = rat;
    p1[15] = iat;

    let mut p2 = [0u8; 16];
    p2[4..10].copy_from_slice(ia);
    p2[10..16].copy_from_slice(ra);

    let step1 = xor16(r, &p1);
    let step1 = aes_encrypt_block(k, &step1);
    let step2 = xor16(&step1, &p2);
    aes_encrypt_block(k, &step2)
}

/// Legacy STK/TK derivation, s1(k, r1, r2): the low 8 bytes of each random
/// value, concatenated and encrypted under k.
pub fn s1(k: &[u8; 16], r1: &[u8; 16], r2: &[u8; 16]) -> [u8; 16] {
    let mut r_prime = [0u8; 16];
    r_prime[0..8].copy_from_slice(&r1[8..16]);
    r_prime[8..16].copy_from_slice(&r2[8..16]);
    aes_encrypt_block(k, &r_prime)
}

/// Secure Connections confirm value generator, f4(U, V, X, Z).
pub fn f4(u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], z: u8) -> [u8; 16] {
    let mut message = Vec::with_capacity(65);
    message.extend_from_slice(u);
    message.extend_from_slice(v);
    message.push(z);
    aes_cmac(x, &message)
}

/// Secure Connections key derivation, f5(W, N1, N2, A1, A2) -> (MacKey, LTK).
pub fn f5(
    w: &[u8; 32],
    n1: &[u8; 16],
    n2: &[u8; 16],
    a1: &[u8; 7],
    a2: &[u8; 7],
) -> ([u8; 16], [u8; 16]) {
    let t = aes_cmac(&F5_SALT, w);

    let build = |counter: u8| -> Vec<u8> {
        let mut m = Vec::with_capacity(53);
        m.push(counter);
        m.extend_from_slice(&F5_KEY_ID);
        m.extend_from_slice(n1);
        m.extend_from_slice(n2);
        m.extend_from_slice(a1);
        m.extend_from_slice(a2);
        m.extend_from_slice(&F5_LENGTH);
        m
    };

    let mac_key = aes_cmac(&t, &build(0));
    let ltk = aes_cmac(&t, &build(1));
    (mac_key, ltk)
}

/// Secure Connections DHKey check, f6(W, N1, N2, R, IOcap, A1, A2).
#[allow(clippy::too_many_arguments)]
pub fn f6(
    w: &[u8; 16],
    n1: &[u8; 16],
    n2: &[u8; 16],
    r: &[u8; 16],
    io_cap: &[u8; 3],
    a1: &[u8; 7],
    a2: &[u8; 7],
) -> [u8; 16] {
    let mut message = Vec::with_capacity(65);
    message.extend_from_slice(n1);
    message.extend_from_slice(n2);
    message.extend_from_slice(r);
    message.extend_from_slice(io_cap);
    message.extend_from_slice(a1);
    message.extend_from_slice(a2);
    aes_cmac(w, &message)
}

/// Numeric Comparison value generator, g2(U, V, X, Y) mod 10^6.
pub fn g2(u: &[u8; 32], v: &[u8; 32], x: &[u8; 16], y: &[u8; 16]) -> u32 {
    let mut message = Vec::with_capacity(80);
    message.extend_from_slice(u);
    message.extend_from_slice(v);
    message.extend_from_slice(y);
    let mac = aes_cmac(x, &message);
    let value = u32::from_be_bytes([mac[12], mac[13], mac[14], mac[15]]);
    value % 1_000_000
}

/// Builds the 16-byte legacy TK (or the `ra`/`rb` operand of f6 in Passkey
/// mode) from an integer passkey: the passkey is written big-endian into the
/// last 4 bytes of a zeroed buffer, then the whole buffer is byte-reversed.
/// This matches the wire convention the reference implementation uses and
/// is required for interop even though it isn't spelled out in Core Spec
/// prose.
pub fn passkey_to_tk(passkey: u32) -> [u8; 16] {
    let mut tk = [0u8; 16];
    tk[12..16].copy_from_slice(&passkey.to_be_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&super::codec::swap_buf(&tk));
    out
}

/// A fresh 128-bit random value (local random nonce, OOB data, etc).
pub fn generate_random_128() -> [u8; 16] {
    use rand::RngCore;
    let mut out = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// A fresh 6-digit passkey, uniformly distributed over `0..=999_999`.
pub fn generate_passkey() -> u32 {
    use rand::Rng;
    rand::rngs::OsRng.gen_range(0..1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex16(s: &str) -> [u8; 16] {
        let v = hex::decode(s).unwrap();
        let mut out = [0u8; 16];
        out.copy_from_slice(&v);
        out
    }

    fn hex32(s: &str) -> [u8; 32] {
        let v = hex::decode(s).unwrap();
        let mut out = [0u8; 32];
        out.copy_from_slice(&v);
        out
    }

    fn hex7(s: &str) -> [u8; 7] {
        let v = hex::decode(s).unwrap();
        let mut out = [0u8; 7];
        out.copy_from_slice(&v);
        out
    }

    // RFC 4493 AES-CMAC test vectors, key = 2b7e151628aed2a6abf7158809cf4f3c.
    #[test]
    fn aes_cmac_rfc4493_vectors() {
        let key = hex16("2b7e151628aed2a6abf7158809cf4f3c");
        let m = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5\
             30c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710",
        )
        .unwrap();

        assert_eq!(
            aes_cmac(&key, &[]),
            hex16("bb1d6929e95937287fa37d129b756746")
        );
        assert_eq!(
            aes_cmac(&key, &m[0..16]),
            hex16("070a16b46b4d4144f79bdd9dd04a287c")
        );
        assert_eq!(
            aes_cmac(&key, &m[0..40]),
            hex16("dfa66747de9ae63030ca32611497c827")
        );
        assert_eq!(
            aes_cmac(&key, &m[0..64]),
            hex16("51f0bebf7e3b9d92fc49741779363cfe")
        );
    }

    // Core Spec v5.0 Vol 3 Part H Appendix D.1.
    #[test]
    fn c1_matches_appendix_d() {
        let k = [0u8; 16];
        let r = hex16("5783D52156AD6F0E6388274EC6702EE0");
        let preq = hex7("07071000000101");
        let pres = hex7("05000800000302");
        let ia: [u8; 6] = hex::decode("A1A2A3A4A5A6").unwrap().try_into().unwrap();
        let ra: [u8; 6] = hex::decode("B1B2B3B4B5B6").unwrap().try_into().unwrap();

        let result = c1(&k, &r, &preq, &pres, 1, 0, &ia, &ra);
        assert_eq!(result, hex16("1e1e3fef878988ead2a74dc5bef13b86"));
    }

    // Core Spec v5.0 Vol 3 Part H Appendix D.1.
    #[test]
    fn s1_matches_appendix_d() {
        let k = [0u8; 16];
        let r1 = hex16("000F0E0D0C0B0A091122334455667788");
        let r2 = hex16("010203040506070899AABBCCDDEEFF00");
        assert_eq!(s1(&k, &r1, &r2), hex16("9a1fe1f0e8b0f49b5b4216ae796da062"));
    }

    // Core Spec v5.0 Vol 3 Part H Appendix D.2.
    #[test]
    fn f4_matches_appendix_d() {
        let u = hex32("20b003d2f297be2c5e2c83a7e9f9a5b9eff49111acf4fddbcc0301480e359de6");
        let v = hex32("55188b3d32f6bb9a900afcfbeed4e72a59cb9ac2f19d7cfb6b4fdd49f47fc5fd");
        let x = hex16("d5cb8454d177733effffb2ec712baeab");
        assert_eq!(f4(&u, &v, &x, 0), hex16("f2c916f107a9bd1cf1eda1bea974872d"));
    }

    // Core Spec v5.0 Vol 3 Part H Appendix D.3.
    #[test]
    fn f5_matches_appendix_d() {
        let w = hex32("ec0234a357c8ad05341010a60a397d9b99796b13b4f866f1868d34f373bfa698");
        let n1 = hex16("d5cb8454d177733effffb2ec712baeab");
        let n2 = hex16("a6e8e7cc25a75f6e216583f7ff3dc4cf");
        let a1 = hex7("0056123737bfce");
        let a2 = hex7("00a713702dcfc1");

        let (mac_key, ltk) = f5(&w, &n1, &n2, &a1, &a2);
        assert_eq!(mac_key, hex16("2965f176a1084a02fd3f6a20ce636e20"));
        assert_eq!(ltk, hex16("6986791169d7cd23980522b594750a38"));
    }

    #[test]
    fn f6_matches_appendix_d() {
        let n1 = hex16("d5cb8454d177733effffb2ec712baeab");
        let n2 = hex16("a6e8e7cc25a75f6e216583f7ff3dc4cf");
        let mac_key = hex16("2965f176a1084a02fd3f6a20ce636e20");
        let r = hex16("12a3343bb453bb5408da42d20c2d0fc8");
        let io_cap: [u8; 3] = hex::decode("010102").unwrap().try_into().unwrap();
        let a1 = hex7("0056123737bfce");
        let a2 = hex7("00a713702dcfc1");

        let result = f6(&mac_key, &n1, &n2, &r, &io_cap, &a1, &a2);
        assert_eq!(result, hex16("e3c473989cd0e8c5d26c0b09da958f61"));
    }

    #[test]
    fn g2_matches_appendix_d() {
        let u = hex32("20b003d2f297be2c5e2c83a7e9f9a5b9eff49111acf4fddbcc0301480e359de6");
        let v = hex32("55188b3d32f6bb9a900afcfbeed4e72a59cb9ac2f19d7cfb6b4fdd49f47fc5fd");
        let x = hex16("d5cb8454d177733effffb2ec712baeab");
        let y = hex16("a6e8e7cc25a75f6e216583f7ff3dc4cf");

        assert_eq!(g2(&u, &v, &x, &y), 0x2f9ed5ba % 1_000_000);
    }

    #[test]
    fn ecdh_round_trips_between_two_keypairs() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let shared_a = a.diffie_hellman(&b.public_bytes()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_bytes()).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn reflected_public_key_is_detected() {
        let a = KeyPair::generate();
        assert!(public_keys_equal(&a.public_bytes(), &a.public_bytes()));
    }
}
