//! The reactive pairing state machine. This is the only externally visible
//! piece of the engine: callers hand it inbound PDU bytes and get outbound
//! PDU bytes, state-change events, and (on completion) a persisted
//! [`BondInfo`] back.
//!
//! `Manager` holds one [`PairingContext`] per in-flight peer, keyed by the
//! peer's lowercase hex address (the same key [`BondStore`] uses). Every
//! call to [`Manager::handle`] runs a single opcode's handler to completion
//! synchronously — there are no suspension points, per the single-threaded,
//! purely reactive scheduling model this engine is built around.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::addr::{AddressType, BdAddr};

use super::codec::{CodecError, Pdu};
use super::constants::{SMP_MAX_ENCRYPTION_KEY_SIZE, SMP_MIN_ENCRYPTION_KEY_SIZE};
use super::context::{PairingContext, Role};
use super::crypto;
use super::pairing_type::determine_pairing_type;
use super::storage::BondStore;
use super::types::{
    AuthData, BondInfo, PairingConfig, PairingEvent, PairingMethod, PairingState, SmpError,
    SmpResult,
};

/// The result of handing one inbound PDU to [`Manager::handle`]: zero or
/// more outbound PDUs to send back (a single inbound PDU can provoke more
/// than one reply — e.g. a responder's `PairingResponse` bundled with its
/// immediate legacy `PairingConfirm`), plus an optional event for the
/// embedding application (a passkey prompt, a numeric-comparison value to
/// display, pairing completion or failure).
#[derive(Debug, Default)]
pub struct HandleOutcome {
    pub replies: Vec<Vec<u8>>,
    pub event: Option<PairingEvent>,
}

impl HandleOutcome {
    fn single(reply: Vec<u8>) -> Self {
        Self {
            replies: vec![reply],
            event: None,
        }
    }

    fn none() -> Self {
        Self {
            replies: Vec::new(),
            event: None,
        }
    }
}

/// The externally visible SMP engine: one instance manages pairing with any
/// number of peers, each tracked by its own [`PairingContext`].
pub struct Manager {
    local_addr: BdAddr,
    local_addr_type: AddressType,
    local_config: PairingConfig,
    store: Arc<dyn BondStore>,
    encrypter: Box<dyn Fn(&BondInfo) -> Vec<u8> + Send + Sync>,
    sessions: Mutex<HashMap<String, PairingContext>>,
}

impl Manager {
    pub fn new(
        local_addr: BdAddr,
        local_addr_type: AddressType,
        local_config: PairingConfig,
        store: Arc<dyn BondStore>,
        encrypter: Box<dyn Fn(&BondInfo) -> Vec<u8> + Send + Sync>,
    ) -> Self {
        Self {
            local_addr,
            local_addr_type,
            local_config,
            store,
            encrypter,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Begins pairing as the initiator and returns the outbound
    /// `PairingRequest` PDU bytes.
    pub fn initiate(
        &self,
        remote_addr: BdAddr,
        remote_addr_type: AddressType,
        auth_data: AuthData,
    ) -> Vec<u8> {
        let mut ctx = PairingContext::new(
            Role::Initiator,
            self.local_addr,
            self.local_addr_type,
            remote_addr,
            remote_addr_type,
            self.local_config,
            auth_data,
        );
        ctx.state = PairingState::WaitPairingResponse;
        let request = Pdu::PairingRequest(self.local_config).serialize();
        self.sessions
            .lock()
            .unwrap()
            .insert(remote_addr.to_hex(), ctx);
        request
    }

    /// Builds an outbound `SecurityRequest`, for use when this side is the
    /// peripheral asking its peer to kick off (re-)pairing.
    pub fn security_request(&self) -> Vec<u8> {
        Pdu::SecurityRequest(self.local_config.auth_req).serialize()
    }

    /// Looks up the peer's bond and invokes the encrypter collaborator.
    /// Its return value is opaque to the Manager — typically the HCI
    /// "Enable Encryption" command bytes for the transport layer to send.
    pub fn encrypt(&self, peer: &BdAddr) -> SmpResult<Vec<u8>> {
        let bond = self
            .store
            .find(&peer.to_hex())
            .map_err(|_| SmpError::NotPaired)?;
        Ok((self.encrypter)(&bond))
    }

    /// Consumes one inbound PDU for `peer` and advances that peer's
    /// session. `auth_data` is merged into (and, for values the Manager
    /// itself derives such as a displayed passkey, read back out of) the
    /// session's stored `AuthData` on every call.
    pub fn handle(
        &self,
        peer: BdAddr,
        peer_type: AddressType,
        pdu_bytes: &[u8],
        auth_data: &mut AuthData,
    ) -> SmpResult<HandleOutcome> {
        let pdu = match Pdu::parse(pdu_bytes) {
            Ok(pdu) => pdu,
            Err(CodecError::UnknownOpcode(op)) => {
                // Vol 3 Part H 3.3: unknown opcodes on the SMP channel are
                // ignored, not rejected.
                log::debug!("ignoring unknown SMP opcode {:#04x} from {}", op, peer);
                return Ok(HandleOutcome::none());
            }
            Err(CodecError::Empty) | Err(CodecError::WrongLength { .. }) => {
                let mut sessions = self.sessions.lock().unwrap();
                return Ok(match sessions.get_mut(&peer.to_hex()) {
                    Some(ctx) => Self::fail(ctx, SmpError::InvalidParameters),
                    None => Self::fail_standalone(SmpError::InvalidParameters),
                });
            }
        };

        // PairingRequest always (re)starts a fresh responder session —
        // it's the only PDU allowed to create one implicitly.
        if let Pdu::PairingRequest(cfg) = pdu {
            let mut ctx = PairingContext::new(
                Role::Responder,
                self.local_addr,
                self.local_addr_type,
                peer,
                peer_type,
                self.local_config,
                auth_data.clone(),
            );
            ctx.remote_config = Some(cfg);
            let outcome = self.handle_pairing_request(&mut ctx);
            *auth_data = ctx.auth_data.clone();
            self.sessions.lock().unwrap().insert(peer.to_hex(), ctx);
            return Ok(outcome);
        }

        if let Pdu::SecurityRequest(auth_req) = pdu {
            return self.handle_security_request(peer, peer_type, auth_req);
        }

        let mut sessions = self.sessions.lock().unwrap();
        let ctx = match sessions.get_mut(&peer.to_hex()) {
            Some(ctx) => ctx,
            None => return Ok(Self::fail_standalone(SmpError::CommandNotSupported)),
        };

        if auth_data.passkey.is_some() {
            ctx.auth_data.passkey = auth_data.passkey;
        }
        if auth_data.oob_data.is_some() {
            ctx.auth_data.oob_data = auth_data.oob_data;
        }

        let result = match pdu {
            Pdu::PairingResponse(cfg) => self.handle_pairing_response(ctx, cfg),
            Pdu::PairingPublicKey(key) => self.handle_public_key(ctx, key),
            Pdu::PairingConfirm(value) => self.handle_confirm(ctx, value),
            Pdu::PairingRandom(value) => self.handle_random(ctx, value),
            Pdu::PairingDhKeyCheck(value) => self.handle_dhkey_check(ctx, value),
            Pdu::PairingFailed(reason) => Ok(Self::handle_pairing_failed(ctx, reason)),
            Pdu::EncryptionInformation(ltk) => Ok(self.handle_encryption_information(ctx, ltk)),
            Pdu::MasterIdentification { ediv, rand } => {
                Ok(self.handle_master_identification(ctx, ediv, rand))
            }
            Pdu::IdentityInformation(_)
            | Pdu::IdentityAddressInformation { .. }
            | Pdu::SigningInformation(_)
            | Pdu::KeypressNotification(_) => {
                // Bonding key-distribution phases beyond LTK/EDIV/Rand are
                // out of scope here; acknowledge receipt and move on.
                Ok(HandleOutcome::none())
            }
            Pdu::PairingRequest(_) | Pdu::SecurityRequest(_) => {
                unreachable!("handled before the session lookup")
            }
        };

        let outcome = result.unwrap_or_else(|err| Self::fail(ctx, err));
        *auth_data = ctx.auth_data.clone();
        Ok(outcome)
    }

    // ---- per-opcode handlers -------------------------------------------

    fn handle_pairing_request(&self, ctx: &mut PairingContext) -> HandleOutcome {
        if let Err(err) = Self::negotiate(ctx) {
            return Self::fail(ctx, err);
        }

        let response_cfg = self.local_config;
        if ctx.legacy {
            let r = crypto::generate_random_128();
            ctx.local_random = Some(r);
            let confirm = ctx.legacy_confirm(&r);
            ctx.state = PairingState::WaitConfirm;
            HandleOutcome {
                replies: vec![
                    Pdu::PairingResponse(response_cfg).serialize(),
                    Pdu::PairingConfirm(confirm).serialize(),
                ],
                event: Self::method_event(ctx),
            }
        } else {
            ctx.state = PairingState::WaitPublicKey;
            HandleOutcome {
                replies: vec![Pdu::PairingResponse(response_cfg).serialize()],
                event: Self::method_event(ctx),
            }
        }
    }

    fn handle_pairing_response(
        &self,
        ctx: &mut PairingContext,
        cfg: PairingConfig,
    ) -> SmpResult<HandleOutcome> {
        if ctx.state != PairingState::WaitPairingResponse {
            return Err(SmpError::CommandNotSupported);
        }
        ctx.remote_config = Some(cfg);
        Self::negotiate(ctx)?;

        if ctx.legacy {
            let r = crypto::generate_random_128();
            ctx.local_random = Some(r);
            let confirm = ctx.legacy_confirm(&r);
            ctx.state = PairingState::WaitConfirm;
            Ok(HandleOutcome {
                replies: vec![Pdu::PairingConfirm(confirm).serialize()],
                event: Self::method_event(ctx),
            })
        } else {
            let local_pub = ctx.ensure_keypair();
            ctx.state = PairingState::WaitPublicKey;
            Ok(HandleOutcome {
                replies: vec![Pdu::PairingPublicKey(local_pub).serialize()],
                event: Self::method_event(ctx),
            })
        }
    }

    fn handle_public_key(
        &self,
        ctx: &mut PairingContext,
        remote_pub: [u8; 64],
    ) -> SmpResult<HandleOutcome> {
        if ctx.state != PairingState::WaitPublicKey || ctx.legacy {
            return Err(SmpError::CommandNotSupported);
        }

        // CVE-2020-26558: a peer reflecting our own public key back at us
        // must be rejected before we ever treat it as a valid remote key.
        if let Some(local_pub) = ctx.local_public_key() {
            if crypto::public_keys_equal(&local_pub, &remote_pub) {
                return Err(SmpError::InvalidParameters);
            }
        }
        ctx.remote_public_key = Some(remote_pub);

        let mut replies = Vec::new();
        if ctx.role == Role::Responder {
            let local_pub = ctx.ensure_keypair();
            if crypto::public_keys_equal(&local_pub, &remote_pub) {
                return Err(SmpError::InvalidParameters);
            }
            replies.push(Pdu::PairingPublicKey(local_pub).serialize());
        }

        match ctx.method {
            Some(PairingMethod::Oob) => {
                let r = crypto::generate_random_128();
                ctx.local_random = Some(r);
                replies.push(Pdu::PairingRandom(r).serialize());
                ctx.state = PairingState::WaitRandom;
            }
            Some(PairingMethod::PasskeyEntry) => {
                ctx.passkey_iteration = 0;
                let r = crypto::generate_random_128();
                ctx.local_random = Some(r);
                let z = ctx.passkey_bit();
                let confirm = ctx
                    .generate_confirm(&r, z)
                    .ok_or(SmpError::UnspecifiedReason)?;
                replies.push(Pdu::PairingConfirm(confirm).serialize());
                ctx.state = PairingState::WaitConfirm;
            }
            _ => {
                let r = crypto::generate_random_128();
                ctx.local_random = Some(r);
                let confirm = ctx
                    .generate_confirm(&r, 0)
                    .ok_or(SmpError::UnspecifiedReason)?;
                replies.push(Pdu::PairingConfirm(confirm).serialize());
                ctx.state = PairingState::WaitConfirm;
            }
        }

        Ok(HandleOutcome {
            replies,
            event: None,
        })
    }

    fn handle_confirm(
        &self,
        ctx: &mut PairingContext,
        value: [u8; 16],
    ) -> SmpResult<HandleOutcome> {
        if ctx.state != PairingState::WaitConfirm {
            return Err(SmpError::CommandNotSupported);
        }
        ctx.remote_confirm = Some(value);
        let local_random = ctx.local_random.ok_or(SmpError::UnspecifiedReason)?;
        ctx.state = PairingState::WaitRandom;
        Ok(HandleOutcome::single(
            Pdu::PairingRandom(local_random).serialize(),
        ))
    }

    fn handle_random(&self, ctx: &mut PairingContext, value: [u8; 16]) -> SmpResult<HandleOutcome> {
        if ctx.state != PairingState::WaitRandom {
            return Err(SmpError::CommandNotSupported);
        }
        ctx.remote_random = Some(value);

        if ctx.legacy {
            if !ctx.check_legacy_confirm() {
                return Err(SmpError::ConfirmValueFailed);
            }
            let tk = ctx.legacy_tk();
            // The STK only encrypts this session long enough to carry out key
            // distribution; it is never the key persisted for reconnection.
            let _stk = crypto::s1(&tk, &ctx.responder_random(), &ctx.initiator_random());
            ctx.state = PairingState::Finished;

            // The responder distributes the real LTK/EDIV/Rand for future
            // reconnection over the now-STK-encrypted link.
            let mut replies = Vec::new();
            if ctx.role == Role::Responder {
                let ltk_material = crypto::generate_random_128();
                let ediv_rand_material = crypto::generate_random_128();
                let ediv = u16::from_le_bytes([ediv_rand_material[0], ediv_rand_material[1]]);
                let rand = u64::from_le_bytes(ediv_rand_material[2..10].try_into().unwrap());
                ctx.bond = BondInfo {
                    long_term_key: ltk_material,
                    ediv,
                    rand,
                    legacy: true,
                };
                ctx.ltk_received = true;
                ctx.ediv_rand_received = true;
                self.maybe_persist_legacy_bond(ctx);
                replies.push(Pdu::EncryptionInformation(ltk_material).serialize());
                replies.push(Pdu::MasterIdentification { ediv, rand }.serialize());
            }

            return Ok(HandleOutcome {
                replies,
                event: Some(PairingEvent::PairingComplete(ctx.remote_addr)),
            });
        }

        // Secure Connections: OOB skips the confirm/commit step entirely
        // (the commitment was exchanged out of band already); every other
        // method verifies the confirm the peer sent earlier against the
        // random it just revealed.
        if ctx.method != Some(PairingMethod::Oob) {
            let z = if ctx.method == Some(PairingMethod::PasskeyEntry) {
                ctx.passkey_bit()
            } else {
                0
            };
            if !ctx.check_confirm(z) {
                return Err(if ctx.method == Some(PairingMethod::PasskeyEntry) {
                    SmpError::PasskeyEntryFailed
                } else {
                    SmpError::ConfirmValueFailed
                });
            }
        }

        let mut event = None;
        if ctx.method == Some(PairingMethod::NumericComparison) {
            event = ctx
                .numeric_comparison_value()
                .map(|value| PairingEvent::NumericComparisonRequest(ctx.remote_addr, value));
        }

        if ctx.method == Some(PairingMethod::PasskeyEntry) && ctx.passkey_iteration < 19 {
            ctx.passkey_iteration += 1;
            let r = crypto::generate_random_128();
            ctx.local_random = Some(r);
            let z = ctx.passkey_bit();
            let confirm = ctx
                .generate_confirm(&r, z)
                .ok_or(SmpError::UnspecifiedReason)?;
            ctx.state = PairingState::WaitConfirm;
            return Ok(HandleOutcome {
                replies: vec![Pdu::PairingConfirm(confirm).serialize()],
                event,
            });
        }

        ctx.calc_mac_ltk().ok_or(SmpError::UnspecifiedReason)?;
        ctx.state = PairingState::WaitDhKeyCheck;

        match ctx.role {
            Role::Initiator => {
                let check = ctx.own_dhkey_check().ok_or(SmpError::UnspecifiedReason)?;
                Ok(HandleOutcome {
                    replies: vec![Pdu::PairingDhKeyCheck(check).serialize()],
                    event,
                })
            }
            Role::Responder => Ok(HandleOutcome {
                replies: Vec::new(),
                event,
            }),
        }
    }

    fn handle_dhkey_check(
        &self,
        ctx: &mut PairingContext,
        value: [u8; 16],
    ) -> SmpResult<HandleOutcome> {
        if ctx.state != PairingState::WaitDhKeyCheck {
            return Err(SmpError::CommandNotSupported);
        }
        ctx.remote_dhkey_check = Some(value);

        if ctx.mac_key.is_none() {
            ctx.calc_mac_ltk().ok_or(SmpError::UnspecifiedReason)?;
        }
        if !ctx.check_dhkey_check() {
            return Err(SmpError::DhKeyCheckFailed);
        }

        ctx.state = PairingState::Finished;
        if Self::bonding_negotiated(ctx) {
            self.store
                .save(&ctx.remote_addr.to_hex(), &ctx.bond)
                .map_err(SmpError::from)?;
        }

        let event = Some(PairingEvent::PairingComplete(ctx.remote_addr));
        match ctx.role {
            Role::Responder => {
                let check = ctx.own_dhkey_check().ok_or(SmpError::UnspecifiedReason)?;
                Ok(HandleOutcome {
                    replies: vec![Pdu::PairingDhKeyCheck(check).serialize()],
                    event,
                })
            }
            Role::Initiator => Ok(HandleOutcome {
                replies: Vec::new(),
                event,
            }),
        }
    }

    fn handle_pairing_failed(ctx: &mut PairingContext, reason: u8) -> HandleOutcome {
        ctx.state = PairingState::Error;
        let err = SmpError::from_reason(reason);
        log::warn!("peer {} reported pairing failed: {}", ctx.remote_addr, err);
        HandleOutcome {
            replies: Vec::new(),
            event: Some(PairingEvent::PairingFailed(ctx.remote_addr, err)),
        }
    }

    fn handle_security_request(
        &self,
        peer: BdAddr,
        peer_type: AddressType,
        auth_req: u8,
    ) -> SmpResult<HandleOutcome> {
        if self.store.exists(&peer.to_hex()) {
            let bytes = self.encrypt(&peer)?;
            return Ok(HandleOutcome::single(bytes));
        }

        let mut local_config = self.local_config;
        local_config.auth_req = auth_req;
        let mut ctx = PairingContext::new(
            Role::Initiator,
            self.local_addr,
            self.local_addr_type,
            peer,
            peer_type,
            local_config,
            AuthData::default(),
        );
        ctx.state = PairingState::WaitPairingResponse;
        let reply = Pdu::PairingRequest(local_config).serialize();
        self.sessions.lock().unwrap().insert(peer.to_hex(), ctx);
        Ok(HandleOutcome::single(reply))
    }

    fn handle_encryption_information(&self, ctx: &mut PairingContext, ltk: [u8; 16]) -> HandleOutcome {
        ctx.bond.long_term_key = ltk;
        ctx.bond.legacy = ctx.legacy;
        ctx.ltk_received = true;
        self.maybe_persist_legacy_bond(ctx);
        HandleOutcome::none()
    }

    fn handle_master_identification(
        &self,
        ctx: &mut PairingContext,
        ediv: u16,
        rand: u64,
    ) -> HandleOutcome {
        ctx.bond.ediv = ediv;
        ctx.bond.rand = rand;
        ctx.ediv_rand_received = true;
        self.maybe_persist_legacy_bond(ctx);
        HandleOutcome::none()
    }

    fn maybe_persist_legacy_bond(&self, ctx: &mut PairingContext) {
        if !ctx.legacy || !ctx.ltk_received || !ctx.ediv_rand_received {
            return;
        }
        if !Self::bonding_negotiated(ctx) {
            return;
        }
        if let Err(err) = self.store.save(&ctx.remote_addr.to_hex(), &ctx.bond) {
            log::warn!(
                "failed to persist legacy bond for {}: {}",
                ctx.remote_addr,
                err
            );
        }
    }

    // ---- shared helpers ---------------------------------------------------

    fn bonding_negotiated(ctx: &PairingContext) -> bool {
        ctx.local_config.auth_requirements().bonding
            && ctx
                .remote_config
                .map(|cfg| cfg.auth_requirements().bonding)
                .unwrap_or(false)
    }

    /// Validates key size and picks the association model for a session
    /// whose `remote_config` has just been set, populating `ctx.legacy` and
    /// `ctx.method`.
    fn negotiate(ctx: &mut PairingContext) -> SmpResult<()> {
        let remote = ctx.remote_config.ok_or(SmpError::UnspecifiedReason)?;
        if remote.max_key_size < SMP_MIN_ENCRYPTION_KEY_SIZE
            || remote.max_key_size > SMP_MAX_ENCRYPTION_KEY_SIZE
            || ctx.local_config.max_key_size < SMP_MIN_ENCRYPTION_KEY_SIZE
            || ctx.local_config.max_key_size > SMP_MAX_ENCRYPTION_KEY_SIZE
        {
            return Err(SmpError::EncryptionKeySize);
        }

        let (initiator_cfg, responder_cfg) = Self::initiator_responder_cfgs(ctx);
        ctx.legacy = !(initiator_cfg.auth_requirements().secure_connections
            && responder_cfg.auth_requirements().secure_connections);

        let local_oob = ctx.local_config.oob_data_flag != 0;
        let remote_oob = remote.oob_data_flag != 0;
        let (initiator_oob, responder_oob) = match ctx.role {
            Role::Initiator => (local_oob, remote_oob),
            Role::Responder => (remote_oob, local_oob),
        };

        let method = determine_pairing_type(
            initiator_cfg.io_capability,
            responder_cfg.io_capability,
            initiator_cfg.auth_requirements().mitm,
            responder_cfg.auth_requirements().mitm,
            ctx.legacy,
            initiator_oob,
            responder_oob,
        );
        ctx.method = Some(method);

        if method == PairingMethod::Oob && ctx.auth_data.oob_data.is_none() {
            return Err(SmpError::OobNotAvailable);
        }
        Ok(())
    }

    fn initiator_responder_cfgs(ctx: &PairingContext) -> (PairingConfig, PairingConfig) {
        let remote = ctx
            .remote_config
            .expect("negotiate called before remote_config was set");
        match ctx.role {
            Role::Initiator => (ctx.local_config, remote),
            Role::Responder => (remote, ctx.local_config),
        }
    }

    fn method_event(ctx: &PairingContext) -> Option<PairingEvent> {
        match ctx.method {
            Some(PairingMethod::PasskeyEntry) => Some(PairingEvent::PasskeyRequest(ctx.remote_addr)),
            _ => None,
        }
    }

    fn fail(ctx: &mut PairingContext, err: SmpError) -> HandleOutcome {
        ctx.state = PairingState::Error;
        log::warn!("SMP pairing with {} failed: {}", ctx.remote_addr, err);
        HandleOutcome {
            replies: vec![Pdu::PairingFailed(err.to_reason()).serialize()],
            event: Some(PairingEvent::PairingFailed(ctx.remote_addr, err)),
        }
    }

    fn fail_standalone(err: SmpError) -> HandleOutcome {
        HandleOutcome {
            replies: vec![Pdu::PairingFailed(err.to_reason()).serialize()],
            event: None,
        }
    }
}
