//! Pair-Verify: per-connection session establishment (M1..M4)
//!
//! Uses the long-term keys exchanged during pair-setup to authenticate both
//! ends over a fresh ephemeral X25519 exchange, then derives the session
//! keys for the encrypted transport. Runs on every connection, including
//! reconnects.

use tracing::{debug, warn};

use super::{PairingState, SessionKeys, expect_state};
use crate::crypto::{
    ChaCha20Poly1305Cipher, Ed25519PublicKey, Ed25519Signature, HkdfSha512, Nonce, X25519KeyPair,
    X25519PublicKey, derive_subkey,
};
use crate::error::HapError;
use crate::pairing::store::{ControllerIdentity, PairingRecord};
use crate::tlv::{Tlv8Reader, Tlv8Writer, TlvType, errors};

const VERIFY_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
const VERIFY_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";
const CONTROL_SALT: &[u8] = b"Control-Salt";
const CONTROL_WRITE_INFO: &[u8] = b"Control-Write-Encryption-Key";
const CONTROL_READ_INFO: &[u8] = b"Control-Read-Encryption-Key";

/// Pair-Verify state machine, controller role
pub struct PairVerify {
    state: PairingState,
    identity: ControllerIdentity,
    record: PairingRecord,
    ephemeral: X25519KeyPair,
    accessory_ephemeral: Option<X25519PublicKey>,
    shared_secret: Option<[u8; 32]>,
    setup_key: Option<[u8; 32]>,
}

impl PairVerify {
    /// Create a verify attempt against one stored pairing
    #[must_use]
    pub fn new(identity: ControllerIdentity, record: PairingRecord) -> Self {
        Self {
            state: PairingState::Init,
            identity,
            record,
            ephemeral: X25519KeyPair::generate(),
            accessory_ephemeral: None,
            shared_secret: None,
            setup_key: None,
        }
    }

    /// Current position in the exchange
    #[must_use]
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Build M1: our ephemeral public key
    ///
    /// # Errors
    ///
    /// Returns an error if the machine is not in its initial state.
    pub fn start(&mut self) -> Result<Vec<u8>, HapError> {
        if self.state != PairingState::Init {
            return Err(HapError::InvalidState {
                expected: "Init".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        debug!("pair-verify M1");
        let m1 = Tlv8Writer::new()
            .add_state(1)
            .add(TlvType::PublicKey, self.ephemeral.public_key().as_bytes())
            .build();

        self.state = PairingState::SentStart;
        Ok(m1)
    }

    /// Process M2 (accessory ephemeral key + encrypted identity proof) and
    /// build M3
    ///
    /// # Errors
    ///
    /// Returns [`HapError::UnknownPeer`] if the accessory presents a pairing
    /// id other than the stored one, and [`HapError::SignatureInvalid`] if
    /// its signature does not verify against the stored long-term key.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        if self.state != PairingState::SentStart {
            return Err(HapError::InvalidState {
                expected: "SentStart".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let result = self.handle_m2(data);
        if result.is_err() {
            self.state = PairingState::Failed;
        }
        result
    }

    fn handle_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        let tlv = Tlv8Reader::decode(data)?;
        expect_state(&tlv, 2)?;

        let accessory_eph_bytes = tlv.get_required(TlvType::PublicKey)?;
        let encrypted = tlv.get_required(TlvType::EncryptedData)?;

        let accessory_ephemeral = X25519PublicKey::from_bytes(accessory_eph_bytes)?;
        let shared = self.ephemeral.diffie_hellman(&accessory_ephemeral);

        let setup_key = derive_subkey(VERIFY_SALT, shared.as_bytes(), VERIFY_INFO)?;
        let cipher = ChaCha20Poly1305Cipher::new(&setup_key)?;
        let decrypted = cipher.decrypt(&Nonce::from_label(b"PV-Msg02"), encrypted)?;

        let inner = Tlv8Reader::decode(&decrypted)?;
        let presented_id = inner.get_required(TlvType::Identifier)?;
        let signature = inner.get_required(TlvType::Signature)?;

        if presented_id != self.record.accessory_pairing_id.as_bytes() {
            let pairing_id = String::from_utf8_lossy(presented_id).into_owned();
            warn!(%pairing_id, "pair-verify M2 from unknown accessory");
            return Err(HapError::UnknownPeer { pairing_id });
        }

        // accessoryEphemeral || accessoryPairingId || controllerEphemeral
        let mut signed_info = Vec::with_capacity(64 + presented_id.len());
        signed_info.extend_from_slice(accessory_eph_bytes);
        signed_info.extend_from_slice(presented_id);
        signed_info.extend_from_slice(self.ephemeral.public_key().as_bytes());

        let accessory_ltpk = Ed25519PublicKey::from_bytes(&self.record.accessory_ltpk)?;
        let signature = Ed25519Signature::from_bytes(signature)?;
        accessory_ltpk.verify(&signed_info, &signature).map_err(|_| {
            warn!("pair-verify M2 accessory signature invalid");
            HapError::SignatureInvalid
        })?;

        // controllerEphemeral || controllerPairingId || accessoryEphemeral
        let mut signed_info = Vec::with_capacity(64 + self.identity.pairing_id.len());
        signed_info.extend_from_slice(self.ephemeral.public_key().as_bytes());
        signed_info.extend_from_slice(self.identity.pairing_id.as_bytes());
        signed_info.extend_from_slice(accessory_eph_bytes);
        let our_signature = self.identity.keypair()?.sign(&signed_info);

        let inner = Tlv8Writer::new()
            .add(TlvType::Identifier, self.identity.pairing_id.as_bytes())
            .add(TlvType::Signature, &our_signature.to_bytes())
            .build();
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg03"), &inner)?;

        let m3 = Tlv8Writer::new()
            .add_state(3)
            .add(TlvType::EncryptedData, &encrypted)
            .build();

        self.accessory_ephemeral = Some(accessory_ephemeral);
        self.shared_secret = Some(*shared.as_bytes());
        self.setup_key = Some(setup_key);
        self.state = PairingState::SentExchange;
        Ok(m3)
    }

    /// Process M4 and derive the session keys
    ///
    /// # Errors
    ///
    /// Returns [`HapError::SignatureInvalid`] if the accessory rejected our
    /// proof, or an error for any other accessory-reported failure.
    pub fn process_m4(&mut self, data: &[u8]) -> Result<SessionKeys, HapError> {
        if self.state != PairingState::SentExchange {
            return Err(HapError::InvalidState {
                expected: "SentExchange".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let result = self.handle_m4(data);
        if result.is_err() {
            self.state = PairingState::Failed;
        }
        result
    }

    fn handle_m4(&mut self, data: &[u8]) -> Result<SessionKeys, HapError> {
        let tlv = Tlv8Reader::decode(data)?;
        if tlv.get_error() == Some(errors::AUTHENTICATION) {
            warn!("pair-verify M4: accessory rejected controller identity");
            return Err(HapError::SignatureInvalid);
        }
        expect_state(&tlv, 4)?;

        let shared_secret = self.shared_secret.ok_or_else(|| HapError::InvalidState {
            expected: "shared secret".to_string(),
            actual: "none".to_string(),
        })?;

        let hkdf = HkdfSha512::new(CONTROL_SALT, &shared_secret);
        let write_key = hkdf.expand_fixed::<32>(CONTROL_WRITE_INFO)?;
        let read_key = hkdf.expand_fixed::<32>(CONTROL_READ_INFO)?;

        debug!("pair-verify complete, session keys derived");
        self.state = PairingState::Complete;

        Ok(SessionKeys {
            write_key,
            read_key,
        })
    }
}
