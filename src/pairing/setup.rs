//! Pair-Setup: SRP6a based first-time pairing (M1..M6)
//!
//! Run once per accessory with the setup code printed on the device. On
//! success the controller learns the accessory's long-term public key and
//! the accessory learns the controller's; both persist them for later
//! pair-verify runs. Nothing is persisted on any failure.

use tracing::{debug, warn};

use super::{PairingState, expect_state};
use crate::crypto::{
    ChaCha20Poly1305Cipher, Ed25519PublicKey, Ed25519Signature, Nonce, SrpClient,
    SrpProof, SrpSessionKey, derive_subkey,
};
use crate::error::HapError;
use crate::pairing::store::ControllerIdentity;
use crate::tlv::{Tlv8Reader, Tlv8Writer, TlvType, errors, methods};

const ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
const ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";
const CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
const CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";
const ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
const ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

/// What a completed pair-setup produced
#[derive(Debug, Clone)]
pub struct PairSetupResult {
    /// The accessory's pairing id as presented in M6
    pub accessory_pairing_id: String,
    /// The accessory's long-term Ed25519 public key
    pub accessory_ltpk: [u8; 32],
}

/// Pair-Setup state machine, controller role
///
/// Strictly sequential: `start`, then `process_m2`, `process_m4`,
/// `process_m6` in order. Any failure moves the machine to `Failed` and it
/// must be discarded; the SRP state is ephemeral and never persisted.
pub struct PairSetup {
    state: PairingState,
    setup_code: String,
    identity: ControllerIdentity,
    srp_client: SrpClient,
    srp_proof: Option<SrpProof>,
    srp_key: Option<SrpSessionKey>,
}

impl PairSetup {
    /// Create a new pair-setup attempt for one accessory
    #[must_use]
    pub fn new(identity: ControllerIdentity, setup_code: &str) -> Self {
        Self {
            state: PairingState::Init,
            setup_code: setup_code.to_string(),
            identity,
            srp_client: SrpClient::new(),
            srp_proof: None,
            srp_key: None,
        }
    }

    /// Current position in the exchange
    #[must_use]
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Build M1: the start request
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

        debug!("pair-setup M1");
        let m1 = Tlv8Writer::new()
            .add_state(1)
            .add_method(methods::PAIR_SETUP)
            .build();

        self.state = PairingState::SentStart;
        Ok(m1)
    }

    /// Process M2 (salt + accessory SRP public value) and build M3
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed message, an accessory error code, or
    /// an illegal SRP public value.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        self.expect(PairingState::SentStart, 2, data, |this, tlv| {
            let salt = tlv.get_required(TlvType::Salt)?;
            let server_public = tlv.get_required(TlvType::PublicKey)?;

            debug!(salt_len = salt.len(), "pair-setup M2 received");
            let proof = this
                .srp_client
                .process_challenge(&this.setup_code, salt, server_public)?;

            let m3 = Tlv8Writer::new()
                .add_state(3)
                .add(TlvType::PublicKey, this.srp_client.public_key())
                .add(TlvType::Proof, proof.client_proof())
                .build();

            this.srp_proof = Some(proof);
            this.state = PairingState::SentProof;
            Ok(m3)
        })
    }

    /// Process M4 (accessory SRP proof) and build M5
    ///
    /// The accessory's proof is checked before anything derived from the
    /// SRP key is trusted; a mismatch (wrong setup code) aborts with
    /// [`HapError::AuthenticationFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`HapError::AuthenticationFailed`] on proof mismatch.
    pub fn process_m4(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        self.expect(PairingState::SentProof, 4, data, |this, tlv| {
            let server_proof = tlv.get_required(TlvType::Proof)?;

            let proof = this.srp_proof.take().ok_or_else(|| HapError::InvalidState {
                expected: "SRP proof".to_string(),
                actual: "none".to_string(),
            })?;

            let srp_key = proof.verify_server(server_proof).map_err(|_| {
                warn!("pair-setup M4 proof mismatch, wrong setup code?");
                HapError::AuthenticationFailed("accessory SRP proof mismatch".to_string())
            })?;

            // Identity sub-TLV: prove possession of our long-term key over
            // a transcript bound to this SRP session.
            let controller_x = derive_subkey(
                CONTROLLER_SIGN_SALT,
                srp_key.as_bytes(),
                CONTROLLER_SIGN_INFO,
            )?;
            let ltpk = this.identity.public_key();
            let mut signed_info = Vec::with_capacity(64 + this.identity.pairing_id.len());
            signed_info.extend_from_slice(&controller_x);
            signed_info.extend_from_slice(this.identity.pairing_id.as_bytes());
            signed_info.extend_from_slice(&ltpk);
            let signature = this.identity.keypair()?.sign(&signed_info);

            let inner = Tlv8Writer::new()
                .add(TlvType::Identifier, this.identity.pairing_id.as_bytes())
                .add(TlvType::PublicKey, &ltpk)
                .add(TlvType::Signature, &signature.to_bytes())
                .build();

            let encrypt_key = derive_subkey(ENCRYPT_SALT, srp_key.as_bytes(), ENCRYPT_INFO)?;
            let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
            let encrypted = cipher.encrypt(&Nonce::from_label(b"PS-Msg05"), &inner)?;

            let m5 = Tlv8Writer::new()
                .add_state(5)
                .add(TlvType::EncryptedData, &encrypted)
                .build();

            this.srp_key = Some(srp_key);
            this.state = PairingState::SentExchange;
            Ok(m5)
        })
    }

    /// Process M6 (accessory identity) and complete the exchange
    ///
    /// Decrypts the accessory's long-term public key and pairing id and
    /// verifies the accompanying signature. The caller persists the
    /// resulting record; this machine holds no storage.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::SignatureInvalid`] if the accessory's signature
    /// does not verify.
    pub fn process_m6(&mut self, data: &[u8]) -> Result<PairSetupResult, HapError> {
        self.expect(PairingState::SentExchange, 6, data, |this, tlv| {
            let encrypted = tlv.get_required(TlvType::EncryptedData)?;

            let srp_key = this.srp_key.take().ok_or_else(|| HapError::InvalidState {
                expected: "SRP session key".to_string(),
                actual: "none".to_string(),
            })?;

            let encrypt_key = derive_subkey(ENCRYPT_SALT, srp_key.as_bytes(), ENCRYPT_INFO)?;
            let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
            let decrypted = cipher.decrypt(&Nonce::from_label(b"PS-Msg06"), encrypted)?;

            let inner = Tlv8Reader::decode(&decrypted)?;
            let accessory_id = inner.get_required(TlvType::Identifier)?.to_vec();
            let accessory_ltpk_bytes = inner.get_required(TlvType::PublicKey)?;
            let signature = inner.get_required(TlvType::Signature)?;

            let accessory_ltpk = Ed25519PublicKey::from_bytes(accessory_ltpk_bytes)?;

            // accessoryX || accessoryPairingId || accessoryLTPK
            let accessory_x = derive_subkey(
                ACCESSORY_SIGN_SALT,
                srp_key.as_bytes(),
                ACCESSORY_SIGN_INFO,
            )?;
            let mut signed_info = Vec::with_capacity(64 + accessory_id.len());
            signed_info.extend_from_slice(&accessory_x);
            signed_info.extend_from_slice(&accessory_id);
            signed_info.extend_from_slice(accessory_ltpk_bytes);

            let signature = Ed25519Signature::from_bytes(signature)?;
            accessory_ltpk.verify(&signed_info, &signature).map_err(|_| {
                warn!("pair-setup M6 accessory signature invalid");
                HapError::SignatureInvalid
            })?;

            let accessory_pairing_id =
                String::from_utf8(accessory_id).map_err(|_| HapError::SignatureInvalid)?;

            debug!(%accessory_pairing_id, "pair-setup complete");
            this.state = PairingState::Complete;

            Ok(PairSetupResult {
                accessory_pairing_id,
                accessory_ltpk: *accessory_ltpk.as_bytes(),
            })
        })
    }

    /// Decode a message, check state and error tags, run `f`, and mark the
    /// machine failed if anything goes wrong.
    fn expect<T>(
        &mut self,
        required: PairingState,
        message_state: u8,
        data: &[u8],
        f: impl FnOnce(&mut Self, &Tlv8Reader) -> Result<T, HapError>,
    ) -> Result<T, HapError> {
        if self.state != required {
            return Err(HapError::InvalidState {
                expected: format!("{required:?}"),
                actual: format!("{:?}", self.state),
            });
        }

        let result = (|| {
            let tlv = Tlv8Reader::decode(data)?;
            if tlv.get_error() == Some(errors::AUTHENTICATION) {
                return Err(HapError::AuthenticationFailed(
                    "accessory rejected the setup code".to_string(),
                ));
            }
            expect_state(&tlv, message_state)?;
            f(self, &tlv)
        })();

        if result.is_err() {
            self.state = PairingState::Failed;
        }
        result
    }
}
