//! In-process accessory for scenario tests.
//!
//! [`SimulatedAccessory`] implements the accessory role of pair-setup and
//! pair-verify plus the encrypted transport and a tiny characteristic
//! database, so the controller can be exercised end-to-end over an
//! in-memory duplex pipe without touching a network.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::characteristic::{
    Accessory, AccessoryDatabase, Characteristic, CharacteristicEntry, CharacteristicFormat,
    CharacteristicValue, CharacteristicsBody, Permission, Service,
};
use crate::crypto::{
    ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512, Nonce,
    SrpServer, SrpSessionKey, X25519KeyPair, X25519PublicKey, derive_subkey,
    generate_salt_and_verifier,
};
use crate::error::HapError;
use crate::http::CONTENT_TYPE_JSON;
use crate::pairing::SessionKeys;
use crate::session::SecureStream;
use crate::tlv::{Tlv8Reader, Tlv8Writer, TlvType, errors, methods};

const SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
const SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";
const CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
const CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";
const ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
const ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";
const VERIFY_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
const VERIFY_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";
const CONTROL_SALT: &[u8] = b"Control-Salt";
const CONTROL_WRITE_INFO: &[u8] = b"Control-Write-Encryption-Key";
const CONTROL_READ_INFO: &[u8] = b"Control-Read-Encryption-Key";

enum SetupState {
    Idle,
    AwaitingProof(SrpServer),
    AwaitingExchange(SrpSessionKey),
}

enum VerifyState {
    Idle,
    AwaitingFinish {
        ephemeral: X25519KeyPair,
        controller_ephemeral: Vec<u8>,
        shared_secret: [u8; 32],
        setup_key: [u8; 32],
    },
}

/// Accessory role of the pairing protocol and characteristic endpoints,
/// entirely in memory.
pub struct SimulatedAccessory {
    pairing_id: String,
    salt: [u8; 16],
    verifier: Vec<u8>,
    keypair: Ed25519KeyPair,
    database: AccessoryDatabase,
    pairings: HashMap<String, [u8; 32]>,
    setup: SetupState,
    verify: VerifyState,
    pending_session: Option<SessionKeys>,
    corrupt_signature: bool,
}

impl SimulatedAccessory {
    /// Create an accessory that accepts `setup_code` and serves a single
    /// lightbulb (aid 1, On at iid 9, Brightness at iid 10).
    #[must_use]
    pub fn new(pairing_id: &str, setup_code: &str) -> Self {
        let (salt, verifier) = generate_salt_and_verifier(setup_code);
        Self {
            pairing_id: pairing_id.to_string(),
            salt,
            verifier,
            keypair: Ed25519KeyPair::generate(),
            database: default_database(),
            pairings: HashMap::new(),
            setup: SetupState::Idle,
            verify: VerifyState::Idle,
            pending_session: None,
            corrupt_signature: false,
        }
    }

    /// The accessory's long-term public key.
    #[must_use]
    pub fn ltpk(&self) -> [u8; 32] {
        *self.keypair.public_key().as_bytes()
    }

    /// The accessory's pairing id.
    #[must_use]
    pub fn pairing_id(&self) -> &str {
        &self.pairing_id
    }

    /// Register a controller as already paired, as pair-setup would.
    pub fn add_pairing(&mut self, controller_pairing_id: &str, controller_ltpk: [u8; 32]) {
        self.pairings
            .insert(controller_pairing_id.to_string(), controller_ltpk);
    }

    /// True while at least one controller is paired.
    #[must_use]
    pub fn has_pairings(&self) -> bool {
        !self.pairings.is_empty()
    }

    /// Sign subsequent pair-verify responses with a throwaway key so the
    /// controller sees a signature mismatch.
    pub fn corrupt_next_signature(&mut self) {
        self.corrupt_signature = true;
    }

    /// Current value of one characteristic, for assertions.
    #[must_use]
    pub fn value_of(&self, aid: u64, iid: u64) -> Option<CharacteristicValue> {
        self.database
            .accessory(aid)
            .and_then(|a| a.characteristic(iid))
            .and_then(|c| c.value.clone())
    }

    /// Session keys derived by the last completed pair-verify, oriented for
    /// the accessory side (swapped relative to the controller's).
    #[must_use]
    pub fn take_session_keys(&mut self) -> Option<SessionKeys> {
        self.pending_session.take()
    }

    /// Handle one pair-setup request body and produce the response body.
    ///
    /// Protocol-level rejections (wrong setup code) come back as TLV error
    /// responses; only malformed input is an `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error when the message cannot be decoded at all.
    pub fn handle_setup_message(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        let tlv = Tlv8Reader::decode(data)?;
        match tlv.get_state()? {
            1 => self.setup_m1(&tlv),
            3 => self.setup_m3(&tlv),
            5 => self.setup_m5(&tlv),
            state => {
                warn!(state, "simulated accessory: unexpected pair-setup state");
                Ok(error_response(state.saturating_add(1), errors::UNKNOWN))
            }
        }
    }

    fn setup_m1(&mut self, tlv: &Tlv8Reader) -> Result<Vec<u8>, HapError> {
        if tlv.get_u8(TlvType::Method) != Some(methods::PAIR_SETUP) {
            return Ok(error_response(2, errors::UNKNOWN));
        }

        debug!("simulated accessory: pair-setup M1");
        let server = SrpServer::new(&self.salt, &self.verifier);
        let m2 = Tlv8Writer::new()
            .add_state(2)
            .add(TlvType::Salt, &self.salt)
            .add(TlvType::PublicKey, server.public_key())
            .build();

        self.setup = SetupState::AwaitingProof(server);
        Ok(m2)
    }

    fn setup_m3(&mut self, tlv: &Tlv8Reader) -> Result<Vec<u8>, HapError> {
        let SetupState::AwaitingProof(server) =
            std::mem::replace(&mut self.setup, SetupState::Idle)
        else {
            return Ok(error_response(4, errors::UNKNOWN));
        };

        let client_public = tlv.get_required(TlvType::PublicKey)?;
        let client_proof = tlv.get_required(TlvType::Proof)?;

        match server.verify_client(client_public, client_proof) {
            Ok((key, server_proof)) => {
                debug!("simulated accessory: pair-setup M3 proof accepted");
                let m4 = Tlv8Writer::new()
                    .add_state(4)
                    .add(TlvType::Proof, &server_proof)
                    .build();
                self.setup = SetupState::AwaitingExchange(key);
                Ok(m4)
            }
            Err(_) => {
                warn!("simulated accessory: pair-setup M3 proof rejected");
                Ok(error_response(4, errors::AUTHENTICATION))
            }
        }
    }

    fn setup_m5(&mut self, tlv: &Tlv8Reader) -> Result<Vec<u8>, HapError> {
        let SetupState::AwaitingExchange(srp_key) =
            std::mem::replace(&mut self.setup, SetupState::Idle)
        else {
            return Ok(error_response(6, errors::UNKNOWN));
        };

        let encrypted = tlv.get_required(TlvType::EncryptedData)?;
        let encrypt_key = derive_subkey(SETUP_ENCRYPT_SALT, srp_key.as_bytes(), SETUP_ENCRYPT_INFO)?;
        let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
        let Ok(decrypted) = cipher.decrypt(&Nonce::from_label(b"PS-Msg05"), encrypted) else {
            return Ok(error_response(6, errors::AUTHENTICATION));
        };

        let inner = Tlv8Reader::decode(&decrypted)?;
        let controller_id = inner.get_required(TlvType::Identifier)?;
        let controller_ltpk_bytes = inner.get_required(TlvType::PublicKey)?;
        let signature = inner.get_required(TlvType::Signature)?;

        let controller_x =
            derive_subkey(CONTROLLER_SIGN_SALT, srp_key.as_bytes(), CONTROLLER_SIGN_INFO)?;
        let mut signed_info = Vec::with_capacity(64 + controller_id.len());
        signed_info.extend_from_slice(&controller_x);
        signed_info.extend_from_slice(controller_id);
        signed_info.extend_from_slice(controller_ltpk_bytes);

        let controller_ltpk = Ed25519PublicKey::from_bytes(controller_ltpk_bytes)?;
        let signature = Ed25519Signature::from_bytes(signature)?;
        if controller_ltpk.verify(&signed_info, &signature).is_err() {
            warn!("simulated accessory: pair-setup M5 signature rejected");
            return Ok(error_response(6, errors::AUTHENTICATION));
        }

        let controller_id = String::from_utf8_lossy(controller_id).into_owned();
        self.pairings
            .insert(controller_id, *controller_ltpk.as_bytes());

        // Our identity proof back to the controller.
        let accessory_x =
            derive_subkey(ACCESSORY_SIGN_SALT, srp_key.as_bytes(), ACCESSORY_SIGN_INFO)?;
        let ltpk = self.ltpk();
        let mut signed_info = Vec::with_capacity(64 + self.pairing_id.len());
        signed_info.extend_from_slice(&accessory_x);
        signed_info.extend_from_slice(self.pairing_id.as_bytes());
        signed_info.extend_from_slice(&ltpk);
        let signature = self.keypair.sign(&signed_info);

        let inner = Tlv8Writer::new()
            .add(TlvType::Identifier, self.pairing_id.as_bytes())
            .add(TlvType::PublicKey, &ltpk)
            .add(TlvType::Signature, &signature.to_bytes())
            .build();
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PS-Msg06"), &inner)?;

        debug!("simulated accessory: pair-setup complete");
        Ok(Tlv8Writer::new()
            .add_state(6)
            .add(TlvType::EncryptedData, &encrypted)
            .build())
    }

    /// Handle one pair-verify request body and produce the response body.
    ///
    /// # Errors
    ///
    /// Returns an error when the message cannot be decoded at all.
    pub fn handle_verify_message(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        let tlv = Tlv8Reader::decode(data)?;
        match tlv.get_state()? {
            1 => self.verify_m1(&tlv),
            3 => self.verify_m3(&tlv),
            state => {
                warn!(state, "simulated accessory: unexpected pair-verify state");
                Ok(error_response(state.saturating_add(1), errors::UNKNOWN))
            }
        }
    }

    fn verify_m1(&mut self, tlv: &Tlv8Reader) -> Result<Vec<u8>, HapError> {
        let controller_eph = tlv.get_required(TlvType::PublicKey)?;
        let controller_public = X25519PublicKey::from_bytes(controller_eph)?;

        let ephemeral = X25519KeyPair::generate();
        let shared = ephemeral.diffie_hellman(&controller_public);
        let setup_key = derive_subkey(VERIFY_SALT, shared.as_bytes(), VERIFY_INFO)?;

        // accessoryEphemeral || accessoryPairingId || controllerEphemeral
        let mut signed_info = Vec::with_capacity(64 + self.pairing_id.len());
        signed_info.extend_from_slice(ephemeral.public_key().as_bytes());
        signed_info.extend_from_slice(self.pairing_id.as_bytes());
        signed_info.extend_from_slice(controller_eph);

        let signature = if self.corrupt_signature {
            Ed25519KeyPair::generate().sign(&signed_info)
        } else {
            self.keypair.sign(&signed_info)
        };

        let inner = Tlv8Writer::new()
            .add(TlvType::Identifier, self.pairing_id.as_bytes())
            .add(TlvType::Signature, &signature.to_bytes())
            .build();
        let cipher = ChaCha20Poly1305Cipher::new(&setup_key)?;
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg02"), &inner)?;

        debug!("simulated accessory: pair-verify M1");
        let m2 = Tlv8Writer::new()
            .add_state(2)
            .add(TlvType::PublicKey, ephemeral.public_key().as_bytes())
            .add(TlvType::EncryptedData, &encrypted)
            .build();

        self.verify = VerifyState::AwaitingFinish {
            controller_ephemeral: controller_eph.to_vec(),
            shared_secret: *shared.as_bytes(),
            setup_key,
            ephemeral,
        };
        Ok(m2)
    }

    fn verify_m3(&mut self, tlv: &Tlv8Reader) -> Result<Vec<u8>, HapError> {
        let VerifyState::AwaitingFinish {
            ephemeral,
            controller_ephemeral,
            shared_secret,
            setup_key,
        } = std::mem::replace(&mut self.verify, VerifyState::Idle)
        else {
            return Ok(error_response(4, errors::UNKNOWN));
        };

        let encrypted = tlv.get_required(TlvType::EncryptedData)?;
        let cipher = ChaCha20Poly1305Cipher::new(&setup_key)?;
        let Ok(decrypted) = cipher.decrypt(&Nonce::from_label(b"PV-Msg03"), encrypted) else {
            return Ok(error_response(4, errors::AUTHENTICATION));
        };

        let inner = Tlv8Reader::decode(&decrypted)?;
        let controller_id = inner.get_required(TlvType::Identifier)?;
        let signature = inner.get_required(TlvType::Signature)?;

        let controller_id = String::from_utf8_lossy(controller_id).into_owned();
        let Some(ltpk) = self.pairings.get(&controller_id) else {
            warn!(%controller_id, "simulated accessory: pair-verify from unpaired controller");
            return Ok(error_response(4, errors::AUTHENTICATION));
        };

        // controllerEphemeral || controllerPairingId || accessoryEphemeral
        let mut signed_info = Vec::with_capacity(64 + controller_id.len());
        signed_info.extend_from_slice(&controller_ephemeral);
        signed_info.extend_from_slice(controller_id.as_bytes());
        signed_info.extend_from_slice(ephemeral.public_key().as_bytes());

        let ltpk = Ed25519PublicKey::from_bytes(ltpk)?;
        let signature = Ed25519Signature::from_bytes(signature)?;
        if ltpk.verify(&signed_info, &signature).is_err() {
            warn!("simulated accessory: pair-verify M3 signature rejected");
            return Ok(error_response(4, errors::AUTHENTICATION));
        }

        // Swapped orientation: the controller's write key is our read key.
        let hkdf = HkdfSha512::new(CONTROL_SALT, &shared_secret);
        self.pending_session = Some(SessionKeys {
            write_key: hkdf.expand_fixed::<32>(CONTROL_READ_INFO)?,
            read_key: hkdf.expand_fixed::<32>(CONTROL_WRITE_INFO)?,
        });

        debug!("simulated accessory: pair-verify complete");
        Ok(Tlv8Writer::new().add_state(4).build())
    }

    /// Serve HAP over a byte stream: cleartext pairing endpoints, then the
    /// encrypted characteristic endpoints once pair-verify completes.
    /// Returns the accessory back when the peer closes the stream, so a
    /// test can serve a follow-up connection with the same state.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or undecodable requests.
    pub async fn serve<T>(mut self, mut stream: T) -> Result<Self, HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut parser = RequestParser::new();
        let mut buf = [0u8; 4096];

        loop {
            while let Some(request) = parser.take_request()? {
                let response = self.route_plain(&request)?;
                stream.write_all(&response).await?;
                if let Some(keys) = self.pending_session.take() {
                    return self.serve_encrypted(stream, &keys).await;
                }
            }

            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(self);
            }
            parser.feed(&buf[..n]);
        }
    }

    async fn serve_encrypted<T>(mut self, stream: T, keys: &SessionKeys) -> Result<Self, HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut secure = SecureStream::new(stream, keys);
        let mut parser = RequestParser::new();

        loop {
            match secure.receive_frame().await {
                Ok(frame) => parser.feed(&frame),
                Err(HapError::TransportError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(self);
                }
                Err(e) => return Err(e),
            }

            while let Some(request) = parser.take_request()? {
                let response = self.route_secure(&request)?;
                secure.send(&response).await?;
            }
        }
    }

    fn route_plain(&mut self, request: &SimRequest) -> Result<Vec<u8>, HapError> {
        match (request.method.as_str(), request.uri.as_str()) {
            ("POST", "/pair-setup") => {
                let body = self.handle_setup_message(&request.body)?;
                Ok(http_response(200, "OK", Some(crate::http::CONTENT_TYPE_TLV), &body))
            }
            ("POST", "/pair-verify") => {
                let body = self.handle_verify_message(&request.body)?;
                Ok(http_response(200, "OK", Some(crate::http::CONTENT_TYPE_TLV), &body))
            }
            _ => Ok(http_response(404, "Not Found", None, &[])),
        }
    }

    fn route_secure(&mut self, request: &SimRequest) -> Result<Vec<u8>, HapError> {
        match (request.method.as_str(), request.uri.as_str()) {
            ("GET", "/accessories") => {
                let body = serde_json::to_vec(&self.database)?;
                Ok(http_response(200, "OK", Some(CONTENT_TYPE_JSON), &body))
            }
            ("GET", uri) if uri.starts_with("/characteristics?id=") => {
                let body = self.read_characteristics(&uri["/characteristics?id=".len()..]);
                let body = serde_json::to_vec(&body)?;
                Ok(http_response(200, "OK", Some(CONTENT_TYPE_JSON), &body))
            }
            ("PUT", "/characteristics") => {
                let writes: CharacteristicsBody = serde_json::from_slice(&request.body)?;
                self.apply_writes(&writes)
            }
            ("POST", "/pairings") => self.handle_pairings(&request.body),
            _ => Ok(http_response(404, "Not Found", None, &[])),
        }
    }

    fn read_characteristics(&self, ids: &str) -> CharacteristicsBody {
        let mut entries = Vec::new();
        for id in ids.split(',') {
            let parsed = id
                .split_once('.')
                .and_then(|(aid, iid)| Some((aid.parse().ok()?, iid.parse().ok()?)));
            let Some((aid, iid)) = parsed else {
                continue;
            };
            let value = self.value_of(aid, iid);
            let status = if value.is_some() { None } else { Some(-70409) };
            entries.push(CharacteristicEntry {
                aid,
                iid,
                value,
                status,
            });
        }
        CharacteristicsBody {
            characteristics: entries,
        }
    }

    fn apply_writes(&mut self, writes: &CharacteristicsBody) -> Result<Vec<u8>, HapError> {
        for entry in &writes.characteristics {
            let Some(value) = entry.value.clone() else {
                continue;
            };
            let target = self
                .database
                .accessories
                .iter_mut()
                .find(|a| a.aid == entry.aid)
                .and_then(|a| {
                    a.services
                        .iter_mut()
                        .flat_map(|s| s.characteristics.iter_mut())
                        .find(|c| c.iid == entry.iid)
                });
            let Some(characteristic) = target else {
                let body = CharacteristicsBody {
                    characteristics: vec![CharacteristicEntry {
                        aid: entry.aid,
                        iid: entry.iid,
                        value: None,
                        status: Some(-70409),
                    }],
                };
                let body = serde_json::to_vec(&body)?;
                return Ok(http_response(
                    207,
                    "Multi-Status",
                    Some(CONTENT_TYPE_JSON),
                    &body,
                ));
            };
            let value = value.reinterpret_for(characteristic.format);
            characteristic.value = Some(value);
        }
        Ok(http_response(204, "No Content", None, &[]))
    }

    fn handle_pairings(&mut self, body: &[u8]) -> Result<Vec<u8>, HapError> {
        let tlv = Tlv8Reader::decode(body)?;
        let response = if tlv.get_u8(TlvType::Method) == Some(methods::REMOVE_PAIRING) {
            if let Ok(id) = tlv.get_required(TlvType::Identifier) {
                let id = String::from_utf8_lossy(id).into_owned();
                self.pairings.remove(&id);
            }
            Tlv8Writer::new().add_state(2).build()
        } else {
            error_response(2, errors::UNKNOWN)
        };
        Ok(http_response(
            200,
            "OK",
            Some(crate::http::CONTENT_TYPE_TLV),
            &response,
        ))
    }
}

fn error_response(state: u8, code: u8) -> Vec<u8> {
    Tlv8Writer::new()
        .add_state(state)
        .add_u8(TlvType::Error, code)
        .build()
}

fn http_response(status: u16, reason: &str, content_type: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    if let Some(ct) = content_type {
        out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

fn default_database() -> AccessoryDatabase {
    AccessoryDatabase {
        accessories: vec![Accessory {
            aid: 1,
            services: vec![Service {
                iid: 8,
                service_type: "00000043-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![
                    Characteristic {
                        iid: 9,
                        characteristic_type: "00000025-0000-1000-8000-0026BB765291".to_string(),
                        value: Some(CharacteristicValue::Bool(false)),
                        perms: vec![Permission::PairedRead, Permission::PairedWrite],
                        format: CharacteristicFormat::Bool,
                        unit: None,
                        min_value: None,
                        max_value: None,
                        min_step: None,
                    },
                    Characteristic {
                        iid: 10,
                        characteristic_type: "00000008-0000-1000-8000-0026BB765291".to_string(),
                        value: Some(CharacteristicValue::Int(50)),
                        perms: vec![Permission::PairedRead, Permission::PairedWrite],
                        format: CharacteristicFormat::Int,
                        unit: Some("percentage".to_string()),
                        min_value: Some(0.0),
                        max_value: Some(100.0),
                        min_step: Some(1.0),
                    },
                ],
            }],
        }],
    }
}

struct SimRequest {
    method: String,
    uri: String,
    body: Vec<u8>,
}

/// Incremental HTTP/1.1 request parser, just enough for the endpoints the
/// accessory serves.
struct RequestParser {
    buffer: Vec<u8>,
}

impl RequestParser {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn take_request(&mut self) -> Result<Option<SimRequest>, HapError> {
        let Some(header_end) = find_header_end(&self.buffer) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&self.buffer[..header_end])
            .map_err(|_| malformed("non-UTF8 request head"))?;
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or_else(|| malformed("empty request"))?;
        let mut parts = request_line.split(' ');
        let method = parts
            .next()
            .ok_or_else(|| malformed("missing method"))?
            .to_string();
        let uri = parts
            .next()
            .ok_or_else(|| malformed("missing uri"))?
            .to_string();

        let mut content_length = 0usize;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value
                        .trim()
                        .parse()
                        .map_err(|_| malformed("bad content-length"))?;
                }
            }
        }

        let body_start = header_end + 4;
        if self.buffer.len() < body_start + content_length {
            return Ok(None);
        }

        let body = self.buffer[body_start..body_start + content_length].to_vec();
        self.buffer.drain(..body_start + content_length);
        Ok(Some(SimRequest { method, uri, body }))
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn malformed(what: &str) -> HapError {
    HapError::TransportError(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        what.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parser_handles_split_input() {
        let mut parser = RequestParser::new();
        parser.feed(b"POST /pair-setup HTTP/1.1\r\nContent-Leng");
        assert!(parser.take_request().unwrap().is_none());

        parser.feed(b"th: 5\r\n\r\nhel");
        assert!(parser.take_request().unwrap().is_none());

        parser.feed(b"loPOST /x HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        let first = parser.take_request().unwrap().unwrap();
        assert_eq!(first.method, "POST");
        assert_eq!(first.uri, "/pair-setup");
        assert_eq!(first.body, b"hello");

        let second = parser.take_request().unwrap().unwrap();
        assert_eq!(second.uri, "/x");
        assert!(second.body.is_empty());
    }

    #[test]
    fn read_query_maps_missing_characteristics_to_status() {
        let accessory = SimulatedAccessory::new("AA:BB:CC:DD:EE:FF", "123-45-678");
        let body = accessory.read_characteristics("1.9,1.99");
        assert_eq!(body.characteristics.len(), 2);
        assert!(body.characteristics[0].value.is_some());
        assert_eq!(body.characteristics[1].status, Some(-70409));
    }
}
