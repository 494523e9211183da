//! Controller front end: pairing, connecting and characteristic access
//!
//! [`HapController`] owns the controller identity and the pairing store and
//! drives the two handshakes over a caller-supplied transport (TCP for real
//! accessories, an in-memory duplex in tests). [`HapConnection`] wraps the
//! resulting encrypted stream and speaks the characteristic protocol.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::characteristic::{
    AccessoryDatabase, Characteristic, CharacteristicEntry, CharacteristicValue,
    CharacteristicsBody,
};
use crate::discovery::DiscoveredAccessory;
use crate::error::HapError;
use crate::http::{CONTENT_TYPE_JSON, CONTENT_TYPE_TLV, HttpCodec, HttpRequest, HttpResponse, Method};
use crate::pairing::store::{ControllerIdentity, PairingRecord, PairingStore, Permissions};
use crate::pairing::{PairSetup, PairVerify};
use crate::session::SecureStream;
use crate::tlv::{Tlv8Writer, TlvType, methods};

/// Timeouts for the two phases of accessory traffic
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bound on each handshake round trip (pair-setup and pair-verify)
    pub handshake_timeout: Duration,
    /// Bound on each request over an established session
    pub request_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// The controller: one long-term identity, a pairing store, and the
/// operations to pair with, connect to and unpair from accessories.
///
/// Cheap to share behind an `Arc`. Handshakes to the same accessory are
/// serialized; different accessories proceed concurrently.
pub struct HapController {
    identity: ControllerIdentity,
    store: Arc<dyn PairingStore>,
    config: ControllerConfig,
    handshakes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HapController {
    /// Create a controller backed by `store`, loading the persisted
    /// identity or generating and persisting a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if a freshly generated identity cannot be saved.
    pub async fn new(store: Arc<dyn PairingStore>) -> Result<Self, HapError> {
        Self::with_config(store, ControllerConfig::default()).await
    }

    /// Like [`new`](Self::new) with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if a freshly generated identity cannot be saved.
    pub async fn with_config(
        store: Arc<dyn PairingStore>,
        config: ControllerConfig,
    ) -> Result<Self, HapError> {
        let identity = match store.load_identity().await {
            Some(identity) => identity,
            None => {
                let identity = ControllerIdentity::generate();
                info!(pairing_id = %identity.pairing_id, "generated controller identity");
                store.save_identity(&identity).await?;
                identity
            }
        };

        Ok(Self {
            identity,
            store,
            config,
            handshakes: Mutex::new(HashMap::new()),
        })
    }

    /// This controller's pairing id.
    #[must_use]
    pub fn pairing_id(&self) -> &str {
        &self.identity.pairing_id
    }

    /// The pairing store backing this controller.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PairingStore> {
        &self.store
    }

    /// Pair with a discovered accessory over TCP.
    ///
    /// # Errors
    ///
    /// See [`pair_over`](Self::pair_over); additionally fails on connect
    /// errors.
    pub async fn pair(
        &self,
        accessory: &DiscoveredAccessory,
        setup_code: &str,
    ) -> Result<PairingRecord, HapError> {
        let stream = self.tcp_connect(accessory).await?;
        self.pair_over(stream, &accessory.pairing_id, setup_code)
            .await
    }

    /// Run pair-setup M1..M6 over an already-connected transport and
    /// persist the resulting record.
    ///
    /// Nothing is persisted on any failure; the SRP state is dropped with
    /// the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::AuthenticationFailed`] on a wrong setup code,
    /// [`HapError::Timeout`] when a round trip exceeds the configured
    /// bound, and transport or protocol errors otherwise.
    pub async fn pair_over<T>(
        &self,
        mut transport: T,
        accessory_pairing_id: &str,
        setup_code: &str,
    ) -> Result<PairingRecord, HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let lock = self.handshake_lock(accessory_pairing_id).await;
        let _guard = lock.lock().await;

        let mut setup = PairSetup::new(self.identity.clone(), setup_code);

        let m1 = setup.start()?;
        let m2 = self.post_tlv(&mut transport, "/pair-setup", m1).await?;
        let m3 = setup.process_m2(&m2)?;
        let m4 = self.post_tlv(&mut transport, "/pair-setup", m3).await?;
        let m5 = setup.process_m4(&m4)?;
        let m6 = self.post_tlv(&mut transport, "/pair-setup", m5).await?;
        let result = setup.process_m6(&m6)?;

        let record = PairingRecord {
            accessory_pairing_id: result.accessory_pairing_id,
            accessory_ltpk: result.accessory_ltpk,
            controller_pairing_id: self.identity.pairing_id.clone(),
            controller_ltsk: self.identity.ltsk,
            controller_ltpk: self.identity.ltpk,
            permissions: Permissions::Admin,
        };
        self.store.insert(record.clone()).await?;

        info!(accessory = %record.accessory_pairing_id, "paired with accessory");
        Ok(record)
    }

    /// Connect to a paired accessory over TCP and establish a session.
    ///
    /// # Errors
    ///
    /// See [`connect_over`](Self::connect_over); additionally fails on
    /// connect errors.
    pub async fn connect(
        &self,
        accessory: &DiscoveredAccessory,
    ) -> Result<HapConnection<TcpStream>, HapError> {
        let stream = self.tcp_connect(accessory).await?;
        self.connect_over(stream, &accessory.pairing_id).await
    }

    /// Run pair-verify M1..M4 over an already-connected transport and wrap
    /// it in an encrypted session.
    ///
    /// Every call derives fresh session keys. There is no resume; after an
    /// idle teardown the caller simply connects again.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::UnknownPeer`] when no record exists for
    /// `accessory_pairing_id`, [`HapError::SignatureInvalid`] when the
    /// accessory fails to prove its stored identity, and transport or
    /// protocol errors otherwise.
    pub async fn connect_over<T>(
        &self,
        mut transport: T,
        accessory_pairing_id: &str,
    ) -> Result<HapConnection<T>, HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let record =
            self.store
                .get(accessory_pairing_id)
                .await
                .ok_or_else(|| HapError::UnknownPeer {
                    pairing_id: accessory_pairing_id.to_string(),
                })?;

        let lock = self.handshake_lock(accessory_pairing_id).await;
        let _guard = lock.lock().await;

        let mut verify = PairVerify::new(self.identity.clone(), record);

        let m1 = verify.start()?;
        let m2 = self.post_tlv(&mut transport, "/pair-verify", m1).await?;
        let m3 = verify.process_m2(&m2)?;
        let m4 = self.post_tlv(&mut transport, "/pair-verify", m3).await?;
        let keys = verify.process_m4(&m4)?;

        debug!(accessory = %accessory_pairing_id, "session established");
        Ok(HapConnection {
            stream: SecureStream::new(transport, &keys),
            codec: HttpCodec::new(),
            request_timeout: self.config.request_timeout,
        })
    }

    /// Unpair from an accessory over TCP: remove the pairing on the
    /// accessory, then drop the local record.
    ///
    /// # Errors
    ///
    /// See [`unpair_over`](Self::unpair_over); additionally fails on
    /// connect errors.
    pub async fn unpair(&self, accessory: &DiscoveredAccessory) -> Result<(), HapError> {
        let stream = self.tcp_connect(accessory).await?;
        self.unpair_over(stream, &accessory.pairing_id).await
    }

    /// Unpair over an already-connected transport.
    ///
    /// Establishes a session, asks the accessory to remove this controller,
    /// and removes the local record. The local record is kept if the
    /// accessory refuses.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`connect_over`](Self::connect_over) plus
    /// store failures.
    pub async fn unpair_over<T>(
        &self,
        transport: T,
        accessory_pairing_id: &str,
    ) -> Result<(), HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut connection = self.connect_over(transport, accessory_pairing_id).await?;
        connection
            .remove_pairing(&self.identity.pairing_id)
            .await?;
        self.store.remove(accessory_pairing_id).await?;

        info!(accessory = %accessory_pairing_id, "unpaired from accessory");
        Ok(())
    }

    async fn tcp_connect(&self, accessory: &DiscoveredAccessory) -> Result<TcpStream, HapError> {
        self.bounded(
            self.config.handshake_timeout,
            TcpStream::connect(accessory.socket_addr()),
        )
        .await?
        .map_err(HapError::from)
    }

    /// One lock per accessory so concurrent handshakes to the same device
    /// cannot interleave.
    async fn handshake_lock(&self, accessory_pairing_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.handshakes.lock().await;
        map.entry(accessory_pairing_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// One cleartext HTTP round trip carrying a pairing TLV body.
    async fn post_tlv<T>(
        &self,
        transport: &mut T,
        path: &str,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, HapError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = HttpRequest::new(Method::Post, path).with_body(CONTENT_TYPE_TLV, body);
        let encoded = request.encode();

        let response = self
            .bounded(self.config.handshake_timeout, async {
                transport.write_all(&encoded).await?;
                transport.flush().await?;

                let mut codec = HttpCodec::new();
                let mut buf = [0u8; 4096];
                loop {
                    if let Some(response) = codec.decode()? {
                        return Ok::<_, HapError>(response);
                    }
                    let n = transport.read(&mut buf).await?;
                    if n == 0 {
                        return Err(HapError::TransportError(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "accessory closed during handshake",
                        )));
                    }
                    codec.feed(&buf[..n])?;
                }
            })
            .await??;

        if !response.is_success() {
            warn!(status = response.status, path, "handshake request rejected");
            return Err(HapError::HttpStatus {
                status: response.status,
            });
        }
        Ok(response.body)
    }

    async fn bounded<F, O>(&self, bound: Duration, fut: F) -> Result<O, HapError>
    where
        F: std::future::Future<Output = O>,
    {
        timeout(bound, fut).await.map_err(|_| HapError::Timeout {
            seconds: bound.as_secs(),
        })
    }
}

impl std::fmt::Debug for HapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapController")
            .field("pairing_id", &self.identity.pairing_id)
            .finish_non_exhaustive()
    }
}

/// An established encrypted session with one accessory
///
/// Dropping the connection discards the session keys; reconnecting runs
/// pair-verify again and derives fresh ones.
pub struct HapConnection<T> {
    stream: SecureStream<T>,
    codec: HttpCodec,
    request_timeout: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> HapConnection<T> {
    /// Fetch the accessory attribute database.
    ///
    /// Values are reinterpreted against each characteristic's declared
    /// format (HAP JSON writes booleans as `0`/`1` and binary as base64).
    ///
    /// # Errors
    ///
    /// Returns transport, HTTP or JSON errors.
    pub async fn accessories(&mut self) -> Result<AccessoryDatabase, HapError> {
        let request = HttpRequest::new(Method::Get, "/accessories");
        let response = self.request(request).await?;

        let mut database: AccessoryDatabase = serde_json::from_slice(&response.body)?;
        for accessory in &mut database.accessories {
            for service in &mut accessory.services {
                for characteristic in &mut service.characteristics {
                    if let Some(value) = characteristic.value.take() {
                        characteristic.value = Some(value.reinterpret_for(characteristic.format));
                    }
                }
            }
        }
        Ok(database)
    }

    /// Read current values for a set of `(aid, iid)` pairs.
    ///
    /// Entries the accessory could not read carry a `status` code instead
    /// of a value.
    ///
    /// # Errors
    ///
    /// Returns transport, HTTP or JSON errors.
    pub async fn read_characteristics(
        &mut self,
        ids: &[(u64, u64)],
    ) -> Result<Vec<CharacteristicEntry>, HapError> {
        let query = ids
            .iter()
            .map(|(aid, iid)| format!("{aid}.{iid}"))
            .collect::<Vec<_>>()
            .join(",");
        let request = HttpRequest::new(Method::Get, format!("/characteristics?id={query}"));
        let response = self.request(request).await?;

        let body: CharacteristicsBody = serde_json::from_slice(&response.body)?;
        Ok(body.characteristics)
    }

    /// Write one characteristic, validating the value against the
    /// characteristic's metadata first.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::InvalidValue`] when the value fails local
    /// validation; no request is issued in that case. Returns
    /// [`HapError::WriteFailed`] when the accessory refuses the write
    /// (a 207 Multi-Status response with a non-zero entry status).
    pub async fn write_characteristic(
        &mut self,
        aid: u64,
        characteristic: &Characteristic,
        value: CharacteristicValue,
    ) -> Result<(), HapError> {
        characteristic
            .validate(&value)
            .map_err(|reason| HapError::InvalidValue {
                aid,
                iid: characteristic.iid,
                reason,
            })?;

        let body = CharacteristicsBody {
            characteristics: vec![CharacteristicEntry {
                aid,
                iid: characteristic.iid,
                value: Some(value),
                status: None,
            }],
        };
        let request = HttpRequest::new(Method::Put, "/characteristics")
            .with_body(CONTENT_TYPE_JSON, serde_json::to_vec(&body)?);

        let response = self.request(request).await?;

        // 204 No Content means the write was applied. Anything with a body
        // (207 Multi-Status) carries per-entry status codes instead.
        if !response.body.is_empty() {
            let outcome: CharacteristicsBody = serde_json::from_slice(&response.body)?;
            for entry in outcome.characteristics {
                if let Some(status) = entry.status {
                    if status != 0 {
                        return Err(HapError::WriteFailed {
                            aid: entry.aid,
                            iid: entry.iid,
                            status,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Ask the accessory to drop the pairing for `controller_pairing_id`.
    ///
    /// # Errors
    ///
    /// Returns transport or HTTP errors.
    pub async fn remove_pairing(&mut self, controller_pairing_id: &str) -> Result<(), HapError> {
        let body = Tlv8Writer::new()
            .add_state(1)
            .add_method(methods::REMOVE_PAIRING)
            .add(TlvType::Identifier, controller_pairing_id.as_bytes())
            .build();
        let request =
            HttpRequest::new(Method::Post, "/pairings").with_body(CONTENT_TYPE_TLV, body);

        self.request(request).await?;
        Ok(())
    }

    /// The sans-IO session state, for inspecting counters in tests.
    #[must_use]
    pub fn session(&self) -> &crate::session::SecureSession {
        self.stream.session()
    }

    /// One encrypted request/response round trip.
    async fn request(&mut self, request: HttpRequest) -> Result<HttpResponse, HapError> {
        let encoded = request.encode();
        let bound = self.request_timeout;

        let response = timeout(bound, async {
            self.stream.send(&encoded).await?;
            loop {
                if let Some(response) = self.codec.decode()? {
                    return Ok::<_, HapError>(response);
                }
                let frame = self.stream.receive_frame().await?;
                self.codec.feed(&frame)?;
            }
        })
        .await
        .map_err(|_| HapError::Timeout {
            seconds: bound.as_secs(),
        })??;

        if !response.is_success() {
            return Err(HapError::HttpStatus {
                status: response.status,
            });
        }
        Ok(response)
    }
}

impl<T> std::fmt::Debug for HapConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapConnection").finish_non_exhaustive()
    }
}
