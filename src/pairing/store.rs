//! Persistent storage for long-term pairing keys
//!
//! The store is an injected capability: the engine only needs lookup,
//! insert and remove keyed by accessory pairing id, so tests can swap in
//! [`MemoryStore`] and applications can use [`FileStore`] or their own
//! backend. Reads may be concurrent; writes are serialized internally.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crypto::Ed25519KeyPair;
use crate::error::HapError;

/// This controller's long-term identity, created once and shared by every
/// pairing the process holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerIdentity {
    /// Controller pairing id, a random MAC-style string
    pub pairing_id: String,
    /// Long-term Ed25519 secret key
    pub ltsk: [u8; 32],
    /// Long-term Ed25519 public key
    pub ltpk: [u8; 32],
}

impl ControllerIdentity {
    /// Generate a fresh identity with a random pairing id
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;

        let keypair = Ed25519KeyPair::generate();
        let mut id_bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let pairing_id = id_bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        Self {
            pairing_id,
            ltsk: keypair.secret_bytes(),
            ltpk: *keypair.public_key().as_bytes(),
        }
    }

    /// Reconstruct the signing key pair
    ///
    /// # Errors
    ///
    /// Returns an error if the stored secret key bytes are invalid.
    pub fn keypair(&self) -> Result<Ed25519KeyPair, HapError> {
        Ok(Ed25519KeyPair::from_bytes(&self.ltsk)?)
    }

    /// The long-term public key bytes
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.ltpk
    }
}

/// Permissions granted to this controller by the accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permissions {
    /// Regular user: read/write characteristics
    User,
    /// Admin: may also manage pairings
    Admin,
}

/// One pairing: an accessory identity bound to this controller's identity
///
/// At most one record exists per accessory. Written at the end of a
/// successful pair-setup, read by every pair-verify, removed on unpair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRecord {
    /// The accessory's pairing id
    pub accessory_pairing_id: String,
    /// The accessory's long-term Ed25519 public key
    pub accessory_ltpk: [u8; 32],
    /// The controller pairing id used for this pairing
    pub controller_pairing_id: String,
    /// The controller's long-term secret key
    pub controller_ltsk: [u8; 32],
    /// The controller's long-term public key
    pub controller_ltpk: [u8; 32],
    /// Permissions the accessory granted
    pub permissions: Permissions,
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted file could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Abstract pairing store
///
/// Implementations must allow concurrent lookups and serialize writes.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Load the record for an accessory, if one exists
    async fn get(&self, accessory_pairing_id: &str) -> Option<PairingRecord>;

    /// Insert or replace the record for an accessory
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    async fn insert(&self, record: PairingRecord) -> Result<(), StoreError>;

    /// Remove the record for an accessory
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    async fn remove(&self, accessory_pairing_id: &str) -> Result<(), StoreError>;

    /// List the pairing ids of all stored accessories
    async fn list(&self) -> Vec<String>;

    /// Load the persisted controller identity, if any
    async fn load_identity(&self) -> Option<ControllerIdentity>;

    /// Persist the controller identity
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    async fn save_identity(&self, identity: &ControllerIdentity) -> Result<(), StoreError>;
}

/// In-memory pairing store (non-persistent), used by tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<String, PairingRecord>,
    identity: Option<ControllerIdentity>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn get(&self, accessory_pairing_id: &str) -> Option<PairingRecord> {
        self.inner.read().await.records.get(accessory_pairing_id).cloned()
    }

    async fn insert(&self, record: PairingRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .records
            .insert(record.accessory_pairing_id.clone(), record);
        Ok(())
    }

    async fn remove(&self, accessory_pairing_id: &str) -> Result<(), StoreError> {
        self.inner.write().await.records.remove(accessory_pairing_id);
        Ok(())
    }

    async fn list(&self) -> Vec<String> {
        self.inner.read().await.records.keys().cloned().collect()
    }

    async fn load_identity(&self) -> Option<ControllerIdentity> {
        self.inner.read().await.identity.clone()
    }

    async fn save_identity(&self, identity: &ControllerIdentity) -> Result<(), StoreError> {
        self.inner.write().await.identity = Some(identity.clone());
        Ok(())
    }
}

/// JSON-file-backed pairing store that survives process restart
pub struct FileStore {
    path: std::path::PathBuf,
    inner: RwLock<FileContents>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileContents {
    identity: Option<ControllerIdentity>,
    pairings: HashMap<String, PairingRecord>,
}

impl FileStore {
    /// Open (or create) a store at the given path
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// file cannot be read.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = Self::load_all(&path).await?;
        Ok(Self {
            path,
            inner: RwLock::new(contents),
        })
    }

    async fn load_all(path: &std::path::Path) -> Result<FileContents, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(FileContents::default());
        }

        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(FileContents::default());
        }

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn save_all(&self, contents: &FileContents) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(contents)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl PairingStore for FileStore {
    async fn get(&self, accessory_pairing_id: &str) -> Option<PairingRecord> {
        self.inner
            .read()
            .await
            .pairings
            .get(accessory_pairing_id)
            .cloned()
    }

    async fn insert(&self, record: PairingRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .pairings
            .insert(record.accessory_pairing_id.clone(), record);
        self.save_all(&inner).await
    }

    async fn remove(&self, accessory_pairing_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.pairings.remove(accessory_pairing_id);
        self.save_all(&inner).await
    }

    async fn list(&self) -> Vec<String> {
        self.inner.read().await.pairings.keys().cloned().collect()
    }

    async fn load_identity(&self) -> Option<ControllerIdentity> {
        self.inner.read().await.identity.clone()
    }

    async fn save_identity(&self, identity: &ControllerIdentity) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.identity = Some(identity.clone());
        self.save_all(&inner).await
    }
}
