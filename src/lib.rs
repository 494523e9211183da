//! # hap-controller
//!
//! A pure Rust controller for `HomeKit` Accessory Protocol (HAP) devices.
//!
//! The crate implements the controller side of HAP over IP: the SRP6a based
//! pair-setup handshake, the Ed25519/X25519 pair-verify handshake, the
//! ChaCha20-Poly1305 encrypted session transport, the TLV8 wire codec, and
//! the characteristic read/write protocol on top.
//!
//! Discovery is a collaborator concern: callers hand the controller a
//! [`DiscoveredAccessory`] record (typically produced by an mDNS browser)
//! and a setup code, and get back a persistent pairing and encrypted
//! connections.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hap_controller::{DiscoveredAccessory, HapController, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), hap_controller::HapError> {
//! let store = Arc::new(MemoryStore::new());
//! let controller = HapController::new(store).await?;
//!
//! let accessory = DiscoveredAccessory {
//!     address: "192.168.1.40".parse().unwrap(),
//!     port: 5001,
//!     pairing_id: "AA:BB:CC:DD:EE:FF".to_string(),
//!     category: 5,
//!     status_flags: 1,
//! };
//!
//! // Pair once with the code printed on the accessory
//! let record = controller.pair(&accessory, "123-45-678").await?;
//!
//! // Every later connection runs pair-verify and yields an encrypted session
//! let mut conn = controller.connect(&accessory).await?;
//! let accessories = conn.accessories().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **High-level**: [`HapController`] / [`HapConnection`] - pair, connect,
//!   read and write characteristics
//! - **Mid-level**: pairing state machines and the secure session
//! - **Low-level**: TLV8, HTTP and crypto primitives

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Characteristic, service and accessory data model
pub mod characteristic;
/// High-level controller API
pub mod controller;
/// Cryptographic primitives
pub mod crypto;
/// Discovery input types
pub mod discovery;
/// Error types
pub mod error;
/// HTTP/1.1 request encoding and response parsing
pub mod http;
/// Pairing state machines and the pairing store
pub mod pairing;
/// Encrypted session transport
pub mod session;
/// TLV8 wire codec
pub mod tlv;

/// Testing utilities (simulated accessory)
pub mod testing;

// Re-exports
pub use characteristic::{
    Accessory, AccessoryDatabase, Characteristic, CharacteristicFormat, CharacteristicValue,
    Service,
};
pub use controller::{ControllerConfig, HapConnection, HapController};
pub use discovery::DiscoveredAccessory;
pub use error::HapError;
pub use pairing::store::{
    ControllerIdentity, FileStore, MemoryStore, PairingRecord, PairingStore, Permissions,
};
pub use pairing::{PairSetup, PairVerify, SessionKeys};
pub use session::{SecureSession, SecureStream};
pub use tlv::{Tlv8Reader, Tlv8Writer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
