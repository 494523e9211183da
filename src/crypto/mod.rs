//! Cryptographic primitives for HAP pairing and session encryption
//!
//! Thin typed wrappers over audited crates. The protocol orchestration
//! lives in [`crate::pairing`] and [`crate::session`]; nothing here is
//! HAP-message aware beyond the nonce label convention.

mod chacha;
mod ed25519;
mod error;
mod hkdf;
mod srp;
mod x25519;


pub use self::chacha::{ChaCha20Poly1305Cipher, Nonce};
pub use self::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use self::error::CryptoError;
pub use self::hkdf::{HkdfSha512, derive_subkey};
pub use self::srp::{SrpClient, SrpProof, SrpServer, SrpSessionKey, generate_salt_and_verifier};
pub use self::x25519::{X25519KeyPair, X25519PublicKey, X25519SharedSecret};

/// Lengths of cryptographic values used by HAP
pub mod lengths {
    /// Ed25519 public key length
    pub const ED25519_PUBLIC_KEY: usize = 32;
    /// Ed25519 signature length
    pub const ED25519_SIGNATURE: usize = 64;
    /// X25519 public key length
    pub const X25519_PUBLIC_KEY: usize = 32;
    /// ChaCha20-Poly1305 key length
    pub const CHACHA_KEY: usize = 32;
    /// ChaCha20-Poly1305 nonce length
    pub const CHACHA_NONCE: usize = 12;
    /// ChaCha20-Poly1305 tag length
    pub const CHACHA_TAG: usize = 16;
    /// SRP 3072-bit group size in bytes
    pub const SRP_GROUP: usize = 384;
    /// SRP salt length
    pub const SRP_SALT: usize = 16;
}
