use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key or nonce had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },

    /// Signature bytes were malformed or verification failed
    #[error("invalid signature")]
    InvalidSignature,

    /// AEAD open failed (bad key, nonce or tampered ciphertext)
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD seal failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// HKDF expand failed (output too long)
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// SRP math or proof failure
    #[error("SRP error: {0}")]
    Srp(String),

    /// Public key bytes did not decode to a valid point
    #[error("invalid public key")]
    InvalidPublicKey,
}
