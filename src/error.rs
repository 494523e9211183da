//! Error types for HAP controller operations

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::http::HttpCodecError;
use crate::pairing::store::StoreError;
use crate::tlv::TlvError;

/// Errors that can occur during HAP operations
///
/// The taxonomy mirrors the protocol: wire-level decode failures, the two
/// handshake failure classes, session-level failures, and local validation.
#[derive(Debug, Error)]
pub enum HapError {
    /// Unparseable TLV8 wire data. Always aborts the current exchange.
    #[error("malformed TLV: {0}")]
    MalformedTlv(#[from] TlvError),

    /// SRP proof mismatch during pair-setup, typically a wrong setup code.
    ///
    /// Never retried with the same code.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No pairing record exists for the pairing id presented during
    /// pair-verify. The accessory must be paired (again) before connecting.
    #[error("no pairing record for accessory {pairing_id}")]
    UnknownPeer {
        /// The pairing id the accessory presented
        pairing_id: String,
    },

    /// An Ed25519 signature failed verification during the handshake.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// No response within the configured bound. The caller may retry a small
    /// bounded number of times; the engine never retries internally.
    #[error("operation timed out after {seconds}s")]
    Timeout {
        /// The timeout that expired, in seconds
        seconds: u64,
    },

    /// Authentication-tag failure on an established session.
    ///
    /// The session is unrecoverable; tear it down and run pair-verify again.
    #[error("session decryption failed, session must be re-established")]
    DecryptFailure,

    /// Connection-level I/O failure.
    #[error("transport error: {0}")]
    TransportError(#[from] std::io::Error),

    /// A write value failed local validation against the characteristic's
    /// declared format or range. Never sent over the wire.
    #[error("invalid value for characteristic {aid}.{iid}: {reason}")]
    InvalidValue {
        /// Accessory id
        aid: u64,
        /// Characteristic instance id
        iid: u64,
        /// What the value violated
        reason: String,
    },

    /// The accessory refused a characteristic write and reported a
    /// per-entry HAP status code.
    #[error("write to characteristic {aid}.{iid} failed with status {status}")]
    WriteFailed {
        /// Accessory id
        aid: u64,
        /// Characteristic instance id
        iid: u64,
        /// HAP status code from the response entry
        status: i32,
    },

    /// The accessory answered a pairing message with a TLV error code.
    #[error("accessory returned pairing error code {code:#04x}")]
    AccessoryError {
        /// HAP TLV error code (kTLVError_*)
        code: u8,
    },

    /// Handshake driven out of order or a message carried an unexpected
    /// state tag.
    #[error("protocol state error: expected {expected}, got {actual}")]
    InvalidState {
        /// State the engine was in / expected
        expected: String,
        /// What actually arrived
        actual: String,
    },

    /// A cryptographic primitive failed (key length, RNG, derivation).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Malformed HTTP framing from the accessory.
    #[error("HTTP parse error: {0}")]
    Http(#[from] HttpCodecError),

    /// Unexpected HTTP status from the accessory.
    #[error("accessory returned HTTP {status}")]
    HttpStatus {
        /// The status code of the response
        status: u16,
    },

    /// The accessory's JSON body did not match the HAP schema.
    #[error("invalid accessory JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pairing store failure.
    #[error("pairing store error: {0}")]
    Store(#[from] StoreError),
}

impl HapError {
    /// Whether this error indicates the accessory is not (or no longer)
    /// paired and a fresh pair-setup is required.
    #[must_use]
    pub fn requires_repairing(&self) -> bool {
        matches!(self, Self::UnknownPeer { .. } | Self::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = HapError::UnknownPeer {
            pairing_id: "AA:BB".to_string(),
        };
        assert!(err.to_string().contains("AA:BB"));

        let err = HapError::Timeout { seconds: 10 };
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn identity_errors_require_repairing() {
        assert!(
            HapError::UnknownPeer {
                pairing_id: String::new()
            }
            .requires_repairing()
        );
        assert!(HapError::SignatureInvalid.requires_repairing());
        assert!(!HapError::DecryptFailure.requires_repairing());
    }
}
