//! TLV8 encoding, the base serialization of every HAP pairing message
//!
//! TLV8 is a tag-length-value format with an 8-bit length. Values longer
//! than 255 bytes are split into consecutive items carrying the same tag;
//! the reader reassembles them by concatenating consecutive same-tag items.

use thiserror::Error;

/// TLV type codes used in HAP pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    /// Pairing method
    Method = 0x00,
    /// Pairing identifier
    Identifier = 0x01,
    /// Salt for SRP
    Salt = 0x02,
    /// Public key (SRP, X25519 or Ed25519 depending on context)
    PublicKey = 0x03,
    /// SRP proof
    Proof = 0x04,
    /// Encrypted data with appended auth tag
    EncryptedData = 0x05,
    /// Pairing state/sequence number (M1..M6)
    State = 0x06,
    /// Error code
    Error = 0x07,
    /// Seconds to wait before retrying
    RetryDelay = 0x08,
    /// MFi certificate
    Certificate = 0x09,
    /// Ed25519 signature
    Signature = 0x0A,
    /// Pairing permissions (admin bit)
    Permissions = 0x0B,
    /// Fragment data
    FragmentData = 0x0C,
    /// Last fragment
    FragmentLast = 0x0D,
    /// Pairing type flags
    Flags = 0x13,
    /// Zero-length separator between list items
    Separator = 0xFF,
}

impl TlvType {
    /// Create from byte value
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0x13 => Some(Self::Flags),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }
}

/// TLV encoding errors
#[derive(Debug, Error)]
pub enum TlvError {
    /// Stream ended in the middle of an item
    #[error("truncated TLV stream at offset {offset}")]
    Truncated {
        /// Byte offset where the stream ran out
        offset: usize,
    },

    /// A required field was absent
    #[error("missing required field: {0:?}")]
    MissingField(TlvType),

    /// A field held a value of the wrong shape
    #[error("invalid value for {0:?}")]
    InvalidValue(TlvType),
}

/// TLV8 writer
///
/// Builder style: chain `add` calls, then `build` the wire bytes.
pub struct Tlv8Writer {
    buffer: Vec<u8>,
}

impl Tlv8Writer {
    /// Create a new writer
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Add an item, fragmenting values longer than 255 bytes into
    /// consecutive same-tag items.
    #[must_use]
    pub fn add(mut self, tlv_type: TlvType, value: &[u8]) -> Self {
        if value.is_empty() {
            self.buffer.push(tlv_type as u8);
            self.buffer.push(0);
            return self;
        }

        for chunk in value.chunks(255) {
            self.buffer.push(tlv_type as u8);
            #[allow(clippy::cast_possible_truncation)]
            self.buffer.push(chunk.len() as u8);
            self.buffer.extend_from_slice(chunk);
        }

        self
    }

    /// Add a single-byte item
    #[must_use]
    pub fn add_u8(self, tlv_type: TlvType, value: u8) -> Self {
        self.add(tlv_type, &[value])
    }

    /// Add the pairing state (M1..M6)
    #[must_use]
    pub fn add_state(self, state: u8) -> Self {
        self.add_u8(TlvType::State, state)
    }

    /// Add the pairing method
    #[must_use]
    pub fn add_method(self, method: u8) -> Self {
        self.add_u8(TlvType::Method, method)
    }

    /// Build the encoded TLV data
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for Tlv8Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// TLV8 reader
///
/// Decodes a stream while preserving item order. Consecutive items with the
/// same tag are transparently reassembled into one logical value.
#[derive(Debug)]
pub struct Tlv8Reader {
    items: Vec<(u8, Vec<u8>)>,
}

impl Tlv8Reader {
    /// Decode TLV data
    ///
    /// # Errors
    ///
    /// Returns [`TlvError::Truncated`] if the stream ends mid-item.
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut items: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            if pos + 2 > data.len() {
                return Err(TlvError::Truncated { offset: pos });
            }

            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(TlvError::Truncated { offset: pos });
            }

            let value = &data[pos..pos + length];
            pos += length;

            // Consecutive items with the same tag are fragments of one
            // logical value. Distinct logical values of the same type must
            // be separated with a Separator item on the wire.
            match items.last_mut() {
                Some((last_tag, last_value)) if *last_tag == tag => {
                    last_value.extend_from_slice(value);
                }
                _ => items.push((tag, value.to_vec())),
            }
        }

        Ok(Self { items })
    }

    /// All logical items in stream order
    #[must_use]
    pub fn items(&self) -> &[(u8, Vec<u8>)] {
        &self.items
    }

    /// Get the first value with the given type
    #[must_use]
    pub fn get(&self, tlv_type: TlvType) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(tag, _)| *tag == tlv_type as u8)
            .map(|(_, value)| value.as_slice())
    }

    /// Get a single-byte value
    #[must_use]
    pub fn get_u8(&self, tlv_type: TlvType) -> Option<u8> {
        self.get(tlv_type).and_then(|v| v.first().copied())
    }

    /// Get a required value
    ///
    /// # Errors
    ///
    /// Returns [`TlvError::MissingField`] if the field is absent.
    pub fn get_required(&self, tlv_type: TlvType) -> Result<&[u8], TlvError> {
        self.get(tlv_type).ok_or(TlvError::MissingField(tlv_type))
    }

    /// Get the pairing state (M1..M6)
    ///
    /// # Errors
    ///
    /// Returns an error if the state field is missing or not one byte.
    pub fn get_state(&self) -> Result<u8, TlvError> {
        let value = self.get_required(TlvType::State)?;
        if value.len() != 1 {
            return Err(TlvError::InvalidValue(TlvType::State));
        }
        Ok(value[0])
    }

    /// Get the accessory error code, if any
    #[must_use]
    pub fn get_error(&self) -> Option<u8> {
        self.get(TlvType::Error).and_then(|v| v.first().copied())
    }
}

/// Pairing method constants
pub mod methods {
    /// Pair-Setup
    pub const PAIR_SETUP: u8 = 0;
    /// Pair-Setup with MFi auth
    pub const PAIR_SETUP_AUTH: u8 = 1;
    /// Pair-Verify
    pub const PAIR_VERIFY: u8 = 2;
    /// Add pairing
    pub const ADD_PAIRING: u8 = 3;
    /// Remove pairing
    pub const REMOVE_PAIRING: u8 = 4;
    /// List pairings
    pub const LIST_PAIRINGS: u8 = 5;
}

/// TLV error codes sent by accessories
pub mod errors {
    /// Unspecified failure
    pub const UNKNOWN: u8 = 0x01;
    /// Setup code or signature verification failed on the accessory
    pub const AUTHENTICATION: u8 = 0x02;
    /// Accessory asks the controller to back off before retrying
    pub const BACKOFF: u8 = 0x03;
    /// Accessory cannot accept more pairings
    pub const MAX_PEERS: u8 = 0x04;
    /// Too many failed attempts
    pub const MAX_TRIES: u8 = 0x05;
    /// Pairing method unavailable
    pub const UNAVAILABLE: u8 = 0x06;
    /// Accessory is busy with another pairing
    pub const BUSY: u8 = 0x07;
}
