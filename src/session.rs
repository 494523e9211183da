//! Encrypted session transport established by pair-verify
//!
//! Every byte after pair-verify M4 travels in framed blocks: a 2-byte
//! little-endian plaintext length (authenticated as AAD), at most 1024
//! bytes of ciphertext, and a 16-byte Poly1305 tag. Each direction has its
//! own key and a monotonically increasing 64-bit counter that forms the
//! nonce; a counter value is never reused under the same key.

use byteorder::{ByteOrder, LittleEndian};
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::HapError;
use crate::pairing::SessionKeys;

/// Maximum plaintext bytes per frame
pub const MAX_FRAME_PLAINTEXT: usize = 1024;

const TAG_LEN: usize = 16;

fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    LittleEndian::write_u64(&mut nonce[4..12], counter);
    nonce
}

/// Sans-IO encrypted session state: two ciphers, two counters
///
/// A failed decryption poisons the session permanently; the caller must
/// discard it and run pair-verify again.
pub struct SecureSession {
    write_cipher: ChaCha20Poly1305,
    read_cipher: ChaCha20Poly1305,
    write_count: u64,
    read_count: u64,
    poisoned: bool,
}

impl SecureSession {
    /// Create a session from freshly derived keys; counters start at zero
    #[must_use]
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            write_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.write_key)),
            read_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.read_key)),
            write_count: 0,
            read_count: 0,
            poisoned: false,
        }
    }

    /// Number of frames sent so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Number of frames received so far
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Whether a decryption failure has made this session unusable
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Encrypt a payload into one or more wire frames
    ///
    /// # Errors
    ///
    /// Returns an error if the session is poisoned or encryption fails.
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, HapError> {
        if self.poisoned {
            return Err(HapError::DecryptFailure);
        }

        let frames = data.len().div_ceil(MAX_FRAME_PLAINTEXT).max(1);
        let mut output = Vec::with_capacity(data.len() + frames * (2 + TAG_LEN));

        // Zero-length payloads still produce one authenticated frame
        if data.is_empty() {
            self.encrypt_chunk(&mut output, &[])?;
        } else {
            for chunk in data.chunks(MAX_FRAME_PLAINTEXT) {
                self.encrypt_chunk(&mut output, chunk)?;
            }
        }

        Ok(output)
    }

    fn encrypt_chunk(&mut self, output: &mut Vec<u8>, chunk: &[u8]) -> Result<(), HapError> {
        #[allow(clippy::cast_possible_truncation)]
        let len = chunk.len() as u16;
        let mut len_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut len_bytes, len);

        let nonce_bytes = counter_nonce(self.write_count);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut buffer = chunk.to_vec();
        let tag = self
            .write_cipher
            .encrypt_in_place_detached(nonce, &len_bytes, &mut buffer)
            .map_err(|_| HapError::Crypto(crate::crypto::CryptoError::EncryptionFailed))?;

        output.extend_from_slice(&len_bytes);
        output.extend_from_slice(&buffer);
        output.extend_from_slice(tag.as_slice());

        self.write_count += 1;
        Ok(())
    }

    /// Decrypt one frame given its length-prefix bytes and body
    ///
    /// The body must be exactly `len` ciphertext bytes plus the 16-byte tag.
    ///
    /// # Errors
    ///
    /// Returns [`HapError::DecryptFailure`] on tag mismatch; the session is
    /// poisoned and every later call fails the same way.
    pub fn decrypt_frame(&mut self, len_bytes: [u8; 2], body: &[u8]) -> Result<Vec<u8>, HapError> {
        if self.poisoned {
            return Err(HapError::DecryptFailure);
        }

        let len = LittleEndian::read_u16(&len_bytes) as usize;
        if body.len() != len + TAG_LEN {
            self.poisoned = true;
            return Err(HapError::DecryptFailure);
        }

        let nonce_bytes = counter_nonce(self.read_count);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut buffer = body[..len].to_vec();
        let tag = Tag::from_slice(&body[len..]);

        if self
            .read_cipher
            .decrypt_in_place_detached(nonce, &len_bytes, &mut buffer, tag)
            .is_err()
        {
            warn!("session frame failed authentication, poisoning session");
            self.poisoned = true;
            return Err(HapError::DecryptFailure);
        }

        self.read_count += 1;
        Ok(buffer)
    }

    /// Decrypt one frame from a contiguous buffer, returning the plaintext
    /// and the unconsumed remainder
    ///
    /// # Errors
    ///
    /// Returns [`HapError::DecryptFailure`] if the buffer does not hold a
    /// complete frame or the tag does not verify.
    pub fn decrypt_block<'a>(&mut self, data: &'a [u8]) -> Result<(Vec<u8>, &'a [u8]), HapError> {
        if data.len() < 2 + TAG_LEN {
            return Err(HapError::DecryptFailure);
        }

        let len_bytes = [data[0], data[1]];
        let len = LittleEndian::read_u16(&len_bytes) as usize;
        if data.len() < 2 + len + TAG_LEN {
            return Err(HapError::DecryptFailure);
        }

        let plaintext = self.decrypt_frame(len_bytes, &data[2..2 + len + TAG_LEN])?;
        Ok((plaintext, &data[2 + len + TAG_LEN..]))
    }
}

/// A byte stream wrapped in the session cipher
///
/// Owns the connection after pair-verify. All characteristic traffic goes
/// through [`send`](Self::send) and [`receive_frame`](Self::receive_frame).
pub struct SecureStream<T> {
    stream: T,
    session: SecureSession,
}

impl<T: AsyncRead + AsyncWrite + Unpin> SecureStream<T> {
    /// Wrap a connected stream with freshly derived session keys
    #[must_use]
    pub fn new(stream: T, keys: &SessionKeys) -> Self {
        Self {
            stream,
            session: SecureSession::new(keys),
        }
    }

    /// The sans-IO session state (counters, poison flag)
    #[must_use]
    pub fn session(&self) -> &SecureSession {
        &self.session
    }

    /// Encrypt and write a payload
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the write fails.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), HapError> {
        let frames = self.session.encrypt(data)?;
        self.stream.write_all(&frames).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read and decrypt one frame (up to 1024 plaintext bytes)
    ///
    /// # Errors
    ///
    /// Returns [`HapError::DecryptFailure`] on tampering (the session is
    /// then unusable) or [`HapError::TransportError`] on I/O failure.
    pub async fn receive_frame(&mut self) -> Result<Vec<u8>, HapError> {
        if self.session.is_poisoned() {
            return Err(HapError::DecryptFailure);
        }

        let mut len_bytes = [0u8; 2];
        self.stream.read_exact(&mut len_bytes).await?;

        let len = LittleEndian::read_u16(&len_bytes) as usize;
        let mut body = vec![0u8; len + TAG_LEN];
        self.stream.read_exact(&mut body).await?;

        self.session.decrypt_frame(len_bytes, &body)
    }
}

#[cfg(test)]
mod tests;
