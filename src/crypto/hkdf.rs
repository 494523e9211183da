use super::CryptoError;
use hkdf::Hkdf;
use sha2::Sha512;

/// HKDF-SHA512, the key derivation used by every HAP sub-key
pub struct HkdfSha512 {
    hkdf: Hkdf<Sha512>,
}

impl HkdfSha512 {
    /// Create an HKDF instance from salt and input key material
    #[must_use]
    pub fn new(salt: &[u8], ikm: &[u8]) -> Self {
        Self {
            hkdf: Hkdf::<Sha512>::new(Some(salt), ikm),
        }
    }

    /// Expand to arbitrary-length output key material
    ///
    /// # Errors
    ///
    /// Returns an error if the requested length exceeds the HKDF limit.
    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
        let mut okm = vec![0u8; length];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        Ok(okm)
    }

    /// Expand into a fixed-size array
    ///
    /// # Errors
    ///
    /// Returns an error if the requested length exceeds the HKDF limit.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N], CryptoError> {
        let mut okm = [0u8; N];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        Ok(okm)
    }
}

/// One-shot 32-byte sub-key derivation, the common HAP case
///
/// # Errors
///
/// Returns an error if expansion fails.
pub fn derive_subkey(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    HkdfSha512::new(salt, ikm).expand_fixed::<32>(info)
}
