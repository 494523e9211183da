//! SRP6a key exchange as mandated by HAP pair-setup
//!
//! Uses the 3072-bit group from RFC 5054 with g = 5 and SHA-512. The
//! username is fixed to `Pair-Setup`; the password is the human-readable
//! setup code. Apple's variant pads A, B and S to the group size inside
//! the hashes but hashes the generator unpadded.

use super::CryptoError;
use num_bigint::{BigUint, RandomBits};
use num_traits::Zero;
use rand::Rng;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// SRP username, always "Pair-Setup" for HAP pairing
pub const SRP_USERNAME: &[u8] = b"Pair-Setup";

const GROUP_BYTES: usize = 384;

fn group_modulus() -> BigUint {
    // RFC 5054 3072-bit group
    BigUint::parse_bytes(
        b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
          8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
          302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
          A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
          49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
          FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
          670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
          180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
          3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
          04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
          B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
          1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
          BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
          E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
        16,
    )
    .expect("hardcoded modulus parses")
}

fn generator() -> BigUint {
    BigUint::from(5u32)
}

fn pad_to_group(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= GROUP_BYTES {
        return bytes;
    }
    let mut padded = vec![0u8; GROUP_BYTES];
    padded[GROUP_BYTES - bytes.len()..].copy_from_slice(&bytes);
    padded
}

/// k = H(N || PAD(g))
fn multiplier(n: &BigUint, g: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_group(n));
    hasher.update(pad_to_group(g));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// u = H(PAD(A) || PAD(B))
fn scrambler(a_pub: &BigUint, b_pub: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_group(a_pub));
    hasher.update(pad_to_group(b_pub));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// x = H(salt || H(username || ":" || setup_code))
fn private_exponent(salt: &[u8], setup_code: &str) -> BigUint {
    let mut inner = Sha512::new();
    inner.update(SRP_USERNAME);
    inner.update(b":");
    inner.update(setup_code.as_bytes());
    let h_up = inner.finalize();

    let mut outer = Sha512::new();
    outer.update(salt);
    outer.update(h_up);
    BigUint::from_bytes_be(&outer.finalize())
}

/// M1 = H(H(N) xor H(g) || H(I) || salt || PAD(A) || PAD(B) || K)
///
/// H(g) is over the raw generator bytes (0x05), not the padded form.
fn client_evidence(
    n: &BigUint,
    g: &BigUint,
    salt: &[u8],
    a_pub: &BigUint,
    b_pub: &BigUint,
    session_key: &[u8],
) -> Vec<u8> {
    let h_n = Sha512::digest(pad_to_group(n));
    let h_g = Sha512::digest(g.to_bytes_be());
    let mut xored = [0u8; 64];
    for (out, (a, b)) in xored.iter_mut().zip(h_n.iter().zip(h_g.iter())) {
        *out = a ^ b;
    }

    let h_user = Sha512::digest(SRP_USERNAME);

    let mut hasher = Sha512::new();
    hasher.update(xored);
    hasher.update(h_user);
    hasher.update(salt);
    hasher.update(pad_to_group(a_pub));
    hasher.update(pad_to_group(b_pub));
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

/// M2 = H(PAD(A) || M1 || K)
fn server_evidence(a_pub: &BigUint, m1: &[u8], session_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_group(a_pub));
    hasher.update(m1);
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

/// Generate a random 16-byte salt and the verifier v = g^x for a setup code
///
/// This is the accessory role of pair-setup. A controller never calls it
/// against real hardware; it exists so the two roles can be exercised
/// against each other in tests.
#[must_use]
pub fn generate_salt_and_verifier(setup_code: &str) -> ([u8; 16], Vec<u8>) {
    use rand::RngCore;

    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let n = group_modulus();
    let x = private_exponent(&salt, setup_code);
    let verifier = generator().modpow(&x, &n);

    (salt, pad_to_group(&verifier))
}

/// Controller side of the SRP exchange
pub struct SrpClient {
    n: BigUint,
    g: BigUint,
    k: BigUint,
    a: BigUint,
    public_key: Vec<u8>,
}

impl SrpClient {
    /// Generate a fresh client with a random private value
    #[must_use]
    pub fn new() -> Self {
        let n = group_modulus();
        let g = generator();
        let k = multiplier(&n, &g);

        let mut rng = rand::thread_rng();
        let a: BigUint = rng.sample(RandomBits::new(256));
        let a = a % &n;

        let a_pub = g.modpow(&a, &n);
        let public_key = pad_to_group(&a_pub);

        Self {
            n,
            g,
            k,
            a,
            public_key,
        }
    }

    /// The client public value A, padded to the group size
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Complete the exchange from the accessory's salt and public value B
    ///
    /// Computes the shared session key K and both evidence messages: the
    /// proof M1 to send and the M2 the accessory must echo back.
    ///
    /// # Errors
    ///
    /// Returns an error if B is zero modulo N (an illegal public value).
    pub fn process_challenge(
        &self,
        setup_code: &str,
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpProof, CryptoError> {
        let b_pub = BigUint::from_bytes_be(server_public);
        if (&b_pub % &self.n).is_zero() {
            return Err(CryptoError::Srp("illegal server public value".to_string()));
        }

        let a_pub = BigUint::from_bytes_be(&self.public_key);
        let u = scrambler(&a_pub, &b_pub);
        let x = private_exponent(salt, setup_code);

        // S = (B - k * g^x) ^ (a + u * x) mod N
        // BigUint has no negative values, so lift B by a multiple of N first.
        let g_x = self.g.modpow(&x, &self.n);
        let k_g_x = (&self.k * g_x) % &self.n;
        let base = if b_pub >= k_g_x {
            (&b_pub - &k_g_x) % &self.n
        } else {
            (&self.n - (&k_g_x - &b_pub) % &self.n) % &self.n
        };
        let exp = &self.a + (&u * x);
        let s_shared = base.modpow(&exp, &self.n);

        // K = H(PAD(S))
        let session_key = Sha512::digest(pad_to_group(&s_shared)).to_vec();

        let m1 = client_evidence(&self.n, &self.g, salt, &a_pub, &b_pub, &session_key);
        let expected_m2 = server_evidence(&a_pub, &m1, &session_key);

        Ok(SrpProof {
            m1,
            expected_m2,
            session_key,
        })
    }
}

impl Default for SrpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Client evidence and the expected server response for one exchange
pub struct SrpProof {
    m1: Vec<u8>,
    expected_m2: Vec<u8>,
    session_key: Vec<u8>,
}

impl SrpProof {
    /// The proof M1 sent to the accessory in M3
    #[must_use]
    pub fn client_proof(&self) -> &[u8] {
        &self.m1
    }

    /// Check the accessory's proof and release the session key
    ///
    /// This is the primary defense against a wrong setup code: nothing
    /// derived from K may be trusted before this check passes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Srp`] if the proof does not match.
    pub fn verify_server(mut self, server_proof: &[u8]) -> Result<SrpSessionKey, CryptoError> {
        if self.expected_m2 != server_proof {
            return Err(CryptoError::Srp("server proof mismatch".to_string()));
        }
        Ok(SrpSessionKey {
            key: std::mem::take(&mut self.session_key),
        })
    }
}

impl Drop for SrpProof {
    fn drop(&mut self) {
        self.session_key.zeroize();
    }
}

/// The shared SRP session key K, zeroed on drop
pub struct SrpSessionKey {
    key: Vec<u8>,
}

impl SrpSessionKey {
    /// Get the key bytes (64 bytes, SHA-512 output)
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for SrpSessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Accessory side of the SRP exchange
///
/// Used by [`crate::testing::SimulatedAccessory`] and by tests that
/// exercise both roles against each other.
pub struct SrpServer {
    n: BigUint,
    salt: Vec<u8>,
    verifier: BigUint,
    b: BigUint,
    public_key: Vec<u8>,
}

impl SrpServer {
    /// Create a server from a salt and verifier
    #[must_use]
    pub fn new(salt: &[u8], verifier: &[u8]) -> Self {
        let n = group_modulus();
        let g = generator();
        let k = multiplier(&n, &g);
        let verifier = BigUint::from_bytes_be(verifier);

        let mut rng = rand::thread_rng();
        let b: BigUint = rng.sample(RandomBits::new(256));
        let b = b % &n;

        // B = k*v + g^b mod N
        let b_pub = (&k * &verifier + g.modpow(&b, &n)) % &n;
        let public_key = pad_to_group(&b_pub);

        Self {
            n,
            salt: salt.to_vec(),
            verifier,
            b,
            public_key,
        }
    }

    /// The server public value B, padded to the group size
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Verify the client's proof and produce the session key and proof M2
    ///
    /// # Errors
    ///
    /// Returns an error if A is illegal or the client proof does not match
    /// (wrong setup code).
    pub fn verify_client(
        &self,
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<(SrpSessionKey, Vec<u8>), CryptoError> {
        let a_pub = BigUint::from_bytes_be(client_public);
        if (&a_pub % &self.n).is_zero() {
            return Err(CryptoError::Srp("illegal client public value".to_string()));
        }

        let b_pub = BigUint::from_bytes_be(&self.public_key);
        let u = scrambler(&a_pub, &b_pub);

        // S = (A * v^u) ^ b mod N
        let v_u = self.verifier.modpow(&u, &self.n);
        let base = (&a_pub * v_u) % &self.n;
        let s_shared = base.modpow(&self.b, &self.n);

        let session_key = Sha512::digest(pad_to_group(&s_shared)).to_vec();

        let expected_m1 = client_evidence(
            &self.n,
            &generator(),
            &self.salt,
            &a_pub,
            &b_pub,
            &session_key,
        );
        if expected_m1 != client_proof {
            return Err(CryptoError::Srp("client proof mismatch".to_string()));
        }

        let m2 = server_evidence(&a_pub, client_proof, &session_key);
        Ok((SrpSessionKey { key: session_key }, m2))
    }
}
