//! Password hashing: scrypt with a self-describing encoded format
//!
//! ```text
//! scrypt$<N>$<r>$<p>$<base64 salt>$<base64 hash>
//! ```
//!
//! Verification re-derives with the parameters embedded in the stored hash,
//! so raising the defaults never invalidates existing accounts.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Algorithm tag leading every encoded hash.
pub const ALGORITHM: &str = "scrypt";

/// Random salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// Derived hash length in bytes.
pub const HASH_SIZE: usize = 32;

/// Upper bound on log2(N) accepted from a stored hash (N = 1 Mi).
const MAX_LOG_N: u8 = 20;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    log_n: u8,
    r: u32,
    p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        // N = 32768
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl ScryptParams {
    /// Build parameters from the CPU/memory cost `n`, which must be a power of two.
    pub fn new(n: u64, r: u32, p: u32) -> CryptoResult<Self> {
        if n < 2 || !n.is_power_of_two() {
            return Err(CryptoError::Hashing(format!(
                "N must be a power of two greater than 1, got {n}"
            )));
        }
        let log_n = n.trailing_zeros() as u8;
        if log_n > MAX_LOG_N {
            return Err(CryptoError::Hashing(format!("N too large: {n}")));
        }
        if r == 0 || p == 0 {
            return Err(CryptoError::Hashing("r and p must be non-zero".into()));
        }
        Ok(Self { log_n, r, p })
    }

    pub fn n(&self) -> u64 {
        1u64 << self.log_n
    }

    pub fn r(&self) -> u32 {
        self.r
    }

    pub fn p(&self) -> u32 {
        self.p
    }

    fn derive(&self, password: &[u8], salt: &[u8], out: &mut [u8]) -> CryptoResult<()> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, out.len())
            .map_err(|e| CryptoError::Hashing(format!("invalid scrypt params: {e}")))?;
        scrypt::scrypt(password, salt, &params, out)
            .map_err(|e| CryptoError::Hashing(format!("scrypt failed: {e}")))
    }
}

/// Hashes and verifies user passwords.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher {
    params: ScryptParams,
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use non-default cost parameters. Tests use this to keep scrypt cheap.
    pub fn with_params(params: ScryptParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> ScryptParams {
        self.params
    }

    /// Hash a password under a fresh random salt.
    pub fn hash(&self, password: &SecretString) -> CryptoResult<String> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut derived = Zeroizing::new([0u8; HASH_SIZE]);
        self.params
            .derive(password.expose_secret().as_bytes(), &salt, &mut derived[..])?;

        Ok(format!(
            "{ALGORITHM}${}${}${}${}${}",
            self.params.n(),
            self.params.r,
            self.params.p,
            STANDARD.encode(salt),
            STANDARD.encode(&derived[..]),
        ))
    }

    /// Check `password` against an encoded hash.
    ///
    /// Returns `Ok(false)` on mismatch and `Err(MalformedHash)` when the stored
    /// value cannot be parsed.
    pub fn verify(&self, encoded: &str, password: &SecretString) -> CryptoResult<bool> {
        let parsed = ParsedHash::parse(encoded)?;

        let mut derived = Zeroizing::new(vec![0u8; parsed.hash.len()]);
        parsed
            .params
            .derive(password.expose_secret().as_bytes(), &parsed.salt, &mut derived[..])?;

        Ok(constant_time_eq(&derived, &parsed.hash))
    }
}

struct ParsedHash {
    params: ScryptParams,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedHash {
    fn parse(encoded: &str) -> CryptoResult<Self> {
        let malformed = |msg: &str| CryptoError::MalformedHash(msg.to_string());

        let parts: Vec<&str> = encoded.split('$').collect();
        let [alg, n, r, p, salt, hash] = parts.as_slice() else {
            return Err(malformed("expected 6 '$'-separated fields"));
        };
        if *alg != ALGORITHM {
            return Err(malformed("unsupported algorithm"));
        }

        let n: u64 = n.parse().map_err(|_| malformed("N is not a number"))?;
        let r: u32 = r.parse().map_err(|_| malformed("r is not a number"))?;
        let p: u32 = p.parse().map_err(|_| malformed("p is not a number"))?;
        let params =
            ScryptParams::new(n, r, p).map_err(|e| CryptoError::MalformedHash(e.to_string()))?;

        let salt = STANDARD.decode(salt).map_err(|_| malformed("invalid base64 salt"))?;
        let hash = STANDARD.decode(hash).map_err(|_| malformed("invalid base64 hash"))?;
        if !(10..=64).contains(&hash.len()) {
            return Err(malformed("hash length out of range"));
        }

        Ok(Self { params, salt, hash })
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
