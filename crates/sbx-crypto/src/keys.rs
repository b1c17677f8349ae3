//! Key hierarchy: server master key → per-user key, key wrapping

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::aead::AeadCipher;
use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// The server's 256-bit master key. Zeroized on drop.
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Decode a base64-encoded 32-byte master key (as provisioned in config).
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim())?);
        let bytes = to_key_array(&decoded)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A per-user 256-bit data key. Encrypts that user's record payloads.
#[derive(Clone)]
pub struct UserKey {
    bytes: [u8; KEY_SIZE],
}

impl UserKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        Ok(Self {
            bytes: to_key_array(bytes)?,
        })
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim())?);
        Self::from_slice(&decoded)
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// AEAD cipher keyed by this user key.
    pub fn cipher(&self) -> CryptoResult<AeadCipher> {
        AeadCipher::new(&self.bytes)
    }
}

impl Drop for UserKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn to_key_array(bytes: &[u8]) -> CryptoResult<[u8; KEY_SIZE]> {
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: bytes.len(),
        });
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Generate a random 256-bit user key.
pub fn generate_user_key() -> UserKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    UserKey::from_bytes(bytes)
}

/// Wrap (encrypt) a user key with the master key.
///
/// Output: `[12-byte nonce][32-byte ciphertext][16-byte tag]`
pub fn wrap_key(master: &MasterKey, user_key: &UserKey) -> CryptoResult<Vec<u8>> {
    AeadCipher::new(master.as_bytes())?.encrypt(user_key.as_bytes())
}

/// Unwrap (decrypt) a user key produced by [`wrap_key`].
pub fn unwrap_key(master: &MasterKey, wrapped: &[u8]) -> CryptoResult<UserKey> {
    if wrapped.len() != NONCE_SIZE + KEY_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "wrapped key has wrong size: {} bytes (expected {})",
            wrapped.len(),
            NONCE_SIZE + KEY_SIZE + TAG_SIZE
        )));
    }

    let plaintext = AeadCipher::new(master.as_bytes())?.decrypt(wrapped)?;
    UserKey::from_slice(&plaintext).map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// Server-side envelope: owns the master key and converts between user keys
/// and their stored (wrapped, base64) form.
#[derive(Debug)]
pub struct KeyHierarchy {
    master: MasterKey,
}

impl KeyHierarchy {
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Generate a fresh user key and return only its wrapped form.
    ///
    /// The plaintext key is dropped (and zeroized) before this returns.
    pub fn generate_wrapped_user_key(&self) -> CryptoResult<String> {
        let user_key = generate_user_key();
        self.wrap_user_key(&user_key)
    }

    pub fn wrap_user_key(&self, user_key: &UserKey) -> CryptoResult<String> {
        Ok(STANDARD.encode(wrap_key(&self.master, user_key)?))
    }

    pub fn unwrap_user_key(&self, wrapped_b64: &str) -> CryptoResult<UserKey> {
        let wrapped = STANDARD
            .decode(wrapped_b64.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64 wrapped key: {e}")))?;
        unwrap_key(&self.master, &wrapped)
    }
}
