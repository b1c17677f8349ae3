//! AES-256-GCM authenticated encryption
//!
//! Sealed format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! A fresh nonce is drawn from the OS-seeded thread RNG on every call, so the
//! same plaintext never encrypts to the same bytes twice. No AAD is bound;
//! records are scoped by the owning user's key rather than by position.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// An AES-256-GCM cipher bound to one 256-bit key.
pub struct AeadCipher {
    cipher: Aes256Gcm,
}

impl AeadCipher {
    /// Build a cipher from raw key bytes. Anything other than 32 bytes is rejected.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                got: key.len(),
            });
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: key.len(),
        })?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext`. Returns `[nonce][ciphertext][tag]`.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed buffer produced by [`AeadCipher::encrypt`].
    ///
    /// The plaintext is returned in a zeroizing buffer.
    pub fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "ciphertext too short: {} bytes (minimum {})",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| {
                CryptoError::Decryption("authentication failed: wrong key or corrupted data".into())
            })
    }
}

impl std::fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt `plaintext` under `key` (must be 32 bytes).
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    AeadCipher::new(key)?.encrypt(plaintext)
}

/// Decrypt a sealed buffer under `key`.
///
/// A key of the wrong length is reported as a decryption failure, same as
/// a wrong key of the right length.
pub fn decrypt(sealed: &[u8], key: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    AeadCipher::new(key)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?
        .decrypt(sealed)
}

/// [`encrypt`], then standard base64 for text storage.
pub fn encrypt_base64(plaintext: &[u8], key: &[u8]) -> CryptoResult<String> {
    Ok(STANDARD.encode(encrypt(plaintext, key)?))
}

/// Inverse of [`encrypt_base64`]. Bad base64 counts as a decryption failure.
pub fn decrypt_base64(encoded: &str, key: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let sealed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
    decrypt(&sealed, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"correct horse battery staple";
        let sealed = encrypt(plaintext, &KEY).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let opened = decrypt(&sealed, &KEY).unwrap();
        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let sealed = encrypt(b"", &KEY).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(decrypt(&sealed, &KEY).unwrap().is_empty());
    }

    #[test]
    fn test_same_plaintext_differs() {
        let a = encrypt(b"same", &KEY).unwrap();
        let b = encrypt(b"same", &KEY).unwrap();
        assert_ne!(a, b, "fresh nonce must change the ciphertext");
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let cipher = AeadCipher::new(&KEY).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let sealed = cipher.encrypt(b"x").unwrap();
            assert!(seen.insert(sealed[..NONCE_SIZE].to_vec()), "nonce reused");
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(b"secret", &KEY).unwrap();
        let err = decrypt(&sealed, &[8u8; KEY_SIZE]).unwrap_err();
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            encrypt(b"secret", &[1u8; 16]),
            Err(CryptoError::InvalidKeyLength { expected: 32, got: 16 })
        ));

        let sealed = encrypt(b"secret", &KEY).unwrap();
        assert!(decrypt(&sealed, &[1u8; 31]).unwrap_err().is_integrity_failure());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let sealed = encrypt(b"secret", &KEY).unwrap();
        for len in [0, 1, NONCE_SIZE, NONCE_SIZE + TAG_SIZE - 1, sealed.len() - 1] {
            assert!(
                decrypt(&sealed[..len], &KEY).unwrap_err().is_integrity_failure(),
                "truncation to {len} bytes must fail"
            );
        }
    }

    #[test]
    fn test_base64_wrappers() {
        let encoded = encrypt_base64(b"{\"a\":1}", &KEY).unwrap();
        let opened = decrypt_base64(&encoded, &KEY).unwrap();
        assert_eq!(opened.as_slice(), b"{\"a\":1}");

        let err = decrypt_base64("not base64!!", &KEY).unwrap_err();
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn test_debug_redacts_key() {
        let cipher = AeadCipher::new(&KEY).unwrap();
        assert!(format!("{cipher:?}").contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            plaintext in proptest::collection::vec(any::<u8>(), 0..1024),
            key in any::<[u8; KEY_SIZE]>(),
        ) {
            let sealed = encrypt(&plaintext, &key).unwrap();
            let opened = decrypt(&sealed, &key).unwrap();
            prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
        }

        #[test]
        fn prop_any_bit_flip_is_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            index in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut sealed = encrypt(&plaintext, &KEY).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= 1 << bit;
            prop_assert!(decrypt(&sealed, &KEY).is_err());
        }
    }
}
