//! sbx-crypto: envelope encryption primitives for Strongbox
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, server-held, provisioned out of band)
//!   └── User Key (per-user, 256-bit random, wrapped by master key, stored base64)
//!       └── Record AEAD: AES-256-GCM (key=user_key, nonce=random_96bit)
//! ```
//!
//! Every ciphertext produced here uses the same framing:
//! `[12-byte nonce][ciphertext][16-byte tag]`.
//!
//! Passwords never touch the key hierarchy. They are hashed with scrypt and
//! stored as `scrypt$N$r$p$<b64 salt>$<b64 hash>`.

pub mod aead;
pub mod error;
pub mod keys;
pub mod password;

pub use aead::{decrypt, decrypt_base64, encrypt, encrypt_base64, AeadCipher};
pub use error::{CryptoError, CryptoResult};
pub use keys::{generate_user_key, unwrap_key, wrap_key, KeyHierarchy, MasterKey, UserKey};
pub use password::{PasswordHasher, ScryptParams};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
