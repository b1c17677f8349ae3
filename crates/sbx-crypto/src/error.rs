use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: {got} bytes (expected {expected})")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failure, truncation or bad framing. Never carries plaintext.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

impl CryptoError {
    /// True for failures that indicate tampered, truncated or mis-keyed ciphertext.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, CryptoError::Decryption(_))
    }
}
