use sbx_crypto::CryptoError;
use thiserror::Error;

pub type SbxResult<T> = Result<T, SbxError>;

#[derive(Debug, Error)]
pub enum SbxError {
    #[error("invalid input: {0}")]
    Validation(String),

    /// Missing, invalid or expired session token.
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Unknown login or wrong password. Deliberately does not say which.
    #[error("incorrect login or password")]
    IncorrectPassword,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("nothing to update: neither metadata nor data given")]
    NothingToUpdate,

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<CryptoError> for SbxError {
    fn from(e: CryptoError) -> Self {
        if e.is_integrity_failure() {
            SbxError::Decryption(e.to_string())
        } else {
            SbxError::Crypto(e.to_string())
        }
    }
}

impl SbxError {
    /// True for errors that end the client session (token rejected by the server).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SbxError::Authentication(_))
    }
}
