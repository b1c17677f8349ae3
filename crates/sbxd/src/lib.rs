//! sbxd: the Strongbox vault server
//!
//! Request path: HTTP handler → [`service::VaultService`] → repository.
//! The service unwraps the caller's user key per operation and seals record
//! payloads with it before anything reaches storage.

pub mod daemon;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod repo;
pub mod service;
pub mod token;

pub use service::VaultService;
pub use token::{IssuedToken, SessionTokenManager};

#[cfg(test)]
pub(crate) mod test_support {
    use secrecy::SecretString;
    use std::sync::Arc;
    use std::time::Duration;

    use sbx_crypto::{KeyHierarchy, MasterKey, PasswordHasher, ScryptParams};

    use crate::repo::MemoryRepository;
    use crate::service::VaultService;
    use crate::token::SessionTokenManager;

    pub fn service() -> Arc<VaultService> {
        let repo = Arc::new(MemoryRepository::new());
        Arc::new(VaultService::new(
            repo.clone(),
            repo,
            KeyHierarchy::new(MasterKey::from_bytes([3u8; 32])),
            PasswordHasher::with_params(ScryptParams::new(1024, 8, 1).unwrap()),
            SessionTokenManager::new(
                &SecretString::from("test-secret".to_string()),
                Duration::from_secs(60),
            ),
        ))
    }
}
