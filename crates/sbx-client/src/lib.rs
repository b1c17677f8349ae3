//! sbx-client: the client half of Strongbox
//!
//! [`ClientVault`] keeps the session token and a local cache of sealed records
//! plus the unwrapped user key, so records can be read offline. Every write
//! goes to sbxd through [`api::ApiClient`].

pub mod api;
pub mod store;
pub mod token;
pub mod vault;

pub use api::ApiClient;
pub use store::{LocalStore, StoreBackend};
pub use token::TokenFile;
pub use vault::{ClientVault, RecordListing, SessionState, VaultStatus};
