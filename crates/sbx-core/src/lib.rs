pub mod config;
pub mod error;
pub mod types;

pub use error::{SbxError, SbxResult};

/// Name of the cookie that carries the session token.
pub const AUTH_COOKIE: &str = "auth_token";
