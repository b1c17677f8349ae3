//! Session cookie handling and the authenticated-user extractor

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use sbx_core::{SbxError, AUTH_COOKIE};

use super::error::ApiError;
use super::AppState;

/// The caller of an authenticated route, taken from a verified session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub login: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, AUTH_COOKIE)
            .ok_or_else(|| SbxError::Authentication("missing session cookie".into()))?;
        let claims = state.service.tokens().verify(token)?;
        Ok(AuthUser {
            user_id: claims.user_id,
            login: claims.login,
        })
    }
}

/// Find cookie `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then_some(value)
        })
        .next()
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie =
        format!("{AUTH_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that makes the browser (or client) drop the session.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
