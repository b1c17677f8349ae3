//! Registration, login and logout

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use sbx_core::types::Credentials;

use super::auth::{clear_cookie, session_cookie};
use super::error::ApiResult;
use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    /// Return the unwrapped user key with the session.
    #[serde(default)]
    pub userkey: bool,
}

/// Serialized straight from the zeroizing key; no owned copy is made.
#[derive(Serialize)]
struct UserKeyBody<'a> {
    user_key: &'a str,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(credentials) = payload?;
    let issued = state.service.register(credentials).await?;
    state.metrics.registration();

    let cookie = session_cookie(&issued.token, issued.ttl_secs, state.cookie_secure);
    Ok(([(SET_COOKIE, cookie)], "OK").into_response())
}

pub async fn login(
    State(state): State<AppState>,
    params: Result<Query<LoginParams>, QueryRejection>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(credentials) = payload?;

    let outcome = match state.service.login(credentials, params.userkey).await {
        Ok(outcome) => {
            state.metrics.login("success");
            outcome
        }
        Err(e) => {
            state.metrics.login("failure");
            return Err(e.into());
        }
    };

    let cookie = session_cookie(
        &outcome.token.token,
        outcome.token.ttl_secs,
        state.cookie_secure,
    );
    let response = match outcome.user_key {
        Some(key) => (
            [(SET_COOKIE, cookie)],
            Json(UserKeyBody {
                user_key: key.as_str(),
            }),
        )
            .into_response(),
        None => ([(SET_COOKIE, cookie)], "OK").into_response(),
    };
    Ok(response)
}

/// Always succeeds; the token itself is stateless and simply expires.
pub async fn logout(State(state): State<AppState>) -> Response {
    ([(SET_COOKIE, clear_cookie(state.cookie_secure))], "OK").into_response()
}
