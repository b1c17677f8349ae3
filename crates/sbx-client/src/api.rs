//! HTTP client for the sbxd API

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use zeroize::Zeroize;

use sbx_core::types::{
    Ack, Credentials, ErrorBody, Record, RecordCreated, RecordInput, RecordResponse,
    RecordUpdateInput, UserKeyResponse,
};
use sbx_core::{SbxError, SbxResult, AUTH_COOKIE};
use sbx_crypto::UserKey;

/// Wire form of [`Credentials`]; borrows the password only for serialization.
#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> From<&'a Credentials> for CredentialsBody<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        CredentialsBody {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
        }
    }
}

/// Result of a successful login.
pub struct LoginResponse {
    pub token: SecretString,
    pub user_key: Option<UserKey>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> SbxResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(network)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        request.header(COOKIE, format!("{AUTH_COOKIE}={}", token.expose_secret()))
    }

    pub async fn register(&self, credentials: &Credentials) -> SbxResult<SecretString> {
        let response = self
            .http
            .post(self.url("/api/user/register"))
            .json(&CredentialsBody::from(credentials))
            .send()
            .await
            .map_err(network)?;
        session_token(&check(response).await?)
    }

    pub async fn login(&self, credentials: &Credentials, want_key: bool) -> SbxResult<LoginResponse> {
        let response = self
            .http
            .post(self.url("/api/user/login"))
            .query(&[("userkey", want_key)])
            .json(&CredentialsBody::from(credentials))
            .send()
            .await
            .map_err(network)?;
        let response = check(response).await?;
        let token = session_token(&response)?;

        let user_key = if want_key {
            let mut body: UserKeyResponse = response.json().await.map_err(network)?;
            let key = UserKey::from_base64(&body.user_key);
            body.user_key.zeroize();
            Some(key?)
        } else {
            None
        };
        Ok(LoginResponse { token, user_key })
    }

    pub async fn logout(&self, token: &SecretString) -> SbxResult<()> {
        let request = self.http.post(self.url("/api/user/logout"));
        let response = self.authed(request, token).send().await.map_err(network)?;
        check(response).await.map(drop)
    }

    pub async fn create(&self, token: &SecretString, input: &RecordInput) -> SbxResult<i64> {
        let request = self.http.post(self.url("/api/record")).json(input);
        let response = self.authed(request, token).send().await.map_err(network)?;
        let created: RecordCreated = check(response).await?.json().await.map_err(network)?;
        Ok(created.id)
    }

    /// Sealed records, newest first.
    pub async fn list(&self, token: &SecretString) -> SbxResult<Vec<Record>> {
        let request = self.http.get(self.url("/api/records"));
        let response = self.authed(request, token).send().await.map_err(network)?;
        check(response).await?.json().await.map_err(network)
    }

    /// Record decrypted by the server.
    pub async fn get(&self, token: &SecretString, id: i64) -> SbxResult<RecordResponse> {
        let request = self.http.get(self.url(&format!("/api/records/{id}")));
        let response = self.authed(request, token).send().await.map_err(network)?;
        check(response).await?.json().await.map_err(network)
    }

    pub async fn delete(&self, token: &SecretString, id: i64) -> SbxResult<()> {
        let request = self.http.delete(self.url(&format!("/api/records/{id}")));
        let response = self.authed(request, token).send().await.map_err(network)?;
        let _: Ack = check(response).await?.json().await.map_err(network)?;
        Ok(())
    }

    pub async fn update(
        &self,
        token: &SecretString,
        id: i64,
        patch: &RecordUpdateInput,
    ) -> SbxResult<()> {
        let request = self
            .http
            .patch(self.url(&format!("/api/records/{id}")))
            .json(patch);
        let response = self.authed(request, token).send().await.map_err(network)?;
        let _: Ack = check(response).await?.json().await.map_err(network)?;
        Ok(())
    }
}

fn network(e: reqwest::Error) -> SbxError {
    SbxError::Network(e.to_string())
}

/// Pass 2xx through; turn anything else into the matching [`SbxError`].
async fn check(response: Response) -> SbxResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let (code, message) = match response.json::<ErrorBody>().await {
        Ok(body) => (body.code, body.message),
        Err(_) => (String::new(), format!("HTTP {}", status.as_u16())),
    };
    Err(error_for(status, &code, message))
}

fn error_for(status: StatusCode, code: &str, message: String) -> SbxError {
    match status {
        StatusCode::UNAUTHORIZED if code == "incorrect_password" => SbxError::IncorrectPassword,
        StatusCode::UNAUTHORIZED => SbxError::Authentication(message),
        StatusCode::NOT_FOUND => SbxError::NotFound(message),
        StatusCode::CONFLICT => SbxError::AlreadyExists(message),
        StatusCode::BAD_REQUEST if code == "nothing_to_update" => SbxError::NothingToUpdate,
        StatusCode::BAD_REQUEST => SbxError::Validation(message),
        _ => SbxError::Network(format!("server answered {status}: {message}")),
    }
}

/// Value of the `auth_token` cookie set by the server.
fn session_token(response: &Response) -> SbxResult<SecretString> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == AUTH_COOKIE && !value.is_empty()).then(|| SecretString::from(value.to_string()))
        })
        .ok_or_else(|| SbxError::Network("server did not set a session cookie".into()))
}
