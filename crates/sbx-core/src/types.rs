//! Wire and storage types shared by the server and the client

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use sbx_crypto::UserKey;
use zeroize::Zeroizing;

use crate::error::{SbxError, SbxResult};

/// Kind of secret held in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    LoginPassword,
    Text,
    Binary,
    BankCard,
}

impl RecordType {
    pub const ALL: [RecordType; 4] = [
        RecordType::LoginPassword,
        RecordType::Text,
        RecordType::Binary,
        RecordType::BankCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::LoginPassword => "login_password",
            RecordType::Text => "text",
            RecordType::Binary => "binary",
            RecordType::BankCard => "bank_card",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                SbxError::Validation(format!(
                    "unknown record type {s:?} (expected login_password, text, binary or bank_card)"
                ))
            })
    }
}

/// A stored record. `data` is the sealed payload (`nonce ‖ ciphertext ‖ tag`),
/// base64 on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: RecordType,
    #[serde(default)]
    pub metadata: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Decrypt `data` with the owner's key.
    pub fn open(&self, key: &UserKey) -> SbxResult<RecordResponse> {
        let plaintext = key.cipher()?.decrypt(&self.data)?;
        let data = serde_json::from_slice(&plaintext)
            .map_err(|e| SbxError::Decryption(format!("payload is not valid JSON: {e}")))?;
        Ok(RecordResponse {
            id: self.id,
            kind: self.kind,
            metadata: self.metadata.clone(),
            data,
        })
    }
}

/// Serialize `data` compactly and encrypt it under the user key.
pub fn seal_data(key: &UserKey, data: &serde_json::Value) -> SbxResult<Vec<u8>> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(data).map_err(|e| SbxError::Validation(format!("data: {e}")))?,
    );
    Ok(key.cipher()?.encrypt(&plaintext)?)
}

/// Plaintext record as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInput {
    #[serde(rename = "type")]
    pub kind: RecordType,
    #[serde(default)]
    pub metadata: String,
    pub data: serde_json::Value,
}

impl RecordInput {
    pub fn validate(&self) -> SbxResult<()> {
        if self.data.is_null() {
            return Err(SbxError::Validation("data is required".into()));
        }
        Ok(())
    }
}

/// Partial update. An absent field leaves the stored value untouched;
/// `Some(String::new())` clears the metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdateInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RecordUpdateInput {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.data.is_none()
    }

    pub fn validate(&self) -> SbxResult<()> {
        if self.is_empty() {
            return Err(SbxError::NothingToUpdate);
        }
        Ok(())
    }
}

/// Decrypted record. Only ever held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: RecordType,
    pub metadata: String,
    pub data: serde_json::Value,
}

/// Body of `POST /api/record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCreated {
    pub id: i64,
}

/// Acknowledgement for delete/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

impl Ack {
    pub fn deleted(id: i64) -> Self {
        Self {
            status: "ok".into(),
            deleted: Some(id),
            updated: None,
        }
    }

    pub fn updated(id: i64) -> Self {
        Self {
            status: "ok".into(),
            deleted: None,
            updated: Some(id),
        }
    }
}

/// Login/registration body.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn validate(&self) -> SbxResult<()> {
        if self.username.trim().is_empty() {
            return Err(SbxError::Validation("username is required".into()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(SbxError::Validation("password is required".into()));
        }
        Ok(())
    }
}

/// Response to `POST /api/user/login?userkey=true`.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserKeyResponse {
    pub user_key: String,
}

impl fmt::Debug for UserKeyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeyResponse")
            .field("user_key", &"[REDACTED]")
            .finish()
    }
}

/// Server-side account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub encrypted_user_key: String,
}

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub login: String,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "nbf")]
    pub not_before: u64,
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

/// JSON body of every non-2xx API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// Body of `POST /debug/loglevel` and response of `GET /debug/loglevel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLevel {
    #[serde(default)]
    pub level: String,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
