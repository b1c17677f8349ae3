//! Session tokens: HS256-signed JWTs carrying [`Claims`]
//!
//! Only HS256 is accepted on verification. Expiry and not-before are checked
//! with zero leeway.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, get_current_timestamp, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use sbx_core::types::Claims;
use sbx_core::{SbxError, SbxResult};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// A freshly signed token and its lifetime.
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub ttl_secs: u64,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

pub struct SessionTokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokenManager {
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generate(&self, user_id: i64, login: &str) -> SbxResult<IssuedToken> {
        let now = get_current_timestamp();
        let ttl_secs = self.ttl.as_secs();
        let claims = Claims {
            user_id,
            login: login.to_string(),
            issued_at: now,
            not_before: now,
            expires_at: now + ttl_secs,
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| SbxError::Crypto(format!("signing session token: {e}")))?;
        Ok(IssuedToken { token, ttl_secs })
    }

    pub fn verify(&self, token: &str) -> SbxResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::ImmatureSignature => "token not yet valid",
                    ErrorKind::InvalidAlgorithm => "token signed with a disallowed algorithm",
                    ErrorKind::InvalidSignature => "invalid token signature",
                    _ => "malformed token",
                };
                SbxError::Authentication(reason.into())
            })
    }
}

impl std::fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenManager")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(secret: &str, ttl_secs: u64) -> SessionTokenManager {
        SessionTokenManager::new(
            &SecretString::from(secret.to_string()),
            Duration::from_secs(ttl_secs),
        )
    }

    fn auth_reason(err: SbxError) -> String {
        match err {
            SbxError::Authentication(reason) => reason,
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    #[test]
    fn test_generate_and_verify() {
        let tokens = manager("secret", 3600);
        let issued = tokens.generate(42, "alice").unwrap();
        assert_eq!(issued.ttl_secs, 3600);

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.login, "alice");
        assert_eq!(claims.issued_at, claims.not_before);
        assert_eq!(claims.expires_at, claims.issued_at + 3600);
    }

    #[test]
    fn test_short_lived_token_expires() {
        let tokens = manager("secret", 1);
        let issued = tokens.generate(1, "alice").unwrap();
        assert!(tokens.verify(&issued.token).is_ok());

        std::thread::sleep(Duration::from_secs(2));
        let reason = auth_reason(tokens.verify(&issued.token).unwrap_err());
        assert_eq!(reason, "token expired");
    }

    #[test]
    fn test_other_secret_rejected() {
        let issued = manager("secret-a", 60).generate(1, "alice").unwrap();
        let reason = auth_reason(manager("secret-b", 60).verify(&issued.token).unwrap_err());
        assert_eq!(reason, "invalid token signature");
    }

    #[test]
    fn test_disallowed_algorithm_rejected() {
        let now = get_current_timestamp();
        let claims = Claims {
            user_id: 1,
            login: "alice".into(),
            issued_at: now,
            not_before: now,
            expires_at: now + 60,
        };
        let forged = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let reason = auth_reason(manager("secret", 60).verify(&forged).unwrap_err());
        assert_eq!(reason, "token signed with a disallowed algorithm");
    }

    #[test]
    fn test_not_yet_valid_rejected() {
        let now = get_current_timestamp();
        let claims = Claims {
            user_id: 1,
            login: "alice".into(),
            issued_at: now,
            not_before: now + 600,
            expires_at: now + 1200,
        };
        let early = encode(
            &Header::new(ALGORITHM),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let reason = auth_reason(manager("secret", 60).verify(&early).unwrap_err());
        assert_eq!(reason, "token not yet valid");
    }

    #[test]
    fn test_garbage_rejected() {
        let tokens = manager("secret", 60);
        for junk in ["", "abc", "a.b.c"] {
            assert!(matches!(
                tokens.verify(junk),
                Err(SbxError::Authentication(_))
            ));
        }
    }
}
