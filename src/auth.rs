//! Password login and bearer-token validation.
//!
//! Users come from configuration. Passwords are kept only as salted HMAC-SHA256 digests and
//! compared in constant time. Tokens are HS256 JWTs carrying the username as `sub`; they are
//! validated without clock leeway.

use crate::config::AuthConfig;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Authentication failures. Status codes are chosen by the HTTP layer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header on a protected route.
    #[error("Not authenticated")]
    MissingToken,
    /// Token was malformed, badly signed, expired, or lacked a subject.
    #[error("Invalid authentication credentials")]
    InvalidToken,
    /// Token was valid but names a user that is not configured.
    #[error("User not found")]
    UnknownUser,
    /// Login with a wrong username or password.
    #[error("Incorrect username or password")]
    BadCredentials,
    /// Token could not be signed.
    #[error("failed to issue token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Body returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Signed JWT.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
}

struct Credential {
    salt: String,
    digest: Vec<u8>,
}

impl Credential {
    fn new(password: &str) -> Self {
        let salt = uuid::Uuid::new_v4().to_string();
        let digest = keyed(&salt, password).finalize().into_bytes().to_vec();
        Self { salt, digest }
    }

    fn matches(&self, password: &str) -> bool {
        keyed(&self.salt, password).verify_slice(&self.digest).is_ok()
    }
}

fn keyed(salt: &str, password: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac
}

/// Holds the user table and signing keys.
pub struct AuthGate {
    users: HashMap<String, Credential>,
    // Compared against when the username is unknown so both paths do the same work.
    decoy: Credential,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_minutes: i64,
}

impl AuthGate {
    /// Build the gate from configuration, hashing every configured password.
    pub fn new(config: &AuthConfig) -> Self {
        let users = config
            .users
            .iter()
            .map(|(name, password)| (name.clone(), Credential::new(password)))
            .collect::<HashMap<_, _>>();
        tracing::info!(users = users.len(), ttl_minutes = config.token_ttl_minutes, "Auth enabled");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            users,
            decoy: Credential::new(&uuid::Uuid::new_v4().to_string()),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            token_ttl_minutes: config.token_ttl_minutes,
        }
    }

    /// Check a username/password pair and issue a token for it.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let known = self.users.get(username);
        let credential = known.unwrap_or(&self.decoy);
        if !credential.matches(password) || known.is_none() {
            tracing::warn!(%username, "Login rejected");
            return Err(AuthError::BadCredentials);
        }
        tracing::info!(%username, "Login accepted");
        self.issue_token(username)
    }

    /// Sign a token for `username` expiring after the configured lifetime.
    pub fn issue_token(&self, username: &str) -> Result<IssuedToken, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp: now + self.token_ttl_minutes * 60,
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken {
            access_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Validate a bearer token and return the configured user it names.
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|error| {
                tracing::debug!(error = %error, "Token rejected");
                AuthError::InvalidToken
            })?
            .claims;
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        if !self.users.contains_key(&claims.sub) {
            return Err(AuthError::UnknownUser);
        }
        Ok(claims.sub)
    }
}
