//! Authentication domain models.
//!
//! Request and response types use camelCase on the wire; the transport layer
//! serializes them as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::OAuthProvider;

/// User role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Trainer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "trainer" => Ok(Role::Trainer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Domain user.
///
/// Credentials and reset-token fields are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub provider: Option<OAuthProvider>,
    pub provider_id: Option<String>,
    pub provider_data: Option<serde_json::Value>,
    pub role: Role,
    /// SHA-256 digest of the outstanding reset token.
    #[serde(skip_serializing, default)]
    pub password_reset_token: Option<String>,
    /// Reset token expiry (unix epoch milliseconds).
    #[serde(skip_serializing, default)]
    pub password_reset_expires: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Fields for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: Option<(OAuthProvider, String)>,
    pub provider_data: Option<serde_json::Value>,
    pub role: Role,
}

impl NewUser {
    /// A password account.
    pub fn with_password(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash.into()),
            provider: None,
            provider_data: None,
            role: Role::User,
        }
    }

    /// A pure OAuth account (no password).
    pub fn with_provider(
        email: impl Into<String>,
        provider: OAuthProvider,
        provider_id: impl Into<String>,
        provider_data: serde_json::Value,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: None,
            provider: Some((provider, provider_id.into())),
            provider_data: Some(provider_data),
            role: Role::User,
        }
    }
}

/// Refresh token record stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// Record id, also embedded in the refresh JWT as `tokenId`.
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 digest of the random token value.
    pub token_hash: String,
    /// Expiry (unix epoch milliseconds).
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// JWT claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    /// Subject: user ID.
    pub sub: String,
    /// Id of the backing [`RefreshTokenRecord`].
    pub token_id: String,
    /// Random value whose digest is stored on the record.
    pub token: String,
    pub exp: i64,
    pub iat: i64,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of register, login and OAuth login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl AuthResponse {
    pub fn new(tokens: TokenPair, user: User) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user,
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// OAuth sign-in request. `provider` is parsed by the orchestrator so an
/// unknown name surfaces as a bad request rather than a decode failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthLoginRequest {
    pub provider: String,
    pub access_token: String,
    pub id_token: Option<String>,
    pub user_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}
