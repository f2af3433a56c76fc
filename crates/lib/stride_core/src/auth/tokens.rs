//! Access/refresh token lifecycle.
//!
//! Every issuance writes one [`RefreshTokenRecord`]. The refresh JWT carries
//! the record id (`tokenId`) and a random value whose SHA-256 digest is what
//! the record stores; a correctly signed token whose value does not match the
//! stored digest fails validation.
//!
//! Record states: issued → rotated / expired (revoked lazily on validation) /
//! explicitly revoked. Revoked is terminal.

use std::sync::Arc;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::jwt::{
    encode_access_token, encode_refresh_token, parse_duration_ms, verify_access_token,
    verify_refresh_token,
};
use crate::config::{AuthConfig, ConfigError};
use crate::models::auth::{AccessClaims, RefreshClaims, RefreshTokenRecord, TokenPair, User};
use crate::store::RefreshTokenStore;
use crate::ids::record_id;

/// Generate a cryptographically random token value (64 alphanumeric chars).
pub(crate) fn generate_token_value() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token value for storage.
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `now + ttl`, failing instead of wrapping.
pub(crate) fn expiry(now: i64, ttl: i64) -> Result<i64, AuthError> {
    now.checked_add(ttl)
        .ok_or_else(|| AuthError::Internal(format!("expiry overflow: {now} + {ttl}")))
}

/// Issues, rotates, validates and revokes token pairs.
pub struct TokenManager<S: ?Sized> {
    store: Arc<S>,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl_ms: i64,
    refresh_ttl_ms: i64,
}

impl<S: RefreshTokenStore + ?Sized> TokenManager<S> {
    /// Build a manager, validating secrets and parsing both lifetimes.
    pub fn new(store: Arc<S>, config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            access_secret: config.access_secret.as_bytes().to_vec(),
            refresh_secret: config.refresh_secret.as_bytes().to_vec(),
            access_ttl_ms: parse_duration_ms(&config.access_expiration)?,
            refresh_ttl_ms: parse_duration_ms(&config.refresh_expiration)?,
        })
    }

    /// Mint an access token and a new refresh record for `user`.
    pub async fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let now_secs = now.timestamp();
        let now_ms = now.timestamp_millis();

        let access = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: expiry(now_secs, self.access_ttl_ms / 1_000)?,
            iat: now_secs,
        };
        let access_token = encode_access_token(&access, &self.access_secret)?;

        let token_id = record_id();
        let token_value = generate_token_value();
        let refresh = RefreshClaims {
            sub: user.id.to_string(),
            token_id: token_id.to_string(),
            token: token_value.clone(),
            exp: expiry(now_secs, self.refresh_ttl_ms / 1_000)?,
            iat: now_secs,
        };
        let refresh_token = encode_refresh_token(&refresh, &self.refresh_secret)?;

        let record = RefreshTokenRecord {
            id: token_id,
            user_id: user.id,
            token_hash: hash_token(&token_value),
            expires_at: expiry(now_ms, self.refresh_ttl_ms)?,
            revoked: false,
            created_at: now,
        };
        self.store.insert_refresh_token(&record).await?;
        debug!(user_id = %user.id, token_id = %token_id, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Revoke the record `token_id`, then issue a fresh pair.
    ///
    /// Fails when the record was not live: already rotated, revoked, owned by
    /// someone else, or expired. Of two concurrent rotations of the same
    /// record only one succeeds.
    pub async fn rotate(&self, user: &User, token_id: Uuid) -> Result<TokenPair, AuthError> {
        let revoked = self.store.revoke_refresh_token(token_id, user.id).await?;
        let Some(previous) = revoked else {
            info!(user_id = %user.id, token_id = %token_id, "refresh token reuse rejected");
            return Err(AuthError::invalid_refresh_token());
        };
        if previous.is_expired_at(Utc::now().timestamp_millis()) {
            debug!(user_id = %user.id, token_id = %token_id, "expired refresh token revoked");
            return Err(AuthError::invalid_refresh_token());
        }
        self.issue(user).await
    }

    /// Check a presented refresh value against its record.
    ///
    /// An expired record is revoked as a side effect.
    pub async fn validate(
        &self,
        user_id: Uuid,
        token_value: &str,
        token_id: Uuid,
    ) -> Result<bool, AuthError> {
        let record = self
            .store
            .find_live_refresh_token(token_id, user_id, &hash_token(token_value))
            .await?;
        let Some(record) = record else {
            return Ok(false);
        };
        if record.is_expired_at(Utc::now().timestamp_millis()) {
            self.store.revoke_refresh_token(token_id, user_id).await?;
            debug!(user_id = %user_id, token_id = %token_id, "expired refresh token revoked");
            return Ok(false);
        }
        Ok(true)
    }

    /// Revoke a single record regardless of the presented value.
    pub async fn revoke(&self, user_id: Uuid, token_id: Uuid) -> Result<bool, AuthError> {
        Ok(self
            .store
            .revoke_refresh_token(token_id, user_id)
            .await?
            .is_some())
    }

    /// Revoke every live record for a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_all_refresh_tokens(user_id).await?;
        info!(user_id = %user_id, revoked, "revoked refresh tokens");
        Ok(revoked)
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        verify_access_token(token, &self.access_secret)
            .ok_or_else(|| AuthError::Unauthorized("Invalid or expired token".into()))
    }

    /// Verify a refresh token's signature and expiry. Does not consult the store.
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        verify_refresh_token(token, &self.refresh_secret).ok_or_else(AuthError::invalid_refresh_token)
    }
}
