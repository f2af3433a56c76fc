//! Authentication service: the public auth operations.
//!
//! Wires the store, [`TokenManager`], [`IdentityResolver`], provider
//! verification and notifications together. Transport layers (the CLI, an
//! HTTP server) call into [`AuthService`] and map [`AuthError::kind`].

use std::sync::Arc;

use chrono::Utc;
use rand::{Rng, rng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::password::{hash_password_blocking, verify_dummy, verify_password_blocking};
use super::tokens::{TokenManager, expiry, hash_token};
use crate::config::AuthConfig;
use crate::identity::IdentityResolver;
use crate::ids::parse_claim_id;
use crate::models::auth::{
    AccessClaims, AuthResponse, MessageResponse, NewUser, OAuthLoginRequest, TokenPair,
};
use crate::models::identity::{OAuthCredentials, OAuthProvider};
use crate::notify::Notifier;
use crate::oauth::ProviderVerifier;
use crate::store::{Store, StoreError};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

const LOGOUT_MESSAGE: &str = "Logout successful";
const RESET_REQUESTED_MESSAGE: &str = "If the email exists, a password reset link has been sent";
const RESET_DONE_MESSAGE: &str = "Password reset successful";
const INVALID_RESET_TOKEN: &str = "Invalid or expired password reset token";
const EMAIL_TAKEN: &str = "User with this email already exists";

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check only: one `@`, a non-empty local part, a dotted domain.
fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AuthError::BadRequest("email must be an email".into()))
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::BadRequest(format!(
            "password must be longer than or equal to {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// 32 random bytes as 64 lowercase hex chars.
fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct AuthService<S: ?Sized> {
    store: Arc<S>,
    tokens: TokenManager<S>,
    resolver: IdentityResolver<S>,
    verifier: Arc<dyn ProviderVerifier>,
    notifier: Arc<dyn Notifier>,
    reset_ttl_ms: i64,
}

impl<S: Store + ?Sized> AuthService<S> {
    /// Build the service. Fails when `config` does not validate.
    pub fn new(
        store: Arc<S>,
        config: &AuthConfig,
        verifier: Arc<dyn ProviderVerifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            tokens: TokenManager::new(store.clone(), config)?,
            resolver: IdentityResolver::new(store.clone()),
            store,
            verifier,
            notifier,
            reset_ttl_ms: config.password_reset_ttl_ms,
        })
    }

    pub fn tokens(&self) -> &TokenManager<S> {
        &self.tokens
    }

    /// Create a password account and sign it in.
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict(EMAIL_TAKEN.into()));
        }

        let hash = hash_password_blocking(password.to_string()).await?;
        let user = match self
            .store
            .create_user(NewUser::with_password(email, hash))
            .await
        {
            Ok(user) => user,
            Err(StoreError::UniqueViolation(_)) => {
                return Err(AuthError::Conflict(EMAIL_TAKEN.into()));
            }
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %user.id, "user registered");

        let tokens = self.tokens.issue(&user).await?;

        let notifier = self.notifier.clone();
        let welcome_to = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_welcome(&welcome_to).await {
                warn!(email = %welcome_to, error = %e, "welcome notification failed");
            }
        });

        Ok(AuthResponse::new(tokens, user))
    }

    /// Password sign-in. Every failure is the same `Invalid credentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);
        let user = self.store.find_user_by_email(&email).await?;

        let Some((user, hash)) =
            user.and_then(|u| u.password_hash.clone().map(|hash| (u, hash)))
        else {
            verify_dummy(password.to_string()).await;
            debug!("login rejected: no password account");
            return Err(AuthError::invalid_credentials());
        };

        if !verify_password_blocking(password.to_string(), hash).await? {
            debug!(user_id = %user.id, "login rejected: wrong password");
            return Err(AuthError::invalid_credentials());
        }

        let tokens = self.tokens.issue(&user).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse::new(tokens, user))
    }

    /// Sign in with a provider credential, linking or creating the account.
    pub async fn oauth_login(&self, request: OAuthLoginRequest) -> Result<AuthResponse, AuthError> {
        let provider: OAuthProvider = request.provider.parse()?;
        let credentials = OAuthCredentials {
            access_token: request.access_token,
            id_token: request.id_token,
            user_data: request.user_data,
        };

        let identity = self.verifier.verify(provider, &credentials).await?;
        let user = self
            .resolver
            .resolve(provider, &identity, credentials.user_data)
            .await?;
        let tokens = self.tokens.issue(&user).await?;
        info!(user_id = %user.id, %provider, "oauth login");
        Ok(AuthResponse::new(tokens, user))
    }

    /// Rotate the refresh record `token_id` for `user_id`.
    ///
    /// The caller has already validated the presented refresh token. If the
    /// user no longer exists the record is revoked before `NotFound`.
    pub async fn refresh(&self, user_id: Uuid, token_id: Uuid) -> Result<TokenPair, AuthError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            self.tokens.revoke(user_id, token_id).await?;
            warn!(%user_id, %token_id, "refresh for missing user");
            return Err(AuthError::NotFound("User not found".into()));
        };
        self.tokens.rotate(&user, token_id).await
    }

    /// Decode, validate and rotate a refresh JWT.
    pub async fn refresh_with_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.decode_refresh_token(refresh_token)?;
        let (Some(user_id), Some(token_id)) = (
            parse_claim_id(&claims.sub),
            parse_claim_id(&claims.token_id),
        ) else {
            return Err(AuthError::invalid_refresh_token());
        };

        if !self.tokens.validate(user_id, &claims.token, token_id).await? {
            return Err(AuthError::invalid_refresh_token());
        }
        self.refresh(user_id, token_id).await
    }

    /// Revoke every refresh token for a user. Idempotent.
    pub async fn logout(&self, user_id: Uuid) -> Result<MessageResponse, AuthError> {
        self.tokens.revoke_all(user_id).await?;
        Ok(MessageResponse::new(LOGOUT_MESSAGE))
    }

    /// Verify an access token.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.verify_access_token(access_token)
    }

    /// Issue a reset token for a known email. The response never reveals
    /// whether the account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE));
        };

        let token = generate_reset_token();
        let expires_at = expiry(Utc::now().timestamp_millis(), self.reset_ttl_ms)?;
        self.store
            .set_password_reset_token(user.id, &hash_token(&token), expires_at)
            .await?;
        info!(user_id = %user.id, "password reset token issued");

        if let Err(e) = self.notifier.send_password_reset(&user.email, &token).await {
            warn!(user_id = %user.id, error = %e, "password reset notification failed");
        }
        Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
    }

    /// Consume a reset token: set the new password and sign out everywhere.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, AuthError> {
        validate_password(new_password)?;

        let user = self
            .store
            .find_user_by_reset_token(&hash_token(token), Utc::now().timestamp_millis())
            .await?
            .ok_or_else(|| AuthError::BadRequest(INVALID_RESET_TOKEN.into()))?;

        let hash = hash_password_blocking(new_password.to_string()).await?;
        self.store.update_password(user.id, &hash).await?;
        self.tokens.revoke_all(user.id).await?;
        info!(user_id = %user.id, "password reset");
        Ok(MessageResponse::new(RESET_DONE_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@example.com").is_ok());
        for bad in ["", "a", "@example.com", "a@", "a@b", "a@.com", "a@b.", "a b@c.d", "a@b@c.d"] {
            assert!(validate_email(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn password_length() {
        assert!(validate_password("12345678").is_ok());
        let err = validate_password("1234567").unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }

    #[test]
    fn reset_tokens_are_64_hex() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_reset_token());
    }
}
