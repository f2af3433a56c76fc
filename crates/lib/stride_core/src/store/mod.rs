//! Persistence boundary for users and refresh-token records.
//!
//! The identity core never talks to a database directly. It is written
//! against [`UserStore`] and [`RefreshTokenStore`]; [`postgres::PgStore`] is
//! the production backend and [`memory::MemoryStore`] an in-process one with
//! the same uniqueness guarantees.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{NewUser, RefreshTokenRecord, User};
use crate::models::identity::OAuthProvider;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write. Carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

/// User records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by (already normalized) email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_provider(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Lookup by reset-token digest. Users whose token expired before
    /// `now_ms` are not returned.
    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now_ms: i64,
    ) -> Result<Option<User>, StoreError>;

    /// Insert a user. Fails with [`StoreError::UniqueViolation`] when the
    /// email or the provider binding is already taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Bind a provider identity to a user with no provider or with the same
    /// provider, replacing the provider id and data in the latter case.
    ///
    /// Returns `None` when the user has a different provider bound (a
    /// concurrent resolution got there first) or no longer exists. Fails with
    /// [`StoreError::UniqueViolation`] when another user holds the binding.
    async fn bind_provider(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_id: &str,
        provider_data: serde_json::Value,
    ) -> Result<Option<User>, StoreError>;

    /// Store a reset-token digest, replacing any outstanding one.
    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<(), StoreError>;

    /// Replace the password hash and clear any reset token.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError>;
}

/// Refresh-token records.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Fetch a non-revoked record matching all three keys. Expiry is not
    /// checked here.
    async fn find_live_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Flip a non-revoked record owned by `user_id` to revoked.
    ///
    /// Returns the record when this call performed the transition and `None`
    /// when it was already revoked or does not exist, so exactly one of any
    /// number of concurrent callers observes `Some`.
    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke every live record for a user, returning how many were flipped.
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// A backend implementing both stores.
pub trait Store: UserStore + RefreshTokenStore {}

impl<T: UserStore + RefreshTokenStore> Store for T {}
