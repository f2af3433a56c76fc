//! PostgreSQL store backed by the embedded migrations.
//!
//! Uniqueness of `users.email` and `users(provider, provider_id)` is enforced
//! by unique indexes; violations surface as [`StoreError::UniqueViolation`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenStore, StoreError, UserStore};
use crate::models::auth::{NewUser, RefreshTokenRecord, Role, User};
use crate::models::identity::OAuthProvider;

macro_rules! user_columns {
    () => {
        "id, email, password_hash, provider, provider_id, provider_data, role, \
         password_reset_token, password_reset_expires, created_at, updated_at"
    };
}

macro_rules! refresh_columns {
    () => {
        "id, user_id, token_hash, expires_at, revoked, created_at"
    };
}

/// PostgreSQL-backed [`UserStore`] and [`RefreshTokenStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: Option<String>,
    provider: Option<String>,
    provider_id: Option<String>,
    provider_data: Option<serde_json::Value>,
    role: String,
    password_reset_token: Option<String>,
    password_reset_expires: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let provider = row
            .provider
            .as_deref()
            .map(str::parse::<OAuthProvider>)
            .transpose()
            .map_err(|e| StoreError::Decode(format!("user {}: {e}", row.id)))?;
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Decode(format!("user {}: {e}", row.id)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            provider,
            provider_id: row.provider_id,
            provider_data: row.provider_data,
            role,
            password_reset_token: row.password_reset_token,
            password_reset_expires: row.password_reset_expires,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefreshRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expires_at: i64,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl From<RefreshRow> for RefreshTokenRecord {
    fn from(row: RefreshRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}

/// Map a write error, singling out unique-index violations.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string());
    }
    StoreError::Db(e)
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, StoreError> {
    row.map(User::try_from).transpose()
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        into_user(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        into_user(row)
    }

    async fn find_user_by_provider(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE provider = $1 AND provider_id = $2"
        ))
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        into_user(row)
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now_ms: i64,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users \
             WHERE password_reset_token = $1 \
               AND password_reset_expires > $2"
        ))
        .bind(token_hash)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;
        into_user(row)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let (provider, provider_id) = match &user.provider {
            Some((p, id)) => (Some(p.as_str()), Some(id.as_str())),
            None => (None, None),
        };
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO users (id, email, password_hash, provider, provider_id, provider_data, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING ",
            user_columns!()
        ))
        .bind(crate::ids::user_id())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(provider)
        .bind(provider_id)
        .bind(&user.provider_data)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;
        User::try_from(row)
    }

    async fn bind_provider(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_id: &str,
        provider_data: serde_json::Value,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users \
             SET provider = $2, provider_id = $3, provider_data = $4, updated_at = now() \
             WHERE id = $1 AND (provider IS NULL OR provider = $2) \
             RETURNING ",
            user_columns!()
        ))
        .bind(user_id)
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(&provider_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;
        into_user(row)
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users \
             SET password_reset_token = $2, password_reset_expires = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users \
             SET password_hash = $2, password_reset_token = NULL, \
                 password_reset_expires = NULL, updated_at = now() \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_live_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshRow>(concat!(
            "SELECT ",
            refresh_columns!(),
            " FROM refresh_tokens \
             WHERE id = $1 AND user_id = $2 AND token_hash = $3 AND revoked = FALSE"
        ))
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshRow>(concat!(
            "UPDATE refresh_tokens SET revoked = TRUE \
             WHERE id = $1 AND user_id = $2 AND revoked = FALSE \
             RETURNING ",
            refresh_columns!()
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE \
             WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
