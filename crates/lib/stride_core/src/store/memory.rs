//! In-process store.
//!
//! Mirrors the PostgreSQL schema's guarantees: email and provider-binding
//! uniqueness are checked under the same write lock as the insert, and
//! revocation is a conditional flip. Used by tests and local tooling.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RefreshTokenStore, StoreError, UserStore};
use crate::models::auth::{NewUser, RefreshTokenRecord, User};
use crate::models::identity::OAuthProvider;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

/// In-memory [`UserStore`] and [`RefreshTokenStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All refresh-token records for a user, oldest first.
    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        records
    }

    /// Remove a user row, leaving its refresh-token records in place.
    pub async fn delete_user(&self, user_id: Uuid) -> Option<User> {
        self.tables.write().await.users.remove(&user_id)
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }

    fn provider_owner(&self, provider: OAuthProvider, provider_id: &str) -> Option<Uuid> {
        self.users
            .values()
            .find(|u| u.provider == Some(provider) && u.provider_id.as_deref() == Some(provider_id))
            .map(|u| u.id)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_provider(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.provider == Some(provider) && u.provider_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now_ms: i64,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| {
                u.password_reset_token.as_deref() == Some(token_hash)
                    && u.password_reset_expires.is_some_and(|exp| exp > now_ms)
            })
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        if let Some((provider, provider_id)) = &user.provider
            && tables.provider_owner(*provider, provider_id).is_some()
        {
            return Err(StoreError::UniqueViolation(
                "users_provider_provider_id_key".into(),
            ));
        }
        let now = Utc::now();
        let (provider, provider_id) = match user.provider {
            Some((p, id)) => (Some(p), Some(id)),
            None => (None, None),
        };
        let created = User {
            id: crate::ids::user_id(),
            email: user.email,
            password_hash: user.password_hash,
            provider,
            provider_id,
            provider_data: user.provider_data,
            role: user.role,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn bind_provider(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        provider_id: &str,
        provider_data: serde_json::Value,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.users.get(&user_id) {
            Some(user) if user.provider.is_none_or(|bound| bound == provider) => {}
            _ => return Ok(None),
        }
        if tables
            .provider_owner(provider, provider_id)
            .is_some_and(|owner| owner != user_id)
        {
            return Err(StoreError::UniqueViolation(
                "users_provider_provider_id_key".into(),
            ));
        }
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.provider = Some(provider);
        user.provider_id = Some(provider_id.to_string());
        user.provider_data = Some(provider_data);
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_reset_token = Some(token_hash.to_string());
            user.password_reset_expires = Some(expires_at);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.password_reset_token = None;
            user.password_reset_expires = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.refresh_tokens.contains_key(&record.id) {
            return Err(StoreError::UniqueViolation("refresh_tokens_pkey".into()));
        }
        tables.refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_live_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .get(&id)
            .filter(|r| r.user_id == user_id && r.token_hash == token_hash && !r.revoked)
            .cloned())
    }

    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.refresh_tokens.get_mut(&id) {
            Some(record) if record.user_id == user_id && !record.revoked => {
                record.revoked = true;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for record in tables.refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: Uuid) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: crate::ids::record_id(),
            user_id,
            token_hash: "digest".into(),
            expires_at: Utc::now().timestamp_millis() + 60_000,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser::with_password("a@example.com", "h"))
            .await
            .unwrap();
        let err = store
            .create_user(NewUser::with_password("a@example.com", "h2"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_provider_binding_is_a_unique_violation() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser::with_provider(
                "a@example.com",
                OAuthProvider::Google,
                "g-1",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let err = store
            .create_user(NewUser::with_provider(
                "b@example.com",
                OAuthProvider::Google,
                "g-1",
                serde_json::json!({}),
            ))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn bind_provider_keeps_other_provider_bindings() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser::with_password("a@example.com", "h"))
            .await
            .unwrap();
        let bound = store
            .bind_provider(user.id, OAuthProvider::Vk, "vk-1", serde_json::json!({}))
            .await
            .unwrap()
            .expect("first bind succeeds");
        assert_eq!(bound.provider, Some(OAuthProvider::Vk));
        assert_eq!(bound.password_hash.as_deref(), Some("h"));

        let second = store
            .bind_provider(user.id, OAuthProvider::Yandex, "ya-1", serde_json::json!({}))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn bind_provider_replaces_same_provider_id() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser::with_provider(
                "a@example.com",
                OAuthProvider::Google,
                "g-1",
                serde_json::json!({"v": 1}),
            ))
            .await
            .unwrap();
        let rebound = store
            .bind_provider(user.id, OAuthProvider::Google, "g-2", serde_json::json!({"v": 2}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rebound.provider_id.as_deref(), Some("g-2"));
        assert_eq!(rebound.provider_data, Some(serde_json::json!({"v": 2})));
        assert!(
            store
                .find_user_by_provider(OAuthProvider::Google, "g-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn bind_provider_rejects_binding_held_by_other_user() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser::with_provider(
                "owner@example.com",
                OAuthProvider::Vk,
                "vk-1",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let other = store
            .create_user(NewUser::with_password("b@example.com", "h"))
            .await
            .unwrap();
        let err = store
            .bind_provider(other.id, OAuthProvider::Vk, "vk-1", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn revoke_flips_exactly_once() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let rec = record(user_id);
        store.insert_refresh_token(&rec).await.unwrap();

        assert!(store.revoke_refresh_token(rec.id, user_id).await.unwrap().is_some());
        assert!(store.revoke_refresh_token(rec.id, user_id).await.unwrap().is_none());
        assert!(
            store
                .find_live_refresh_token(rec.id, user_id, "digest")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn revoke_is_scoped_to_owner() {
        let store = MemoryStore::new();
        let rec = record(Uuid::new_v4());
        store.insert_refresh_token(&rec).await.unwrap();
        assert!(
            store
                .revoke_refresh_token(rec.id, Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn revoke_all_counts_live_records() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        for _ in 0..3 {
            store.insert_refresh_token(&record(user_id)).await.unwrap();
        }
        store.insert_refresh_token(&record(Uuid::new_v4())).await.unwrap();

        assert_eq!(store.revoke_all_refresh_tokens(user_id).await.unwrap(), 3);
        assert_eq!(store.revoke_all_refresh_tokens(user_id).await.unwrap(), 0);
        assert!(store.refresh_tokens_for(user_id).await.iter().all(|r| r.revoked));
    }

    #[tokio::test]
    async fn reset_token_lookup_honours_expiry() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser::with_password("a@example.com", "h"))
            .await
            .unwrap();
        store
            .set_password_reset_token(user.id, "digest", 1_000)
            .await
            .unwrap();
        assert!(store.find_user_by_reset_token("digest", 999).await.unwrap().is_some());
        assert!(store.find_user_by_reset_token("digest", 1_000).await.unwrap().is_none());

        store.update_password(user.id, "h2").await.unwrap();
        assert!(store.find_user_by_reset_token("digest", 0).await.unwrap().is_none());
    }
}
