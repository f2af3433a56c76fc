//! Maps a verified provider identity onto a local user.
//!
//! Resolution order: existing provider binding, then account linking by
//! email, then a new OAuth-only account. The email decides between merge and
//! conflict: an account bound to another provider is never relinked, one
//! bound to the same provider takes the new provider id.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::AuthError;
use crate::models::auth::{NewUser, User};
use crate::models::identity::{CanonicalIdentity, OAuthProvider};
use crate::store::{StoreError, UserStore};

/// Outcome of a single resolution attempt.
enum Attempt {
    Resolved(User),
    /// A concurrent resolution for the same email or binding got there first.
    Contended,
}

pub struct IdentityResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: UserStore + ?Sized> IdentityResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Find, link, or create the user for a verified identity.
    ///
    /// `provider_data` is stored on link/create; when absent the identity
    /// itself is stored. Contention on the store's unique constraints is
    /// retried once, after which the call fails with `Conflict`.
    pub async fn resolve(
        &self,
        provider: OAuthProvider,
        identity: &CanonicalIdentity,
        provider_data: Option<serde_json::Value>,
    ) -> Result<User, AuthError> {
        let email = identity.email.trim().to_lowercase();
        let data = match provider_data {
            Some(data) => data,
            None => serde_json::to_value(identity)
                .map_err(|e| AuthError::Internal(format!("provider data: {e}")))?,
        };

        for attempt in 0..2 {
            match self.try_resolve(provider, identity, &email, &data).await? {
                Attempt::Resolved(user) => return Ok(user),
                Attempt::Contended => {
                    warn!(%provider, attempt, "identity resolution contended");
                }
            }
        }
        Err(AuthError::Conflict(
            "Concurrent sign-in for this account, please retry".into(),
        ))
    }

    async fn try_resolve(
        &self,
        provider: OAuthProvider,
        identity: &CanonicalIdentity,
        email: &str,
        data: &serde_json::Value,
    ) -> Result<Attempt, AuthError> {
        let provider_id = identity.provider_id.as_str();

        if let Some(user) = self.store.find_user_by_provider(provider, provider_id).await? {
            debug!(user_id = %user.id, %provider, "provider binding found");
            return Ok(Attempt::Resolved(user));
        }

        if let Some(user) = self.store.find_user_by_email(email).await? {
            if let Some(existing) = user.provider
                && existing != provider
            {
                return Err(AuthError::BadRequest(format!(
                    "This email is already linked with {existing}. Please use that provider to sign in."
                )));
            }
            let rebind = user.provider.is_some();
            let bound = self
                .store
                .bind_provider(user.id, provider, provider_id, data.clone())
                .await;
            return match bound {
                Ok(Some(user)) => {
                    if rebind {
                        info!(user_id = %user.id, %provider, "provider id replaced on existing account");
                    } else {
                        info!(user_id = %user.id, %provider, "provider linked to existing account");
                    }
                    Ok(Attempt::Resolved(user))
                }
                Ok(None) => Ok(Attempt::Contended),
                Err(StoreError::UniqueViolation(constraint)) => {
                    debug!(%constraint, "provider bind lost a race");
                    Ok(Attempt::Contended)
                }
                Err(e) => Err(e.into()),
            };
        }

        let new_user = NewUser::with_provider(email, provider, provider_id, data.clone());
        match self.store.create_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, %provider, "created account from provider identity");
                Ok(Attempt::Resolved(user))
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                debug!(%constraint, "account creation lost a race");
                Ok(Attempt::Contended)
            }
            Err(e) => Err(e.into()),
        }
    }
}
