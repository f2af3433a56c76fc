//! Password hashing via bcrypt.
//!
//! bcrypt is CPU-bound, so the async wrappers run it on tokio's blocking pool.

use std::sync::LazyLock;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash verified against when the account does not exist, so unknown emails
/// take as long as wrong passwords.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| bcrypt::hash("stride-dummy-password", BCRYPT_COST).unwrap_or_default());

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("bcrypt task: {e}")))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("bcrypt task: {e}")))?
}

/// Burn one bcrypt verification for a login that has no stored hash.
pub async fn verify_dummy(password: String) {
    let _ = tokio::task::spawn_blocking(move || {
        let _ = bcrypt::verify(&password, &DUMMY_HASH);
    })
    .await;
}
