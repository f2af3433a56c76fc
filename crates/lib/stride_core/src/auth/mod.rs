//! Authentication: password hashing, signed tokens, refresh-token lifecycle
//! and the orchestrating [`service::AuthService`].

pub mod jwt;
pub mod password;
pub mod service;
pub mod tokens;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::identity::UnsupportedProvider;
use crate::store::StoreError;

/// Authentication errors.
///
/// The first four variants are caller-facing; their messages are safe to
/// return to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    Conflict,
    NotFound,
    Internal,
}

impl AuthError {
    pub fn invalid_credentials() -> Self {
        AuthError::Unauthorized("Invalid credentials".into())
    }

    pub fn invalid_refresh_token() -> Self {
        AuthError::Unauthorized("Invalid refresh token".into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Unauthorized(_) => ErrorKind::Unauthorized,
            AuthError::BadRequest(_) => ErrorKind::BadRequest,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Store(_) | AuthError::Config(_) | AuthError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<UnsupportedProvider> for AuthError {
    fn from(e: UnsupportedProvider) -> Self {
        AuthError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_provider_is_bad_request() {
        let err = AuthError::from(UnsupportedProvider("myspace".into()));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.to_string(), "Unsupported OAuth provider: myspace");
    }

    #[test]
    fn store_errors_are_internal() {
        let err = AuthError::from(StoreError::Decode("bad role".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn credential_errors_share_one_message() {
        assert_eq!(AuthError::invalid_credentials().to_string(), "Invalid credentials");
        assert_eq!(
            AuthError::invalid_credentials().kind(),
            ErrorKind::Unauthorized
        );
    }
}
