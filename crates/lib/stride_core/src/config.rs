//! Explicit configuration for the identity core.
//!
//! Everything the token manager and provider verifier need is carried in
//! these structs and passed in at construction; nothing is read from the
//! process environment at call time.

use std::path::PathBuf;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::jwt::parse_duration_ms;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_EXPIRATION: &str = "15m";

/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_EXPIRATION: &str = "7d";

/// Default password reset token lifetime: one hour, in milliseconds.
pub const DEFAULT_PASSWORD_RESET_TTL_MS: i64 = 3_600_000;

/// Upper bound for every configured lifetime, in milliseconds. Keeps
/// `now + lifetime` well inside `i64`.
pub const MAX_LIFETIME_MS: i64 = i64::MAX / 2;

/// Default timeout for provider identity calls.
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors, detected before any token is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration '{0}': expected a number with optional s/m/h/d suffix")]
    InvalidDuration(String),

    #[error("Signing secret for {0} tokens is empty")]
    EmptySecret(&'static str),

    #[error("Access and refresh tokens must use different signing secrets")]
    SharedSecret,

    #[error("Lifetime for {0} is negative or too large")]
    LifetimeOutOfRange(&'static str),

    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
}

/// Token signing keys and lifetimes.
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret for access tokens.
    pub access_secret: String,
    /// Access token lifetime, e.g. `"15m"`.
    pub access_expiration: String,
    /// HS256 secret for refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: String,
    /// Refresh token lifetime, e.g. `"7d"`.
    pub refresh_expiration: String,
    /// Password reset token lifetime in milliseconds.
    pub password_reset_ttl_ms: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("access_expiration", &self.access_expiration)
            .field("refresh_secret", &"<redacted>")
            .field("refresh_expiration", &self.refresh_expiration)
            .field("password_reset_ttl_ms", &self.password_reset_ttl_ms)
            .finish()
    }
}

impl AuthConfig {
    /// Config with the given secrets and default lifetimes.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            access_expiration: DEFAULT_ACCESS_EXPIRATION.into(),
            refresh_secret: refresh_secret.into(),
            refresh_expiration: DEFAULT_REFRESH_EXPIRATION.into(),
            password_reset_ttl_ms: DEFAULT_PASSWORD_RESET_TTL_MS,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                           | Default                        |
    /// |------------------------------------|--------------------------------|
    /// | `JWT_ACCESS_SECRET`                | generated & persisted to file  |
    /// | `JWT_ACCESS_EXPIRATION`            | `15m`                          |
    /// | `JWT_REFRESH_SECRET`               | generated & persisted to file  |
    /// | `JWT_REFRESH_EXPIRATION`           | `7d`                           |
    /// | `PASSWORD_RESET_TOKEN_EXPIRATION`  | `3600000` (ms)                 |
    pub fn from_env() -> Self {
        Self {
            access_secret: resolve_secret("JWT_ACCESS_SECRET", "jwt-access-secret"),
            access_expiration: std::env::var("JWT_ACCESS_EXPIRATION")
                .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRATION.into()),
            refresh_secret: resolve_secret("JWT_REFRESH_SECRET", "jwt-refresh-secret"),
            refresh_expiration: std::env::var("JWT_REFRESH_EXPIRATION")
                .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRATION.into()),
            password_reset_ttl_ms: std::env::var("PASSWORD_RESET_TOKEN_EXPIRATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PASSWORD_RESET_TTL_MS),
        }
    }

    /// Check secrets, parse both token lifetimes and bound all three.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::EmptySecret("access"));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::EmptySecret("refresh"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        check_lifetime("access tokens", parse_duration_ms(&self.access_expiration)?)?;
        check_lifetime("refresh tokens", parse_duration_ms(&self.refresh_expiration)?)?;
        check_lifetime("password reset tokens", self.password_reset_ttl_ms)?;
        Ok(())
    }
}

fn check_lifetime(name: &'static str, ms: i64) -> Result<i64, ConfigError> {
    if (0..=MAX_LIFETIME_MS).contains(&ms) {
        Ok(ms)
    } else {
        Err(ConfigError::LifetimeOutOfRange(name))
    }
}

/// Provider endpoints and HTTP policy for OAuth verification.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google_userinfo_url: String,
    /// Base URL for VK API methods (`<base>/method/users.get`).
    pub vk_api_url: String,
    pub vk_api_version: String,
    pub yandex_info_url: String,
    pub yandex_avatar_url: String,
    /// When set, Apple identity tokens must carry this audience.
    pub apple_client_id: Option<String>,
    pub timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            google_userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".into(),
            vk_api_url: "https://api.vk.com".into(),
            vk_api_version: "5.131".into(),
            yandex_info_url: "https://login.yandex.ru/info".into(),
            yandex_avatar_url: "https://avatars.yandex.net/get-yapic".into(),
            apple_client_id: None,
            timeout: DEFAULT_OAUTH_TIMEOUT,
        }
    }
}

impl OAuthConfig {
    /// Reads overrides from the environment.
    ///
    /// | Variable                  | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `GOOGLE_USERINFO_URL`     | Google v3 userinfo endpoint |
    /// | `VK_API_URL`              | `https://api.vk.com`        |
    /// | `YANDEX_INFO_URL`         | `https://login.yandex.ru/info` |
    /// | `APPLE_CLIENT_ID`         | unset (audience not checked) |
    /// | `OAUTH_HTTP_TIMEOUT_SECS` | `10`                        |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            google_userinfo_url: std::env::var("GOOGLE_USERINFO_URL")
                .unwrap_or(defaults.google_userinfo_url),
            vk_api_url: std::env::var("VK_API_URL").unwrap_or(defaults.vk_api_url),
            vk_api_version: defaults.vk_api_version,
            yandex_info_url: std::env::var("YANDEX_INFO_URL").unwrap_or(defaults.yandex_info_url),
            yandex_avatar_url: defaults.yandex_avatar_url,
            apple_client_id: std::env::var("APPLE_CLIENT_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: std::env::var("OAUTH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Check that every endpoint parses as an absolute URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("google_userinfo_url", &self.google_userinfo_url),
            ("vk_api_url", &self.vk_api_url),
            ("yandex_info_url", &self.yandex_info_url),
            ("yandex_avatar_url", &self.yandex_avatar_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl(name, e.to_string()))?;
        }
        Ok(())
    }
}

/// Resolve a signing secret: env var → persisted file → generate and persist.
pub fn resolve_secret(env_var: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_var)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&secret_path, &secret) {
        warn!(path = %secret_path.display(), error = %e, "could not persist generated secret");
    } else {
        info!(path = %secret_path.display(), env_var, "generated new signing secret");
    }
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stride")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_lifetimes() {
        let config = AuthConfig::new("a", "b");
        assert_eq!(config.access_expiration, "15m");
        assert_eq!(config.refresh_expiration, "7d");
        assert_eq!(config.password_reset_ttl_ms, 3_600_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_shared_secret() {
        let config = AuthConfig::new("same", "same");
        assert!(matches!(config.validate(), Err(ConfigError::SharedSecret)));
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let config = AuthConfig::new("", "b");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySecret("access"))
        ));
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let mut config = AuthConfig::new("a", "b");
        config.refresh_expiration = "seven days".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn validate_bounds_lifetimes() {
        let mut config = AuthConfig::new("a", "b");
        config.refresh_expiration = i64::MAX.to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LifetimeOutOfRange("refresh tokens"))
        ));

        let mut config = AuthConfig::new("a", "b");
        config.password_reset_ttl_ms = -1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LifetimeOutOfRange("password reset tokens"))
        ));

        config.password_reset_ttl_ms = MAX_LIFETIME_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AuthConfig::new("top-secret-a", "top-secret-b");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
    }

    #[test]
    fn oauth_defaults_are_valid_urls() {
        let config = OAuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vk_api_version, "5.131");
        assert!(config.apple_client_id.is_none());
    }

    #[test]
    fn oauth_validate_rejects_relative_url() {
        let config = OAuthConfig {
            google_userinfo_url: "/userinfo".into(),
            ..OAuthConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl("google_userinfo_url", _))
        ));
    }
}
