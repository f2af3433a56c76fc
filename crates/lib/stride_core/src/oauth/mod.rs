//! OAuth provider verification.
//!
//! Turns raw client credentials for one of the supported providers into a
//! [`CanonicalIdentity`]. Each provider is an [`IdentityProvider`]; the
//! [`OAuthVerifier`] picks one with an exhaustive match on
//! [`OAuthProvider`], so a new provider is a new variant plus a new
//! implementation.
//!
//! Whatever goes wrong upstream, callers only ever see
//! `Unauthorized("Failed to validate <Provider> token")`.

pub mod apple;
pub mod google;
pub mod vk;
pub mod yandex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::AuthError;
use crate::config::OAuthConfig;
use crate::models::identity::{CanonicalIdentity, OAuthCredentials, OAuthProvider};

pub use apple::AppleProvider;
pub use google::GoogleProvider;
pub use vk::VkProvider;
pub use yandex::YandexProvider;

/// Why a provider rejected a credential. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed identity token: {0}")]
    Decode(String),

    #[error("missing claim '{0}'")]
    MissingClaim(&'static str),

    #[error("identity token is required")]
    MissingIdToken,

    #[error("identity token audience mismatch")]
    Audience,

    #[error("identity token expired")]
    Expired,
}

/// One provider's credential check.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    async fn fetch_identity(
        &self,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, VerifyError>;
}

/// The verification boundary consumed by the orchestrator.
#[async_trait]
pub trait ProviderVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: OAuthProvider,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, AuthError>;
}

/// Dispatches to the four built-in providers.
pub struct OAuthVerifier {
    apple: AppleProvider,
    google: GoogleProvider,
    vk: VkProvider,
    yandex: YandexProvider,
}

impl OAuthVerifier {
    /// Build the verifier with one shared HTTP client.
    pub fn new(config: &OAuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            apple: AppleProvider::new(config.apple_client_id.clone()),
            google: GoogleProvider::new(client.clone(), config.google_userinfo_url.clone()),
            vk: VkProvider::new(
                client.clone(),
                config.vk_api_url.clone(),
                config.vk_api_version.clone(),
            ),
            yandex: YandexProvider::new(
                client,
                config.yandex_info_url.clone(),
                config.yandex_avatar_url.clone(),
            ),
        })
    }

    fn provider_for(&self, provider: OAuthProvider) -> &dyn IdentityProvider {
        match provider {
            OAuthProvider::Apple => &self.apple,
            OAuthProvider::Google => &self.google,
            OAuthProvider::Vk => &self.vk,
            OAuthProvider::Yandex => &self.yandex,
        }
    }
}

#[async_trait]
impl ProviderVerifier for OAuthVerifier {
    async fn verify(
        &self,
        provider: OAuthProvider,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, AuthError> {
        match self.provider_for(provider).fetch_identity(credentials).await {
            Ok(identity) => {
                debug!(%provider, provider_id = %identity.provider_id, "provider identity verified");
                Ok(identity)
            }
            Err(e) => {
                warn!(%provider, error = %e, "provider identity verification failed");
                Err(AuthError::Unauthorized(format!(
                    "Failed to validate {} token",
                    provider.display_name()
                )))
            }
        }
    }
}

/// Treat absent and empty values alike.
pub(crate) fn require(value: Option<String>, claim: &'static str) -> Result<String, VerifyError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(VerifyError::MissingClaim(claim))
}

/// Drop empty optional strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> OAuthConfig {
        OAuthConfig {
            google_userinfo_url: format!("{}/userinfo", server.uri()),
            vk_api_url: server.uri(),
            yandex_info_url: format!("{}/info", server.uri()),
            ..OAuthConfig::default()
        }
    }

    #[test]
    fn require_rejects_blank() {
        assert!(matches!(
            require(Some("  ".into()), "email"),
            Err(VerifyError::MissingClaim("email"))
        ));
        assert!(require(None, "sub").is_err());
        assert_eq!(require(Some(" x ".into()), "sub").unwrap(), "x");
    }

    #[test]
    fn dispatch_covers_every_provider() {
        let verifier = OAuthVerifier::new(&OAuthConfig::default()).unwrap();
        for provider in OAuthProvider::ALL {
            assert_eq!(verifier.provider_for(provider).provider(), provider);
        }
    }

    #[tokio::test]
    async fn upstream_failure_becomes_uniform_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401).set_body_string("secret upstream detail"))
            .mount(&server)
            .await;

        let verifier = OAuthVerifier::new(&config_for(&server)).unwrap();
        let err = verifier
            .verify(
                OAuthProvider::Google,
                &OAuthCredentials {
                    access_token: "bad".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Unauthorized(_)));
        assert_eq!(err.to_string(), "Failed to validate Google token");
    }

    #[tokio::test]
    async fn apple_without_id_token_is_unauthorized() {
        let verifier = OAuthVerifier::new(&OAuthConfig::default()).unwrap();
        let err = verifier
            .verify(
                OAuthProvider::Apple,
                &OAuthCredentials {
                    access_token: "unused".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to validate Apple token");
    }

    #[tokio::test]
    async fn unreachable_provider_is_unauthorized() {
        let config = OAuthConfig {
            yandex_info_url: "http://127.0.0.1:9/info".into(),
            timeout: std::time::Duration::from_secs(2),
            ..OAuthConfig::default()
        };
        let verifier = OAuthVerifier::new(&config).unwrap();
        let err = verifier
            .verify(
                OAuthProvider::Yandex,
                &OAuthCredentials {
                    access_token: "tok".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to validate Yandex token");
    }
}
