//! Yandex ID: `GET /info` with an `OAuth` authorization scheme.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::{IdentityProvider, VerifyError, non_empty, require};
use crate::models::identity::{CanonicalIdentity, OAuthCredentials, OAuthProvider};

#[derive(Debug, Deserialize)]
struct YandexInfo {
    id: Option<String>,
    default_email: Option<String>,
    display_name: Option<String>,
    default_avatar_id: Option<String>,
}

pub struct YandexProvider {
    client: reqwest::Client,
    info_url: String,
    avatar_url: String,
}

impl YandexProvider {
    pub fn new(client: reqwest::Client, info_url: String, avatar_url: String) -> Self {
        Self {
            client,
            info_url,
            avatar_url,
        }
    }

    fn avatar(&self, avatar_id: &str) -> String {
        format!(
            "{}/{avatar_id}/islands-200",
            self.avatar_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl IdentityProvider for YandexProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Yandex
    }

    async fn fetch_identity(
        &self,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, VerifyError> {
        let info = self
            .client
            .get(&self.info_url)
            .header(AUTHORIZATION, format!("OAuth {}", credentials.access_token))
            .send()
            .await?
            .error_for_status()?
            .json::<YandexInfo>()
            .await?;

        Ok(CanonicalIdentity {
            provider_id: require(info.id, "id")?,
            email: require(info.default_email, "default_email")?,
            name: non_empty(info.display_name),
            picture: non_empty(info.default_avatar_id).map(|id| self.avatar(&id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn provider_with(body: serde_json::Value) -> (MockServer, YandexProvider) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .and(header("authorization", "OAuth ya-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let provider = YandexProvider::new(
            reqwest::Client::new(),
            format!("{}/info", server.uri()),
            "https://avatars.yandex.net/get-yapic".into(),
        );
        (server, provider)
    }

    fn creds() -> OAuthCredentials {
        OAuthCredentials {
            access_token: "ya-token".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn builds_avatar_url() {
        let (_server, provider) = provider_with(json!({
            "id": "998877",
            "default_email": "ivan@yandex.ru",
            "display_name": "Ivan",
            "default_avatar_id": "131652443/kb3wQ"
        }))
        .await;

        let identity = provider.fetch_identity(&creds()).await.unwrap();
        assert_eq!(identity.provider_id, "998877");
        assert_eq!(identity.email, "ivan@yandex.ru");
        assert_eq!(identity.name.as_deref(), Some("Ivan"));
        assert_eq!(
            identity.picture.as_deref(),
            Some("https://avatars.yandex.net/get-yapic/131652443/kb3wQ/islands-200")
        );
    }

    #[tokio::test]
    async fn no_avatar_means_no_picture() {
        let (_server, provider) = provider_with(json!({
            "id": "1",
            "default_email": "ivan@yandex.ru"
        }))
        .await;
        let identity = provider.fetch_identity(&creds()).await.unwrap();
        assert!(identity.picture.is_none());
        assert!(identity.name.is_none());
    }

    #[tokio::test]
    async fn missing_email_fails() {
        let (_server, provider) = provider_with(json!({"id": "1"})).await;
        let err = provider.fetch_identity(&creds()).await.unwrap_err();
        assert!(matches!(err, VerifyError::MissingClaim("default_email")));
    }
}
