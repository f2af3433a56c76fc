//! VK: profile from `users.get`, email from `account.getProfileInfo`.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{IdentityProvider, VerifyError, non_empty, require};
use crate::models::identity::{CanonicalIdentity, OAuthCredentials, OAuthProvider};

/// VK wraps every method result in `{"response": ...}` or `{"error": ...}`.
#[derive(Debug, Deserialize)]
struct VkEnvelope<T> {
    response: Option<T>,
    error: Option<VkApiError>,
}

#[derive(Debug, Deserialize)]
struct VkApiError {
    error_code: Option<i64>,
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VkUser {
    id: Option<serde_json::Value>,
    first_name: Option<String>,
    last_name: Option<String>,
    photo_200: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VkProfileInfo {
    email: Option<String>,
}

pub struct VkProvider {
    client: reqwest::Client,
    api_url: String,
    api_version: String,
}

impl VkProvider {
    pub fn new(client: reqwest::Client, api_url: String, api_version: String) -> Self {
        Self {
            client,
            api_url,
            api_version,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, VerifyError> {
        let url = format!("{}/method/{method}", self.api_url.trim_end_matches('/'));
        let envelope = self
            .client
            .get(url)
            .query(params)
            .query(&[("v", self.api_version.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<VkEnvelope<T>>()
            .await?;

        if let Some(err) = envelope.error {
            return Err(VerifyError::Provider(format!(
                "{method}: {} ({})",
                err.error_msg.unwrap_or_default(),
                err.error_code.unwrap_or_default()
            )));
        }
        envelope
            .response
            .ok_or_else(|| VerifyError::Provider(format!("{method}: empty response")))
    }
}

/// VK returns numeric ids; accept strings too.
fn id_to_string(id: Option<serde_json::Value>) -> Option<String> {
    match id? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait]
impl IdentityProvider for VkProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Vk
    }

    async fn fetch_identity(
        &self,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, VerifyError> {
        let token = credentials.access_token.as_str();

        let users: Vec<VkUser> = self
            .call(
                "users.get",
                &[("access_token", token), ("fields", "photo_200")],
            )
            .await?;
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| VerifyError::Provider("users.get: no user".into()))?;

        let profile: VkProfileInfo = self
            .call("account.getProfileInfo", &[("access_token", token)])
            .await?;

        let name = format!(
            "{} {}",
            user.first_name.unwrap_or_default(),
            user.last_name.unwrap_or_default()
        );

        Ok(CanonicalIdentity {
            provider_id: require(id_to_string(user.id), "id")?,
            email: require(profile.email, "email")?,
            name: non_empty(Some(name)),
            picture: non_empty(user.photo_200),
        })
    }
}
