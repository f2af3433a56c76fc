//! Google: access token checked against the OpenID userinfo endpoint.

use async_trait::async_trait;
use serde::Deserialize;

use super::{IdentityProvider, VerifyError, non_empty, require};
use crate::models::identity::{CanonicalIdentity, OAuthCredentials, OAuthProvider};

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleProvider {
    client: reqwest::Client,
    userinfo_url: String,
}

impl GoogleProvider {
    pub fn new(client: reqwest::Client, userinfo_url: String) -> Self {
        Self {
            client,
            userinfo_url,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Google
    }

    async fn fetch_identity(
        &self,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, VerifyError> {
        let info = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleUserInfo>()
            .await?;

        Ok(CanonicalIdentity {
            provider_id: require(info.sub, "sub")?,
            email: require(info.email, "email")?,
            name: non_empty(info.name),
            picture: non_empty(info.picture),
        })
    }
}
