//! Sign in with Apple: claims come from the client-supplied identity token.
//!
//! No network call is made. The compact JWS payload is decoded for `sub`
//! and `email`; the display name is only available from client `userData`
//! because Apple sends it on first consent alone.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;

use super::{IdentityProvider, VerifyError, non_empty, require};
use crate::models::identity::{CanonicalIdentity, OAuthCredentials, OAuthProvider};

#[derive(Debug, Deserialize)]
struct AppleClaims {
    sub: Option<String>,
    email: Option<String>,
    /// A string or an array of strings.
    aud: Option<serde_json::Value>,
    exp: Option<i64>,
}

pub struct AppleProvider {
    client_id: Option<String>,
}

impl AppleProvider {
    /// `client_id`, when set, must appear in the token's `aud`.
    pub fn new(client_id: Option<String>) -> Self {
        Self { client_id }
    }

    fn check_audience(&self, aud: Option<&serde_json::Value>) -> Result<(), VerifyError> {
        let Some(expected) = &self.client_id else {
            return Ok(());
        };
        let matches = match aud {
            Some(serde_json::Value::String(s)) => s == expected,
            Some(serde_json::Value::Array(items)) => {
                items.iter().any(|v| v.as_str() == Some(expected.as_str()))
            }
            _ => false,
        };
        if matches { Ok(()) } else { Err(VerifyError::Audience) }
    }
}

/// Decode the payload segment of a compact JWS without checking the signature.
fn decode_payload(token: &str) -> Result<AppleClaims, VerifyError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VerifyError::Decode("expected three segments".into()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| VerifyError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| VerifyError::Decode(e.to_string()))
}

/// `userData.fullName` as a string, or as `{givenName, familyName}`.
fn full_name(user_data: Option<&serde_json::Value>) -> Option<String> {
    match user_data?.get("fullName")? {
        serde_json::Value::String(s) => non_empty(Some(s.clone())),
        serde_json::Value::Object(parts) => {
            let given = parts.get("givenName").and_then(|v| v.as_str()).unwrap_or("");
            let family = parts.get("familyName").and_then(|v| v.as_str()).unwrap_or("");
            non_empty(Some(format!("{given} {family}")))
        }
        _ => None,
    }
}

#[async_trait]
impl IdentityProvider for AppleProvider {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Apple
    }

    async fn fetch_identity(
        &self,
        credentials: &OAuthCredentials,
    ) -> Result<CanonicalIdentity, VerifyError> {
        let id_token = credentials
            .id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(VerifyError::MissingIdToken)?;

        let claims = decode_payload(id_token)?;
        self.check_audience(claims.aud.as_ref())?;
        if let Some(exp) = claims.exp
            && exp < Utc::now().timestamp()
        {
            return Err(VerifyError::Expired);
        }

        Ok(CanonicalIdentity {
            provider_id: require(claims.sub, "sub")?,
            email: require(claims.email, "email")?,
            name: full_name(credentials.user_data.as_ref()),
            picture: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id_token(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"test"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    fn creds(token: String, user_data: Option<serde_json::Value>) -> OAuthCredentials {
        OAuthCredentials {
            access_token: "authorization-code".into(),
            id_token: Some(token),
            user_data,
        }
    }

    #[tokio::test]
    async fn decodes_subject_and_email() {
        let token = id_token(json!({"sub": "001234.abcd", "email": "a@privaterelay.appleid.com"}));
        let identity = AppleProvider::new(None)
            .fetch_identity(&creds(token, Some(json!({"fullName": "Alice Appleseed"}))))
            .await
            .unwrap();
        assert_eq!(identity.provider_id, "001234.abcd");
        assert_eq!(identity.email, "a@privaterelay.appleid.com");
        assert_eq!(identity.name.as_deref(), Some("Alice Appleseed"));
        assert!(identity.picture.is_none());
    }

    #[tokio::test]
    async fn structured_full_name() {
        let token = id_token(json!({"sub": "s", "email": "e@x.io"}));
        let identity = AppleProvider::new(None)
            .fetch_identity(&creds(
                token,
                Some(json!({"fullName": {"givenName": "Alice", "familyName": "Appleseed"}})),
            ))
            .await
            .unwrap();
        assert_eq!(identity.name.as_deref(), Some("Alice Appleseed"));
    }

    #[tokio::test]
    async fn name_is_absent_without_user_data() {
        let token = id_token(json!({"sub": "s", "email": "e@x.io"}));
        let identity = AppleProvider::new(None)
            .fetch_identity(&creds(token, None))
            .await
            .unwrap();
        assert!(identity.name.is_none());
    }

    #[tokio::test]
    async fn missing_id_token_fails() {
        let err = AppleProvider::new(None)
            .fetch_identity(&OAuthCredentials {
                access_token: "code".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingIdToken));
    }

    #[tokio::test]
    async fn garbage_token_fails() {
        for token in ["not-a-jwt", "a.b", "a.!!!.c", "a.b.c.d"] {
            let err = AppleProvider::new(None)
                .fetch_identity(&creds(token.into(), None))
                .await
                .unwrap_err();
            assert!(matches!(err, VerifyError::Decode(_)), "token {token}");
        }
    }

    #[tokio::test]
    async fn missing_email_claim_fails() {
        let token = id_token(json!({"sub": "s"}));
        let err = AppleProvider::new(None)
            .fetch_identity(&creds(token, None))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingClaim("email")));
    }

    #[tokio::test]
    async fn audience_is_checked_when_configured() {
        let provider = AppleProvider::new(Some("com.stride.app".into()));

        let good = id_token(json!({"sub": "s", "email": "e@x.io", "aud": "com.stride.app"}));
        assert!(provider.fetch_identity(&creds(good, None)).await.is_ok());

        let listed = id_token(json!({"sub": "s", "email": "e@x.io", "aud": ["other", "com.stride.app"]}));
        assert!(provider.fetch_identity(&creds(listed, None)).await.is_ok());

        let bad = id_token(json!({"sub": "s", "email": "e@x.io", "aud": "com.evil.app"}));
        let err = provider.fetch_identity(&creds(bad, None)).await.unwrap_err();
        assert!(matches!(err, VerifyError::Audience));
    }

    #[tokio::test]
    async fn expired_token_fails() {
        let token = id_token(json!({"sub": "s", "email": "e@x.io", "exp": 1_000}));
        let err = AppleProvider::new(None)
            .fetch_identity(&creds(token, None))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }
}
