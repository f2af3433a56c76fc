//! OAuth provider identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of OAuth providers users can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Apple,
    Google,
    Vk,
    Yandex,
}

/// Returned when a provider name is not one of [`OAuthProvider`].
#[derive(Debug, Clone, Error)]
#[error("Unsupported OAuth provider: {0}")]
pub struct UnsupportedProvider(pub String);

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 4] = [
        OAuthProvider::Apple,
        OAuthProvider::Google,
        OAuthProvider::Vk,
        OAuthProvider::Yandex,
    ];

    /// Wire and storage name (`"google"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Apple => "apple",
            OAuthProvider::Google => "google",
            OAuthProvider::Vk => "vk",
            OAuthProvider::Yandex => "yandex",
        }
    }

    /// Human-readable name used in error messages (`"Google"`).
    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Apple => "Apple",
            OAuthProvider::Google => "Google",
            OAuthProvider::Vk => "VK",
            OAuthProvider::Yandex => "Yandex",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = UnsupportedProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apple" => Ok(OAuthProvider::Apple),
            "google" => Ok(OAuthProvider::Google),
            "vk" => Ok(OAuthProvider::Vk),
            "yandex" => Ok(OAuthProvider::Yandex),
            _ => Err(UnsupportedProvider(s.to_string())),
        }
    }
}

/// Normalized identity claims produced by a provider verifier.
///
/// Lives only for the duration of one resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalIdentity {
    /// Stable provider-scoped subject id.
    pub provider_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Raw credentials supplied by a client for an OAuth sign-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    pub access_token: String,
    pub id_token: Option<String>,
    /// Client-supplied profile data (Apple only sends the name on first consent).
    pub user_data: Option<serde_json::Value>,
}
