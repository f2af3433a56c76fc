//! JWT encoding and verification for both token classes.
//!
//! Access and refresh tokens are HS256 JWTs signed with independent secrets.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::AuthError;
use crate::config::ConfigError;
use crate::models::auth::{AccessClaims, RefreshClaims};

/// Parse a lifetime such as `"15m"` or `"7d"` into milliseconds.
///
/// Recognized suffixes are `s`, `m`, `h` and `d`. A bare number is taken as
/// milliseconds, and so is the leading number of a value with any other
/// suffix. A value without leading digits is rejected.
pub fn parse_duration_ms(expiration: &str) -> Result<i64, ConfigError> {
    let trimmed = expiration.trim();
    let invalid = || ConfigError::InvalidDuration(expiration.to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if split == 0 {
        return Err(invalid());
    }
    let (digits, suffix) = trimmed.split_at(split);
    let value: i64 = digits.parse().map_err(|_| invalid())?;

    let multiplier = match suffix {
        "" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        other => {
            warn!(expiration, suffix = other, "unrecognized duration suffix, using milliseconds");
            1
        }
    };
    value.checked_mul(multiplier).ok_or_else(invalid)
}

fn sign<T: Serialize>(claims: &T, secret: &[u8]) -> Result<String, AuthError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

fn verify<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Option<T> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    decode::<T>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Sign access token claims.
pub fn encode_access_token(claims: &AccessClaims, secret: &[u8]) -> Result<String, AuthError> {
    sign(claims, secret)
}

/// Sign refresh token claims.
pub fn encode_refresh_token(claims: &RefreshClaims, secret: &[u8]) -> Result<String, AuthError> {
    sign(claims, secret)
}

/// Verify an access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    verify(token, secret)
}

/// Verify a refresh token's signature and expiry, returning the claims.
pub fn verify_refresh_token(token: &str, secret: &[u8]) -> Option<RefreshClaims> {
    verify(token, secret)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::auth::Role;

    fn access_claims(exp_offset: i64) -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            sub: "user-1".into(),
            email: "a@example.com".into(),
            role: Role::User,
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("15m").unwrap(), 900_000);
        assert_eq!(parse_duration_ms("2h").unwrap(), 7_200_000);
        assert_eq!(parse_duration_ms("7d").unwrap(), 604_800_000);
    }

    #[test]
    fn duration_without_suffix_is_milliseconds() {
        assert_eq!(parse_duration_ms("3600000").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("0").unwrap(), 0);
    }

    #[test]
    fn duration_with_unknown_suffix_keeps_leading_number() {
        assert_eq!(parse_duration_ms("5w").unwrap(), 5);
        assert_eq!(parse_duration_ms("90 minutes").unwrap(), 90);
        assert_eq!(parse_duration_ms("1.5h").unwrap(), 1);
    }

    #[test]
    fn duration_rejects_garbage() {
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("d").is_err());
        assert!(parse_duration_ms("w5").is_err());
        assert!(parse_duration_ms("-5m").is_err());
        assert!(parse_duration_ms("99999999999999999d").is_err());
        assert!(parse_duration_ms("99999999999999999999").is_err());
    }

    #[test]
    fn access_token_roundtrip() {
        let claims = access_claims(60);
        let token = encode_access_token(&claims, b"access").unwrap();
        assert_eq!(verify_access_token(&token, b"access"), Some(claims));
    }

    #[test]
    fn access_token_wrong_secret_fails() {
        let token = encode_access_token(&access_claims(60), b"access").unwrap();
        assert!(verify_access_token(&token, b"other").is_none());
    }

    #[test]
    fn expired_access_token_fails() {
        let token = encode_access_token(&access_claims(-10), b"access").unwrap();
        assert!(verify_access_token(&token, b"access").is_none());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: "user-1".into(),
            token_id: "tid".into(),
            token: "value".into(),
            exp: now + 60,
            iat: now,
        };
        let token = encode_refresh_token(&claims, b"refresh").unwrap();
        assert_eq!(verify_refresh_token(&token, b"refresh"), Some(claims));
        assert!(verify_refresh_token(&token, b"access").is_none());
        assert!(verify_access_token(&token, b"refresh").is_none());
    }
}
