//! # stride_core
//!
//! Identity core for Stride: password and OAuth authentication, refresh-token
//! rotation and cross-provider account linking.

pub mod auth;
pub mod config;
pub mod identity;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod oauth;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
