//! Identifier generation and parsing.
//!
//! Refresh-token records use UUIDv7 so rows sort by issuance time; user ids
//! are random (v4) and reveal nothing about sign-up order.

use uuid::Uuid;

/// Id for a new refresh-token record.
pub fn record_id() -> Uuid {
    Uuid::now_v7()
}

/// Id for a new user.
pub fn user_id() -> Uuid {
    Uuid::new_v4()
}

/// Parse an id carried in a token claim (`sub`, `tokenId`).
pub fn parse_claim_id(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}
