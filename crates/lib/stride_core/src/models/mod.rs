//! Domain models shared by the auth, identity and store modules.

pub mod auth;
pub mod identity;
