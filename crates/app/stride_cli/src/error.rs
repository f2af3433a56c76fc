use stride_core::auth::AuthError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Auth(#[from] AuthError),

    #[error("Database::{:?}: {}", .0, .0)]
    Database(#[from] sqlx::Error),

    #[error("Migrate::{:?}: {}", .0, .0)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Json::{:?}: {}", .0, .0)]
    Json(#[from] serde_json::Error),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Logging: {}", .0)]
    Logging(String),
}
