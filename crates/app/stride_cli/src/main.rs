//! Stride identity CLI.
//!
//! Runs the auth operations against PostgreSQL. Results are printed as JSON
//! on stdout; logs go to stderr.

// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use stride_core::auth::AuthError;
use stride_core::auth::service::AuthService;
use stride_core::config::{AuthConfig, OAuthConfig};
use stride_core::ids::parse_claim_id;
use stride_core::models::auth::{
    LoginRequest, OAuthLoginRequest, RegisterRequest, RequestPasswordResetRequest,
    ResetPasswordRequest,
};
use stride_core::notify::LogNotifier;
use stride_core::oauth::OAuthVerifier;
use stride_core::store::PgStore;
use tracing::{error, info};

mod cli;
mod logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        // Logging may be off or not yet installed.
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), stride_core::version());
        return Ok(());
    }

    let pool = connect(&args).await?;

    if let Commands::Migrate = args.command {
        info!("running database migrations");
        stride_core::migrate::migrate(&pool).await?;
        print_json(&serde_json::json!({"migrated": true}))?;
        return Ok(());
    }

    let service = AuthService::new(
        Arc::new(PgStore::new(pool)),
        &AuthConfig::from_env(),
        Arc::new(OAuthVerifier::new(&OAuthConfig::from_env())?),
        Arc::new(LogNotifier),
    )?;

    match args.command {
        Commands::Register { email, password } => {
            let request = RegisterRequest { email, password };
            print_json(&service.register(&request.email, &request.password).await?)
        }
        Commands::Login { email, password } => {
            let request = LoginRequest { email, password };
            print_json(&service.login(&request.email, &request.password).await?)
        }
        Commands::OauthLogin {
            provider,
            access_token,
            id_token,
            user_data,
        } => {
            let user_data = user_data
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()?;
            let request = OAuthLoginRequest {
                provider,
                access_token,
                id_token,
                user_data,
            };
            print_json(&service.oauth_login(request).await?)
        }
        Commands::Refresh { refresh_token } => {
            print_json(&service.refresh_with_token(&refresh_token).await?)
        }
        Commands::Logout { access_token } => {
            let claims = service.authenticate(&access_token)?;
            let user_id = parse_claim_id(&claims.sub)
                .ok_or_else(|| AuthError::Unauthorized("Invalid or expired token".into()))?;
            print_json(&service.logout(user_id).await?)
        }
        Commands::Whoami { access_token } => print_json(&service.authenticate(&access_token)?),
        Commands::RequestReset { email } => {
            let request = RequestPasswordResetRequest { email };
            print_json(&service.request_password_reset(&request.email).await?)
        }
        Commands::ResetPassword {
            token,
            new_password,
        } => {
            let request = ResetPasswordRequest {
                token,
                new_password,
            };
            print_json(
                &service
                    .reset_password(&request.token, &request.new_password)
                    .await?,
            )
        }
        Commands::Migrate | Commands::Version => Ok(()),
    }
}

/// Open the pool. Commands that never query get a lazy pool.
async fn connect(args: &Cli) -> Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(args.db.max_connections)
        .acquire_timeout(Duration::from_secs(30));

    if !args.command.needs_database() {
        return Ok(options.connect_lazy(&args.db.database_url)?);
    }

    info!(max_connections = args.db.max_connections, "connecting to database");
    Ok(options.connect(&args.db.database_url).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
