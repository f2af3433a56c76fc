use clap::{Args, Parser, Subcommand};

/// Stride identity CLI.
#[derive(Parser, Debug)]
#[command(name = "stride_cli", version, about = "Stride identity CLI")]
pub struct Cli {
    #[command(flatten)]
    pub db: DatabaseArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL.
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/stride"
    )]
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, global = true, default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the embedded database migrations.
    Migrate,

    /// Create a password account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign in with an OAuth provider credential.
    OauthLogin {
        /// apple, google, vk or yandex.
        #[arg(long)]
        provider: String,
        #[arg(long)]
        access_token: String,
        /// Apple identity token.
        #[arg(long)]
        id_token: Option<String>,
        /// Client-supplied profile data as a JSON object.
        #[arg(long)]
        user_data: Option<String>,
    },

    /// Exchange a refresh token for a new pair.
    Refresh {
        #[arg(long)]
        refresh_token: String,
    },

    /// Revoke every refresh token of the access token's user.
    Logout {
        #[arg(long)]
        access_token: String,
    },

    /// Print the claims of an access token.
    Whoami {
        #[arg(long)]
        access_token: String,
    },

    /// Issue a password reset token.
    RequestReset {
        #[arg(long)]
        email: String,
    },

    /// Set a new password using a reset token.
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long)]
        new_password: String,
    },

    /// Print the version.
    Version,
}

impl Commands {
    /// Whether the command queries the database.
    pub fn needs_database(&self) -> bool {
        !matches!(self, Commands::Whoami { .. } | Commands::Version)
    }
}
