use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use packman::config::ServerConfig;
use packman::provider::HttpIdentityProvider;
use packman::ratelimit::RateLimiter;
use packman::server::{AppState, create_router};
use packman::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "packman")]
#[command(about = "A package registry server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database and package store
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Base URL of the identity provider API
        #[arg(long, default_value = "https://api.github.com")]
        provider_url: String,

        /// Device-flow initiation URL of the identity provider
        #[arg(long, default_value = "https://github.com/login/device/code")]
        device_code_url: String,

        /// OAuth client id used for device-flow requests without one
        #[arg(long)]
        device_client_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Grant a permission to a user id
    Grant {
        /// Numeric user id at the identity provider
        user: i64,

        /// Permission name (e.g. "admin")
        permission: String,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Revoke a permission from a user id
    Revoke {
        user: i64,

        permission: String,

        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// List a user's permissions
    List {
        user: i64,

        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

fn open_store(data_dir: &str) -> anyhow::Result<SqliteStore> {
    let data_path = PathBuf::from(data_dir);
    fs::create_dir_all(&data_path)?;
    let store = SqliteStore::new(data_path.join("packman.db"))?;
    store.initialize()?;
    Ok(store)
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(SqliteStore::new(config.db_path())?);
    store.initialize()?;

    // Reclamation timers die with the process; sweep what they left behind.
    let swept = RateLimiter::new(store.clone(), config.rate_limit, config.rate_window)
        .sweep_expired()?;
    if swept > 0 {
        info!("swept {swept} expired rate windows");
    }

    let provider = Arc::new(HttpIdentityProvider::new(
        config.provider_url.clone(),
        config.device_code_url.clone(),
    ));

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(store, provider, config));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            provider_url,
            device_code_url,
            device_client_id,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: PathBuf::from(data_dir),
                provider_url,
                device_code_url,
                device_client_id,
                ..ServerConfig::default()
            };
            run_serve(config).await
        }
        Commands::Admin { command } => match command {
            AdminCommands::Grant {
                user,
                permission,
                data_dir,
            } => {
                let store = open_store(&data_dir)?;
                store.grant_permission(user, &permission)?;
                println!("Granted '{permission}' to user {user}");
                Ok(())
            }
            AdminCommands::Revoke {
                user,
                permission,
                data_dir,
            } => {
                let store = open_store(&data_dir)?;
                if store.revoke_permission(user, &permission)? {
                    println!("Revoked '{permission}' from user {user}");
                } else {
                    println!("User {user} does not have '{permission}'");
                }
                Ok(())
            }
            AdminCommands::List { user, data_dir } => {
                let store = open_store(&data_dir)?;
                let permissions = store.list_permissions(user)?;
                if permissions.is_empty() {
                    println!("User {user} has no permissions");
                } else {
                    for permission in permissions {
                        println!("{permission}");
                    }
                }
                Ok(())
            }
        },
    }
}
