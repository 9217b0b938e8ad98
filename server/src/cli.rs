use std::net::IpAddr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::{CredentialError, CredentialHasher};
use crate::config::{Config, ConfigError};
use crate::media::MediaStore;
use crate::routes::create_routes;
use crate::services::{AccountError, AccountService};
use crate::state::AppState;
use crate::store::{AccountStore, ApplicationStore, MemoryStore, PgStore, StoreError};
use crate::telemetry::{self, TelemetryError};

#[derive(Parser, Debug)]
#[command(
    name = "buspass-server",
    about = "Bus pass applications, payments and admin review over HTTP",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply database migrations and exit
    Migrate,
    /// Provision an administrator account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured bind address
    #[arg(long)]
    host: Option<IpAddr>,
    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
    /// Keep all data in process memory instead of Postgres
    #[arg(long)]
    in_memory: bool,
    /// Administrator to create at start-up (in-memory mode only)
    #[arg(long, requires = "admin_password")]
    admin_username: Option<String>,
    #[arg(long, requires = "admin_username")]
    admin_password: Option<String>,
}

#[derive(Args, Debug)]
struct CreateAdminArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run() -> Result<(), StartupError> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    telemetry::init(&config.log_level)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => serve(config, args).await,
        Command::Migrate => {
            connect(&config).await?;
            Ok(())
        }
        Command::CreateAdmin(args) => {
            let store = connect(&config).await?;
            let accounts = AccountService::new(
                Arc::new(store),
                Arc::new(CredentialHasher::new(config.password_pepper.as_str())?),
                MediaStore::new(config.upload_dir.clone()),
            );
            accounts.create_admin(&args.username, &args.password).await?;
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> Result<PgStore, StartupError> {
    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    info!("Successfully connected to database");
    store.migrate().await?;
    info!("Migrations run successfully");
    Ok(store)
}

async fn serve(mut config: Config, args: ServeArgs) -> Result<(), StartupError> {
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let (accounts, applications) = if args.in_memory {
        tracing::warn!("Using the in-memory store; data is lost on exit");
        let store = Arc::new(MemoryStore::new());
        (
            store.clone() as Arc<dyn AccountStore>,
            store as Arc<dyn ApplicationStore>,
        )
    } else {
        let store = Arc::new(connect(&config).await?);
        (
            store.clone() as Arc<dyn AccountStore>,
            store as Arc<dyn ApplicationStore>,
        )
    };

    let hasher = CredentialHasher::new(config.password_pepper.as_str())?;
    let state = AppState::build(&config, accounts, applications, hasher);
    state.media.ensure_layout()?;

    if let (true, Some(username), Some(password)) =
        (args.in_memory, &args.admin_username, &args.admin_password)
    {
        state.accounts.create_admin(username, password).await?;
    }

    let app = create_routes(state, &config);
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, production = config.production, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
