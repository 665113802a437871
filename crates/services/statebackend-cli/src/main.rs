//! `statebackend-git`: CLI front-end for the Git-backed remote state
//! backend (component C8). Wires configuration, the storage registry, and
//! the HTTP adapter together and runs the server until signaled to stop.

mod config;
mod pid;
mod tracing_setup;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::ConfigOverrides;
use statebackend_core::crypt::{EncryptionProvider, EncryptionRegistry, IdentityProvider};
use statebackend_core::storage::git_client::{GitClientConfig, GitStorageClient};
use statebackend_core::storage::StorageClient;
use statebackend_server::auth::BasicAuthConfig;
use statebackend_server::{build_router, AppState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "statebackend-git", version, about = "Git-backed HTTP remote state backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the backend and block until terminated.
    Serve {
        #[arg(short, long)]
        address: Option<String>,
        #[arg(short = 'l', long)]
        access_logs: bool,
        #[arg(short = 'c', long)]
        config: Option<String>,
        #[arg(short = 'r', long)]
        repository: Option<String>,
        #[arg(short = 'b', long)]
        git_ref: Option<String>,
        #[arg(short = 's', long)]
        state: Option<String>,
    },
    /// Signal a running instance (identified by its pid file) to stop.
    Stop,
    /// Print the build version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("statebackend-git {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Stop => pid::stop(),
        Command::Serve {
            address,
            access_logs,
            config,
            repository,
            git_ref,
            state,
        } => {
            let overrides = ConfigOverrides {
                address,
                access_logs: if access_logs { Some(true) } else { None },
                config_file: config,
                repository,
                git_ref,
                state,
            };
            serve(overrides).await
        }
    }
}

async fn serve(overrides: ConfigOverrides) -> Result<()> {
    let config = config::load(&overrides).context("load configuration")?;
    tracing_setup::init(&config.log_format);

    pid::lock_pid_file().context("acquire single-instance pid lock")?;

    let git_client = GitStorageClient::new(GitClientConfig {
        default_repository: config.git_repository.clone(),
        default_ref: config.git_ref.clone(),
        default_state: config.git_state.clone(),
        ..GitClientConfig::default()
    });

    let mut registry: HashMap<String, Arc<dyn StorageClient>> = HashMap::new();
    registry.insert(config.default_backend_type.clone(), Arc::new(git_client));

    let encryption: Arc<dyn EncryptionProvider> = match &config.encryption_provider {
        Some(name) => EncryptionRegistry::with_defaults(config.encryption_passphrase.clone())
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown encryption provider: {name}"))?,
        None => Arc::new(IdentityProvider),
    };

    let auth = match (&config.auth_username, &config.auth_password) {
        (Some(username), Some(password)) => Some(BasicAuthConfig {
            username: username.clone(),
            password: password.clone(),
            realm: config.auth_realm.clone(),
        }),
        _ => None,
    };

    let state = AppState {
        registry: Arc::new(registry),
        encryption,
        auth,
        default_backend_type: config.default_backend_type.clone(),
        start_time: Instant::now(),
    };

    let app = build_router(state);
    if config.access_logs {
        tracing::info!("access logging enabled");
    }

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("bind {}", config.address))?;
    tracing::info!(address = %config.address, "statebackend-git listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    let _ = pid::release_pid_file();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
