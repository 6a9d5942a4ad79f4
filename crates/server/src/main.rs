//! Custody server binary.

use anyhow::{Context, Result};
use clap::Parser;
use custody_core::config::{AppConfig, KeyConfig};
use custody_server::bootstrap::ensure_admin_user;
use custody_server::{AppState, create_router};
use custody_token::{Ed25519TokenMaker, SecretKey, TokenMaker};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Custody - A digital-evidence custody server
#[derive(Parser, Debug)]
#[command(name = "custodyd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CUSTODY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Custody v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // CUSTODY_CONFIG is only the path
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("CUSTODY_") && key != "CUSTODY_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: custodyd --config /path/to/config.toml\n  \
             2. Environment variables: CUSTODY_SERVER__BIND=0.0.0.0:8080 custodyd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set CUSTODY_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CUSTODY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    custody_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = custody_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Fail before accepting requests when storage is unreachable.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let metadata = custody_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    if let Some(admin) = &config.admin {
        ensure_admin_user(metadata.as_ref(), admin).await?;
    } else {
        tracing::info!("No admin user configured");
    }

    let secret = load_signing_key(&config.auth.signing_key).await?;
    let tokens: Arc<dyn TokenMaker> = Arc::new(Ed25519TokenMaker::new(secret));

    let state = AppState::new(config.clone(), storage, metadata, tokens);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load the token signing key from configuration.
async fn load_signing_key(config: &KeyConfig) -> Result<SecretKey> {
    let secret = match config {
        KeyConfig::File { path } => {
            let key_data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read key file: {}", path.display()))?;
            SecretKey::from_base64(key_data.trim()).context("failed to parse signing key")?
        }
        KeyConfig::Env { var } => {
            let key_data = std::env::var(var)
                .with_context(|| format!("signing key env var not set: {var}"))?;
            SecretKey::from_base64(key_data.trim()).context("failed to parse signing key")?
        }
        KeyConfig::Value { key } => {
            tracing::warn!("Using inline signing key (not recommended for production)");
            SecretKey::from_base64(key.trim()).context("failed to parse signing key")?
        }
        KeyConfig::Generate => {
            tracing::warn!(
                "Generating ephemeral signing key; issued tokens will not survive a restart"
            );
            SecretKey::generate()
        }
    };

    tracing::info!(public_key = %secret.public_key().to_base64(), "Token signing key loaded");
    Ok(secret)
}
