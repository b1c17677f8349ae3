//! sbxd: Strongbox vault server
//!
//! Usage:
//!   sbxd [--config /etc/sbx/sbxd.toml] [--http-addr 0.0.0.0:8080]

use anyhow::Result;
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sbx_core::config::SbxdConfig;
use sbxd::daemon;
use sbxd::logging::{LogControl, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "sbxd", version, about = "Strongbox vault server")]
struct Cli {
    /// Path to sbxd.toml configuration file
    #[arg(long, short = 'c', env = "SBX_CONFIG", default_value = "/etc/sbx/sbxd.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error) [default: from config]
    #[arg(long, env = "SBX_LOG")]
    log: Option<String>,

    /// Log format (json, text) [default: from config]
    #[arg(long, env = "SBX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// API listen address
    #[arg(long, env = "SBX_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Health/metrics listen address
    #[arg(long, env = "SBX_HEALTH_ADDR")]
    health_addr: Option<String>,

    /// Postgres URL (in-memory storage when unset)
    #[arg(long, env = "SBX_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// HMAC secret for session tokens
    #[arg(long, env = "SBX_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Base64 of the 32-byte master key
    #[arg(long, env = "SBX_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = SbxdConfig::load_optional(&cli.config)?;
    let config_missing = loaded.is_none();
    let mut config = loaded.unwrap_or_default();
    apply_overrides(&mut config, &cli);

    let level = cli.log.clone().unwrap_or_else(|| config.server.log_level.clone());
    let format = cli.log_format.unwrap_or_else(|| {
        LogFormat::from_str(&config.server.log_format, true).unwrap_or(LogFormat::Json)
    });
    let log = LogControl::init(&level, format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sbxd starting"
    );
    if config_missing {
        warn!(
            "config file not found: {}  (using defaults and overrides)",
            cli.config.display()
        );
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match daemon::shutdown_signal().await {
            Ok(()) => signal_token.cancel(),
            Err(e) => error!("signal handler failed: {e}"),
        }
    });

    daemon::run(config, log, shutdown).await
}

fn apply_overrides(config: &mut SbxdConfig, cli: &Cli) {
    if let Some(addr) = &cli.http_addr {
        config.server.http_addr = addr.clone();
    }
    if let Some(addr) = &cli.health_addr {
        config.server.health_addr = addr.clone();
    }
    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(secret) = &cli.token_secret {
        config.auth.token_secret = Some(SecretString::from(secret.clone()));
    }
    if let Some(key) = &cli.master_key {
        config.crypto.master_key = Some(SecretString::from(key.clone()));
    }
}
