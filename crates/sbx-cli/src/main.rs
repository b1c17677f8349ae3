//! sbx: Strongbox command-line client
//!
//! Session:
//!   register / login    - authenticate, cache the user key and all records locally
//!   logout              - drop the session token and wipe the local cache
//!   status              - session state and local cache summary
//!
//! Records:
//!   record add|get|list|update|delete|sync
//!   get/list read the local cache unless --remote is given; every write goes
//!   to the server.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

use sbx_client::{ClientVault, RecordListing, SessionState};
use sbx_core::config::{expand_tilde, ClientConfig};
use sbx_core::types::{Credentials, RecordInput, RecordType, RecordUpdateInput};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sbx",
    version,
    about = "Strongbox secrets vault client",
    long_about = "sbx: keep credentials, notes, cards and binary secrets in an encrypted vault"
)]
struct Cli {
    /// Path to sbx.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBX_CLIENT_CONFIG",
        default_value = "~/.config/strongbox/sbx.toml"
    )]
    config: PathBuf,

    /// Server URL (overrides config)
    #[arg(long, env = "SBX_SERVER_URL")]
    server: Option<String>,

    /// Local data directory (overrides config)
    #[arg(long, env = "SBX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "SBX_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account and log in
    Register {
        #[arg(long, short = 'u')]
        username: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "SBX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log in, caching the user key and every record locally
    Login {
        #[arg(long, short = 'u')]
        username: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "SBX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Discard the session token and the local cache
    Logout,

    /// Record management
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Show session state and local cache summary
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum RecordAction {
    /// Store a new record on the server
    Add {
        /// login_password, text, binary or bank_card
        #[arg(long = "type", short = 't')]
        kind: RecordType,
        /// Cleartext label (not encrypted)
        #[arg(long, short = 'm', default_value = "")]
        metadata: String,
        /// Payload: JSON, or a plain string
        #[arg(long, short = 'd', conflicts_with = "file", required_unless_present = "file")]
        data: Option<String>,
        /// Read the payload from a file, stored as base64
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Show one record, decrypted
    Get {
        id: i64,
        /// Ask the server instead of the local cache
        #[arg(long)]
        remote: bool,
    },

    /// List records
    List {
        /// Ask the server (records stay sealed)
        #[arg(long)]
        remote: bool,
    },

    /// Change metadata and/or payload of a record
    Update {
        id: i64,
        #[arg(long, short = 'm')]
        metadata: Option<String>,
        #[arg(long, short = 'd', conflicts_with = "file")]
        data: Option<String>,
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Delete a record on the server
    Delete { id: i64 },

    /// Replace the local cache with the server's records
    Sync,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file + flags)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let config_path = expand_tilde(&cli.config);
    let mut config = load_config(&config_path)?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Register { username, password } => {
            cmd_register(&config, &username, password).await
        }
        Commands::Login { username, password } => cmd_login(&config, &username, password).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Status => cmd_status(&config),
        Commands::Record { action } => cmd_record(&config, action).await,
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ClientConfig> {
    if path.exists() {
        ClientConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
    } else {
        Ok(ClientConfig::default())
    }
}

fn open_vault(config: &ClientConfig) -> Result<ClientVault> {
    ClientVault::open(config)
        .with_context(|| format!("opening local vault in {}", config.data_dir().display()))
}

// ── Input helpers ─────────────────────────────────────────────────────────────

fn read_password(given: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(password) = given {
        return Ok(SecretString::from(password));
    }
    let password = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again =
            rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != password {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(password))
}

/// `--data` as JSON when it parses, otherwise as a JSON string. `--file` is
/// read and base64-encoded.
fn payload(data: Option<String>, file: Option<&Path>) -> Result<Option<serde_json::Value>> {
    if let Some(path) = file {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        return Ok(Some(serde_json::Value::String(STANDARD.encode(bytes))));
    }
    Ok(data.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    }))
}

// ── `sbx register` / `sbx login` / `sbx logout` ───────────────────────────────

async fn cmd_register(config: &ClientConfig, username: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password, true)?;
    let mut vault = open_vault(config)?;
    vault
        .register(Credentials::new(username, password))
        .await
        .context("register failed")?;
    println!("Registered and logged in as {username}");
    Ok(())
}

async fn cmd_login(config: &ClientConfig, username: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password, false)?;
    let mut vault = open_vault(config)?;
    vault
        .login(Credentials::new(username, password))
        .await
        .context("login failed")?;
    let status = vault.status()?;
    println!("Logged in as {username} ({} records cached)", status.cached_records);
    Ok(())
}

async fn cmd_logout(config: &ClientConfig) -> Result<()> {
    let mut vault = open_vault(config)?;
    vault.logout().await?;
    println!("Logged out; local cache cleared");
    Ok(())
}

// ── `sbx record ...` ──────────────────────────────────────────────────────────

async fn cmd_record(config: &ClientConfig, action: RecordAction) -> Result<()> {
    let mut vault = open_vault(config)?;

    match action {
        RecordAction::Add {
            kind,
            metadata,
            data,
            file,
        } => {
            let data = payload(data, file.as_deref())?.unwrap_or(serde_json::Value::Null);
            let id = vault
                .add(RecordInput {
                    kind,
                    metadata,
                    data,
                })
                .await?;
            println!("{id}");
        }
        RecordAction::Get { id, remote } => {
            let record = vault.get(id, remote).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("rendering record")?
            );
        }
        RecordAction::List { remote } => match vault.list(remote).await? {
            RecordListing::Decrypted(records) => {
                for record in records {
                    println!("{:>8}  {:<15} {}", record.id, record.kind.as_str(), record.metadata);
                }
            }
            RecordListing::Sealed(records) => {
                for record in records {
                    println!(
                        "{:>8}  {:<15} {:<30} {} bytes sealed, updated {}",
                        record.id,
                        record.kind.as_str(),
                        record.metadata,
                        record.data.len(),
                        record.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    );
                }
            }
        },
        RecordAction::Update {
            id,
            metadata,
            data,
            file,
        } => {
            let patch = RecordUpdateInput {
                metadata,
                data: payload(data, file.as_deref())?,
            };
            vault.update(id, patch).await?;
            println!("Updated record {id}");
        }
        RecordAction::Delete { id } => {
            vault.delete(id).await?;
            println!("Deleted record {id}");
        }
        RecordAction::Sync => {
            let count = vault.sync().await?;
            println!("Synced {count} records");
        }
    }
    Ok(())
}

// ── `sbx status` ──────────────────────────────────────────────────────────────

fn cmd_status(config: &ClientConfig) -> Result<()> {
    let vault = open_vault(config)?;
    let status = vault.status()?;

    println!("sbx v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  session:        {}",
        match status.state {
            SessionState::LoggedIn => "logged in",
            SessionState::LoggedOut => "logged out",
        }
    );
    println!("  server:         {}", status.server_url);
    println!("  data dir:       {}", status.data_dir.display());
    println!("  cached records: {}", status.cached_records);
    println!(
        "  user key:       {}",
        if status.user_key_cached { "cached" } else { "not cached" }
    );
    Ok(())
}

// ── `sbx config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &ClientConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_payload_json_or_string() {
        assert_eq!(
            payload(Some(r#"{"number":"4111"}"#.into()), None).unwrap(),
            Some(json!({"number": "4111"}))
        );
        assert_eq!(
            payload(Some("plain secret".into()), None).unwrap(),
            Some(json!("plain secret"))
        );
        assert_eq!(payload(None, None).unwrap(), None);
    }

    #[test]
    fn test_payload_from_file_is_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 1, 2, 255]).unwrap();
        assert_eq!(
            payload(None, Some(&path)).unwrap(),
            Some(json!(STANDARD.encode([0u8, 1, 2, 255])))
        );
    }

    #[test]
    fn test_parse_record_add() {
        let cli = Cli::try_parse_from([
            "sbx", "record", "add", "--type", "bank_card", "-m", "visa", "-d", "{}",
        ])
        .unwrap();
        match cli.command {
            Commands::Record {
                action: RecordAction::Add { kind, metadata, .. },
            } => {
                assert_eq!(kind, RecordType::BankCard);
                assert_eq!(metadata, "visa");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_add_requires_payload() {
        assert!(Cli::try_parse_from(["sbx", "record", "add", "--type", "text"]).is_err());
    }
}
