//! Subscriber setup and the runtime log-level control
//!
//! The filter layer sits behind `tracing_subscriber::reload`; the handle is
//! carried in [`LogControl`] and handed to the HTTP layer explicitly.

use std::sync::{Arc, RwLock};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use sbx_core::{SbxError, SbxResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Reads and changes the active log level.
#[derive(Clone)]
pub struct LogControl {
    handle: Option<FilterHandle>,
    current: Arc<RwLock<String>>,
}

impl LogControl {
    /// Install the global subscriber and return its control handle.
    /// `RUST_LOG`, when set and valid, takes precedence over `level`.
    pub fn init(level: &str, format: LogFormat) -> anyhow::Result<Self> {
        let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        let (filter, applied) = initial_filter(level, from_env.as_deref());
        let (filter, handle) = reload::Layer::new(filter);

        match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init()?,
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init()?,
        }

        Ok(Self {
            handle: Some(handle),
            current: Arc::new(RwLock::new(applied)),
        })
    }

    /// A control that tracks the level without an installed subscriber.
    pub fn detached(level: &str) -> Self {
        Self {
            handle: None,
            current: Arc::new(RwLock::new(level.to_lowercase())),
        }
    }

    pub fn current(&self) -> String {
        self.current
            .read()
            .map(|level| level.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Switch to `level` (trace, debug, info, warn or error).
    pub fn set(&self, level: &str) -> SbxResult<String> {
        let level = level.trim().to_lowercase();
        if level.is_empty() {
            return Err(SbxError::Validation("level is required".into()));
        }
        if !LEVELS.contains(&level.as_str()) {
            return Err(SbxError::Validation(format!("unknown log level {level:?}")));
        }

        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(&level))
                .map_err(|e| SbxError::Other(anyhow::anyhow!("reloading log filter: {e}")))?;
        }

        match self.current.write() {
            Ok(mut current) => *current = level.clone(),
            Err(poisoned) => *poisoned.into_inner() = level.clone(),
        }
        Ok(level)
    }
}

/// The filter to start with, and the directive string it was built from.
fn initial_filter(level: &str, from_env: Option<&str>) -> (EnvFilter, String) {
    if let Some(directives) = from_env.map(str::trim).filter(|d| !d.is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return (filter, directives.to_string());
        }
    }
    let level = level.trim().to_lowercase();
    (EnvFilter::new(&level), level)
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("current", &self.current())
            .field("installed", &self.handle.is_some())
            .finish()
    }
}
