//! Runtime settings
//!
//! Loaded from a JSON file (missing file means defaults) and then overridden
//! from the environment (`POOLMUX_*`, with `.env` support).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Directory for daily-rotated log files; console only when unset
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            log_dir: None,
            file_prefix: "poolmux".to_string(),
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tick of the drain polling loop
    pub drain_poll_interval_ms: u64,
    /// Cadence of the idle resizer, zero disables it
    pub resizer_interval_ms: u64,
    pub event_bus_capacity: usize,
    /// Pending drain jobs per identity before redeploy drains inline
    pub drain_queue_capacity: usize,
    /// Budget for proxy acquires that do not pass one; falls back to the pool's max wait
    pub default_acquire_timeout_ms: Option<u64>,
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drain_poll_interval_ms: 5_000,
            resizer_interval_ms: 60_000,
            event_bus_capacity: crate::event_bus::DEFAULT_CAPACITY,
            drain_queue_capacity: 4,
            default_acquire_timeout_ms: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms.max(1))
    }

    pub fn resizer_interval(&self) -> Option<Duration> {
        (self.resizer_interval_ms > 0).then(|| Duration::from_millis(self.resizer_interval_ms))
    }

    pub fn default_acquire_timeout(&self) -> Option<Duration> {
        self.default_acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Read settings from a JSON file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "[Config] No runtime config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse runtime config {}", path.display()))
    }

    /// Defaults plus `.env` and `POOLMUX_*` overrides.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var::<u64>(&lookup, "POOLMUX_DRAIN_POLL_INTERVAL_MS") {
            self.drain_poll_interval_ms = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "POOLMUX_RESIZER_INTERVAL_MS") {
            self.resizer_interval_ms = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "POOLMUX_EVENT_BUS_CAPACITY") {
            self.event_bus_capacity = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "POOLMUX_DRAIN_QUEUE_CAPACITY") {
            self.drain_queue_capacity = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "POOLMUX_DEFAULT_ACQUIRE_TIMEOUT_MS") {
            self.default_acquire_timeout_ms = Some(v);
        }
        if let Some(v) = lookup("POOLMUX_LOG_FILTER") {
            self.logging.default_filter = v;
        }
        if let Some(v) = lookup("POOLMUX_LOG_DIR") {
            self.logging.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_var::<bool>(&lookup, "POOLMUX_LOG_ANSI") {
            self.logging.ansi = v;
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "[Config] Ignoring unparsable override");
            None
        }
    }
}
