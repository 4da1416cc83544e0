//! poolmuxd - connection pool daemon
//!
//! Reads pool records from a JSON file, deploys them, reconciles against the
//! file again on SIGHUP and undeploys everything on Ctrl-C.
//!
//! Paths:
//! - pools file: first argument, `POOLMUX_POOLS`, or `<config dir>/poolmux/pools.json`
//! - runtime config: `POOLMUX_CONFIG` or `<config dir>/poolmux/config.json`
//! - logs: `logging.log_dir`, or `<local data dir>/poolmux/logs`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use poolmux_core::{EventReceiver, PoolEvent, PoolsFile, RuntimeConfig};
use poolmux_runtime::logging::init_tracing;
use poolmux_runtime::{PoolHost, TcpFactoryProvider};
use tracing::{debug, error, info, warn};

const APP_DIR: &str = "poolmux";

struct Paths {
    pools: PathBuf,
    config: PathBuf,
    logs: PathBuf,
}

impl Paths {
    fn resolve(pools_arg: Option<String>) -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        let pools = pools_arg
            .or_else(|| std::env::var("POOLMUX_POOLS").ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir.join("pools.json"));
        let config = std::env::var("POOLMUX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("config.json"));

        Self {
            pools,
            config,
            logs: data_dir.join("logs"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let paths = Paths::resolve(std::env::args().nth(1));

    let mut config = RuntimeConfig::load(&paths.config)?;
    config.apply_env_overrides();
    if config.logging.log_dir.is_none() {
        config.logging.log_dir = Some(paths.logs.clone());
    }
    let _log_guard = init_tracing(&config.logging)?;

    info!(
        pools = %paths.pools.display(),
        config = %paths.config.display(),
        "[poolmuxd] Starting"
    );

    let host = Arc::new(PoolHost::new(config, Arc::new(TcpFactoryProvider)));
    tokio::spawn(audit_events(host.subscribe()));

    reload(&host, &paths.pools).await;

    let mut hangup = Hangup::new()?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "[poolmuxd] Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = hangup.recv() => {
                info!("[poolmuxd] SIGHUP received, reloading pools");
                reload(&host, &paths.pools).await;
            }
        }
    }

    info!("[poolmuxd] Shutting down");
    let undeployed = host.shutdown().await;
    info!(undeployed, "[poolmuxd] Stopped");
    Ok(())
}

async fn reload(host: &PoolHost, path: &Path) {
    let file = match PoolsFile::load(path) {
        Ok(file) => file,
        Err(e) => {
            error!(path = %path.display(), error = %format!("{:#}", e), "[poolmuxd] Cannot read pools file, keeping current pools");
            return;
        }
    };
    let report = host.reconcile(&file.pools).await;
    for (identity, err) in &report.failed {
        warn!(pool = %identity, error = %err, "[poolmuxd] Pool not applied");
    }
}

/// Write every pool event to the log as JSON.
async fn audit_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| event.type_name().to_string());
        match &event {
            PoolEvent::ConnectionLeakSuspected { .. }
            | PoolEvent::ConnectionCreationFailed { .. }
            | PoolEvent::RedeployAborted { .. } => {
                warn!(event = %json, "[Audit] {}", event.type_name())
            }
            _ => info!(event = %json, "[Audit] {}", event.type_name()),
        }
    }
    debug!("[Audit] Event stream closed");
}

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
