//! Resource proxy
//!
//! The handle application code caches instead of a pool. Every call resolves
//! the identity's current generation in the registry, so swaps are picked up
//! without the caller noticing. A caller parked on a generation that gets
//! retired is transparently retried against its successor within the same
//! time budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use poolmux_core::{PoolError, PoolIdentity, PoolResult};
use tokio::time::Instant;
use tracing::debug;

use crate::pool::{PhysicalPool, PooledConnection};
use crate::registry::PoolRegistry;

#[derive(Clone)]
pub struct ResourceProxy {
    identity: PoolIdentity,
    registry: Arc<PoolRegistry>,
    epoch: u64,
    default_timeout: Option<Duration>,
}

impl ResourceProxy {
    pub(crate) fn new(
        identity: PoolIdentity,
        registry: Arc<PoolRegistry>,
        epoch: u64,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            identity,
            registry,
            epoch,
            default_timeout,
        }
    }

    pub fn identity(&self) -> &PoolIdentity {
        &self.identity
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Version of the generation the proxy currently resolves to.
    pub fn version(&self) -> PoolResult<u64> {
        self.registry
            .version(&self.identity)
            .ok_or_else(|| PoolError::PoolUndeployed(self.identity.clone()))
    }

    /// Whether the identity was invalidated after this proxy was issued.
    pub fn is_stale(&self) -> bool {
        self.registry
            .epoch(&self.identity)
            .map_or(true, |epoch| epoch != self.epoch)
    }

    fn resolve(&self) -> PoolResult<Arc<PhysicalPool>> {
        let entry = self
            .registry
            .entry(&self.identity)
            .ok_or_else(|| PoolError::PoolUndeployed(self.identity.clone()))?;
        if entry.epoch != self.epoch {
            return Err(PoolError::StaleProxy(self.identity.clone()));
        }
        Ok(entry.pool)
    }

    /// Obtain a connection with the pool's own max-wait budget (or the
    /// runtime-wide default when one is configured).
    pub async fn get_connection(&self) -> PoolResult<PooledConnection> {
        let timeout = match self.default_timeout {
            Some(timeout) => timeout,
            None => self.resolve()?.config().max_wait,
        };
        self.acquire(timeout).await
    }

    /// Obtain a connection within `timeout`, following swaps.
    pub async fn acquire(&self, timeout: Duration) -> PoolResult<PooledConnection> {
        let deadline = Instant::now() + timeout;
        loop {
            let pool = self.resolve()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match pool.acquire(remaining).await {
                Err(PoolError::Reconfigured(_)) => {
                    debug!(
                        pool = %self.identity,
                        retired = %pool.id(),
                        "[ResourceProxy] Generation retired while waiting, retrying"
                    );
                    if Instant::now() >= deadline {
                        return Err(PoolError::PoolTimeout {
                            identity: self.identity.clone(),
                            waited: timeout,
                        });
                    }
                    tokio::task::yield_now().await;
                }
                other => return other,
            }
        }
    }
}

impl fmt::Debug for ResourceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceProxy")
            .field("identity", &self.identity)
            .field("epoch", &self.epoch)
            .finish()
    }
}
