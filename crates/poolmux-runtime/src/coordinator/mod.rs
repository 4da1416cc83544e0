//! Reconfiguration coordinator
//!
//! Owns the lifecycle of every pool identity:
//!
//! ```text
//! Undeployed --deploy--> Deployed --redeploy--> Draining --swap--> Deployed
//!      ^                    |                                         |
//!      +------undeploy------+-----------------------------------------+
//! ```
//!
//! Every administrative operation on an identity runs under that identity's
//! own async mutex, so operations on one identity never interleave while
//! different identities proceed independently. A draining redeploy hands its
//! guard to the identity's drain worker, which releases it only after the
//! new generation is published.

mod drain;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use poolmux_core::{
    AttributeSet, EventSender, LifecycleState, PoolAttribute, PoolConfiguration, PoolError,
    PoolEvent, PoolIdentity, PoolResult, PoolStatus, RuntimeConfig,
};
use serde::Serialize;
use tokio::sync::{oneshot, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::naming::NamingService;
use crate::pool::{FactoryProvider, PhysicalPool};
use crate::proxy::ResourceProxy;
use crate::registry::PoolRegistry;

pub use drain::{DrainHandle, DrainReport};
use drain::{DrainContext, DrainJob, DrainWorker};

/// Result of a redeploy.
#[derive(Debug)]
pub enum RedeployOutcome {
    /// The new configuration equals the current one.
    Unchanged,
    /// Only soft attributes differed; the pool was updated in place.
    SoftUpdated { changed: Vec<PoolAttribute> },
    /// A new generation was published before returning.
    Recreated { version: u64 },
    /// The old generation is draining; the swap completes in the background.
    Draining(DrainHandle),
}

impl RedeployOutcome {
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Recreated { .. } | Self::Draining(_))
    }

    /// Version published by this redeploy, waiting for a drain to finish.
    pub async fn swapped_version(self) -> Option<u64> {
        match self {
            Self::Unchanged | Self::SoftUpdated { .. } => None,
            Self::Recreated { version } => Some(version),
            Self::Draining(handle) => handle.completed().await.map(|report| report.version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndeployReport {
    pub identity: PoolIdentity,
    /// Version of the generation that was torn down
    pub version: u64,
    pub rejected_waiters: usize,
}

/// Per-identity serialization point.
struct IdentitySlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    state: Arc<RwLock<LifecycleState>>,
    worker: Mutex<Option<DrainWorker>>,
}

impl Default for IdentitySlot {
    fn default() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            state: Arc::new(RwLock::new(LifecycleState::Undeployed)),
            worker: Mutex::new(None),
        }
    }
}

/// Publishes a new generation: registry swap, retire the old one, announce.
#[derive(Clone)]
pub(crate) struct Publisher {
    registry: Arc<PoolRegistry>,
    events: EventSender,
}

impl Publisher {
    pub(crate) fn install(
        &self,
        identity: &PoolIdentity,
        fresh: Arc<PhysicalPool>,
        drain_id: Option<Uuid>,
        drained_cleanly: bool,
    ) -> PoolResult<u64> {
        let dynamic = fresh.config().dynamic_reconfig_enabled();
        let (version, old) = self.registry.swap(identity, fresh)?;
        self.registry.set_dynamic(identity, dynamic);
        old.retire();

        info!(
            pool = %identity,
            version,
            drained_cleanly,
            "[Coordinator] New pool generation published"
        );
        self.events.emit(PoolEvent::PoolSwapped {
            identity: identity.clone(),
            version,
            drain_id,
            drained_cleanly,
        });
        Ok(version)
    }
}

pub struct Coordinator {
    registry: Arc<PoolRegistry>,
    naming: Arc<dyn NamingService>,
    events: EventSender,
    config: RuntimeConfig,
    slots: DashMap<PoolIdentity, Arc<IdentitySlot>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<PoolRegistry>,
        naming: Arc<dyn NamingService>,
        events: EventSender,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            naming,
            events,
            config,
            slots: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Lock the slot of `identity`. Only `deploy` creates slots; every other
    /// operation on an identity without one fails with `NotDeployed`.
    ///
    /// A slot removed by an undeploy while we waited for its lock is stale,
    /// so the lookup starts over.
    async fn lock_slot(
        &self,
        identity: &PoolIdentity,
        create: bool,
    ) -> PoolResult<(Arc<IdentitySlot>, OwnedMutexGuard<()>)> {
        loop {
            let slot = if create {
                self.slots
                    .entry(identity.clone())
                    .or_insert_with(|| Arc::new(IdentitySlot::default()))
                    .clone()
            } else {
                self.slots
                    .get(identity)
                    .map(|slot| slot.clone())
                    .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?
            };
            let guard = slot.lock.clone().lock_owned().await;
            let current = self
                .slots
                .get(identity)
                .is_some_and(|mapped| Arc::ptr_eq(mapped.value(), &slot));
            if current {
                return Ok((slot, guard));
            }
        }
    }

    /// Forget the slot of an identity that is no longer deployed.
    fn drop_slot(&self, identity: &PoolIdentity, slot: &Arc<IdentitySlot>) {
        self.slots
            .remove_if(identity, |_, mapped| Arc::ptr_eq(mapped, slot));
    }

    fn publisher(&self) -> Publisher {
        Publisher {
            registry: self.registry.clone(),
            events: self.events.clone(),
        }
    }

    fn proxy_for(&self, identity: &PoolIdentity, epoch: u64) -> ResourceProxy {
        ResourceProxy::new(
            identity.clone(),
            self.registry.clone(),
            epoch,
            self.config.default_acquire_timeout(),
        )
    }

    fn build_pool(
        &self,
        identity: &PoolIdentity,
        config: PoolConfiguration,
        factories: &dyn FactoryProvider,
    ) -> Result<Arc<PhysicalPool>, String> {
        let factory = factories
            .build(identity, &config)
            .map_err(|e| format!("{:#}", e))?;
        Ok(PhysicalPool::new(
            identity.clone(),
            config,
            factory,
            self.events.clone(),
            self.config.resizer_interval(),
        ))
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Materialize and publish the first generation of `identity` at version 0.
    pub async fn deploy(
        &self,
        identity: PoolIdentity,
        config: PoolConfiguration,
        factories: &dyn FactoryProvider,
    ) -> PoolResult<ResourceProxy> {
        config.validate(&identity)?;
        let (slot, _guard) = self.lock_slot(&identity, true).await?;

        if self.registry.contains(&identity) {
            return Err(PoolError::AlreadyDeployed(identity));
        }

        let dynamic = config.dynamic_reconfig_enabled();
        let pool = self
            .build_pool(&identity, config, factories)
            .map_err(|reason| {
                warn!(pool = %identity, reason = %reason, "[Coordinator] Deploy failed");
                self.drop_slot(&identity, &slot);
                PoolError::DeployFailed {
                    identity: identity.clone(),
                    reason,
                }
            })?;

        self.registry.insert_new(identity.clone(), pool.clone())?;
        self.registry.set_dynamic(&identity, dynamic);

        let proxy = self.proxy_for(&identity, 0);
        if let Err(e) = self.naming.bind(&identity.binding_name(), proxy.clone()) {
            self.registry.remove(&identity);
            pool.close();
            self.drop_slot(&identity, &slot);
            return Err(PoolError::DeployFailed {
                identity,
                reason: format!("binding failed: {:#}", e),
            });
        }

        *slot.state.write() = LifecycleState::Deployed;
        info!(
            pool = %identity,
            pool_id = %pool.id(),
            dynamic_reconfiguration = dynamic,
            "[Coordinator] Pool deployed"
        );
        self.events.emit(PoolEvent::PoolDeployed {
            identity,
            version: 0,
            dynamic_reconfiguration: dynamic,
        });
        Ok(proxy)
    }

    /// Remove `identity`: unbind it, release its connections and reject
    /// every parked caller with `PoolUndeployed`.
    pub async fn undeploy(&self, identity: &PoolIdentity) -> PoolResult<UndeployReport> {
        let (slot, _guard) = self.lock_slot(identity, false).await?;

        let entry = self
            .registry
            .remove(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        if let Err(e) = self.naming.unbind(&identity.binding_name()) {
            warn!(pool = %identity, error = %e, "[Coordinator] Unbind failed");
        }

        let rejected_waiters = entry.pool.close();
        *slot.state.write() = LifecycleState::Undeployed;
        slot.worker.lock().take();
        self.drop_slot(identity, &slot);

        info!(
            pool = %identity,
            version = entry.version,
            rejected_waiters,
            "[Coordinator] Pool undeployed"
        );
        self.events.emit(PoolEvent::PoolUndeployed {
            identity: identity.clone(),
            rejected_waiters,
        });
        Ok(UndeployReport {
            identity: identity.clone(),
            version: entry.version,
            rejected_waiters,
        })
    }

    /// Apply a complete new configuration to a deployed identity.
    ///
    /// Differences confined to `soft` are applied to the live pool. Anything
    /// else builds a new generation first (a build failure aborts and leaves
    /// the current one in place), then swaps it in according to the
    /// reconfiguration timeout of the new configuration:
    ///
    /// - timeout > 0: block the old pool and let the drain worker wait for it
    ///   to go quiet, at most the timeout, before swapping
    /// - timeout 0, previously armed: invalidate outstanding proxies, swap now
    /// - otherwise: swap now
    pub async fn redeploy(
        &self,
        identity: &PoolIdentity,
        config: PoolConfiguration,
        soft: &AttributeSet,
        factories: &dyn FactoryProvider,
    ) -> PoolResult<RedeployOutcome> {
        config.validate(identity)?;
        let (slot, guard) = self.lock_slot(identity, false).await?;

        let old = self
            .registry
            .current(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        let current = old.config();
        let diff = current.diff(&config, soft);

        if diff.is_empty() {
            debug!(pool = %identity, "[Coordinator] Redeploy without changes");
            return Ok(RedeployOutcome::Unchanged);
        }

        if !diff.is_structural() {
            let dynamic = config.dynamic_reconfig_enabled();
            old.reconfigure_in_place(config);
            self.registry.set_dynamic(identity, dynamic);
            info!(
                pool = %identity,
                changed = ?diff.soft,
                "[Coordinator] Soft attributes updated in place"
            );
            self.events.emit(PoolEvent::PoolSoftReconfigured {
                identity: identity.clone(),
                changed: diff.soft.clone(),
            });
            return Ok(RedeployOutcome::SoftUpdated { changed: diff.soft });
        }

        info!(
            pool = %identity,
            structural = ?diff.structural,
            "[Coordinator] Structural change, recreating pool"
        );
        let wait_timeout = config.reconfig.wait_timeout;
        let fresh = match self.build_pool(identity, config, factories) {
            Ok(pool) => pool,
            Err(reason) => {
                warn!(
                    pool = %identity,
                    reason = %reason,
                    "[Coordinator] Redeploy aborted, keeping current pool"
                );
                self.events.emit(PoolEvent::RedeployAborted {
                    identity: identity.clone(),
                    reason: reason.clone(),
                });
                return Err(PoolError::aborted(identity, reason));
            }
        };

        if !wait_timeout.is_zero() {
            old.block_requests(wait_timeout);
            if old.is_quiescent() {
                let version = self.publisher().install(identity, fresh, None, true)?;
                return Ok(RedeployOutcome::Recreated { version });
            }

            let drain_id = Uuid::new_v4();
            *slot.state.write() = LifecycleState::Draining;
            info!(
                pool = %identity,
                drain_id = %drain_id,
                timeout_ms = wait_timeout.as_millis() as u64,
                "[Coordinator] Draining old pool"
            );
            self.events.emit(PoolEvent::DrainStarted {
                identity: identity.clone(),
                drain_id,
                timeout_ms: wait_timeout.as_millis() as u64,
            });

            let (reply, rx) = oneshot::channel();
            let job = DrainJob {
                drain_id,
                identity: identity.clone(),
                old,
                fresh,
                timeout: wait_timeout,
                guard,
                reply,
            };
            let context = self.drain_context(&slot);
            let rejected = {
                let mut worker = slot.worker.lock();
                let worker = worker.get_or_insert_with(|| {
                    DrainWorker::spawn(
                        identity.clone(),
                        self.config.drain_queue_capacity,
                        context.clone(),
                    )
                });
                worker.dispatch(job).err()
            };

            return match rejected {
                None => Ok(RedeployOutcome::Draining(DrainHandle::new(drain_id, rx))),
                Some(job) => {
                    warn!(
                        pool = %identity,
                        "[Coordinator] Drain worker unavailable, draining inline"
                    );
                    let report = drain::run_drain(job, &context).await;
                    Ok(RedeployOutcome::Recreated {
                        version: report.version,
                    })
                }
            };
        }

        if current.dynamic_reconfig_enabled() {
            info!(
                pool = %identity,
                "[Coordinator] Dynamic reconfiguration switched off, invalidating proxies"
            );
            self.invalidate_locked(identity)?;
        }

        let version = self.publisher().install(identity, fresh, None, true)?;
        drop(guard);
        Ok(RedeployOutcome::Recreated { version })
    }

    fn drain_context(&self, slot: &IdentitySlot) -> DrainContext {
        DrainContext {
            publisher: self.publisher(),
            tick: self.config.drain_poll_interval(),
            state: slot.state.clone(),
        }
    }

    /// Invalidate every outstanding proxy of `identity` and rebind a fresh one.
    /// Returns the new proxy epoch.
    pub async fn invalidate(&self, identity: &PoolIdentity) -> PoolResult<u64> {
        let (_slot, _guard) = self.lock_slot(identity, false).await?;
        self.invalidate_locked(identity)
    }

    fn invalidate_locked(&self, identity: &PoolIdentity) -> PoolResult<u64> {
        let epoch = self.registry.invalidate(identity)?;
        if let Err(e) = self
            .naming
            .rebind(&identity.binding_name(), self.proxy_for(identity, epoch))
        {
            warn!(pool = %identity, error = %e, "[Coordinator] Rebind failed");
        }
        info!(pool = %identity, epoch, "[Coordinator] Proxies invalidated");
        self.events.emit(PoolEvent::ProxiesInvalidated {
            identity: identity.clone(),
            epoch,
        });
        Ok(epoch)
    }

    /// Undeploy every identity. Returns how many were torn down.
    pub async fn shutdown(&self) -> usize {
        // Identities undeploy concurrently.
        let tasks: Vec<_> = self
            .registry
            .identities()
            .into_iter()
            .map(|identity| async move {
                match self.undeploy(&identity).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(pool = %identity, error = %e, "[Coordinator] Shutdown undeploy failed");
                        false
                    }
                }
            })
            .collect();

        let undeployed = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|done| *done)
            .count();
        info!(undeployed, "[Coordinator] Shutdown complete");
        undeployed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// A proxy for the current epoch of a deployed identity.
    pub fn proxy(&self, identity: &PoolIdentity) -> PoolResult<ResourceProxy> {
        let epoch = self
            .registry
            .epoch(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        Ok(self.proxy_for(identity, epoch))
    }

    pub fn state(&self, identity: &PoolIdentity) -> LifecycleState {
        self.slots
            .get(identity)
            .map(|slot| *slot.state.read())
            .unwrap_or_default()
    }

    pub fn status(&self, identity: &PoolIdentity) -> PoolResult<PoolStatus> {
        let entry = self
            .registry
            .entry(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        let snapshot = entry.pool.snapshot();
        Ok(PoolStatus {
            identity: identity.clone(),
            state: self.state(identity),
            version: entry.version,
            size: snapshot.size,
            used: snapshot.used,
            free: snapshot.free,
            wait_queue_length: snapshot.wait_queue_length,
            reconfig_wait_queue_length: snapshot.reconfig_wait_queue_length,
            dynamic_reconfiguration: self.registry.is_dynamic(identity),
            blocked: snapshot.blocked,
            steady_pool_size: snapshot.steady_pool_size,
            max_pool_size: snapshot.max_pool_size,
        })
    }

    pub fn statuses(&self) -> Vec<PoolStatus> {
        self.registry
            .identities()
            .iter()
            .filter_map(|identity| self.status(identity).ok())
            .collect()
    }

    /// Destroy the free connections of the current generation.
    pub fn flush(&self, identity: &PoolIdentity) -> PoolResult<usize> {
        self.registry
            .current(identity)
            .map(|pool| pool.flush())
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))
    }
}
