//! PoolHost - service container and administrative surface
//!
//! Wires the event bus, registry, naming layer, coordinator and deployers
//! together. Administrative callers (the daemon, tests, an embedding server)
//! go through this type rather than the coordinator directly.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use poolmux_core::{
    EventBus, EventReceiver, PoolError, PoolIdentity, PoolResult, PoolStatus, ResourceKind,
    ResourceRecord, RuntimeConfig, SharedEventBus,
};
use tracing::{info, warn, Instrument};

use crate::coordinator::{Coordinator, RedeployOutcome, UndeployReport};
use crate::deployer::{DeployerRegistry, PoolResourceDeployer, ResourceDeployer};
use crate::logging::admin_span;
use crate::naming::{InMemoryNaming, NamingService};
use crate::pool::FactoryProvider;
use crate::proxy::ResourceProxy;
use crate::registry::PoolRegistry;

/// What a reconcile pass did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub deployed: Vec<PoolIdentity>,
    pub redeployed: Vec<PoolIdentity>,
    pub unchanged: Vec<PoolIdentity>,
    pub undeployed: Vec<PoolIdentity>,
    pub failed: Vec<(PoolIdentity, PoolError)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PoolHost {
    config: RuntimeConfig,
    event_bus: SharedEventBus,
    naming: Arc<dyn NamingService>,
    coordinator: Arc<Coordinator>,
    deployers: DeployerRegistry,
    kinds: DashMap<PoolIdentity, ResourceKind>,
}

impl PoolHost {
    /// Host with an in-memory naming layer and the stock pool deployers.
    pub fn new(config: RuntimeConfig, factories: Arc<dyn FactoryProvider>) -> Self {
        Self::with_naming(config, factories, Arc::new(InMemoryNaming::new()))
    }

    pub fn with_naming(
        config: RuntimeConfig,
        factories: Arc<dyn FactoryProvider>,
        naming: Arc<dyn NamingService>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::with_capacity(config.event_bus_capacity));
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(PoolRegistry::new()),
            naming.clone(),
            event_bus.sender(),
            config.clone(),
        ));

        let mut deployers = DeployerRegistry::new();
        deployers.register(Arc::new(PoolResourceDeployer::jdbc(
            coordinator.clone(),
            factories.clone(),
        )));
        deployers.register(Arc::new(PoolResourceDeployer::connector(
            coordinator.clone(),
            factories,
        )));

        Self {
            config,
            event_bus,
            naming,
            coordinator,
            deployers,
            kinds: DashMap::new(),
        }
    }

    /// Replace the deployer for a resource kind, e.g. to override its soft set.
    pub fn register_deployer(&mut self, deployer: Arc<dyn ResourceDeployer>) {
        self.deployers.register(deployer);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn naming(&self) -> &Arc<dyn NamingService> {
        &self.naming
    }

    /// Resolve an external name to its proxy.
    pub fn lookup(&self, name: &str) -> Option<ResourceProxy> {
        self.naming.lookup(name)
    }

    // =========================================================================
    // Administrative operations
    // =========================================================================

    pub async fn deploy(&self, record: &ResourceRecord) -> PoolResult<ResourceProxy> {
        let identity = record.identity();
        let deployer = self.deployers.for_record(record)?;
        let proxy = deployer
            .deploy(record)
            .instrument(admin_span("deploy", &identity))
            .await?;
        self.kinds.insert(identity, record.kind);
        Ok(proxy)
    }

    pub async fn undeploy(&self, identity: &PoolIdentity) -> PoolResult<UndeployReport> {
        let kind = self
            .kinds
            .get(identity)
            .map(|kind| *kind)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        let report = self
            .deployers
            .for_kind(kind)?
            .undeploy(identity)
            .instrument(admin_span("undeploy", identity))
            .await?;
        self.kinds.remove(identity);
        Ok(report)
    }

    /// Redeploy a record. The kind of a deployed identity cannot change in
    /// place; reconcile handles that as undeploy plus deploy.
    pub async fn redeploy(&self, record: &ResourceRecord) -> PoolResult<RedeployOutcome> {
        let identity = record.identity();
        let deployed_kind = self
            .kinds
            .get(&identity)
            .map(|kind| *kind)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        if deployed_kind != record.kind {
            return Err(PoolError::invalid(
                &identity,
                format!("kind changed from {} to {}", deployed_kind, record.kind),
            ));
        }
        self.deployers
            .for_record(record)?
            .redeploy(record)
            .instrument(admin_span("redeploy", &identity))
            .await
    }

    pub fn status(&self, identity: &PoolIdentity) -> PoolResult<PoolStatus> {
        self.coordinator.status(identity)
    }

    pub fn statuses(&self) -> Vec<PoolStatus> {
        self.coordinator.statuses()
    }

    pub fn flush(&self, identity: &PoolIdentity) -> PoolResult<usize> {
        self.coordinator.flush(identity)
    }

    /// Make the deployed set match `records`: deploy new identities,
    /// redeploy existing ones and undeploy the ones no longer listed.
    /// Draining redeploys are not waited for.
    pub async fn reconcile(&self, records: &[ResourceRecord]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut wanted = HashSet::new();

        for record in records {
            let identity = record.identity();
            if !wanted.insert(identity.clone()) {
                warn!(pool = %identity, "[PoolHost] Duplicate pool record, later one wins");
            }

            let deployed_kind = self.kinds.get(&identity).map(|kind| *kind);
            let result = match deployed_kind {
                None => self.deploy(record).await.map(|_| &mut report.deployed),
                Some(kind) if kind != record.kind => {
                    match self.undeploy(&identity).await {
                        Ok(_) => self.deploy(record).await.map(|_| &mut report.deployed),
                        Err(e) => Err(e),
                    }
                }
                Some(_) => match self.redeploy(record).await {
                    Ok(RedeployOutcome::Unchanged) => Ok(&mut report.unchanged),
                    Ok(_) => Ok(&mut report.redeployed),
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(bucket) => bucket.push(identity),
                Err(e) => {
                    warn!(pool = %identity, error = %e, "[PoolHost] Reconcile failed for pool");
                    report.failed.push((identity, e));
                }
            }
        }

        let stale: Vec<PoolIdentity> = self
            .kinds
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|identity| !wanted.contains(identity))
            .collect();
        for identity in stale {
            match self.undeploy(&identity).await {
                Ok(_) => report.undeployed.push(identity),
                Err(e) => report.failed.push((identity, e)),
            }
        }

        info!(
            deployed = report.deployed.len(),
            redeployed = report.redeployed.len(),
            unchanged = report.unchanged.len(),
            undeployed = report.undeployed.len(),
            failed = report.failed.len(),
            "[PoolHost] Reconcile complete"
        );
        report
    }

    /// Undeploy everything.
    pub async fn shutdown(&self) -> usize {
        let undeployed = self.coordinator.shutdown().await;
        self.kinds.clear();
        undeployed
    }
}
