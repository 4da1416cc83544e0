//! Deployers - per resource-kind entry points
//!
//! A deployer turns an external [`ResourceRecord`] into an identity plus a
//! complete configuration and drives the coordinator. It also owns the policy
//! of which attributes count as soft for its kind.

mod pool_deployer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use poolmux_core::{AttributeSet, PoolError, PoolIdentity, PoolResult, ResourceKind, ResourceRecord};

use crate::coordinator::{RedeployOutcome, UndeployReport};
use crate::proxy::ResourceProxy;

pub use pool_deployer::PoolResourceDeployer;

#[async_trait]
pub trait ResourceDeployer: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn handles(&self, record: &ResourceRecord) -> bool {
        record.kind == self.kind()
    }

    /// Attributes whose changes are applied to the live pool.
    fn soft_attributes(&self) -> &AttributeSet;

    async fn deploy(&self, record: &ResourceRecord) -> PoolResult<ResourceProxy>;

    async fn undeploy(&self, identity: &PoolIdentity) -> PoolResult<UndeployReport>;

    async fn redeploy(&self, record: &ResourceRecord) -> PoolResult<RedeployOutcome>;
}

/// Deployers by the resource kind they handle.
#[derive(Default, Clone)]
pub struct DeployerRegistry {
    deployers: HashMap<ResourceKind, Arc<dyn ResourceDeployer>>,
}

impl DeployerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deployer, replacing any previous one for the same kind.
    pub fn register(&mut self, deployer: Arc<dyn ResourceDeployer>) {
        self.deployers.insert(deployer.kind(), deployer);
    }

    pub fn for_kind(&self, kind: ResourceKind) -> PoolResult<Arc<dyn ResourceDeployer>> {
        self.deployers
            .get(&kind)
            .cloned()
            .ok_or_else(|| PoolError::UnsupportedResource(kind.to_string()))
    }

    pub fn for_record(&self, record: &ResourceRecord) -> PoolResult<Arc<dyn ResourceDeployer>> {
        let deployer = self.for_kind(record.kind)?;
        if !deployer.handles(record) {
            return Err(PoolError::UnsupportedResource(record.kind.to_string()));
        }
        Ok(deployer)
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.deployers.keys().copied().collect()
    }
}
