use std::sync::Arc;

use async_trait::async_trait;
use poolmux_core::{AttributeSet, PoolIdentity, PoolResult, ResourceKind, ResourceRecord};
use tracing::debug;

use super::ResourceDeployer;
use crate::coordinator::{Coordinator, RedeployOutcome, UndeployReport};
use crate::pool::FactoryProvider;
use crate::proxy::ResourceProxy;

/// Deployer for connection-pool records.
///
/// JDBC pools default to the stock soft-attribute set; connector pools treat
/// every change as structural unless configured otherwise.
pub struct PoolResourceDeployer {
    kind: ResourceKind,
    soft: AttributeSet,
    coordinator: Arc<Coordinator>,
    factories: Arc<dyn FactoryProvider>,
}

impl PoolResourceDeployer {
    pub fn new(
        kind: ResourceKind,
        soft: AttributeSet,
        coordinator: Arc<Coordinator>,
        factories: Arc<dyn FactoryProvider>,
    ) -> Self {
        Self {
            kind,
            soft,
            coordinator,
            factories,
        }
    }

    pub fn jdbc(coordinator: Arc<Coordinator>, factories: Arc<dyn FactoryProvider>) -> Self {
        Self::new(
            ResourceKind::JdbcConnectionPool,
            AttributeSet::soft_defaults(),
            coordinator,
            factories,
        )
    }

    pub fn connector(coordinator: Arc<Coordinator>, factories: Arc<dyn FactoryProvider>) -> Self {
        Self::new(
            ResourceKind::ConnectorConnectionPool,
            AttributeSet::empty(),
            coordinator,
            factories,
        )
    }

    pub fn with_soft_attributes(mut self, soft: AttributeSet) -> Self {
        self.soft = soft;
        self
    }
}

#[async_trait]
impl ResourceDeployer for PoolResourceDeployer {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn soft_attributes(&self) -> &AttributeSet {
        &self.soft
    }

    async fn deploy(&self, record: &ResourceRecord) -> PoolResult<ResourceProxy> {
        let config = record.to_configuration()?;
        debug!(pool = %record.identity(), kind = %self.kind, "[Deployer] Deploying");
        self.coordinator
            .deploy(record.identity(), config, self.factories.as_ref())
            .await
    }

    async fn undeploy(&self, identity: &PoolIdentity) -> PoolResult<UndeployReport> {
        debug!(pool = %identity, kind = %self.kind, "[Deployer] Undeploying");
        self.coordinator.undeploy(identity).await
    }

    async fn redeploy(&self, record: &ResourceRecord) -> PoolResult<RedeployOutcome> {
        let config = record.to_configuration()?;
        debug!(pool = %record.identity(), kind = %self.kind, "[Deployer] Redeploying");
        self.coordinator
            .redeploy(&record.identity(), config, &self.soft, self.factories.as_ref())
            .await
    }
}
