//! Mock connection factories for testing
//!
//! Connections are plain counters; creation latency, creation failures and
//! validation results are scripted per test.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use poolmux_core::{PoolConfiguration, PoolIdentity, ValidationMethod};
use poolmux_runtime::{ConnectionFactory, FactoryProvider, ManagedConnection};

// ============================================================================
// MockConnection
// ============================================================================

#[derive(Debug)]
pub struct MockConnection {
    /// Serial number assigned by the factory, starting at 1
    pub serial: u64,
}

impl ManagedConnection for MockConnection {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// MockConnectionFactory
// ============================================================================

#[derive(Default)]
pub struct MockConnectionFactory {
    serial: AtomicU64,
    created: AtomicU32,
    destroyed: AtomicU32,
    fail_creates: AtomicU32,
    invalid: AtomicBool,
    create_delay_ms: AtomicU64,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> u32 {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Connections created and not yet destroyed.
    pub fn live(&self) -> u32 {
        self.created().saturating_sub(self.destroyed())
    }

    /// Fail the next `count` create calls.
    pub fn fail_creates(&self, count: u32) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }

    /// Make every create call take `delay` before it completes.
    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every validation fail (or pass again).
    pub fn set_invalid(&self, invalid: bool) {
        self.invalid.store(invalid, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn ManagedConnection>> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let scripted = self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            anyhow::bail!("mock connection refused");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockConnection { serial }))
    }

    async fn validate(&self, _: &mut dyn ManagedConnection, _: ValidationMethod) -> bool {
        !self.invalid.load(Ordering::SeqCst)
    }

    fn destroy(&self, _: Box<dyn ManagedConnection>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}

// ============================================================================
// MockFactoryProvider
// ============================================================================

/// Hands out a fresh factory per build and keeps every one it built.
#[derive(Default)]
pub struct MockFactoryProvider {
    builds: Mutex<Vec<(PoolIdentity, PoolConfiguration, Arc<MockConnectionFactory>)>>,
    fail_builds: AtomicBool,
}

impl MockFactoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_builds(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }

    pub fn build_count(&self) -> usize {
        self.builds.lock().len()
    }

    /// Factory of the most recent build for `identity`.
    pub fn latest(&self, identity: &PoolIdentity) -> Option<Arc<MockConnectionFactory>> {
        self.builds
            .lock()
            .iter()
            .rev()
            .find(|(built_for, _, _)| built_for == identity)
            .map(|(_, _, factory)| factory.clone())
    }

    /// Configuration of the most recent build for `identity`.
    pub fn latest_config(&self, identity: &PoolIdentity) -> Option<PoolConfiguration> {
        self.builds
            .lock()
            .iter()
            .rev()
            .find(|(built_for, _, _)| built_for == identity)
            .map(|(_, config, _)| config.clone())
    }
}

impl FactoryProvider for MockFactoryProvider {
    fn build(
        &self,
        identity: &PoolIdentity,
        config: &PoolConfiguration,
    ) -> anyhow::Result<Arc<dyn ConnectionFactory>> {
        if self.fail_builds.load(Ordering::SeqCst) {
            anyhow::bail!("mock driver unavailable for {}", identity);
        }
        let factory = Arc::new(MockConnectionFactory::new());
        self.builds
            .lock()
            .push((identity.clone(), config.clone(), factory.clone()));
        Ok(factory)
    }
}
