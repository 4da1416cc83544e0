//! Connection factory seam
//!
//! The pool treats physical connections as opaque boxes. A
//! [`FactoryProvider`] turns the connection-relevant part of a configuration
//! into a [`ConnectionFactory`]; failing to do so aborts the deploy or
//! redeploy that asked for it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use poolmux_core::{PoolConfiguration, PoolIdentity, ValidationMethod};

/// A live physical connection owned by a pool.
pub trait ManagedConnection: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open one new physical connection.
    async fn create(&self) -> anyhow::Result<Box<dyn ManagedConnection>>;

    /// Check that a reused connection is still usable.
    async fn validate(&self, connection: &mut dyn ManagedConnection, method: ValidationMethod) -> bool;

    /// Release the physical resources of a connection.
    fn destroy(&self, connection: Box<dyn ManagedConnection>);

    /// Short description for logging
    fn description(&self) -> String;
}

pub trait FactoryProvider: Send + Sync {
    fn build(
        &self,
        identity: &PoolIdentity,
        config: &PoolConfiguration,
    ) -> anyhow::Result<Arc<dyn ConnectionFactory>>;
}
