//! # PoolMux Runtime
//!
//! The pool lifecycle engine: physical pools with admission and
//! reconfiguration wait queues, the registry of current pool generations,
//! resource proxies that always resolve to the current generation, and the
//! coordinator that deploys, undeploys and hot-swaps pools.
//!
//! ## Modules
//!
//! - `pool` - Physical pools, wait queues, leases, the connection factory seam
//! - `registry` - Identity to current generation map with versions and proxy epochs
//! - `proxy` - Stable handles callers cache instead of pools
//! - `naming` - Binding of proxies under external names
//! - `coordinator` - Deploy / undeploy / redeploy state machine and drain workers
//! - `deployer` - Per resource-kind entry points
//! - `host` - Service container and administrative surface
//! - `logging` - Tracing bootstrap

pub mod coordinator;
pub mod deployer;
pub mod host;
pub mod logging;
pub mod naming;
pub mod pool;
pub mod proxy;
pub mod registry;

pub use coordinator::{Coordinator, DrainHandle, DrainReport, RedeployOutcome, UndeployReport};
pub use deployer::{DeployerRegistry, PoolResourceDeployer, ResourceDeployer};
pub use host::{PoolHost, ReconcileReport};
pub use naming::{InMemoryNaming, NamingService};
pub use pool::{
    ConnectionFactory, FactoryProvider, ManagedConnection, PhysicalPool, PoolSnapshot,
    PooledConnection, ResizeReport, TcpConnection, TcpConnectionFactory, TcpFactoryProvider,
};
pub use proxy::ResourceProxy;
pub use registry::{PoolRegistry, RegistryEntry};
