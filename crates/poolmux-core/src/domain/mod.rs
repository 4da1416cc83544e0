//! Domain entities for PoolMux

mod attribute;
mod configuration;
mod event;
mod identity;
mod record;
mod status;

pub use attribute::{AttributeSet, AttributeValue, PoolAttribute, DEFAULT_SOFT_ATTRIBUTES};
pub use configuration::{
    ConfigDiff, IsolationLevel, PoolConfiguration, ReconfigPolicy, StatementPolicy,
    ValidationMethod,
};
pub use event::PoolEvent;
pub use identity::PoolIdentity;
pub use record::{PoolsFile, ResourceKind, ResourceRecord, DYNAMIC_RECONFIG_PROPERTY};
pub use status::{LifecycleState, PoolStatus};
