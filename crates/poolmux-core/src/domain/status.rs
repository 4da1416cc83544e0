//! Administrative status of a pool identity

use serde::{Deserialize, Serialize};

use super::identity::PoolIdentity;

/// Lifecycle state of one identity in the coordinator.
///
/// `Draining` is transient: it always returns to `Deployed` once the swap is
/// done, whether or not the drain completed cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Undeployed,
    Deployed,
    Draining,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undeployed => "undeployed",
            Self::Deployed => "deployed",
            Self::Draining => "draining",
        }
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed | Self::Draining)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub identity: PoolIdentity,
    pub state: LifecycleState,
    pub version: u64,
    pub size: u32,
    pub used: u32,
    pub free: u32,
    pub wait_queue_length: usize,
    pub reconfig_wait_queue_length: usize,
    pub dynamic_reconfiguration: bool,
    pub blocked: bool,
    pub steady_pool_size: u32,
    pub max_pool_size: u32,
}
