//! Pool events
//!
//! Every lifecycle transition of a pool identity is published as a
//! `PoolEvent` on the event bus. Events are facts; consumers (the daemon's
//! audit log, tests, admin tooling) decide which ones they care about.
//!
//! # Serialization
//!
//! Events serialize with a `type` field containing the snake_case variant name:
//! ```json
//! { "type": "pool_swapped", "identity": { "name": "orders" }, "version": 3, ... }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::PoolAttribute;
use super::identity::PoolIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    // ════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ════════════════════════════════════════════════════════════════════════

    /// A pool was materialized and published at version 0
    PoolDeployed {
        identity: PoolIdentity,
        version: u64,
        dynamic_reconfiguration: bool,
    },

    /// A pool was removed; parked callers were rejected
    PoolUndeployed {
        identity: PoolIdentity,
        rejected_waiters: usize,
    },

    // ════════════════════════════════════════════════════════════════════════
    // RECONFIGURATION
    // ════════════════════════════════════════════════════════════════════════

    /// Only soft attributes changed; the physical pool was kept
    PoolSoftReconfigured {
        identity: PoolIdentity,
        changed: Vec<PoolAttribute>,
    },

    /// The old generation stopped admitting callers and is draining
    DrainStarted {
        identity: PoolIdentity,
        drain_id: Uuid,
        timeout_ms: u64,
    },

    /// A new generation was published
    PoolSwapped {
        identity: PoolIdentity,
        version: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        drain_id: Option<Uuid>,
        drained_cleanly: bool,
    },

    /// The new configuration could not be materialized; the old pool stays current
    RedeployAborted {
        identity: PoolIdentity,
        reason: String,
    },

    /// Outstanding proxies were invalidated and the name rebound
    ProxiesInvalidated {
        identity: PoolIdentity,
        epoch: u64,
    },

    // ════════════════════════════════════════════════════════════════════════
    // CONNECTIONS
    // ════════════════════════════════════════════════════════════════════════

    /// A lease has been held longer than the leak timeout
    ConnectionLeakSuspected {
        identity: PoolIdentity,
        connection_id: u64,
        held_ms: u64,
    },

    /// The factory exhausted its retry budget for one acquire
    ConnectionCreationFailed {
        identity: PoolIdentity,
        attempts: u32,
        reason: String,
    },
}

impl PoolEvent {
    /// Get the event type name (for logging/debugging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PoolDeployed { .. } => "pool_deployed",
            Self::PoolUndeployed { .. } => "pool_undeployed",
            Self::PoolSoftReconfigured { .. } => "pool_soft_reconfigured",
            Self::DrainStarted { .. } => "drain_started",
            Self::PoolSwapped { .. } => "pool_swapped",
            Self::RedeployAborted { .. } => "redeploy_aborted",
            Self::ProxiesInvalidated { .. } => "proxies_invalidated",
            Self::ConnectionLeakSuspected { .. } => "connection_leak_suspected",
            Self::ConnectionCreationFailed { .. } => "connection_creation_failed",
        }
    }

    pub fn identity(&self) -> &PoolIdentity {
        match self {
            Self::PoolDeployed { identity, .. }
            | Self::PoolUndeployed { identity, .. }
            | Self::PoolSoftReconfigured { identity, .. }
            | Self::DrainStarted { identity, .. }
            | Self::PoolSwapped { identity, .. }
            | Self::RedeployAborted { identity, .. }
            | Self::ProxiesInvalidated { identity, .. }
            | Self::ConnectionLeakSuspected { identity, .. }
            | Self::ConnectionCreationFailed { identity, .. } => identity,
        }
    }

    /// Whether the event changed which physical pool backs the identity
    pub fn changes_generation(&self) -> bool {
        matches!(
            self,
            Self::PoolDeployed { .. } | Self::PoolUndeployed { .. } | Self::PoolSwapped { .. }
        )
    }
}
