//! Pool error taxonomy
//!
//! Every failure a caller or an administrator can observe is one of these
//! variants. Factory and I/O causes are flattened to strings so the error
//! stays `Clone` and can travel inside events and drain reports.

use std::time::Duration;

use thiserror::Error;

use crate::domain::PoolIdentity;

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// No connection could be obtained within the caller's budget.
    #[error("no connection available in pool {identity} within {waited:?}")]
    PoolTimeout {
        identity: PoolIdentity,
        waited: Duration,
    },

    /// The connection factory exhausted its retry budget.
    #[error("connection creation failed for pool {identity} after {attempts} attempt(s): {reason}")]
    ConnectionCreationFailed {
        identity: PoolIdentity,
        attempts: u32,
        reason: String,
    },

    /// The caller raced an undeploy of the pool.
    #[error("pool {0} has been undeployed")]
    PoolUndeployed(PoolIdentity),

    /// The new configuration could not be materialized; the old pool stays current.
    #[error("redeploy of pool {identity} aborted: {reason}")]
    RedeployAborted {
        identity: PoolIdentity,
        reason: String,
    },

    /// A first deploy could not build its pool; nothing was published.
    #[error("deploy of pool {identity} failed: {reason}")]
    DeployFailed {
        identity: PoolIdentity,
        reason: String,
    },

    /// Structural validation failure in a supplied configuration.
    #[error("invalid configuration for pool {identity}: {reason}")]
    InvalidConfiguration {
        identity: PoolIdentity,
        reason: String,
    },

    #[error("pool {0} is not deployed")]
    NotDeployed(PoolIdentity),

    #[error("pool {0} is already deployed")]
    AlreadyDeployed(PoolIdentity),

    #[error("no deployer handles resource kind '{0}'")]
    UnsupportedResource(String),

    /// The proxy was issued before its identity was invalidated; look the name up again.
    #[error("resource proxy for pool {0} was invalidated, look it up again")]
    StaleProxy(PoolIdentity),

    /// The pool generation was replaced while the caller was parked.
    /// Resource proxies retry against the new generation.
    #[error("pool {0} was reconfigured, retry the lookup")]
    Reconfigured(PoolIdentity),
}

impl PoolError {
    pub fn identity(&self) -> Option<&PoolIdentity> {
        match self {
            Self::PoolTimeout { identity, .. }
            | Self::ConnectionCreationFailed { identity, .. }
            | Self::RedeployAborted { identity, .. }
            | Self::DeployFailed { identity, .. }
            | Self::InvalidConfiguration { identity, .. } => Some(identity),
            Self::PoolUndeployed(identity)
            | Self::NotDeployed(identity)
            | Self::AlreadyDeployed(identity)
            | Self::StaleProxy(identity)
            | Self::Reconfigured(identity) => Some(identity),
            Self::UnsupportedResource(_) => None,
        }
    }

    /// Whether a caller may reasonably retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout { .. } | Self::Reconfigured(_) | Self::StaleProxy(_)
        )
    }

    pub fn invalid(identity: &PoolIdentity, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            identity: identity.clone(),
            reason: reason.into(),
        }
    }

    pub fn aborted(identity: &PoolIdentity, reason: impl Into<String>) -> Self {
        Self::RedeployAborted {
            identity: identity.clone(),
            reason: reason.into(),
        }
    }
}
