//! Pool configuration snapshot
//!
//! An immutable description of one desired pool shape. The coordinator never
//! mutates a snapshot; a redeploy always supplies a complete new one and the
//! diff against the current snapshot decides between an in-place update and a
//! full replacement of the physical pool.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::attribute::{AttributeSet, AttributeValue, PoolAttribute};
use super::identity::PoolIdentity;
use crate::error::{PoolError, PoolResult};

/// How a connection is checked before it is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMethod {
    #[default]
    AutoCommit,
    MetaData,
    Table,
    CustomValidation,
}

impl ValidationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoCommit => "auto-commit",
            Self::MetaData => "meta-data",
            Self::Table => "table",
            Self::CustomValidation => "custom-validation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto-commit" => Some(Self::AutoCommit),
            "meta-data" => Some(Self::MetaData),
            "table" => Some(Self::Table),
            "custom-validation" => Some(Self::CustomValidation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read-uncommitted",
            Self::ReadCommitted => "read-committed",
            Self::RepeatableRead => "repeatable-read",
            Self::Serializable => "serializable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read-uncommitted" => Some(Self::ReadUncommitted),
            "read-committed" => Some(Self::ReadCommitted),
            "repeatable-read" => Some(Self::RepeatableRead),
            "serializable" => Some(Self::Serializable),
            _ => None,
        }
    }
}

/// Statement handling carried by the connection wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPolicy {
    pub cache_size: u32,
    pub cache_type: Option<String>,
    /// `None` leaves the driver default in place
    pub timeout: Option<Duration>,
    pub leak_timeout: Option<Duration>,
    pub leak_reclaim: bool,
    pub wrapping: bool,
}

/// Drain-and-swap policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigPolicy {
    /// Zero disables transparent dynamic reconfiguration
    pub wait_timeout: Duration,
}

impl ReconfigPolicy {
    pub fn armed(wait_timeout: Duration) -> Self {
        Self { wait_timeout }
    }

    pub fn is_enabled(&self) -> bool {
        !self.wait_timeout.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfiguration {
    pub steady_pool_size: u32,
    pub max_pool_size: u32,
    pub resize_quantity: u32,
    pub max_wait: Duration,
    /// Zero keeps idle connections forever
    pub idle_timeout: Duration,

    pub validation_required: bool,
    pub validation_method: ValidationMethod,
    pub validation_table_name: Option<String>,
    pub validation_class_name: Option<String>,
    /// Zero validates on every lease
    pub validate_at_most_once_period: Duration,
    /// One failed validation destroys every free connection
    pub fail_all_connections: bool,

    pub match_connections: bool,
    pub associate_with_thread: bool,
    pub pooling_enabled: bool,
    pub lazy_enlistment: bool,
    pub lazy_association: bool,

    /// Zero means unlimited
    pub max_connection_usage: u32,
    /// Zero disables leak detection
    pub leak_timeout: Duration,
    pub leak_reclaim: bool,

    pub creation_retry_attempts: u32,
    pub creation_retry_interval: Duration,

    pub reconfig: ReconfigPolicy,
    pub statements: StatementPolicy,
    pub transaction_isolation: Option<IsolationLevel>,
    pub guarantee_isolation_level: bool,

    /// Connection-factory parameters (addresses, credentials, driver knobs)
    pub factory_properties: BTreeMap<String, String>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            steady_pool_size: 8,
            max_pool_size: 32,
            resize_quantity: 2,
            max_wait: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
            validation_required: false,
            validation_method: ValidationMethod::default(),
            validation_table_name: None,
            validation_class_name: None,
            validate_at_most_once_period: Duration::ZERO,
            fail_all_connections: false,
            match_connections: false,
            associate_with_thread: false,
            pooling_enabled: true,
            lazy_enlistment: false,
            lazy_association: false,
            max_connection_usage: 0,
            leak_timeout: Duration::ZERO,
            leak_reclaim: false,
            creation_retry_attempts: 0,
            creation_retry_interval: Duration::from_secs(10),
            reconfig: ReconfigPolicy::default(),
            statements: StatementPolicy::default(),
            transaction_isolation: None,
            guarantee_isolation_level: false,
            factory_properties: BTreeMap::new(),
        }
    }
}

impl PoolConfiguration {
    /// Default snapshot with the given steady and maximum sizes.
    pub fn sized(steady_pool_size: u32, max_pool_size: u32) -> Self {
        Self {
            steady_pool_size,
            max_pool_size,
            ..Self::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_dynamic_reconfig_timeout(mut self, wait_timeout: Duration) -> Self {
        self.reconfig = ReconfigPolicy::armed(wait_timeout);
        self
    }

    pub fn with_factory_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.factory_properties.insert(key.into(), value.into());
        self
    }

    pub fn dynamic_reconfig_enabled(&self) -> bool {
        self.reconfig.is_enabled()
    }

    /// Comparable value of a single attribute.
    pub fn value(&self, attribute: PoolAttribute) -> AttributeValue {
        use AttributeValue as V;
        match attribute {
            PoolAttribute::SteadyPoolSize => V::Count(self.steady_pool_size),
            PoolAttribute::MaxPoolSize => V::Count(self.max_pool_size),
            PoolAttribute::ResizeQuantity => V::Count(self.resize_quantity),
            PoolAttribute::MaxWait => V::Duration(self.max_wait),
            PoolAttribute::IdleTimeout => V::Duration(self.idle_timeout),
            PoolAttribute::ValidationRequired => V::Flag(self.validation_required),
            PoolAttribute::ValidationMethod => {
                V::Text(Some(self.validation_method.as_str().to_string()))
            }
            PoolAttribute::ValidationTableName => V::Text(self.validation_table_name.clone()),
            PoolAttribute::ValidationClassName => V::Text(self.validation_class_name.clone()),
            PoolAttribute::ValidateAtMostOncePeriod => {
                V::Duration(self.validate_at_most_once_period)
            }
            PoolAttribute::FailAllConnections => V::Flag(self.fail_all_connections),
            PoolAttribute::MatchConnections => V::Flag(self.match_connections),
            PoolAttribute::AssociateWithThread => V::Flag(self.associate_with_thread),
            PoolAttribute::PoolingEnabled => V::Flag(self.pooling_enabled),
            PoolAttribute::LazyEnlistment => V::Flag(self.lazy_enlistment),
            PoolAttribute::LazyAssociation => V::Flag(self.lazy_association),
            PoolAttribute::MaxConnectionUsage => V::Count(self.max_connection_usage),
            PoolAttribute::LeakTimeout => V::Duration(self.leak_timeout),
            PoolAttribute::LeakReclaim => V::Flag(self.leak_reclaim),
            PoolAttribute::CreationRetryAttempts => V::Count(self.creation_retry_attempts),
            PoolAttribute::CreationRetryInterval => V::Duration(self.creation_retry_interval),
            PoolAttribute::DynamicReconfigWaitTimeout => V::Duration(self.reconfig.wait_timeout),
            PoolAttribute::StatementCacheSize => V::Count(self.statements.cache_size),
            PoolAttribute::StatementCacheType => V::Text(self.statements.cache_type.clone()),
            PoolAttribute::StatementTimeout => {
                V::Text(self.statements.timeout.map(|t| format!("{}ms", t.as_millis())))
            }
            PoolAttribute::StatementLeakTimeout => {
                V::Text(self.statements.leak_timeout.map(|t| format!("{}ms", t.as_millis())))
            }
            PoolAttribute::StatementLeakReclaim => V::Flag(self.statements.leak_reclaim),
            PoolAttribute::StatementWrapping => V::Flag(self.statements.wrapping),
            PoolAttribute::TransactionIsolation => {
                V::Text(self.transaction_isolation.map(|l| l.as_str().to_string()))
            }
            PoolAttribute::GuaranteeIsolationLevel => V::Flag(self.guarantee_isolation_level),
            PoolAttribute::FactoryProperties => V::Properties(self.factory_properties.clone()),
        }
    }

    /// Compare attribute by attribute against `other`, classifying every
    /// difference as soft (listed in `soft`) or structural.
    pub fn diff(&self, other: &PoolConfiguration, soft: &AttributeSet) -> ConfigDiff {
        let mut diff = ConfigDiff::default();
        for attribute in PoolAttribute::ALL.iter().copied() {
            if self.value(attribute) == other.value(attribute) {
                continue;
            }
            if soft.contains(attribute) {
                diff.soft.push(attribute);
            } else {
                diff.structural.push(attribute);
            }
        }
        diff
    }

    /// Structural validation, run before any pool mutation.
    pub fn validate(&self, identity: &PoolIdentity) -> PoolResult<()> {
        if self.max_pool_size == 0 {
            return Err(PoolError::invalid(identity, "max pool size must be at least 1"));
        }
        if self.steady_pool_size > self.max_pool_size {
            return Err(PoolError::invalid(
                identity,
                format!(
                    "steady pool size {} exceeds max pool size {}",
                    self.steady_pool_size, self.max_pool_size
                ),
            ));
        }
        if self.resize_quantity == 0 {
            return Err(PoolError::invalid(identity, "resize quantity must be at least 1"));
        }
        if self.max_wait.is_zero() {
            return Err(PoolError::invalid(identity, "max wait must be greater than zero"));
        }
        if self.validation_required
            && self.validation_method == ValidationMethod::Table
            && self.validation_table_name.as_deref().map_or(true, str::is_empty)
        {
            return Err(PoolError::invalid(
                identity,
                "table validation requires a validation table name",
            ));
        }
        if self.validation_required
            && self.validation_method == ValidationMethod::CustomValidation
            && self.validation_class_name.as_deref().map_or(true, str::is_empty)
        {
            return Err(PoolError::invalid(
                identity,
                "custom validation requires a validation class name",
            ));
        }
        Ok(())
    }
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub structural: Vec<PoolAttribute>,
    pub soft: Vec<PoolAttribute>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.structural.is_empty() && self.soft.is_empty()
    }

    /// Whether the difference requires replacing the physical pool.
    pub fn is_structural(&self) -> bool {
        !self.structural.is_empty()
    }

    /// Every changed attribute, structural first.
    pub fn changed(&self) -> Vec<PoolAttribute> {
        self.structural.iter().chain(self.soft.iter()).copied().collect()
    }
}
