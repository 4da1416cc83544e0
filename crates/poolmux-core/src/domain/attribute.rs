//! Named pool attributes
//!
//! Configuration snapshots are compared attribute by attribute. The soft set
//! lists the attributes allowed to change without replacing the physical pool.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolAttribute {
    SteadyPoolSize,
    MaxPoolSize,
    ResizeQuantity,
    MaxWait,
    IdleTimeout,
    ValidationRequired,
    ValidationMethod,
    ValidationTableName,
    ValidationClassName,
    ValidateAtMostOncePeriod,
    FailAllConnections,
    MatchConnections,
    AssociateWithThread,
    PoolingEnabled,
    LazyEnlistment,
    LazyAssociation,
    MaxConnectionUsage,
    LeakTimeout,
    LeakReclaim,
    CreationRetryAttempts,
    CreationRetryInterval,
    DynamicReconfigWaitTimeout,
    StatementCacheSize,
    StatementCacheType,
    StatementTimeout,
    StatementLeakTimeout,
    StatementLeakReclaim,
    StatementWrapping,
    TransactionIsolation,
    GuaranteeIsolationLevel,
    FactoryProperties,
}

impl PoolAttribute {
    pub const ALL: &'static [PoolAttribute] = &[
        Self::SteadyPoolSize,
        Self::MaxPoolSize,
        Self::ResizeQuantity,
        Self::MaxWait,
        Self::IdleTimeout,
        Self::ValidationRequired,
        Self::ValidationMethod,
        Self::ValidationTableName,
        Self::ValidationClassName,
        Self::ValidateAtMostOncePeriod,
        Self::FailAllConnections,
        Self::MatchConnections,
        Self::AssociateWithThread,
        Self::PoolingEnabled,
        Self::LazyEnlistment,
        Self::LazyAssociation,
        Self::MaxConnectionUsage,
        Self::LeakTimeout,
        Self::LeakReclaim,
        Self::CreationRetryAttempts,
        Self::CreationRetryInterval,
        Self::DynamicReconfigWaitTimeout,
        Self::StatementCacheSize,
        Self::StatementCacheType,
        Self::StatementTimeout,
        Self::StatementLeakTimeout,
        Self::StatementLeakReclaim,
        Self::StatementWrapping,
        Self::TransactionIsolation,
        Self::GuaranteeIsolationLevel,
        Self::FactoryProperties,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SteadyPoolSize => "steady_pool_size",
            Self::MaxPoolSize => "max_pool_size",
            Self::ResizeQuantity => "resize_quantity",
            Self::MaxWait => "max_wait",
            Self::IdleTimeout => "idle_timeout",
            Self::ValidationRequired => "validation_required",
            Self::ValidationMethod => "validation_method",
            Self::ValidationTableName => "validation_table_name",
            Self::ValidationClassName => "validation_class_name",
            Self::ValidateAtMostOncePeriod => "validate_at_most_once_period",
            Self::FailAllConnections => "fail_all_connections",
            Self::MatchConnections => "match_connections",
            Self::AssociateWithThread => "associate_with_thread",
            Self::PoolingEnabled => "pooling_enabled",
            Self::LazyEnlistment => "lazy_enlistment",
            Self::LazyAssociation => "lazy_association",
            Self::MaxConnectionUsage => "max_connection_usage",
            Self::LeakTimeout => "leak_timeout",
            Self::LeakReclaim => "leak_reclaim",
            Self::CreationRetryAttempts => "creation_retry_attempts",
            Self::CreationRetryInterval => "creation_retry_interval",
            Self::DynamicReconfigWaitTimeout => "dynamic_reconfig_wait_timeout",
            Self::StatementCacheSize => "statement_cache_size",
            Self::StatementCacheType => "statement_cache_type",
            Self::StatementTimeout => "statement_timeout",
            Self::StatementLeakTimeout => "statement_leak_timeout",
            Self::StatementLeakReclaim => "statement_leak_reclaim",
            Self::StatementWrapping => "statement_wrapping",
            Self::TransactionIsolation => "transaction_isolation",
            Self::GuaranteeIsolationLevel => "guarantee_isolation_level",
            Self::FactoryProperties => "factory_properties",
        }
    }
}

/// Attributes that may change without forcing structural replacement.
///
/// Validation and statement handling live in the connection wrapper, and the
/// isolation level is applied per lease, so none of them need new physical
/// connections.
pub const DEFAULT_SOFT_ATTRIBUTES: &[PoolAttribute] = &[
    PoolAttribute::TransactionIsolation,
    PoolAttribute::GuaranteeIsolationLevel,
    PoolAttribute::ValidationTableName,
    PoolAttribute::ValidationRequired,
    PoolAttribute::ValidationMethod,
    PoolAttribute::ValidationClassName,
    PoolAttribute::ValidateAtMostOncePeriod,
    PoolAttribute::FailAllConnections,
    PoolAttribute::StatementWrapping,
    PoolAttribute::StatementTimeout,
    PoolAttribute::StatementCacheSize,
    PoolAttribute::StatementCacheType,
    PoolAttribute::StatementLeakTimeout,
    PoolAttribute::StatementLeakReclaim,
];

/// Set of attributes excluded from the structural comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet(BTreeSet<PoolAttribute>);

impl AttributeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The default soft-attribute set.
    pub fn soft_defaults() -> Self {
        DEFAULT_SOFT_ATTRIBUTES.iter().copied().collect()
    }

    pub fn with(mut self, attribute: PoolAttribute) -> Self {
        self.0.insert(attribute);
        self
    }

    pub fn without(mut self, attribute: PoolAttribute) -> Self {
        self.0.remove(&attribute);
        self
    }

    pub fn contains(&self, attribute: PoolAttribute) -> bool {
        self.0.contains(&attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = PoolAttribute> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PoolAttribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = PoolAttribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Comparable value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Count(u32),
    Duration(Duration),
    Flag(bool),
    Text(Option<String>),
    Properties(BTreeMap<String, String>),
}
