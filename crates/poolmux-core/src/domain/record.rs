//! External pool records
//!
//! The configuration source hands pools over as JSON records in the
//! administrative units operators are used to (seconds, milliseconds,
//! kebab-case keys). A record is translated into a [`PoolIdentity`] and a
//! complete [`PoolConfiguration`]; well-known entries of the free-form
//! `properties` map are lifted into typed attributes, the rest are passed to
//! the connection factory untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::configuration::{IsolationLevel, PoolConfiguration, ReconfigPolicy, ValidationMethod};
use super::identity::PoolIdentity;
use crate::error::{PoolError, PoolResult};

/// Pool property carrying the drain-and-swap wait timeout.
pub const DYNAMIC_RECONFIG_PROPERTY: &str = "dynamic-reconfiguration-wait-timeout-in-seconds";

/// Resource kind tag; deployers are selected by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    JdbcConnectionPool,
    ConnectorConnectionPool,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JdbcConnectionPool => "jdbc-connection-pool",
            Self::ConnectorConnectionPool => "connector-connection-pool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    pub steady_pool_size: u32,
    pub max_pool_size: u32,
    pub pool_resize_quantity: u32,
    pub max_wait_time_in_millis: u64,
    pub idle_timeout_in_seconds: u64,

    pub is_connection_validation_required: bool,
    pub connection_validation_method: ValidationMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_classname: Option<String>,
    pub validate_atmost_once_period_in_seconds: u64,
    pub fail_all_connections: bool,

    pub match_connections: bool,
    pub associate_with_thread: bool,
    pub pooling: bool,
    pub max_connection_usage_count: u32,
    pub connection_leak_timeout_in_seconds: u64,
    pub connection_leak_reclaim: bool,
    pub connection_creation_retry_attempts: u32,
    pub connection_creation_retry_interval_in_seconds: u64,

    pub properties: BTreeMap<String, String>,
}

impl Default for ResourceRecord {
    fn default() -> Self {
        let defaults = PoolConfiguration::default();
        Self {
            kind: ResourceKind::JdbcConnectionPool,
            name: String::new(),
            application: None,
            module: None,
            steady_pool_size: defaults.steady_pool_size,
            max_pool_size: defaults.max_pool_size,
            pool_resize_quantity: defaults.resize_quantity,
            max_wait_time_in_millis: defaults.max_wait.as_millis() as u64,
            idle_timeout_in_seconds: defaults.idle_timeout.as_secs(),
            is_connection_validation_required: defaults.validation_required,
            connection_validation_method: defaults.validation_method,
            validation_table_name: None,
            validation_classname: None,
            validate_atmost_once_period_in_seconds: defaults.validate_at_most_once_period.as_secs(),
            fail_all_connections: defaults.fail_all_connections,
            match_connections: defaults.match_connections,
            associate_with_thread: defaults.associate_with_thread,
            pooling: defaults.pooling_enabled,
            max_connection_usage_count: defaults.max_connection_usage,
            connection_leak_timeout_in_seconds: 0,
            connection_leak_reclaim: false,
            connection_creation_retry_attempts: defaults.creation_retry_attempts,
            connection_creation_retry_interval_in_seconds: defaults
                .creation_retry_interval
                .as_secs(),
            properties: BTreeMap::new(),
        }
    }
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn jdbc(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::JdbcConnectionPool, name)
    }

    pub fn connector(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::ConnectorConnectionPool, name)
    }

    pub fn sized(mut self, steady: u32, max: u32) -> Self {
        self.steady_pool_size = steady;
        self.max_pool_size = max;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn identity(&self) -> PoolIdentity {
        PoolIdentity::scoped(self.name.clone(), self.application.clone(), self.module.clone())
    }

    /// Build the complete configuration snapshot this record describes.
    pub fn to_configuration(&self) -> PoolResult<PoolConfiguration> {
        let identity = self.identity();
        if self.name.trim().is_empty() {
            return Err(PoolError::invalid(&identity, "pool name must not be empty"));
        }

        let mut config = PoolConfiguration {
            steady_pool_size: self.steady_pool_size,
            max_pool_size: self.max_pool_size,
            resize_quantity: self.pool_resize_quantity,
            max_wait: Duration::from_millis(self.max_wait_time_in_millis),
            idle_timeout: Duration::from_secs(self.idle_timeout_in_seconds),
            validation_required: self.is_connection_validation_required,
            validation_method: self.connection_validation_method,
            validation_table_name: self.validation_table_name.clone(),
            validation_class_name: self.validation_classname.clone(),
            validate_at_most_once_period: Duration::from_secs(
                self.validate_atmost_once_period_in_seconds,
            ),
            fail_all_connections: self.fail_all_connections,
            match_connections: self.match_connections,
            associate_with_thread: self.associate_with_thread,
            pooling_enabled: self.pooling,
            max_connection_usage: self.max_connection_usage_count,
            leak_timeout: Duration::from_secs(self.connection_leak_timeout_in_seconds),
            leak_reclaim: self.connection_leak_reclaim,
            creation_retry_attempts: self.connection_creation_retry_attempts,
            creation_retry_interval: Duration::from_secs(
                self.connection_creation_retry_interval_in_seconds,
            ),
            ..PoolConfiguration::default()
        };

        for (key, value) in &self.properties {
            lift_property(&identity, &mut config, key, value)?;
        }

        config.validate(&identity)?;
        Ok(config)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn lift_property(
    identity: &PoolIdentity,
    config: &mut PoolConfiguration,
    key: &str,
    value: &str,
) -> PoolResult<()> {
    match normalize_key(key).as_str() {
        "dynamicreconfigurationwaittimeoutinseconds" => match value.trim().parse::<u64>() {
            Ok(secs) => config.reconfig = ReconfigPolicy::armed(Duration::from_secs(secs)),
            Err(_) => warn!(
                pool = %identity,
                value,
                "[ResourceRecord] Invalid {}, dynamic reconfiguration stays disabled",
                DYNAMIC_RECONFIG_PROPERTY
            ),
        },
        "lazyconnectionenlistment" => config.lazy_enlistment = parse_flag(identity, key, value)?,
        "lazyconnectionassociation" => config.lazy_association = parse_flag(identity, key, value)?,
        "statementcachesize" => config.statements.cache_size = parse_count(identity, key, value)?,
        "statementcachetype" => config.statements.cache_type = Some(value.trim().to_string()),
        "statementtimeout" => config.statements.timeout = parse_optional_secs(identity, key, value)?,
        "statementleaktimeoutinseconds" => {
            config.statements.leak_timeout = parse_optional_secs(identity, key, value)?
        }
        "statementleakreclaim" => config.statements.leak_reclaim = parse_flag(identity, key, value)?,
        "statementwrapping" => config.statements.wrapping = parse_flag(identity, key, value)?,
        "transactionisolation" => {
            config.transaction_isolation = Some(IsolationLevel::parse(value).ok_or_else(|| {
                PoolError::invalid(identity, format!("unknown isolation level '{}'", value))
            })?)
        }
        "guaranteeisolationlevel" => {
            config.guarantee_isolation_level = parse_flag(identity, key, value)?
        }
        _ => {
            config
                .factory_properties
                .insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn parse_flag(identity: &PoolIdentity, key: &str, value: &str) -> PoolResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(PoolError::invalid(
            identity,
            format!("property {} expects a boolean, got '{}'", key, value),
        )),
    }
}

fn parse_count(identity: &PoolIdentity, key: &str, value: &str) -> PoolResult<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        PoolError::invalid(
            identity,
            format!("property {} expects a non-negative integer, got '{}'", key, value),
        )
    })
}

/// Seconds; zero or negative means unset.
fn parse_optional_secs(
    identity: &PoolIdentity,
    key: &str,
    value: &str,
) -> PoolResult<Option<Duration>> {
    let secs = value.trim().parse::<i64>().map_err(|_| {
        PoolError::invalid(
            identity,
            format!("property {} expects seconds, got '{}'", key, value),
        )
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs as u64)))
}

/// A file of pool records, as read by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolsFile {
    #[serde(default)]
    pub pools: Vec<ResourceRecord>,
}

impl PoolsFile {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse pool records")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pool records from {}", path.display()))?;
        Self::from_json(&content)
    }
}
