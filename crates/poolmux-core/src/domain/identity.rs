//! Pool identity
//!
//! Stable key for one logical pool across its whole reconfiguration history.
//! Absence of both scopes denotes a server-wide pool.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolIdentity {
    /// Logical pool name
    pub name: String,
    /// Owning application, if application-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    /// Owning module within the application, if module-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl PoolIdentity {
    /// Server-wide pool identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            application: None,
            module: None,
        }
    }

    pub fn scoped(
        name: impl Into<String>,
        application: Option<String>,
        module: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            application,
            module,
        }
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn is_server_wide(&self) -> bool {
        self.application.is_none() && self.module.is_none()
    }

    /// External name the naming layer binds the proxy under.
    pub fn binding_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.application, &self.module) {
            (None, None) => write!(f, "{}", self.name),
            (Some(app), None) => write!(f, "{}/{}", app, self.name),
            (None, Some(module)) => write!(f, "~/{}/{}", module, self.name),
            (Some(app), Some(module)) => write!(f, "{}/{}/{}", app, module, self.name),
        }
    }
}
