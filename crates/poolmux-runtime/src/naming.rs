//! Naming service
//!
//! Deployers publish each pool's [`ResourceProxy`] under the identity's
//! binding name. The in-memory implementation is what the daemon and tests
//! use; an embedding host can supply its own directory.

use anyhow::{bail, Result};
use dashmap::DashMap;
use tracing::debug;

use crate::proxy::ResourceProxy;

pub trait NamingService: Send + Sync {
    /// Bind a name that must not be bound yet.
    fn bind(&self, name: &str, proxy: ResourceProxy) -> Result<()>;

    /// Bind or replace.
    fn rebind(&self, name: &str, proxy: ResourceProxy) -> Result<()>;

    fn unbind(&self, name: &str) -> Result<()>;

    fn lookup(&self, name: &str) -> Option<ResourceProxy>;
}

#[derive(Default)]
pub struct InMemoryNaming {
    bindings: DashMap<String, ResourceProxy>,
}

impl InMemoryNaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.bindings.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }
}

impl NamingService for InMemoryNaming {
    fn bind(&self, name: &str, proxy: ResourceProxy) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.bindings.entry(name.to_string()) {
            Entry::Occupied(_) => bail!("name '{}' is already bound", name),
            Entry::Vacant(vacant) => {
                vacant.insert(proxy);
                debug!(name, "[Naming] Bound");
                Ok(())
            }
        }
    }

    fn rebind(&self, name: &str, proxy: ResourceProxy) -> Result<()> {
        self.bindings.insert(name.to_string(), proxy);
        debug!(name, "[Naming] Rebound");
        Ok(())
    }

    fn unbind(&self, name: &str) -> Result<()> {
        if self.bindings.remove(name).is_none() {
            bail!("name '{}' is not bound", name);
        }
        debug!(name, "[Naming] Unbound");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<ResourceProxy> {
        self.bindings.get(name).map(|proxy| proxy.clone())
    }
}
