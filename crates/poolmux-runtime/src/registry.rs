//! Pool registry
//!
//! Process-wide map from identity to the current pool generation. Readers
//! take a cheap `Arc` clone of the entry; only the coordinator writes, and it
//! serializes writers per identity, so a swap is a single map update that
//! readers observe either before or after.

use std::sync::Arc;

use dashmap::DashMap;
use poolmux_core::{PoolError, PoolIdentity, PoolResult};

use crate::pool::PhysicalPool;

/// Current generation of one identity.
#[derive(Clone)]
pub struct RegistryEntry {
    pub pool: Arc<PhysicalPool>,
    /// Bumped on every swap, starts at 0
    pub version: u64,
    /// Bumped on every proxy invalidation
    pub epoch: u64,
}

#[derive(Default)]
pub struct PoolRegistry {
    entries: DashMap<PoolIdentity, RegistryEntry>,
    dynamic: DashMap<PoolIdentity, ()>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the first generation of an identity at version 0.
    pub fn insert_new(&self, identity: PoolIdentity, pool: Arc<PhysicalPool>) -> PoolResult<()> {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(identity) {
            Entry::Occupied(occupied) => Err(PoolError::AlreadyDeployed(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(RegistryEntry {
                    pool,
                    version: 0,
                    epoch: 0,
                });
                Ok(())
            }
        }
    }

    /// Replace the current generation. Returns the new version and the
    /// generation it replaced.
    pub fn swap(
        &self,
        identity: &PoolIdentity,
        pool: Arc<PhysicalPool>,
    ) -> PoolResult<(u64, Arc<PhysicalPool>)> {
        let mut entry = self
            .entries
            .get_mut(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        entry.version += 1;
        let old = std::mem::replace(&mut entry.pool, pool);
        Ok((entry.version, old))
    }

    pub fn current(&self, identity: &PoolIdentity) -> Option<Arc<PhysicalPool>> {
        self.entries.get(identity).map(|entry| entry.pool.clone())
    }

    pub fn entry(&self, identity: &PoolIdentity) -> Option<RegistryEntry> {
        self.entries.get(identity).map(|entry| entry.clone())
    }

    pub fn version(&self, identity: &PoolIdentity) -> Option<u64> {
        self.entries.get(identity).map(|entry| entry.version)
    }

    pub fn epoch(&self, identity: &PoolIdentity) -> Option<u64> {
        self.entries.get(identity).map(|entry| entry.epoch)
    }

    /// Invalidate outstanding proxies. Returns the new epoch.
    pub fn invalidate(&self, identity: &PoolIdentity) -> PoolResult<u64> {
        let mut entry = self
            .entries
            .get_mut(identity)
            .ok_or_else(|| PoolError::NotDeployed(identity.clone()))?;
        entry.epoch += 1;
        Ok(entry.epoch)
    }

    pub fn remove(&self, identity: &PoolIdentity) -> Option<RegistryEntry> {
        self.dynamic.remove(identity);
        self.entries.remove(identity).map(|(_, entry)| entry)
    }

    /// Track whether the current configuration has dynamic reconfiguration enabled.
    pub fn set_dynamic(&self, identity: &PoolIdentity, enabled: bool) {
        if enabled {
            self.dynamic.insert(identity.clone(), ());
        } else {
            self.dynamic.remove(identity);
        }
    }

    pub fn is_dynamic(&self, identity: &PoolIdentity) -> bool {
        self.dynamic.contains_key(identity)
    }

    pub fn contains(&self, identity: &PoolIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn identities(&self) -> Vec<PoolIdentity> {
        let mut identities: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        identities.sort();
        identities
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
