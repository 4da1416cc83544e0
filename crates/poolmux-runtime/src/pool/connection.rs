use std::any::Any;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use poolmux_core::PoolIdentity;
use tokio::time::Instant;
use uuid::Uuid;

use super::factory::ManagedConnection;
use super::physical::{IdleConnection, PhysicalPool};

/// Left in a lease once its connection has gone back to the pool.
#[derive(Debug)]
struct Detached;

impl ManagedConnection for Detached {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A leased connection. Dropping it returns the connection to its pool.
pub struct PooledConnection {
    pool: Arc<PhysicalPool>,
    id: u64,
    created_at: Instant,
    last_used: Instant,
    usage_count: u32,
    last_validated: Option<Instant>,
    connection: Box<dyn ManagedConnection>,
    settled: bool,
}

impl PooledConnection {
    pub(crate) fn new(pool: Arc<PhysicalPool>, idle: IdleConnection) -> Self {
        Self {
            pool,
            id: idle.id,
            created_at: idle.created_at,
            last_used: idle.last_used,
            usage_count: idle.usage_count,
            last_validated: idle.last_validated,
            connection: idle.connection,
            settled: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Generation the connection belongs to.
    pub fn pool_id(&self) -> Uuid {
        self.pool.id()
    }

    pub fn identity(&self) -> &PoolIdentity {
        self.pool.identity()
    }

    /// Completed leases before this one.
    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }

    /// When the connection last passed validation.
    pub fn last_validated(&self) -> Option<Instant> {
        self.last_validated
    }

    pub(crate) fn mark_validated(&mut self, at: Instant) {
        self.last_validated = Some(at);
    }

    pub fn connection(&self) -> &dyn ManagedConnection {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> &mut dyn ManagedConnection {
        self.connection.as_mut()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.connection().as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.connection_mut().as_any_mut().downcast_mut::<T>()
    }

    /// Return the connection to the pool.
    pub fn release(self) {}

    /// Return the connection as unusable; the pool destroys it.
    pub fn discard(mut self) {
        if let Some(idle) = self.take_idle() {
            self.pool.check_in(idle, true);
        }
    }

    /// Take the connection out without returning it.
    pub(crate) fn into_idle(mut self) -> Option<IdleConnection> {
        self.take_idle()
    }

    fn take_idle(&mut self) -> Option<IdleConnection> {
        if mem::replace(&mut self.settled, true) {
            return None;
        }
        Some(IdleConnection {
            id: self.id,
            connection: mem::replace(&mut self.connection, Box::new(Detached)),
            created_at: self.created_at,
            last_used: self.last_used,
            usage_count: self.usage_count,
            last_validated: self.last_validated,
        })
    }
}

impl Deref for PooledConnection {
    type Target = dyn ManagedConnection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection_mut()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", self.pool.identity())
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(idle) = self.take_idle() {
            self.pool.check_in(idle, false);
        }
    }
}
