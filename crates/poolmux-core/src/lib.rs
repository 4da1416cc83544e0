//! # PoolMux Core Library
//!
//! Domain types for the pool lifecycle engine. Nothing in here owns a
//! connection or spawns a task; the runtime crate builds on these values.
//!
//! ## Modules
//!
//! - `domain` - Pool identities, configuration snapshots, records, events, status
//! - `error` - The `PoolError` taxonomy shared by every layer
//! - `event_bus` - Broadcast distribution of `PoolEvent`s
//! - `config` - Runtime settings (drain polling, resizer cadence, logging)

pub mod config;
pub mod domain;
pub mod error;
pub mod event_bus;

pub use config::{LoggingConfig, RuntimeConfig};
pub use domain::*;
pub use error::{PoolError, PoolResult};
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
