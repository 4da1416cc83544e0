//! Physical pools
//!
//! - **PhysicalPool**: one configuration generation of live connections
//! - **WaitQueue**: FIFO of parked callers, one for admission and one for reconfiguration
//! - **PooledConnection**: lease guard, returns the connection on drop
//! - **ConnectionFactory**: black-box create / validate / destroy seam
//! - **Resizer**: background idle reaping and leak detection

mod connection;
mod factory;
mod physical;
mod resizer;
mod tcp;
mod wait_queue;


pub use connection::PooledConnection;
pub use factory::{ConnectionFactory, FactoryProvider, ManagedConnection};
pub use physical::{PhysicalPool, PoolSnapshot, ResizeReport};
pub use tcp::{TcpConnection, TcpConnectionFactory, TcpFactoryProvider};
pub use wait_queue::WaitQueue;
