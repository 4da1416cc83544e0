//! TCP connection factory
//!
//! The stock factory used by the daemon: each pooled connection is one open
//! TCP stream to the address named in the pool's factory properties
//! (`address`, or `host` plus `port`; optional `connect-timeout-ms`).

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use poolmux_core::{PoolConfiguration, PoolIdentity, ValidationMethod};
use tokio::net::TcpStream;
use tracing::debug;

use super::factory::{ConnectionFactory, FactoryProvider, ManagedConnection};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

impl ManagedConnection for TcpConnection {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct TcpConnectionFactory {
    address: String,
    connect_timeout: Duration,
}

impl TcpConnectionFactory {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn ManagedConnection>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| anyhow!("connect to {} timed out after {:?}", self.address, self.connect_timeout))?
            .with_context(|| format!("connect to {}", self.address))?;
        let peer = stream.peer_addr().context("read peer address")?;
        stream.set_nodelay(true).context("set TCP_NODELAY")?;
        debug!(peer = %peer, "[TcpFactory] Connected");
        Ok(Box::new(TcpConnection { stream, peer }))
    }

    async fn validate(&self, connection: &mut dyn ManagedConnection, method: ValidationMethod) -> bool {
        let Some(tcp) = connection.as_any().downcast_ref::<TcpConnection>() else {
            return false;
        };
        // Table and custom validation need a protocol; a socket can only be probed.
        debug!(peer = %tcp.peer, method = method.as_str(), "[TcpFactory] Validating");
        tcp.stream.peer_addr().is_ok() && matches!(tcp.stream.take_error(), Ok(None))
    }

    fn destroy(&self, connection: Box<dyn ManagedConnection>) {
        if let Some(tcp) = connection.as_any().downcast_ref::<TcpConnection>() {
            debug!(peer = %tcp.peer, "[TcpFactory] Closing connection");
        }
        drop(connection);
    }

    fn description(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// Builds a [`TcpConnectionFactory`] from a pool's factory properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpFactoryProvider;

impl FactoryProvider for TcpFactoryProvider {
    fn build(
        &self,
        identity: &PoolIdentity,
        config: &PoolConfiguration,
    ) -> anyhow::Result<Arc<dyn ConnectionFactory>> {
        let props = &config.factory_properties;
        let address = match props.get("address") {
            Some(address) => address.clone(),
            None => {
                let host = props
                    .get("host")
                    .ok_or_else(|| anyhow!("pool {} has no 'address' or 'host' property", identity))?;
                let port = props
                    .get("port")
                    .ok_or_else(|| anyhow!("pool {} has no 'port' property", identity))?;
                let port: u16 = port
                    .parse()
                    .with_context(|| format!("pool {} has an invalid port '{}'", identity, port))?;
                format!("{}:{}", host, port)
            }
        };

        let connect_timeout = match props.get("connect-timeout-ms") {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .with_context(|| format!("invalid connect-timeout-ms '{}'", ms))?,
            ),
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        Ok(Arc::new(TcpConnectionFactory::new(address, connect_timeout)))
    }
}
