//! Client construction and liveness probing
//!
//! A [`Connector`] turns a stored configuration into a live, probed client.
//! A client that cannot answer PING is never returned, so the registry never
//! caches an unreachable handle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::client::{CertificateBundle, SharedClient, StoreClient, StoreConnection};
use super::params::ConnectionParams;
use super::DecodeMode;
use crate::config::StoreConfig;
use crate::error::{ConnectError, ConnectFailure};

/// Builds probed clients for the registry
#[async_trait]
pub trait Connector: Send + Sync {
    /// Construct and probe a client for `host_id` with the given decode mode
    async fn connect(
        &self,
        host_id: &str,
        config: &StoreConfig,
        mode: DecodeMode,
    ) -> Result<SharedClient, ConnectError>;
}

/// Connector backed by the `redis` driver
#[derive(Debug, Clone)]
pub struct RedisConnector {
    /// Deadline covering connect, handshake and the PING probe
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn open_and_probe(
        &self,
        host_id: &str,
        params: ConnectionParams,
    ) -> Result<StoreClient, ConnectError> {
        let mode = params.decode_mode();

        let certs = if params.ssl {
            CertificateBundle::load(&params.tls).await.map_err(|e| {
                ConnectError::new(
                    ConnectFailure::Unclassified,
                    host_id,
                    mode,
                    format!("Failed to read TLS certificate: {}", e),
                )
            })?
        } else {
            None
        };

        let client = StoreClient::open(params, certs)
            .await
            .map_err(|e| ConnectError::from_redis(host_id, mode, &e))?;

        client
            .ping()
            .await
            .map_err(|e| ConnectError::from_redis(host_id, mode, &e))?;

        Ok(client)
    }
}

impl Default for RedisConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(
        &self,
        host_id: &str,
        config: &StoreConfig,
        mode: DecodeMode,
    ) -> Result<SharedClient, ConnectError> {
        let params = ConnectionParams::build(config, mode);
        let kind = if params.cluster_mode { "cluster" } else { "standalone" };
        debug!("Connecting to {} ({}, {} mode)", host_id, kind, mode);

        match timeout(self.connect_timeout, self.open_and_probe(host_id, params)).await {
            Ok(Ok(client)) => {
                debug!("Connected to {} ({} mode)", host_id, mode);
                Ok(Arc::new(client))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectError::new(
                ConnectFailure::Timeout,
                host_id,
                mode,
                format!("no response within {:?}", self.connect_timeout),
            )),
        }
    }
}
