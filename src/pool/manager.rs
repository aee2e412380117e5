//! Compatibility facade over the registry
//!
//! Command handlers call [`ConnectionManager::get_connection`] and never have
//! to connect first: if nothing is registered and no host is named, the
//! process-wide default configuration is registered under its `host:port`.

use std::sync::Arc;
use tracing::info;

use super::client::SharedClient;
use super::registry::ConnectionRegistry;
use super::DecodeMode;
use crate::config::StoreConfig;
use crate::error::PoolResult;

/// Registry handle plus the configuration used for auto-provisioning
#[derive(Clone)]
pub struct ConnectionManager {
    registry: Arc<ConnectionRegistry>,
    defaults: StoreConfig,
}

impl ConnectionManager {
    pub fn new(registry: Arc<ConnectionRegistry>, defaults: StoreConfig) -> Self {
        Self { registry, defaults }
    }

    /// Manager over the process-wide registry with `REDIS_*` defaults
    pub fn from_env() -> Self {
        Self::new(super::get_registry(), StoreConfig::from_env())
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn defaults(&self) -> &StoreConfig {
        &self.defaults
    }

    /// Client for `host_id` or the default host, registering the default
    /// configuration first when the registry is empty and no host is named
    pub async fn get_connection(
        &self,
        host_id: Option<&str>,
        mode: DecodeMode,
    ) -> PoolResult<SharedClient> {
        if host_id.is_none() && self.registry.is_empty().await {
            let default_id = self.defaults.host_id();
            let added = self
                .registry
                .add_connection_if_empty(&default_id, self.defaults.clone(), mode)
                .await?;
            if added.is_some() {
                info!("Auto-provisioned default connection {}", default_id);
            }
        }

        self.registry.get_connection(host_id, mode).await
    }
}
