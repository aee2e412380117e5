//! Registry of named Redis connections
//!
//! ## Locking
//! `state` is a read/write lock over the host map and the default host id;
//! it is only held for in-memory work, never across a network call.
//! `mutation` serializes every operation that changes the registry (add,
//! remove, default switch, lazy variant creation) including the connect and
//! probe it performs, so two callers can never race to build the same
//! variant. Readers (`list_connections`, `get_connection_details`, cached
//! `get_connection`) only take a snapshot under the read lock.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::client::{SharedClient, StoreConnection};
use super::factory::Connector;
use super::DecodeMode;
use crate::config::StoreConfig;
use crate::error::{PoolError, PoolResult};

/// Per-host state: the registered configuration and its live clients
struct ConnectionEntry {
    config: StoreConfig,
    clients: HashMap<DecodeMode, SharedClient>,
}

impl ConnectionEntry {
    fn modes(&self) -> Vec<DecodeMode> {
        let mut modes: Vec<DecodeMode> = self.clients.keys().copied().collect();
        modes.sort();
        modes
    }
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<String, ConnectionEntry>,
    default_host: Option<String>,
}

impl RegistryState {
    fn hosts(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn resolve(&self, host_id: Option<&str>) -> PoolResult<String> {
        let host_id = match host_id {
            Some(id) => id.to_string(),
            None => self
                .default_host
                .clone()
                .ok_or(PoolError::NoConnectionsAvailable)?,
        };

        if !self.entries.contains_key(&host_id) {
            return Err(PoolError::host_not_found(host_id, self.hosts()));
        }
        Ok(host_id)
    }
}

/// Snapshot of one registered host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    /// `connected` or `error: <detail>`
    pub status: String,
    pub redis_version: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: Option<i64>,
    pub cluster_mode: bool,
    pub ssl: bool,
    pub is_default: bool,
    pub decode_modes: Vec<DecodeMode>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.status == "connected"
    }
}

/// Result of a details lookup. Missing hosts are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ConnectionDetails {
    Found {
        host_id: String,
        #[serde(flatten)]
        status: ConnectionStatus,
    },
    NotFound {
        host_id: String,
        available: Vec<String>,
    },
    NoConnections,
}

impl ConnectionDetails {
    pub fn status(&self) -> Option<&ConnectionStatus> {
        match self {
            ConnectionDetails::Found { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Result of `remove_connection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(String),
    NotFound(String),
}

impl fmt::Display for RemoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveOutcome::Removed(host_id) => {
                write!(f, "Connection to '{}' removed successfully", host_id)
            }
            RemoveOutcome::NotFound(host_id) => write!(f, "No connection found for host '{}'", host_id),
        }
    }
}

/// Everything needed to report on one host without holding the lock
struct EntrySnapshot {
    host_id: String,
    config: StoreConfig,
    probe: Option<SharedClient>,
    is_default: bool,
    modes: Vec<DecodeMode>,
}

/// Registry of named connections, each with up to one client per decode mode
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    state: RwLock<RegistryState>,
    mutation: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: RwLock::new(RegistryState::default()),
            mutation: Mutex::new(()),
        }
    }

    /// Connect to `host_id` and register the client.
    ///
    /// The configuration replaces any stored one. A client already cached
    /// for the same decode mode is closed once the new one is in place;
    /// clients of the other mode are kept. The first host added becomes the
    /// default.
    pub async fn add_connection(
        &self,
        host_id: &str,
        config: StoreConfig,
        mode: DecodeMode,
    ) -> PoolResult<String> {
        let _guard = self.mutation.lock().await;
        self.add_locked(host_id, config, mode).await
    }

    /// Register `host_id` only when the registry is still empty.
    ///
    /// Returns `Ok(None)` if another host got there first.
    pub async fn add_connection_if_empty(
        &self,
        host_id: &str,
        config: StoreConfig,
        mode: DecodeMode,
    ) -> PoolResult<Option<String>> {
        let _guard = self.mutation.lock().await;
        if !self.state.read().await.entries.is_empty() {
            return Ok(None);
        }
        self.add_locked(host_id, config, mode).await.map(Some)
    }

    async fn add_locked(
        &self,
        host_id: &str,
        config: StoreConfig,
        mode: DecodeMode,
    ) -> PoolResult<String> {
        let client = self.connector.connect(host_id, &config, mode).await?;

        let (superseded, became_default) = {
            let mut state = self.state.write().await;
            let superseded = match state.entries.get_mut(host_id) {
                Some(entry) => {
                    entry.config = config;
                    entry.clients.insert(mode, client)
                }
                None => {
                    let mut clients = HashMap::new();
                    clients.insert(mode, client);
                    state
                        .entries
                        .insert(host_id.to_string(), ConnectionEntry { config, clients });
                    None
                }
            };

            let became_default = state.default_host.is_none();
            if became_default {
                state.default_host = Some(host_id.to_string());
            }
            (superseded, became_default)
        };

        if let Some(old) = superseded {
            // Failure here is non-fatal; the replacement is already registered
            if let Err(e) = old.close().await {
                warn!("Failed to close replaced {} client for {}: {}", mode, host_id, e);
            }
        }

        info!("Registered {} ({} mode)", host_id, mode);
        if became_default {
            info!("Default connection set to {}", host_id);
        }

        Ok(format!("Successfully connected to Redis at {} ({} mode)", host_id, mode))
    }

    /// Client for `host_id` (or the default host) in the requested mode.
    ///
    /// A missing mode for a known host is built on first use from the stored
    /// configuration; a failed build leaves the entry as it was.
    pub async fn get_connection(
        &self,
        host_id: Option<&str>,
        mode: DecodeMode,
    ) -> PoolResult<SharedClient> {
        {
            let state = self.state.read().await;
            let resolved = state.resolve(host_id)?;
            if let Some(client) = state.entries.get(&resolved).and_then(|e| e.clients.get(&mode)) {
                return Ok(Arc::clone(client));
            }
        }

        let _guard = self.mutation.lock().await;

        // The lock may have been waited on while another caller built it or removed the host
        let (resolved, config) = {
            let state = self.state.read().await;
            let resolved = state.resolve(host_id)?;
            let entry = match state.entries.get(&resolved) {
                Some(entry) => entry,
                None => return Err(PoolError::host_not_found(resolved, state.hosts())),
            };
            if let Some(client) = entry.clients.get(&mode) {
                return Ok(Arc::clone(client));
            }
            (resolved, entry.config.clone())
        };

        debug!("Creating {} client for {}", mode, resolved);
        let client = self.connector.connect(&resolved, &config, mode).await?;

        let mut state = self.state.write().await;
        if let Some(entry) = state.entries.get_mut(&resolved) {
            entry.clients.insert(mode, Arc::clone(&client));
        }
        Ok(client)
    }

    /// Status of every registered host. Never fails: probe errors become the
    /// host's status.
    pub async fn list_connections(&self) -> BTreeMap<String, ConnectionStatus> {
        let snapshots = self.snapshot(None).await;
        let statuses = join_all(snapshots.into_iter().map(|snap| async move {
            let host_id = snap.host_id.clone();
            (host_id, probe_status(snap).await)
        }))
        .await;
        statuses.into_iter().collect()
    }

    /// Status of one host (the default when `host_id` is `None`)
    pub async fn get_connection_details(&self, host_id: Option<&str>) -> ConnectionDetails {
        let resolved = {
            let state = self.state.read().await;
            match state.resolve(host_id) {
                Ok(resolved) => resolved,
                Err(PoolError::HostNotFound { host_id, available }) => {
                    return ConnectionDetails::NotFound { host_id, available }
                }
                Err(_) => return ConnectionDetails::NoConnections,
            }
        };

        match self.snapshot(Some(&resolved)).await.pop() {
            Some(snap) => ConnectionDetails::Found {
                host_id: resolved,
                status: probe_status(snap).await,
            },
            // Removed between the two reads
            None => ConnectionDetails::NotFound {
                host_id: resolved,
                available: self.hosts().await,
            },
        }
    }

    /// Close every client of `host_id` and forget it. Unknown hosts are not an error.
    pub async fn remove_connection(&self, host_id: &str) -> RemoveOutcome {
        let _guard = self.mutation.lock().await;

        let entry = {
            let mut state = self.state.write().await;
            let Some(entry) = state.entries.remove(host_id) else {
                return RemoveOutcome::NotFound(host_id.to_string());
            };

            if state.default_host.as_deref() == Some(host_id) {
                state.default_host = state.entries.keys().next().cloned();
                match &state.default_host {
                    Some(next) => info!("Default connection moved to {}", next),
                    None => info!("Default connection cleared"),
                }
            }
            entry
        };

        for (mode, client) in entry.clients {
            // Best effort: the socket may already be gone
            if let Err(e) = client.close().await {
                warn!("Failed to close {} client for {}: {}", mode, host_id, e);
            }
        }

        info!("Removed {}", host_id);
        RemoveOutcome::Removed(host_id.to_string())
    }

    /// Make `host_id` the default connection
    pub async fn set_default(&self, host_id: &str) -> PoolResult<()> {
        let _guard = self.mutation.lock().await;
        let mut state = self.state.write().await;
        if !state.entries.contains_key(host_id) {
            return Err(PoolError::host_not_found(host_id, state.hosts()));
        }
        state.default_host = Some(host_id.to_string());
        info!("Default connection switched to {}", host_id);
        Ok(())
    }

    pub async fn default_host(&self) -> Option<String> {
        self.state.read().await.default_host.clone()
    }

    pub async fn hosts(&self) -> Vec<String> {
        self.state.read().await.hosts()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Stored configuration for `host_id`
    pub async fn config(&self, host_id: &str) -> Option<StoreConfig> {
        self.state
            .read()
            .await
            .entries
            .get(host_id)
            .map(|entry| entry.config.clone())
    }

    async fn snapshot(&self, only: Option<&str>) -> Vec<EntrySnapshot> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|(host_id, _)| only.map_or(true, |wanted| wanted == host_id.as_str()))
            .map(|(host_id, entry)| EntrySnapshot {
                host_id: host_id.clone(),
                config: entry.config.clone(),
                probe: entry
                    .clients
                    .get(&DecodeMode::Decoded)
                    .or_else(|| entry.clients.values().next())
                    .cloned(),
                is_default: state.default_host.as_deref() == Some(host_id.as_str()),
                modes: entry.modes(),
            })
            .collect()
    }
}

async fn probe_status(snap: EntrySnapshot) -> ConnectionStatus {
    let live = snap.probe.as_ref().map(|client| (client.address(), client.db()));
    let (status, redis_version) = match &snap.probe {
        Some(client) => match client.info("server").await {
            Ok(info) => (
                "connected".to_string(),
                Some(
                    info.get("redis_version")
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string()),
                ),
            ),
            Err(e) => {
                warn!("Liveness probe failed for {}: {}", snap.host_id, e);
                (format!("error: {}", e), None)
            }
        },
        None => ("error: no live client".to_string(), None),
    };

    let config = &snap.config;
    ConnectionStatus {
        status,
        redis_version,
        host: config
            .host
            .clone()
            .or_else(|| live.as_ref().map(|(addr, _)| addr.host.clone()))
            .unwrap_or_else(|| "unknown".to_string()),
        port: config
            .port
            .or_else(|| live.as_ref().map(|(addr, _)| addr.port))
            .unwrap_or_default(),
        db: config.db.or_else(|| live.as_ref().and_then(|(_, db)| *db)),
        cluster_mode: config.cluster_mode,
        ssl: config.ssl,
        is_default: snap.is_default,
        decode_modes: snap.modes,
    }
}
