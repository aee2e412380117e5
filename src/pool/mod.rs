//! Multi-host Redis connection pool
//!
//! The registry keeps one entry per host identifier. Each entry stores the
//! configuration it was registered with and up to two live clients, one per
//! [`DecodeMode`], because the driver fixes response decoding when a client
//! is built. Tool handlers never build clients themselves; they always go
//! through [`ConnectionRegistry`] (or the [`ConnectionManager`] facade).
pub mod client;
pub mod factory;
pub mod manager;
pub mod params;
pub mod registry;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

pub use client::{SharedClient, StoreClient, StoreConnection};
pub use factory::{Connector, RedisConnector};
pub use manager::ConnectionManager;
pub use params::ConnectionParams;
pub use registry::{ConnectionDetails, ConnectionRegistry, ConnectionStatus, RemoveOutcome};

/// Upper bound on driver connections per client (or per node in cluster mode)
pub const MAX_CONNECTIONS: usize = 10;

/// Response decoding requested from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Bulk replies are returned as UTF-8 text
    Decoded,
    /// Bulk replies are returned untouched as bytes
    Raw,
}

impl DecodeMode {
    pub fn from_decode_responses(decode_responses: bool) -> Self {
        if decode_responses {
            DecodeMode::Decoded
        } else {
            DecodeMode::Raw
        }
    }

    pub fn decode_responses(self) -> bool {
        matches!(self, DecodeMode::Decoded)
    }
}

impl Default for DecodeMode {
    fn default() -> Self {
        DecodeMode::Decoded
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::Decoded => write!(f, "decoded"),
            DecodeMode::Raw => write!(f, "raw"),
        }
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<Option<Arc<ConnectionRegistry>>> = Mutex::new(None);
}

fn registry_or_init<F>(build: F) -> (Arc<ConnectionRegistry>, bool)
where
    F: FnOnce() -> ConnectionRegistry,
{
    let mut slot = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(registry) => (Arc::clone(registry), false),
        None => {
            let registry = Arc::new(build());
            *slot = Some(Arc::clone(&registry));
            (registry, true)
        }
    }
}

/// Create the process-wide registry over `connector`.
///
/// Only the first initialization takes effect; later calls, and calls after
/// [`get_registry`] already created the registry, return the existing one.
pub fn init_registry(connector: Arc<dyn Connector>) -> Arc<ConnectionRegistry> {
    let (registry, created) = registry_or_init(|| ConnectionRegistry::new(connector));
    if !created {
        warn!("Connection registry already initialized; keeping the existing one");
    }
    registry
}

/// Process-wide registry. Created on first access with the default Redis
/// connector unless [`init_registry`] ran first, and kept for the lifetime
/// of the process.
pub fn get_registry() -> Arc<ConnectionRegistry> {
    registry_or_init(|| ConnectionRegistry::new(Arc::new(RedisConnector::default()))).0
}
