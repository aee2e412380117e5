//! Driver-ready connection parameters
//!
//! Translates a stored [`StoreConfig`] into the parameter record used to
//! construct a client. Standalone and cluster clients accept different
//! settings: a cluster has no meaningful database index and is addressed by
//! startup nodes rather than a single host.

use serde::Serialize;

use super::{DecodeMode, MAX_CONNECTIONS};
use crate::config::{StoreConfig, DEFAULT_HOST, DEFAULT_PORT};

/// Client identification sent to the server
pub fn lib_name() -> String {
    format!("redis-rs(mcp-server_v{})", crate::VERSION)
}

/// A `host:port` pair used to seed cluster discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

/// TLS settings carried through from the configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TlsParams {
    pub ca_path: Option<String>,
    pub keyfile: Option<String>,
    pub certfile: Option<String>,
    pub cert_reqs: Option<String>,
    pub ca_certs: Option<String>,
}

impl TlsParams {
    /// Server certificates are not verified
    pub fn insecure(&self) -> bool {
        self.cert_reqs.as_deref() == Some("none")
    }

    /// File holding the trusted root certificate, bundle first
    pub fn root_cert_file(&self) -> Option<&str> {
        self.ca_certs.as_deref().or(self.ca_path.as_deref())
    }
}

/// Parameters for constructing one client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionParams {
    pub decode_responses: bool,
    pub lib_name: String,
    pub cluster_mode: bool,
    /// Standalone only
    pub host: Option<String>,
    /// Standalone only
    pub port: Option<u16>,
    /// Standalone only
    pub db: Option<i64>,
    /// Cluster only
    pub startup_nodes: Vec<NodeAddr>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    pub tls: TlsParams,
    /// Standalone cap on total connections. The multiplexed driver holds a
    /// single socket, which always stays within it.
    pub max_connections: Option<usize>,
    /// Cluster cap on connections to each node. The cluster driver holds one
    /// multiplexed socket per node.
    pub max_connections_per_node: Option<usize>,
}

impl ConnectionParams {
    /// Build parameters for a configuration and decode mode. Never fails;
    /// absent fields are left for the driver to default.
    pub fn build(config: &StoreConfig, mode: DecodeMode) -> Self {
        let tls = TlsParams {
            ca_path: config.ssl_ca_path.clone(),
            keyfile: config.ssl_keyfile.clone(),
            certfile: config.ssl_certfile.clone(),
            cert_reqs: config.ssl_cert_reqs.clone(),
            ca_certs: config.ssl_ca_certs.clone(),
        };

        let mut params = Self {
            decode_responses: mode.decode_responses(),
            lib_name: lib_name(),
            cluster_mode: config.cluster_mode,
            host: None,
            port: None,
            db: None,
            startup_nodes: Vec::new(),
            username: config.username.clone(),
            password: config.password.clone(),
            ssl: config.ssl,
            tls,
            max_connections: None,
            max_connections_per_node: None,
        };

        if config.cluster_mode {
            params.startup_nodes = vec![NodeAddr {
                host: config
                    .host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: config.port.unwrap_or(DEFAULT_PORT),
            }];
            params.max_connections_per_node = Some(MAX_CONNECTIONS);
        } else {
            params.host = config.host.clone();
            params.port = config.port;
            params.db = config.db;
            params.max_connections = Some(MAX_CONNECTIONS);
        }

        params
    }

    pub fn decode_mode(&self) -> DecodeMode {
        DecodeMode::from_decode_responses(self.decode_responses)
    }

    /// Address a standalone client dials, with driver defaults filled in
    pub fn address(&self) -> NodeAddr {
        match self.startup_nodes.first() {
            Some(node) if self.cluster_mode => node.clone(),
            _ => NodeAddr {
                host: self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: self.port.unwrap_or(DEFAULT_PORT),
            },
        }
    }

    /// Standalone parameters for one member of this cluster
    pub fn for_node(&self, node: &NodeAddr) -> Self {
        let mut params = self.clone();
        params.cluster_mode = false;
        params.startup_nodes.clear();
        params.host = Some(node.host.clone());
        params.port = Some(node.port);
        params.db = None;
        params.max_connections = self.max_connections_per_node.or(Some(MAX_CONNECTIONS));
        params.max_connections_per_node = None;
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_params() {
        let config = StoreConfig {
            host: Some("localhost".to_string()),
            port: Some(6379),
            db: Some(3),
            cluster_mode: false,
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Decoded);

        assert!(params.decode_responses);
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.port, Some(6379));
        assert_eq!(params.db, Some(3));
        assert_eq!(params.max_connections, Some(MAX_CONNECTIONS));
        assert_eq!(params.max_connections_per_node, None);
        assert!(params.startup_nodes.is_empty());
        assert!(params.lib_name.contains(crate::VERSION));
    }

    #[test]
    fn test_cluster_params_drop_standalone_fields() {
        let config = StoreConfig {
            host: Some("10.0.0.5".to_string()),
            port: Some(7000),
            db: Some(3),
            username: Some("testuser".to_string()),
            password: Some("testpass".to_string()),
            ssl: true,
            ssl_ca_path: Some("/path/to/ca.pem".to_string()),
            cluster_mode: true,
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Decoded);

        assert_eq!(
            params.startup_nodes,
            vec![NodeAddr {
                host: "10.0.0.5".to_string(),
                port: 7000
            }]
        );
        assert_eq!(params.db, None);
        assert_eq!(params.host, None);
        assert_eq!(params.port, None);
        assert_eq!(params.max_connections_per_node, Some(MAX_CONNECTIONS));
        assert_eq!(params.max_connections, None);
        assert_eq!(params.username.as_deref(), Some("testuser"));
        assert_eq!(params.password.as_deref(), Some("testpass"));
        assert!(params.ssl);
        assert_eq!(params.tls.ca_path.as_deref(), Some("/path/to/ca.pem"));

        // The serialized record carries no db field value at all
        let json = serde_json::to_value(&params).unwrap();
        assert!(json["db"].is_null());
    }

    #[test]
    fn test_cluster_params_default_startup_node() {
        let config = StoreConfig {
            host: None,
            port: None,
            db: None,
            cluster_mode: true,
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Raw);
        assert_eq!(params.startup_nodes[0].host, "127.0.0.1");
        assert_eq!(params.startup_nodes[0].port, 6379);
        assert!(!params.decode_responses);
        assert_eq!(params.decode_mode(), DecodeMode::Raw);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let config = StoreConfig {
            host: None,
            port: None,
            db: None,
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Decoded);
        assert_eq!(params.host, None);
        assert_eq!(params.username, None);
        assert_eq!(params.password, None);
        assert_eq!(params.address().host, "127.0.0.1");
        assert_eq!(params.address().port, 6379);
    }

    #[test]
    fn test_tls_params() {
        let config = StoreConfig {
            ssl: true,
            ssl_ca_path: Some("/ca/dir.pem".to_string()),
            ssl_ca_certs: Some("/ca/bundle.pem".to_string()),
            ssl_cert_reqs: Some("none".to_string()),
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Decoded);
        assert!(params.tls.insecure());
        assert_eq!(params.tls.root_cert_file(), Some("/ca/bundle.pem"));
    }

    #[test]
    fn test_for_node_builds_standalone_params() {
        let config = StoreConfig {
            host: Some("10.0.0.5".to_string()),
            port: Some(7000),
            password: Some("pw".to_string()),
            cluster_mode: true,
            ..Default::default()
        };
        let params = ConnectionParams::build(&config, DecodeMode::Decoded);
        let node = params.for_node(&NodeAddr {
            host: "10.0.0.6".to_string(),
            port: 7001,
        });
        assert!(!node.cluster_mode);
        assert_eq!(node.host.as_deref(), Some("10.0.0.6"));
        assert_eq!(node.port, Some(7001));
        assert_eq!(node.password.as_deref(), Some("pw"));
        assert_eq!(node.max_connections, Some(MAX_CONNECTIONS));
    }
}
