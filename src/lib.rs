//! Redis MCP server - Redis tools for AI agents over the Model Context Protocol
//!
//! The heart of the crate is the connection pool in [`pool`]: a process-wide
//! registry of named Redis connections, standalone or cluster, each cached in
//! up to two decode modes and built lazily on first use. Tool handlers in
//! [`tools`] only ever obtain clients through the registry, and [`mcp`]
//! exposes those tools over JSON-RPC on stdio.

pub mod config;
pub mod error;
pub mod mcp;
pub mod pool;
pub mod tools;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ConnectOptions, StoreConfig};
pub use error::{ConfigError, ConnectError, ConnectFailure, PoolError, PoolResult, ToolError};
pub use mcp::McpServer;
pub use pool::{
    get_registry, init_registry, ConnectionDetails, ConnectionManager, ConnectionRegistry,
    ConnectionStatus, Connector, DecodeMode, RedisConnector, RemoveOutcome, SharedClient,
    StoreConnection,
};
pub use tools::{ToolDef, ToolRegistry, ToolResult};

/// Crate version, reported to Redis and to MCP clients
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(pool::params::lib_name().ends_with(&format!("_v{})", VERSION)));
    }

    #[tokio::test]
    async fn test_end_to_end_connect_and_query() {
        let connector = Arc::new(testing::MockConnector::new());
        connector.store("cache").set("user:1", b"alice");
        let registry = Arc::new(ConnectionRegistry::new(connector.clone()));
        let manager = ConnectionManager::new(registry, StoreConfig::default());
        let server = McpServer::new(ToolRegistry::new(manager));

        let connect = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"connect","arguments":{"host":"cache","host_id":"cache"}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(connect.result.unwrap()["isError"], false);

        let scan = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"scan_all_keys","arguments":{"host_id":"cache"}}}"#,
            )
            .await
            .unwrap();
        let text = scan.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        let keys: Vec<String> = serde_json::from_str(&text).unwrap();
        assert_eq!(keys, vec!["user:1"]);

        // Decoded handle from connect, raw handle built lazily for the scan
        assert_eq!(
            connector.connects_for("cache"),
            vec![DecodeMode::Decoded, DecodeMode::Raw]
        );
    }

    #[test]
    fn test_default_connector_timeout() {
        let connector = RedisConnector::new(Duration::from_secs(3));
        assert_eq!(connector.connect_timeout(), Duration::from_secs(3));
    }
}
