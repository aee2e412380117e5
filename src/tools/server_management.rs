//! Server-level tools: dbsize, info, client_list

use redis::RedisResult;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{host_id_property, ToolDef, ToolResult};
use crate::pool::client::{command, node_reply, query, value_text};
use crate::pool::{ConnectionManager, DecodeMode, StoreConnection};
use crate::utils::parse_client_list;

#[derive(Debug, Default, Deserialize)]
pub struct HostArgs {
    #[serde(default)]
    pub host_id: Option<String>,
}

fn default_section() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct InfoArgs {
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default)]
    pub host_id: Option<String>,
}

pub fn definitions() -> Vec<ToolDef> {
    let host_only = json!({
        "type": "object",
        "properties": {"host_id": host_id_property()}
    });

    vec![
        ToolDef::new(
            "dbsize",
            "Get the number of keys in the database. Cluster connections sum every primary.",
            host_only.clone(),
        ),
        ToolDef::new(
            "info",
            "Get Redis server information and statistics for one INFO section.",
            json!({
                "type": "object",
                "properties": {
                    "section": {
                        "type": "string",
                        "default": "default",
                        "description": "INFO section: default, server, memory, cpu, keyspace, ..."
                    },
                    "host_id": host_id_property()
                }
            }),
        ),
        ToolDef::new(
            "client_list",
            "List the clients connected to the Redis server.",
            host_only,
        ),
    ]
}

async fn cluster_dbsize(client: &dyn StoreConnection) -> RedisResult<i64> {
    let mut total = 0;
    for node in client.nodes().await? {
        match query::<i64>(node.as_ref(), &command(["DBSIZE"])).await {
            Ok(size) => total += size,
            Err(e) => warn!("DBSIZE failed on cluster node {:?}: {}", node.address(), e),
        }
    }
    Ok(total)
}

pub async fn dbsize(manager: &ConnectionManager, args: HostArgs) -> ToolResult {
    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
        .await
    {
        Ok(client) => client,
        Err(e) => return ToolResult::error(format!("Error getting database size: {}", e)),
    };

    if client.is_cluster() {
        return match cluster_dbsize(client.as_ref()).await {
            Ok(total) => ToolResult::ok(json!(total)),
            Err(e) => ToolResult::error(format!("Error getting cluster database size: {}", e)),
        };
    }

    match query::<i64>(client.as_ref(), &command(["DBSIZE"])).await {
        Ok(size) => ToolResult::ok(json!(size)),
        Err(e) => ToolResult::error(format!("Error getting database size: {}", e)),
    }
}

pub async fn info(manager: &ConnectionManager, args: InfoArgs) -> ToolResult {
    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
        .await
    {
        Ok(client) => client,
        Err(e) => return ToolResult::error(format!("Error retrieving Redis info: {}", e)),
    };

    match client.info(&args.section).await {
        Ok(fields) => ToolResult::ok(json!(fields)),
        Err(e) => ToolResult::error(format!("Error retrieving Redis info: {}", e)),
    }
}

pub async fn client_list(manager: &ConnectionManager, args: HostArgs) -> ToolResult {
    let listed: RedisResult<_> = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
        .await
    {
        Ok(client) => client.execute(&command(["CLIENT", "LIST"])).await,
        Err(e) => return ToolResult::error(format!("Error retrieving client list: {}", e)),
    };

    match listed {
        Ok(value) => ToolResult::ok(json!(parse_client_list(&value_text(node_reply(&value))))),
        Err(e) => ToolResult::error(format!("Error retrieving client list: {}", e)),
    }
}
