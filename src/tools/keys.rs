//! Key-level tools: delete, type, expire, rename and SCAN iteration

use redis::RedisResult;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{host_id_property, ToolDef, ToolResult};
use crate::pool::client::{command, query};
use crate::pool::{ConnectionManager, DecodeMode, StoreConnection};
use crate::utils::lossy_utf8;

fn default_pattern() -> String {
    "*".to_string()
}

fn default_count() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct KeyArgs {
    pub key: String,
    #[serde(default)]
    pub host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpireArgs {
    pub name: String,
    pub expire_seconds: i64,
    #[serde(default)]
    pub host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameArgs {
    pub old_key: String,
    pub new_key: String,
    #[serde(default)]
    pub host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanArgs {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_count")]
    pub count: u64,
    #[serde(default)]
    pub cursor: u64,
    #[serde(default)]
    pub host_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanAllArgs {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_count")]
    pub batch_size: u64,
    #[serde(default)]
    pub host_id: Option<String>,
}

pub fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            "delete",
            "Delete a Redis key.",
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "The key to delete."},
                    "host_id": host_id_property()
                },
                "required": ["key"]
            }),
        ),
        ToolDef::new(
            "type",
            "Return the type of the value stored at a key together with its TTL.",
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "The key to check."},
                    "host_id": host_id_property()
                },
                "required": ["key"]
            }),
        ),
        ToolDef::new(
            "expire",
            "Set an expiration time in seconds for a Redis key.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "The Redis key."},
                    "expire_seconds": {"type": "integer", "description": "Seconds until the key expires."},
                    "host_id": host_id_property()
                },
                "required": ["name", "expire_seconds"]
            }),
        ),
        ToolDef::new(
            "rename",
            "Rename a Redis key. Fails if the source key does not exist.",
            json!({
                "type": "object",
                "properties": {
                    "old_key": {"type": "string"},
                    "new_key": {"type": "string"},
                    "host_id": host_id_property()
                },
                "required": ["old_key", "new_key"]
            }),
        ),
        ToolDef::new(
            "scan_keys",
            "Run one SCAN iteration and return a partial page of matching keys. \
             Call again with the returned cursor until scan_complete is true.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "default": "*"},
                    "count": {"type": "integer", "default": 100, "description": "Hint for keys per iteration."},
                    "cursor": {"type": "integer", "default": 0},
                    "host_id": host_id_property()
                }
            }),
        ),
        ToolDef::new(
            "scan_all_keys",
            "Collect every key matching a pattern by iterating SCAN until the cursor returns to 0.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "default": "*"},
                    "batch_size": {"type": "integer", "default": 100},
                    "host_id": host_id_property()
                }
            }),
        ),
    ]
}

pub async fn delete(manager: &ConnectionManager, args: KeyArgs) -> ToolResult {
    let outcome: Result<i64, String> = async {
        let client = manager
            .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
            .await
            .map_err(|e| e.to_string())?;
        query(client.as_ref(), &command(["DEL", args.key.as_str()]))
            .await
            .map_err(|e| e.to_string())
    }
    .await;

    match outcome {
        Ok(0) => ToolResult::message(format!("Key {} not found", args.key)),
        Ok(_) => ToolResult::message(format!("Successfully deleted {}", args.key)),
        Err(e) => ToolResult::error(format!("Error deleting key {}: {}", args.key, e)),
    }
}

async fn describe_key(client: &dyn StoreConnection, key: &str) -> RedisResult<(String, i64)> {
    let key_type: String = query(client, &command(["TYPE", key])).await?;
    let ttl: i64 = query(client, &command(["TTL", key])).await?;
    Ok((key_type, ttl))
}

pub async fn key_type(manager: &ConnectionManager, args: KeyArgs) -> ToolResult {
    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
        .await
    {
        Ok(client) => client,
        Err(e) => return ToolResult::error_object(e.to_string()),
    };

    match describe_key(client.as_ref(), &args.key).await {
        Ok((key_type, ttl)) => ToolResult::ok(json!({
            "key": args.key,
            "type": key_type,
            "ttl": ttl,
        })),
        Err(e) => ToolResult::error_object(e.to_string()),
    }
}

pub async fn expire(manager: &ConnectionManager, args: ExpireArgs) -> ToolResult {
    let outcome: Result<i64, String> = async {
        let client = manager
            .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
            .await
            .map_err(|e| e.to_string())?;
        let seconds = args.expire_seconds.to_string();
        query(client.as_ref(), &command(["EXPIRE", args.name.as_str(), seconds.as_str()]))
            .await
            .map_err(|e| e.to_string())
    }
    .await;

    match outcome {
        Ok(1) => ToolResult::message(format!(
            "Expiration set to {} seconds for '{}'.",
            args.expire_seconds, args.name
        )),
        Ok(_) => ToolResult::message(format!("Key '{}' does not exist.", args.name)),
        Err(e) => ToolResult::error(format!(
            "Error setting expiration for key '{}': {}",
            args.name, e
        )),
    }
}

pub async fn rename(manager: &ConnectionManager, args: RenameArgs) -> ToolResult {
    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Decoded)
        .await
    {
        Ok(client) => client,
        Err(e) => return ToolResult::error_object(e.to_string()),
    };

    let exists: RedisResult<i64> = query(client.as_ref(), &command(["EXISTS", args.old_key.as_str()])).await;
    match exists {
        Ok(0) => {
            return ToolResult::error_object(format!("Key '{}' does not exist.", args.old_key))
        }
        Ok(_) => {}
        Err(e) => return ToolResult::error_object(e.to_string()),
    }

    let renamed: RedisResult<()> = query(
        client.as_ref(),
        &command(["RENAME", args.old_key.as_str(), args.new_key.as_str()]),
    )
    .await;
    match renamed {
        Ok(()) => ToolResult::ok(json!({
            "status": "success",
            "message": format!("Renamed key '{}' to '{}'", args.old_key, args.new_key),
        })),
        Err(e) => ToolResult::error_object(e.to_string()),
    }
}

/// One SCAN step. Keys are fetched as raw bytes and decoded lossily so
/// binary key names never fail the whole page.
async fn scan_page(
    client: &dyn StoreConnection,
    cursor: u64,
    pattern: &str,
    count: u64,
) -> RedisResult<(u64, Vec<String>)> {
    let args = command([
        "SCAN".to_string(),
        cursor.to_string(),
        "MATCH".to_string(),
        pattern.to_string(),
        "COUNT".to_string(),
        count.to_string(),
    ]);
    let (next, keys): (u64, Vec<Vec<u8>>) = query(client, &args).await?;
    Ok((next, keys.iter().map(|key| lossy_utf8(key)).collect()))
}

async fn scan_to_end(client: &dyn StoreConnection, pattern: &str, batch_size: u64) -> RedisResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor = 0;
    loop {
        let (next, page) = scan_page(client, cursor, pattern, batch_size).await?;
        keys.extend(page);
        if next == 0 {
            return Ok(keys);
        }
        cursor = next;
    }
}

pub async fn scan_keys(manager: &ConnectionManager, args: ScanArgs) -> ToolResult {
    let failed = |e: String| {
        ToolResult::error(format!(
            "Error scanning keys with pattern '{}': {}",
            args.pattern, e
        ))
    };

    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Raw)
        .await
    {
        Ok(client) => client,
        Err(e) => return failed(e.to_string()),
    };

    if !client.is_cluster() {
        return match scan_page(client.as_ref(), args.cursor, &args.pattern, args.count).await {
            Ok((cursor, keys)) => ToolResult::ok(json!({
                "cursor": cursor,
                "total_scanned": keys.len(),
                "keys": keys,
                "scan_complete": cursor == 0,
            })),
            Err(e) => failed(e.to_string()),
        };
    }

    // Cluster cursors are per node, so only a fresh scan is supported
    if args.cursor != 0 {
        return ToolResult::ok(json!({
            "cursor": 0,
            "keys": [],
            "total_scanned": 0,
            "scan_complete": true,
        }));
    }

    let nodes = match client.nodes().await {
        Ok(nodes) => nodes,
        Err(e) => return failed(e.to_string()),
    };

    let mut keys = Vec::new();
    let mut cursors = Map::new();
    for node in nodes {
        let addr = node.address();
        let label = format!("{}:{}", addr.host, addr.port);
        match scan_page(node.as_ref(), 0, &args.pattern, args.count).await {
            Ok((cursor, page)) => {
                keys.extend(page);
                cursors.insert(label, json!(cursor));
            }
            Err(e) => {
                warn!("SCAN failed on cluster node {}: {}", label, e);
                cursors.insert(label, json!(0));
            }
        }
    }

    let complete = cursors.values().all(|cursor| cursor == &json!(0));
    ToolResult::ok(json!({
        "cursor": Value::Object(cursors),
        "total_scanned": keys.len(),
        "keys": keys,
        "scan_complete": complete,
    }))
}

pub async fn scan_all_keys(manager: &ConnectionManager, args: ScanAllArgs) -> ToolResult {
    let failed = |e: String| {
        ToolResult::error(format!(
            "Error scanning all keys with pattern '{}': {}",
            args.pattern, e
        ))
    };

    let client = match manager
        .get_connection(args.host_id.as_deref(), DecodeMode::Raw)
        .await
    {
        Ok(client) => client,
        Err(e) => return failed(e.to_string()),
    };

    if !client.is_cluster() {
        return match scan_to_end(client.as_ref(), &args.pattern, args.batch_size).await {
            Ok(keys) => ToolResult::ok(json!(keys)),
            Err(e) => failed(e.to_string()),
        };
    }

    let nodes = match client.nodes().await {
        Ok(nodes) => nodes,
        Err(e) => return failed(e.to_string()),
    };

    let mut keys = Vec::new();
    for node in nodes {
        match scan_to_end(node.as_ref(), &args.pattern, args.batch_size).await {
            Ok(found) => {
                debug!("Cluster node {:?} returned {} keys", node.address(), found.len());
                keys.extend(found);
            }
            // A failing node is skipped
            Err(e) => warn!("SCAN failed on cluster node {:?}: {}", node.address(), e),
        }
    }
    ToolResult::ok(json!(keys))
}
