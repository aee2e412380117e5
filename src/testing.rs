//! In-memory stand-ins for the Redis driver, used by unit tests

use async_trait::async_trait;
use redis::{ErrorKind, RedisError, RedisResult, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{StoreConfig, DEFAULT_HOST, DEFAULT_PORT};
use crate::error::{ConnectError, ConnectFailure};
use crate::pool::params::NodeAddr;
use crate::pool::{Connector, DecodeMode, SharedClient, StoreConnection};

/// Number of primaries a mocked cluster reports
pub const MOCK_CLUSTER_NODES: u16 = 3;

/// Standalone config pointing at `host`
pub fn mock_config(host: &str) -> StoreConfig {
    StoreConfig {
        host: Some(host.to_string()),
        port: Some(DEFAULT_PORT),
        db: Some(0),
        ..Default::default()
    }
}

/// Cluster config seeded at `host`
pub fn mock_cluster_config(host: &str) -> StoreConfig {
    StoreConfig {
        host: Some(host.to_string()),
        port: Some(7000),
        db: None,
        cluster_mode: true,
        ..Default::default()
    }
}

fn err(kind: ErrorKind, desc: &'static str) -> RedisError {
    RedisError::from((kind, desc))
}

fn data(text: &str) -> Value {
    Value::Data(text.as_bytes().to_vec())
}

/// `*` and `?` glob matching as used by SCAN MATCH
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn matches(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| matches(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && matches(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && matches(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&p, &t)
}

#[derive(Debug, Clone)]
struct MockKey {
    kind: String,
    value: Vec<u8>,
    ttl: i64,
}

/// Keyspace shared by every client of one mocked server
#[derive(Debug, Default)]
pub struct MockStore {
    keys: Mutex<BTreeMap<String, MockKey>>,
}

impl MockStore {
    pub fn set(&self, key: &str, value: &[u8]) {
        self.insert(key, "string", value);
    }

    /// Insert a key reporting `kind` from TYPE
    pub fn insert(&self, key: &str, kind: &str, value: &[u8]) {
        self.keys.lock().unwrap().insert(
            key.to_string(),
            MockKey {
                kind: kind.to_string(),
                value: value.to_vec(),
                ttl: -1,
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains_key(key)
    }

    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.keys.lock().unwrap().get(key).map(|k| k.ttl)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    fn execute(&self, args: &[String], cluster: bool) -> RedisResult<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(err(ErrorKind::ClientError, "Empty command"));
        };
        let mut keys = self.keys.lock().unwrap();

        match (name.to_ascii_uppercase().as_str(), rest) {
            ("PING", _) => Ok(Value::Status("PONG".to_string())),
            ("SET", [key, value, ..]) => {
                keys.insert(
                    key.clone(),
                    MockKey {
                        kind: "string".to_string(),
                        value: value.as_bytes().to_vec(),
                        ttl: -1,
                    },
                );
                Ok(Value::Okay)
            }
            ("GET", [key]) => Ok(keys
                .get(key)
                .map(|k| Value::Data(k.value.clone()))
                .unwrap_or(Value::Nil)),
            ("DEL", names) => {
                let removed = names.iter().filter(|k| keys.remove(*k).is_some()).count();
                Ok(Value::Int(removed as i64))
            }
            ("EXISTS", names) => Ok(Value::Int(
                names.iter().filter(|k| keys.contains_key(*k)).count() as i64,
            )),
            ("TYPE", [key]) => Ok(Value::Status(
                keys.get(key).map_or("none".to_string(), |k| k.kind.clone()),
            )),
            ("TTL", [key]) => Ok(Value::Int(keys.get(key).map_or(-2, |k| k.ttl))),
            ("EXPIRE", [key, seconds]) => {
                let seconds: i64 = seconds
                    .parse()
                    .map_err(|_| err(ErrorKind::ResponseError, "value is not an integer"))?;
                match keys.get_mut(key) {
                    Some(entry) => {
                        entry.ttl = seconds;
                        Ok(Value::Int(1))
                    }
                    None => Ok(Value::Int(0)),
                }
            }
            ("RENAME", [from, to]) => match keys.remove(from) {
                Some(entry) => {
                    keys.insert(to.clone(), entry);
                    Ok(Value::Okay)
                }
                None => Err(err(ErrorKind::ResponseError, "no such key")),
            },
            ("SCAN", [cursor, options @ ..]) => {
                let start: usize = cursor
                    .parse()
                    .map_err(|_| err(ErrorKind::ResponseError, "invalid cursor"))?;
                let mut pattern = "*".to_string();
                let mut count = 10usize;
                for pair in options.chunks(2) {
                    match (pair[0].to_ascii_uppercase().as_str(), pair.get(1)) {
                        ("MATCH", Some(p)) => pattern = p.clone(),
                        ("COUNT", Some(n)) => count = n.parse().unwrap_or(10).max(1),
                        _ => return Err(err(ErrorKind::ResponseError, "syntax error")),
                    }
                }

                // The cursor is a position in key order; MATCH filters after paging
                let all: Vec<&String> = keys.keys().collect();
                let end = (start + count).min(all.len());
                let page: Vec<Value> = all
                    .get(start..end)
                    .unwrap_or_default()
                    .iter()
                    .filter(|k| glob_match(&pattern, k))
                    .map(|k| Value::Data(k.as_bytes().to_vec()))
                    .collect();
                let next = if end >= all.len() { 0 } else { end };
                Ok(Value::Bulk(vec![data(&next.to_string()), Value::Bulk(page)]))
            }
            ("DBSIZE", []) => Ok(Value::Int(keys.len() as i64)),
            ("INFO", section) => {
                let mode = if cluster { "cluster" } else { "standalone" };
                let mut text = format!(
                    "# Server\r\nredis_version:7.2.4\r\nredis_mode:{}\r\ntcp_port:{}\r\n",
                    mode, DEFAULT_PORT
                );
                if section.first().map_or(true, |s| s != "server") {
                    text.push_str("# Clients\r\nconnected_clients:2\r\n");
                    text.push_str(&format!("# Keyspace\r\ndb0:keys={},expires=0\r\n", keys.len()));
                }
                Ok(data(&text))
            }
            ("CLIENT", [sub]) if sub.eq_ignore_ascii_case("LIST") => Ok(data(
                "id=3 addr=127.0.0.1:50412 name= db=0 cmd=client|list\nid=4 addr=127.0.0.1:50413 name=worker db=0 cmd=get\n",
            )),
            _ => Err(err(ErrorKind::ResponseError, "unknown command")),
        }
    }
}

/// Failure switches and call records shared by a connector and its clients
#[derive(Default)]
struct MockState {
    connect_failures: HashMap<String, ConnectFailure>,
    failing_info: HashSet<String>,
    failing_close: HashSet<String>,
    failing_commands: HashSet<String>,
    connects: Vec<(String, DecodeMode)>,
    closes: HashMap<String, usize>,
    stores: HashMap<String, Arc<MockStore>>,
}

/// Connector producing [`MockClient`]s. Switches are keyed by the
/// configured host name; call records by host id.
#[derive(Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_host(&self, host: &str, kind: ConnectFailure) {
        self.state
            .lock()
            .unwrap()
            .connect_failures
            .insert(host.to_string(), kind);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().connect_failures.clear();
    }

    pub fn fail_info(&self, host: &str) {
        self.state.lock().unwrap().failing_info.insert(host.to_string());
    }

    pub fn fail_close(&self, host: &str) {
        self.state.lock().unwrap().failing_close.insert(host.to_string());
    }

    /// Every command to `host` (or cluster member `host:port`) fails
    pub fn fail_commands(&self, host: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_commands
            .insert(host.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn connects_for(&self, host_id: &str) -> Vec<DecodeMode> {
        self.state
            .lock()
            .unwrap()
            .connects
            .iter()
            .filter(|(id, _)| id == host_id)
            .map(|(_, mode)| *mode)
            .collect()
    }

    pub fn closed_for(&self, host_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .closes
            .get(host_id)
            .copied()
            .unwrap_or(0)
    }

    /// Keyspace of the server at `host`; cluster members are `host:port`
    pub fn store(&self, host: &str) -> Arc<MockStore> {
        store_for(&self.state, host)
    }
}

fn store_for(state: &Arc<Mutex<MockState>>, key: &str) -> Arc<MockStore> {
    Arc::clone(
        state
            .lock()
            .unwrap()
            .stores
            .entry(key.to_string())
            .or_default(),
    )
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host_id: &str,
        config: &StoreConfig,
        mode: DecodeMode,
    ) -> Result<SharedClient, ConnectError> {
        let host = config.host.clone().unwrap_or_default();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(kind) = state.connect_failures.get(&host) {
                return Err(ConnectError::new(*kind, host_id, mode, "mock failure"));
            }
            state.connects.push((host_id.to_string(), mode));
        }

        let address = NodeAddr {
            host: config.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: config.port.unwrap_or(DEFAULT_PORT),
        };
        let client = MockClient {
            host_id: host_id.to_string(),
            switch_key: host.clone(),
            mode,
            cluster: config.cluster_mode,
            db: if config.cluster_mode {
                None
            } else {
                Some(config.db.unwrap_or(0))
            },
            address,
            store: store_for(&self.state, &host),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        };
        Ok(Arc::new(client))
    }
}

/// Client answering commands from a [`MockStore`]
pub struct MockClient {
    host_id: String,
    switch_key: String,
    mode: DecodeMode,
    cluster: bool,
    db: Option<i64>,
    address: NodeAddr,
    store: Arc<MockStore>,
    state: Arc<Mutex<MockState>>,
    closed: AtomicBool,
}

impl MockClient {
    fn member(&self, port: u16) -> MockClient {
        let name = format!("{}:{}", self.address.host, port);
        MockClient {
            host_id: name.clone(),
            switch_key: name.clone(),
            mode: self.mode,
            cluster: false,
            db: Some(0),
            address: NodeAddr {
                host: self.address.host.clone(),
                port,
            },
            store: store_for(&self.state, &name),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StoreConnection for MockClient {
    fn decode_mode(&self) -> DecodeMode {
        self.mode
    }

    fn is_cluster(&self) -> bool {
        self.cluster
    }

    fn address(&self) -> NodeAddr {
        self.address.clone()
    }

    fn db(&self) -> Option<i64> {
        self.db
    }

    async fn execute(&self, args: &[String]) -> RedisResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(err(ErrorKind::IoError, "Connection closed"));
        }
        let is_info = args
            .first()
            .map_or(false, |name| name.eq_ignore_ascii_case("INFO"));
        {
            let state = self.state.lock().unwrap();
            if state.failing_commands.contains(&self.switch_key)
                || (is_info && state.failing_info.contains(&self.switch_key))
            {
                return Err(err(ErrorKind::IoError, "Connection reset by peer"));
            }
        }
        let reply = self.store.execute(args, self.cluster)?;
        if self.cluster && is_info {
            // Cluster connections fan INFO out and pair each reply with its node
            let pairs = (0..MOCK_CLUSTER_NODES)
                .map(|i| {
                    let node = format!("{}:{}", self.address.host, self.address.port + i);
                    Value::Bulk(vec![data(&node), reply.clone()])
                })
                .collect();
            return Ok(Value::Bulk(pairs));
        }
        Ok(reply)
    }

    async fn nodes(&self) -> RedisResult<Vec<SharedClient>> {
        if !self.cluster {
            return Ok(Vec::new());
        }
        Ok((0..MOCK_CLUSTER_NODES)
            .map(|i| Arc::new(self.member(self.address.port + i)) as SharedClient)
            .collect())
    }

    async fn close(&self) -> RedisResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state.closes.entry(self.host_id.clone()).or_default() += 1;
        if state.failing_close.contains(&self.switch_key) {
            return Err(err(ErrorKind::IoError, "Broken pipe"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::client::{command, query};

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:1"));
        assert!(!glob_match("user:*", "session:1"));
        assert!(glob_match("k?y", "key"));
        assert!(!glob_match("k?y", "ky"));
    }

    #[tokio::test]
    async fn test_mock_scan_pages_through_keys() {
        let connector = MockConnector::new();
        let store = connector.store("h");
        for i in 0..5 {
            store.set(&format!("k{}", i), b"v");
        }
        let client = connector
            .connect("h:6379", &mock_config("h"), DecodeMode::Decoded)
            .await
            .unwrap();

        let (cursor, keys): (u64, Vec<String>) =
            query(client.as_ref(), &command(["SCAN", "0", "COUNT", "3"])).await.unwrap();
        assert_eq!(cursor, 3);
        assert_eq!(keys.len(), 3);

        let (cursor, keys): (u64, Vec<String>) =
            query(client.as_ref(), &command(["SCAN", "3", "COUNT", "3"])).await.unwrap();
        assert_eq!(cursor, 0);
        assert_eq!(keys, vec!["k3", "k4"]);
    }

    #[tokio::test]
    async fn test_mock_closed_client_fails() {
        let connector = MockConnector::new();
        let client = connector
            .connect("h", &mock_config("h"), DecodeMode::Decoded)
            .await
            .unwrap();
        assert!(client.ping().await.is_ok());
        client.close().await.unwrap();
        assert!(client.ping().await.is_err());
        assert_eq!(connector.closed_for("h"), 1);
    }
}
