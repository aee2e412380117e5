//! Live Redis clients held by the registry
//!
//! [`StoreConnection`] is the capability contract every cached handle
//! satisfies: run a command, probe liveness, read INFO, enumerate cluster
//! members and close. [`StoreClient`] is the production implementation and
//! dispatches between a standalone multiplexed connection and a cluster
//! connection.

use async_trait::async_trait;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{
    ConnectionAddr, ConnectionInfo, ErrorKind, FromRedisValue, RedisConnectionInfo, RedisError,
    RedisResult, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::params::{ConnectionParams, NodeAddr, TlsParams};
use super::DecodeMode;
use crate::utils::{lossy_utf8, parse_info};

/// Handle type shared between the registry and its callers
pub type SharedClient = Arc<dyn StoreConnection>;

/// Operations the registry and the tool handlers need from a client
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Decoding this client was built with
    fn decode_mode(&self) -> DecodeMode;

    /// Whether this client talks to a cluster
    fn is_cluster(&self) -> bool;

    /// Address the client dialed (first startup node for clusters)
    fn address(&self) -> NodeAddr;

    /// Database index the client selected, if any
    fn db(&self) -> Option<i64>;

    /// Run one command given as its name followed by its arguments
    async fn execute(&self, args: &[String]) -> RedisResult<Value>;

    /// Round-trip a PING
    async fn ping(&self) -> RedisResult<()> {
        match self.execute(&command(["PING"])).await? {
            Value::Status(_) | Value::Okay | Value::Data(_) => Ok(()),
            other => Err(RedisError::from((
                ErrorKind::ResponseError,
                "Unexpected PING response",
                format!("{:?}", other),
            ))),
        }
    }

    /// INFO for one section, parsed into fields. Clusters report the first
    /// primary that answered.
    async fn info(&self, section: &str) -> RedisResult<BTreeMap<String, String>> {
        let value = self.execute(&command(["INFO", section])).await?;
        Ok(parse_info(&value_text(node_reply(&value))))
    }

    /// Standalone clients for every primary of a cluster; empty for standalone
    async fn nodes(&self) -> RedisResult<Vec<SharedClient>>;

    /// Release the underlying connection. Later commands fail.
    async fn close(&self) -> RedisResult<()>;
}

/// Build an argument vector from string-like parts
pub fn command<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Run a command and convert its reply
pub async fn query<T: FromRedisValue>(client: &dyn StoreConnection, args: &[String]) -> RedisResult<T> {
    let value = client.execute(args).await?;
    redis::from_redis_value(&value)
}

/// Text content of a reply; nested replies yield their first non-empty text
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Data(bytes) => lossy_utf8(bytes),
        Value::Status(status) => status.clone(),
        Value::Okay => "OK".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Bulk(items) => items
            .iter()
            .map(value_text)
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// One server's reply out of a cluster fan-out.
///
/// Commands a cluster connection sends to every primary come back as
/// `[[address, reply], ...]`; the first node's reply is returned. Any other
/// shape is returned unchanged.
pub fn node_reply(value: &Value) -> &Value {
    if let Value::Bulk(items) = value {
        if let Some(Value::Bulk(pair)) = items.first() {
            if let [Value::Data(_) | Value::Status(_), reply] = pair.as_slice() {
                return reply;
            }
        }
    }
    value
}

/// Primary addresses from a CLUSTER SLOTS reply, in first-seen order.
///
/// An empty host means "the node you asked", so `fallback_host` stands in.
pub fn parse_cluster_slots(value: &Value, fallback_host: &str) -> Vec<NodeAddr> {
    let mut nodes: Vec<NodeAddr> = Vec::new();
    let Value::Bulk(ranges) = value else {
        return nodes;
    };

    for range in ranges {
        let Value::Bulk(fields) = range else { continue };
        let Some(Value::Bulk(primary)) = fields.get(2) else { continue };

        let host = primary.first().map(value_text).unwrap_or_default();
        let port = match primary.get(1) {
            Some(Value::Int(port)) => u16::try_from(*port).ok(),
            Some(other) => value_text(other).parse().ok(),
            None => None,
        };
        let Some(port) = port else { continue };

        let node = NodeAddr {
            host: if host.is_empty() { fallback_host.to_string() } else { host },
            port,
        };
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    nodes
}

/// Certificate material read from the configured PEM files
#[derive(Debug, Clone, Default)]
pub struct CertificateBundle {
    pub root_cert: Option<Vec<u8>>,
    pub client_cert: Option<Vec<u8>>,
    pub client_key: Option<Vec<u8>>,
}

impl CertificateBundle {
    /// Read the files named in the TLS parameters; `None` when none are set
    pub async fn load(tls: &TlsParams) -> std::io::Result<Option<Self>> {
        let mut bundle = Self::default();
        if let Some(path) = tls.root_cert_file() {
            bundle.root_cert = Some(tokio::fs::read(path).await?);
        }
        if let (Some(cert), Some(key)) = (&tls.certfile, &tls.keyfile) {
            bundle.client_cert = Some(tokio::fs::read(cert).await?);
            bundle.client_key = Some(tokio::fs::read(key).await?);
        }

        if bundle.root_cert.is_none() && bundle.client_cert.is_none() {
            Ok(None)
        } else {
            Ok(Some(bundle))
        }
    }

    fn to_tls(&self) -> redis::TlsCertificates {
        let client_tls = match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some(redis::ClientTlsConfig {
                client_cert: cert.clone(),
                client_key: key.clone(),
            }),
            _ => None,
        };
        redis::TlsCertificates {
            client_tls,
            root_cert: self.root_cert.clone(),
        }
    }
}

#[derive(Clone)]
enum Handle {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

/// Production client over the `redis` driver
pub struct StoreClient {
    params: ConnectionParams,
    certs: Option<CertificateBundle>,
    handle: RwLock<Option<Handle>>,
}

impl StoreClient {
    /// Connect according to the parameters. Does not probe; the connector does.
    pub async fn open(params: ConnectionParams, certs: Option<CertificateBundle>) -> RedisResult<Self> {
        let handle = if params.cluster_mode {
            Handle::Cluster(open_cluster(&params, certs.as_ref()).await?)
        } else {
            Handle::Standalone(open_standalone(&params, certs.as_ref()).await?)
        };

        Ok(Self {
            params,
            certs,
            handle: RwLock::new(Some(handle)),
        })
    }

    async fn handle(&self) -> RedisResult<Handle> {
        self.handle
            .read()
            .await
            .clone()
            .ok_or_else(|| RedisError::from((ErrorKind::IoError, "Connection closed")))
    }
}

#[async_trait]
impl StoreConnection for StoreClient {
    fn decode_mode(&self) -> DecodeMode {
        self.params.decode_mode()
    }

    fn is_cluster(&self) -> bool {
        self.params.cluster_mode
    }

    fn address(&self) -> NodeAddr {
        self.params.address()
    }

    fn db(&self) -> Option<i64> {
        self.params.db
    }

    async fn execute(&self, args: &[String]) -> RedisResult<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(RedisError::from((ErrorKind::ClientError, "Empty command")));
        };
        let mut cmd = redis::cmd(name);
        cmd.arg(rest);

        match self.handle().await? {
            Handle::Standalone(mut conn) => cmd.query_async(&mut conn).await,
            Handle::Cluster(mut conn) => cmd.query_async(&mut conn).await,
        }
    }

    async fn nodes(&self) -> RedisResult<Vec<SharedClient>> {
        if !self.params.cluster_mode {
            return Ok(Vec::new());
        }

        let slots = self.execute(&command(["CLUSTER", "SLOTS"])).await?;
        let fallback = self.params.address().host;
        let mut members: Vec<SharedClient> = Vec::new();
        for node in parse_cluster_slots(&slots, &fallback) {
            debug!("Opening cluster member {}:{}", node.host, node.port);
            let client = StoreClient::open(self.params.for_node(&node), self.certs.clone()).await?;
            members.push(Arc::new(client));
        }
        Ok(members)
    }

    async fn close(&self) -> RedisResult<()> {
        // Dropping the last clone of a multiplexed connection shuts its driver task down
        self.handle.write().await.take();
        Ok(())
    }
}

fn connection_info(params: &ConnectionParams, node: &NodeAddr) -> ConnectionInfo {
    let addr = if params.ssl {
        ConnectionAddr::TcpTls {
            host: node.host.clone(),
            port: node.port,
            insecure: params.tls.insecure(),
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(node.host.clone(), node.port)
    };

    ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: params.db.unwrap_or(0),
            username: params.username.clone(),
            password: params.password.clone(),
            ..Default::default()
        },
    }
}

async fn open_standalone(
    params: &ConnectionParams,
    certs: Option<&CertificateBundle>,
) -> RedisResult<MultiplexedConnection> {
    let info = connection_info(params, &params.address());
    let client = match certs {
        Some(bundle) if params.ssl => redis::Client::build_with_tls(info, bundle.to_tls())?,
        _ => redis::Client::open(info)?,
    };

    let mut conn = client.get_multiplexed_async_connection().await?;
    identify(&mut conn, &params.lib_name).await;
    Ok(conn)
}

fn setinfo_command(lib_name: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("CLIENT");
    cmd.arg("SETINFO").arg("LIB-NAME").arg(lib_name);
    cmd
}

/// Tag the connection with the library name. Servers before 7.2 reject
/// SETINFO, so failure is only logged.
async fn identify<C>(conn: &mut C, lib_name: &str)
where
    C: ConnectionLike + Send,
{
    let tagged: RedisResult<Value> = setinfo_command(lib_name).query_async(conn).await;
    if let Err(e) = tagged {
        debug!("CLIENT SETINFO not accepted: {}", e);
    }
}

async fn open_cluster(
    params: &ConnectionParams,
    certs: Option<&CertificateBundle>,
) -> RedisResult<ClusterConnection> {
    let nodes: Vec<ConnectionInfo> = params
        .startup_nodes
        .iter()
        .map(|node| connection_info(params, node))
        .collect();

    let mut builder = ClusterClientBuilder::new(nodes);
    if let Some(username) = &params.username {
        builder = builder.username(username.clone());
    }
    if let Some(password) = &params.password {
        builder = builder.password(password.clone());
    }
    if let Some(bundle) = certs.filter(|_| params.ssl) {
        builder = builder.certs(bundle.to_tls());
    }

    let client = builder.build()?;
    let mut conn = client.get_async_connection().await?;
    identify(&mut conn, &params.lib_name).await;
    Ok(conn)
}
