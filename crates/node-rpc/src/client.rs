//! Node RPC client trait and its JSON-RPC over HTTP implementation

use crate::config::NodeConfig;
use crate::error::{Result, RpcError};
use crate::types::{Block, Transaction};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Read-only view of a full node.
///
/// Unknown heights, hashes and txids fail with [`RpcError::NotFound`];
/// network-level failures fail with [`RpcError::Transient`].
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_chain_tip_height(&self) -> Result<u64>;

    async fn get_block_hash(&self, height: u64) -> Result<String>;

    async fn get_block(&self, hash: &str) -> Result<Block>;

    async fn get_transaction(&self, txid: &str) -> Result<Transaction>;

    async fn get_mempool_txids(&self) -> Result<Vec<String>>;

    /// Drop the current session and open a fresh one.
    async fn reconnect(&self) -> Result<()>;

    async fn get_block_by_height(&self, height: u64) -> Result<Block> {
        let hash = self.get_block_hash(height).await?;
        self.get_block(&hash).await
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 1.0 client for bitcoind-compatible nodes.
pub struct HttpNodeClient {
    endpoint: String,
    config: NodeConfig,
    http: RwLock<reqwest::Client>,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        Self::with_endpoint(endpoint, config)
    }

    /// Use an explicit endpoint URL instead of the one derived from host and port.
    pub fn with_endpoint(endpoint: impl Into<String>, config: NodeConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let endpoint = endpoint.into();
        info!("Node RPC client targeting {}", endpoint);

        Ok(Self {
            endpoint,
            config,
            http: RwLock::new(http),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        // Clone the handle so a concurrent reconnect never blocks on this call.
        let http = self.http.read().await.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc #{} {} {:?}", id, method, params);

        let request = RpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params,
        };

        let mut builder = http.post(&self.endpoint).json(&request);
        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.password.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Unauthorized);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(RpcError::Transient(format!("{} returned {}", method, status)));
        }

        let body = response.text().await?;

        // bitcoind reports errors with a non-2xx status and a JSON envelope.
        let envelope: RpcResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(RpcError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if let Some(error) = envelope.error {
            return Err(RpcError::from_node(error.code, error.message));
        }

        envelope
            .result
            .ok_or_else(|| RpcError::Decode(format!("{} returned no result", method)))
    }
}

fn build_http_client(config: &NodeConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .build()
        .map_err(|e| RpcError::Transient(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait]
impl NodeRpc for HttpNodeClient {
    async fn get_chain_tip_height(&self) -> Result<u64> {
        self.call("getblockcount", vec![]).await
    }

    async fn get_block_hash(&self, height: u64) -> Result<String> {
        self.call("getblockhash", vec![json!(height)]).await
    }

    async fn get_block(&self, hash: &str) -> Result<Block> {
        self.call("getblock", vec![json!(hash)]).await
    }

    async fn get_transaction(&self, txid: &str) -> Result<Transaction> {
        self.call("getrawtransaction", vec![json!(txid), json!(1)]).await
    }

    async fn get_mempool_txids(&self) -> Result<Vec<String>> {
        self.call("getrawmempool", vec![]).await
    }

    async fn reconnect(&self) -> Result<()> {
        let fresh = build_http_client(&self.config)?;
        *self.http.write().await = fresh;
        info!("Recreated node RPC session for {}", self.endpoint);
        Ok(())
    }
}
