//! Network-reading capability and the context an instance is bound to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{FhevmError, Result};
use crate::http;

/// Something that can issue JSON-RPC read calls against a chain.
///
/// Supplied by the wallet bootstrap layer; `HttpJsonRpc` is the plain
/// HTTP implementation.
#[async_trait]
pub trait NetworkReader: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    async fn chain_id(&self) -> Result<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&value)
    }
}

/// Parse a JSON-RPC quantity (`"0x7a69"` or a bare number).
pub fn parse_quantity(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FhevmError::Network(format!("invalid quantity: {n}"))),
        Value::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(digits, 16)
                .map_err(|_| FhevmError::Network(format!("invalid quantity: {s}")))
        }
        other => Err(FhevmError::Network(format!("invalid quantity: {other}"))),
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// JSON-RPC over HTTP.
pub struct HttpJsonRpc {
    url: String,
    next_id: AtomicU64,
}

impl HttpJsonRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NetworkReader for HttpJsonRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let resp: RpcResponse = http::post_json(self.url.clone(), body)
            .await
            .map_err(FhevmError::Network)?;

        if let Some(err) = resp.error {
            let data = err.data.map(|d| format!(" ({d})")).unwrap_or_default();
            return Err(FhevmError::Network(format!(
                "{method} failed with code {}: {}{data}",
                err.code, err.message
            )));
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }
}

/// How an instance reaches its chain: an RPC URL, or an injected reader.
#[derive(Clone)]
pub enum Connectivity {
    Url(String),
    Provider(Arc<dyn NetworkReader>),
}

impl Connectivity {
    pub fn reader(&self) -> Arc<dyn NetworkReader> {
        match self {
            Connectivity::Url(url) => Arc::new(HttpJsonRpc::new(url.clone())),
            Connectivity::Provider(reader) => reader.clone(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Connectivity::Url(url) => Some(url),
            Connectivity::Provider(_) => None,
        }
    }

    /// Whether this connectivity addresses a loopback endpoint.
    pub fn is_loopback(&self) -> bool {
        self.url().is_some_and(is_loopback_url)
    }
}

impl PartialEq for Connectivity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Connectivity::Url(a), Connectivity::Url(b)) => a == b,
            (Connectivity::Provider(a), Connectivity::Provider(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl Eq for Connectivity {}

impl fmt::Debug for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Connectivity::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

pub fn is_loopback_url(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    let host = if host.starts_with('[') {
        host.split_once(']').map_or(host, |(h, _)| h).trim_start_matches('[')
    } else {
        host.split(':').next().unwrap_or_default()
    };
    matches!(host, "localhost" | "::1") || host.starts_with("127.")
}

/// Which chain a cryptographic instance is bound to.
///
/// A change of either field forces a new instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkContext {
    pub connectivity: Option<Connectivity>,
    pub network_id: Option<u64>,
}

impl NetworkContext {
    pub fn new(connectivity: Connectivity, network_id: Option<u64>) -> Self {
        Self {
            connectivity: Some(connectivity),
            network_id,
        }
    }

    pub fn from_url(url: impl Into<String>, network_id: Option<u64>) -> Self {
        Self::new(Connectivity::Url(url.into()), network_id)
    }

    pub fn from_provider(reader: Arc<dyn NetworkReader>, network_id: Option<u64>) -> Self {
        Self::new(Connectivity::Provider(reader), network_id)
    }

    /// A context with no connectivity handle; keeps the lifecycle idle.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChain(u64);

    #[async_trait]
    impl NetworkReader for FixedChain {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            assert_eq!(method, "eth_chainId");
            Ok(Value::String(format!("0x{:x}", self.0)))
        }
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_url("http://localhost:8545"));
        assert!(is_loopback_url("http://127.0.0.1:8545/"));
        assert!(is_loopback_url("http://[::1]:8545"));
        assert!(is_loopback_url("localhost:8545"));
        assert!(!is_loopback_url("https://sepolia.infura.io/v3/key"));
        assert!(!is_loopback_url("https://localhost.example.com"));
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity(&json!("0x7a69")).unwrap(), 31337);
        assert_eq!(parse_quantity(&json!(11155111)).unwrap(), 11155111);
        assert!(parse_quantity(&json!("0xzz")).is_err());
        assert!(parse_quantity(&Value::Null).is_err());
    }

    #[tokio::test]
    async fn default_chain_id_goes_through_request() {
        let reader = FixedChain(31337);
        assert_eq!(reader.chain_id().await.unwrap(), 31337);
    }

    #[test]
    fn provider_equality_is_identity() {
        let a: Arc<dyn NetworkReader> = Arc::new(FixedChain(1));
        let b: Arc<dyn NetworkReader> = Arc::new(FixedChain(1));
        assert_eq!(
            Connectivity::Provider(a.clone()),
            Connectivity::Provider(a.clone())
        );
        assert_ne!(Connectivity::Provider(a), Connectivity::Provider(b));
        assert_eq!(
            NetworkContext::from_url("http://localhost:8545", Some(31337)),
            NetworkContext::from_url("http://localhost:8545", Some(31337))
        );
    }
}
