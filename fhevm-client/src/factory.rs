//! Instance creation: simulated backend for development chains, relayer
//! otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::{MockChainConfig, DEV_CHAIN_ID};
use crate::error::{FhevmError, Result};
use crate::instance::FhevmInstance;
use crate::lifecycle::InstanceCreator;
use crate::loader::SdkLoader;
use crate::mock::MockInstance;
use crate::network::{Connectivity, HttpJsonRpc, NetworkContext, NetworkReader};

pub struct InstanceFactory {
    loader: Arc<SdkLoader>,
    mock: MockChainConfig,
}

impl InstanceFactory {
    pub fn new(loader: Arc<SdkLoader>) -> Self {
        Self {
            loader,
            mock: MockChainConfig::default(),
        }
    }

    pub fn with_mock_config(mut self, mock: MockChainConfig) -> Self {
        self.mock = mock;
        self
    }

    /// Whether `context` looks like a local development chain.
    pub fn targets_development(context: &NetworkContext) -> bool {
        context.network_id == Some(DEV_CHAIN_ID)
            || context
                .connectivity
                .as_ref()
                .is_some_and(Connectivity::is_loopback)
    }

    /// The caller's connectivity is only used to read the chain id; the
    /// simulated backend stays bound to its configured local endpoint.
    async fn create_simulated(&self, context: &NetworkContext) -> Result<MockInstance> {
        let reader: Arc<dyn NetworkReader> = match &context.connectivity {
            Some(connectivity) => connectivity.reader(),
            None => Arc::new(HttpJsonRpc::new(self.mock.rpc_url.clone())),
        };
        MockInstance::connect(self.mock.clone(), reader.as_ref()).await
    }

    async fn create_production(&self, context: &NetworkContext) -> Result<Arc<dyn FhevmInstance>> {
        let connectivity = context.connectivity.clone().ok_or_else(|| {
            FhevmError::Network("no connectivity handle for the production backend".into())
        })?;
        let loaded = self.loader.ensure_loaded().await?;
        loaded.ensure_initialized().await?;
        let sdk = loaded.sdk();
        sdk.create_instance(sdk.default_config(), connectivity).await
    }

    pub async fn create(&self, context: &NetworkContext) -> Result<Arc<dyn FhevmInstance>> {
        if Self::targets_development(context) {
            match self.create_simulated(context).await {
                Ok(instance) => {
                    info!("using simulated fhEVM backend");
                    return Ok(Arc::new(instance));
                }
                // Kept as a fallthrough; the production error is the one reported.
                Err(e) => warn!("simulated backend unavailable, trying relayer: {e}"),
            }
        } else {
            debug!("network {:?} is not a development chain", context.network_id);
        }

        self.create_production(context)
            .await
            .map_err(FhevmError::instance_creation)
    }
}

#[async_trait]
impl InstanceCreator for InstanceFactory {
    async fn create(&self, context: &NetworkContext) -> Result<Arc<dyn FhevmInstance>> {
        InstanceFactory::create(self, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::Ordering;

    use serde_json::{json, Value};

    use crate::config::{NetworkConfig, LOCAL_RPC_URL};
    use crate::loader::tests::CountingSource;
    use crate::loader::SdkSource;
    use crate::relayer::{RelayerInstance, RelayerSdk};

    struct ChainIdReader(u64);

    #[async_trait]
    impl NetworkReader for ChainIdReader {
        async fn request(&self, _method: &str, _params: Value) -> Result<Value> {
            Ok(Value::String(format!("0x{:x}", self.0)))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl NetworkReader for Unreachable {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            Err(FhevmError::Network(format!("{method}: connection refused")))
        }
    }

    struct OfflineSdk;

    #[async_trait]
    impl RelayerSdk for OfflineSdk {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        fn default_config(&self) -> NetworkConfig {
            NetworkConfig::sepolia()
        }

        async fn create_instance(
            &self,
            config: NetworkConfig,
            _network: Connectivity,
        ) -> Result<Arc<dyn FhevmInstance>> {
            Ok(Arc::new(RelayerInstance::new(config)))
        }
    }

    struct OfflineSource;

    #[async_trait]
    impl SdkSource for OfflineSource {
        async fn fetch(&self) -> Result<Arc<dyn RelayerSdk>> {
            Ok(Arc::new(OfflineSdk))
        }
    }

    /// Answers one JSON-RPC request over plain HTTP with `result`.
    fn serve_once(result: Value) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let body = json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        });
        url
    }

    fn provider(chain_id: u64) -> Connectivity {
        Connectivity::Provider(Arc::new(ChainIdReader(chain_id)))
    }

    #[test]
    fn development_detection() {
        assert!(InstanceFactory::targets_development(&NetworkContext::from_url(
            "http://localhost:8545",
            None
        )));
        assert!(InstanceFactory::targets_development(&NetworkContext::new(
            provider(1),
            Some(DEV_CHAIN_ID)
        )));
        assert!(!InstanceFactory::targets_development(&NetworkContext::new(
            provider(1),
            Some(11155111)
        )));
    }

    #[tokio::test]
    async fn development_chain_never_touches_loader() {
        let source = Arc::new(CountingSource::new(false));
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(source.clone())));

        let ctx = NetworkContext::new(provider(DEV_CHAIN_ID), Some(DEV_CHAIN_ID));
        let instance = factory.create(&ctx).await.unwrap();

        assert_eq!(instance.chain_id(), DEV_CHAIN_ID);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn simulated_backend_stays_on_local_endpoint() {
        let url = serve_once(json!("0x7a69"));
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(Arc::new(OfflineSource))));
        let ctx = NetworkContext::from_url(url.clone(), None);
        assert!(InstanceFactory::targets_development(&ctx));

        let mock = factory.create_simulated(&ctx).await.unwrap();
        assert_eq!(mock.config().rpc_url, LOCAL_RPC_URL);
        assert_ne!(mock.config().rpc_url, url);
    }

    #[tokio::test]
    async fn production_chain_uses_sdk() {
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(Arc::new(OfflineSource))));
        let ctx = NetworkContext::new(provider(11155111), Some(11155111));
        let instance = factory.create(&ctx).await.unwrap();
        assert_eq!(instance.chain_id(), 11155111);
    }

    #[tokio::test]
    async fn simulated_failure_falls_through_to_production() {
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(Arc::new(OfflineSource))));
        // Dev network id, but the endpoint reports Sepolia: simulated path fails.
        let ctx = NetworkContext::new(provider(11155111), Some(DEV_CHAIN_ID));
        let instance = factory.create(&ctx).await.unwrap();
        assert_eq!(instance.chain_id(), 11155111);
    }

    #[tokio::test]
    async fn both_paths_failing_reports_production_error() {
        let source = Arc::new(CountingSource::new(true));
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(source.clone())));
        let ctx = NetworkContext::new(
            Connectivity::Provider(Arc::new(Unreachable)),
            Some(DEV_CHAIN_ID),
        );

        match factory.create(&ctx).await {
            Err(FhevmError::InstanceCreation { source: inner }) => {
                assert!(matches!(*inner, FhevmError::Load(_)));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("creation should fail"),
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnected_context_fails() {
        let factory = InstanceFactory::new(Arc::new(SdkLoader::new(Arc::new(OfflineSource))));
        let err = factory
            .create(&NetworkContext::disconnected())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FhevmError::InstanceCreation { .. }));
    }
}
