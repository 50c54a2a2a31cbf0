//! Idle / loading / ready / error state machine around instance creation.
//!
//! Every context change starts a new creation attempt tagged with a
//! generation number and aborts the previous task. An attempt commits its
//! outcome only if its generation is still current, so the published state
//! always reflects the most recently submitted context.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{FhevmError, Result};
use crate::instance::FhevmInstance;
use crate::network::NetworkContext;

#[async_trait]
pub trait InstanceCreator: Send + Sync {
    async fn create(&self, context: &NetworkContext) -> Result<Arc<dyn FhevmInstance>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// What consumers observe. `instance` is set only in `Ready`, `error` only in `Error`.
#[derive(Clone)]
pub struct LifecycleSnapshot {
    pub instance: Option<Arc<dyn FhevmInstance>>,
    pub status: LifecycleStatus,
    pub error: Option<Arc<FhevmError>>,
}

impl LifecycleSnapshot {
    fn with_status(status: LifecycleStatus) -> Self {
        Self {
            instance: None,
            status,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == LifecycleStatus::Ready
    }
}

impl fmt::Debug for LifecycleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleSnapshot")
            .field(
                "instance",
                &self.instance.as_ref().map(|i| format!("chain {}", i.chain_id())),
            )
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}

struct Inner {
    generation: u64,
    context: Option<NetworkContext>,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    state: watch::Sender<LifecycleSnapshot>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(&self, generation: u64, outcome: Result<Arc<dyn FhevmInstance>>) {
        // Lock held across the send so a newer attempt cannot interleave.
        let inner = self.lock();
        if inner.generation != generation {
            debug!(
                "discarding result of superseded attempt {} (current {})",
                generation, inner.generation
            );
            return;
        }
        let snapshot = match outcome {
            Ok(instance) => {
                info!("fhEVM instance ready on chain {}", instance.chain_id());
                LifecycleSnapshot {
                    instance: Some(instance),
                    status: LifecycleStatus::Ready,
                    error: None,
                }
            }
            Err(e) => {
                error!("fhEVM instance creation failed: {e}");
                LifecycleSnapshot {
                    instance: None,
                    status: LifecycleStatus::Error,
                    error: Some(Arc::new(e)),
                }
            }
        };
        self.state.send_replace(snapshot);
    }

    fn abandon(&self, inner: &mut Inner) {
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
    }
}

/// Owns the current instance for one consuming session.
pub struct InstanceLifecycle {
    creator: Arc<dyn InstanceCreator>,
    shared: Arc<Shared>,
}

impl InstanceLifecycle {
    pub fn new(creator: Arc<dyn InstanceCreator>) -> Self {
        let (state, _) = watch::channel(LifecycleSnapshot::with_status(LifecycleStatus::Idle));
        Self {
            creator,
            shared: Arc::new(Shared {
                state,
                inner: Mutex::new(Inner {
                    generation: 0,
                    context: None,
                    task: None,
                }),
            }),
        }
    }

    /// Submit the current network context.
    ///
    /// An unchanged context is a no-op. Otherwise the in-flight attempt is
    /// abandoned and, if the context has connectivity, a new one is spawned.
    /// Must be called from within a Tokio runtime.
    pub fn set_context(&self, context: NetworkContext) {
        let mut inner = self.shared.lock();
        if inner.context.as_ref() == Some(&context) {
            return;
        }
        self.shared.abandon(&mut inner);
        let generation = inner.generation;
        inner.context = Some(context.clone());

        if context.connectivity.is_none() {
            debug!("no connectivity, lifecycle idle");
            self.shared
                .state
                .send_replace(LifecycleSnapshot::with_status(LifecycleStatus::Idle));
            return;
        }

        debug!("starting creation attempt {generation}");
        self.shared
            .state
            .send_replace(LifecycleSnapshot::with_status(LifecycleStatus::Loading));

        let shared = self.shared.clone();
        let creator = self.creator.clone();
        inner.task = Some(tokio::spawn(async move {
            let outcome = creator.create(&context).await;
            shared.commit(generation, outcome);
        }));
    }

    pub fn context(&self) -> Option<NetworkContext> {
        self.shared.lock().context.clone()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.shared.state.borrow().clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.shared.state.borrow().status
    }

    pub fn instance(&self) -> Option<Arc<dyn FhevmInstance>> {
        self.shared.state.borrow().instance.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.shared.state.subscribe()
    }

    /// Wait until the current attempt (if any) has committed.
    pub async fn wait_settled(&self) -> LifecycleSnapshot {
        let mut rx = self.shared.state.subscribe();
        let settled = rx
            .wait_for(|s| s.status != LifecycleStatus::Loading)
            .await
            .map(|s| LifecycleSnapshot::clone(&s));
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// End the session: abandon any in-flight attempt and return to idle.
    pub fn shutdown(&self) {
        let mut inner = self.shared.lock();
        self.shared.abandon(&mut inner);
        inner.context = None;
        self.shared
            .state
            .send_replace(LifecycleSnapshot::with_status(LifecycleStatus::Idle));
    }
}

impl Drop for InstanceLifecycle {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        self.shared.abandon(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::MockChainConfig;
    use crate::mock::MockInstance;
    use crate::network::Connectivity;

    /// Resolves after a delay derived from the network id.
    struct DelayedCreator;

    #[async_trait]
    impl InstanceCreator for DelayedCreator {
        async fn create(&self, context: &NetworkContext) -> Result<Arc<dyn FhevmInstance>> {
            let id = context.network_id.unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(id * 10)).await;
            if id == 0 {
                return Err(FhevmError::Network("no chain".into()));
            }
            Ok(Arc::new(MockInstance::new(MockChainConfig {
                chain_id: id,
                ..MockChainConfig::default()
            })))
        }
    }

    fn ctx(id: u64) -> NetworkContext {
        NetworkContext::new(Connectivity::Url(format!("http://node-{id}")), Some(id))
    }

    #[tokio::test]
    async fn starts_idle() {
        let lc = InstanceLifecycle::new(Arc::new(DelayedCreator));
        assert_eq!(lc.status(), LifecycleStatus::Idle);
        assert!(lc.instance().is_none());
        lc.set_context(NetworkContext::disconnected());
        assert_eq!(lc.status(), LifecycleStatus::Idle);
    }

    #[tokio::test]
    async fn loading_then_ready() {
        let lc = InstanceLifecycle::new(Arc::new(DelayedCreator));
        lc.set_context(ctx(2));
        assert_eq!(lc.status(), LifecycleStatus::Loading);
        let snap = lc.wait_settled().await;
        assert!(snap.is_ready());
        assert_eq!(snap.instance.unwrap().chain_id(), 2);
    }

    #[tokio::test]
    async fn slow_earlier_attempt_does_not_overwrite() {
        let lc = InstanceLifecycle::new(Arc::new(DelayedCreator));
        lc.set_context(ctx(9));
        lc.set_context(ctx(1));
        let snap = lc.wait_settled().await;
        assert_eq!(snap.instance.unwrap().chain_id(), 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(lc.instance().unwrap().chain_id(), 1);
    }

    #[tokio::test]
    async fn same_context_is_noop() {
        let lc = InstanceLifecycle::new(Arc::new(DelayedCreator));
        lc.set_context(ctx(1));
        lc.wait_settled().await;
        let before = lc.instance().unwrap();
        lc.set_context(ctx(1));
        assert_eq!(lc.status(), LifecycleStatus::Ready);
        assert!(Arc::ptr_eq(&before, &lc.instance().unwrap()));
    }

    #[tokio::test]
    async fn failure_publishes_error() {
        let lc = InstanceLifecycle::new(Arc::new(DelayedCreator));
        lc.set_context(NetworkContext::from_url("http://nowhere", None));
        let snap = lc.wait_settled().await;
        assert_eq!(snap.status, LifecycleStatus::Error);
        assert!(snap.instance.is_none());
        assert!(matches!(
            snap.error.as_deref(),
            Some(FhevmError::Network(_))
        ));
    }
}
