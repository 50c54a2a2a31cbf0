//! One-shot loader for the relayer SDK capability.
//!
//! The SDK is process-wide state: it is fetched at most once and
//! initialized at most once. The fetch runs on a task owned by the loader,
//! so a caller that is cancelled mid-fetch neither cancels nor restarts it.
//! Callers that arrive while a fetch is in flight wait on that same fetch
//! and observe its outcome. A failed fetch is reported to every waiter and
//! is not retried automatically; the next explicit `ensure_loaded` starts a
//! fresh attempt.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use tokio::sync::{watch, OnceCell};

use crate::error::{FhevmError, Result};
use crate::relayer::{HttpSdkSource, RelayerSdk};

/// Where the SDK capability comes from.
#[async_trait]
pub trait SdkSource: Send + Sync {
    async fn fetch(&self) -> Result<Arc<dyn RelayerSdk>>;
}

/// A fetched SDK plus its one-time initialization latch.
pub struct LoadedSdk {
    sdk: Arc<dyn RelayerSdk>,
    initialized: OnceCell<()>,
}

impl LoadedSdk {
    fn new(sdk: Arc<dyn RelayerSdk>) -> Self {
        Self {
            sdk,
            initialized: OnceCell::new(),
        }
    }

    pub fn sdk(&self) -> &Arc<dyn RelayerSdk> {
        &self.sdk
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Run backend initialization unless it already succeeded.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                debug!("initializing relayer SDK");
                self.sdk.init().await
            })
            .await
            .map(|_| ())
    }
}

type Outcome = std::result::Result<Arc<LoadedSdk>, String>;

/// One fetch in flight or settled. `None` until the fetch task reports.
#[derive(Clone)]
struct Attempt {
    outcome: watch::Receiver<Option<Outcome>>,
}

impl Attempt {
    fn is_loaded(&self) -> bool {
        self.outcome.borrow().as_ref().is_some_and(|o| o.is_ok())
    }

    fn has_failed(&self) -> bool {
        self.outcome.borrow().as_ref().is_some_and(|o| o.is_err())
    }

    async fn settled(mut self) -> Outcome {
        let outcome = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err("relayer SDK fetch task ended without a result".into()))
    }
}

pub struct SdkLoader {
    source: Arc<dyn SdkSource>,
    attempt: Mutex<Option<Attempt>>,
}

static GLOBAL: Lazy<Arc<SdkLoader>> =
    Lazy::new(|| Arc::new(SdkLoader::new(Arc::new(HttpSdkSource::default()))));

impl SdkLoader {
    pub fn new(source: Arc<dyn SdkSource>) -> Self {
        Self {
            source,
            attempt: Mutex::new(None),
        }
    }

    /// The process-wide loader, fetching from the fixed SDK location.
    pub fn global() -> Arc<SdkLoader> {
        GLOBAL.clone()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Attempt>> {
        self.attempt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a fetch has completed successfully.
    pub fn is_loaded(&self) -> bool {
        self.slot().as_ref().is_some_and(Attempt::is_loaded)
    }

    fn start_fetch(&self) -> Attempt {
        let (tx, rx) = watch::channel(None);
        let source = self.source.clone();
        tokio::spawn(async move {
            info!("fetching relayer SDK");
            let outcome = match source.fetch().await {
                Ok(sdk) => Ok(Arc::new(LoadedSdk::new(sdk))),
                Err(e) => {
                    warn!("relayer SDK fetch failed: {e}");
                    Err(e.to_string())
                }
            };
            tx.send_replace(Some(outcome));
        });
        Attempt { outcome: rx }
    }

    /// Resolve to the loaded SDK, fetching it if no usable attempt exists.
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedSdk>> {
        let attempt = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(attempt) if !attempt.has_failed() => attempt.clone(),
                _ => {
                    let attempt = self.start_fetch();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };
        attempt.settled().await.map_err(FhevmError::Load)
    }
}
