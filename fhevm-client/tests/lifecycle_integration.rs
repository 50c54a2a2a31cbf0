//! Lifecycle ordering tests: only the latest submitted context may commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fhevm_client::mock::MockInstance;
use fhevm_client::prelude::*;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Outcome = fhevm_client::error::Result<Arc<dyn FhevmInstance>>;

/// Creator whose attempts resolve only when the test says so.
#[derive(Default)]
struct ScriptedCreator {
    pending: Mutex<HashMap<u64, oneshot::Receiver<Outcome>>>,
}

impl ScriptedCreator {
    fn script(&self, network_id: u64) -> oneshot::Sender<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(network_id, rx);
        tx
    }
}

#[async_trait]
impl InstanceCreator for ScriptedCreator {
    async fn create(&self, context: &NetworkContext) -> Outcome {
        let id = context.network_id.unwrap_or_default();
        let rx = self.pending.lock().unwrap().remove(&id);
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(FhevmError::Network("script dropped".into()))),
            None => Err(FhevmError::Network(format!("no script for {id}"))),
        }
    }
}

fn ctx(id: u64) -> NetworkContext {
    NetworkContext::from_url(format!("https://rpc-{id}.example"), Some(id))
}

fn instance_on(chain_id: u64) -> Arc<dyn FhevmInstance> {
    Arc::new(MockInstance::new(MockChainConfig {
        chain_id,
        ..MockChainConfig::default()
    }))
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_context_wins_when_earlier_attempts_resolve_late() {
    let creator = Arc::new(ScriptedCreator::default());
    let a = creator.script(1);
    let b = creator.script(2);
    let c = creator.script(3);
    let lifecycle = InstanceLifecycle::new(creator.clone());

    lifecycle.set_context(ctx(1));
    settle().await;
    lifecycle.set_context(ctx(2));
    settle().await;
    lifecycle.set_context(ctx(3));
    assert_eq!(lifecycle.status(), LifecycleStatus::Loading);

    c.send(Ok(instance_on(3))).ok();
    let snapshot = lifecycle.wait_settled().await;
    assert_eq!(snapshot.status, LifecycleStatus::Ready);
    assert_eq!(snapshot.instance.as_ref().unwrap().chain_id(), 3);

    // Late results for A and B land nowhere.
    a.send(Ok(instance_on(1))).ok();
    b.send(Err(FhevmError::Network("late failure".into()))).ok();
    settle().await;

    let snapshot = lifecycle.snapshot();
    assert_eq!(snapshot.status, LifecycleStatus::Ready);
    assert_eq!(snapshot.instance.unwrap().chain_id(), 3);
    assert_eq!(lifecycle.context(), Some(ctx(3)));
}

#[tokio::test]
async fn loading_clears_previous_instance() {
    let creator = Arc::new(ScriptedCreator::default());
    let first = creator.script(1);
    let _second = creator.script(2);
    let lifecycle = InstanceLifecycle::new(creator.clone());

    lifecycle.set_context(ctx(1));
    first.send(Ok(instance_on(1))).ok();
    assert!(lifecycle.wait_settled().await.is_ready());

    lifecycle.set_context(ctx(2));
    let snapshot = lifecycle.snapshot();
    assert_eq!(snapshot.status, LifecycleStatus::Loading);
    assert!(snapshot.instance.is_none());
}

// ---------------------------------------------------------------------------
// Error and recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_state_until_context_changes() {
    let creator = Arc::new(ScriptedCreator::default());
    let failing = creator.script(5);
    let ok = creator.script(6);
    let lifecycle = InstanceLifecycle::new(creator.clone());

    lifecycle.set_context(ctx(5));
    failing
        .send(Err(FhevmError::InstanceCreation {
            source: Box::new(FhevmError::Load("offline".into())),
        }))
        .ok();
    let snapshot = lifecycle.wait_settled().await;
    assert_eq!(snapshot.status, LifecycleStatus::Error);
    assert!(snapshot.instance.is_none());
    assert!(snapshot.error.unwrap().to_string().contains("offline"));

    // Same context again: nothing restarts.
    lifecycle.set_context(ctx(5));
    assert_eq!(lifecycle.status(), LifecycleStatus::Error);

    lifecycle.set_context(ctx(6));
    ok.send(Ok(instance_on(6))).ok();
    assert!(lifecycle.wait_settled().await.is_ready());
}

#[tokio::test]
async fn losing_connectivity_returns_to_idle() {
    let creator = Arc::new(ScriptedCreator::default());
    let tx = creator.script(1);
    let lifecycle = InstanceLifecycle::new(creator.clone());

    lifecycle.set_context(ctx(1));
    tx.send(Ok(instance_on(1))).ok();
    lifecycle.wait_settled().await;

    lifecycle.set_context(NetworkContext::disconnected());
    let snapshot = lifecycle.snapshot();
    assert_eq!(snapshot.status, LifecycleStatus::Idle);
    assert!(snapshot.instance.is_none());
    assert!(snapshot.error.is_none());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_abandons_in_flight_attempt() {
    let creator = Arc::new(ScriptedCreator::default());
    let tx = creator.script(1);
    let lifecycle = InstanceLifecycle::new(creator.clone());
    let mut updates = lifecycle.subscribe();

    lifecycle.set_context(ctx(1));
    settle().await;
    lifecycle.shutdown();
    tx.send(Ok(instance_on(1))).ok();
    settle().await;

    assert_eq!(lifecycle.status(), LifecycleStatus::Idle);
    assert!(lifecycle.instance().is_none());
    assert_eq!(updates.borrow_and_update().status, LifecycleStatus::Idle);
}

#[tokio::test]
async fn dropping_the_controller_is_clean() {
    let creator = Arc::new(ScriptedCreator::default());
    let tx = creator.script(1);
    let lifecycle = InstanceLifecycle::new(creator.clone());
    let updates = lifecycle.subscribe();

    lifecycle.set_context(ctx(1));
    drop(lifecycle);
    tx.send(Ok(instance_on(1))).ok();
    settle().await;

    assert_eq!(updates.borrow().status, LifecycleStatus::Loading);
}
