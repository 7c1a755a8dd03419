mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use domain::{StoreError, UsageLogRecord, UsageLogStore, User, UserId};
use orchestrator::{IdentityMode, Orchestrator};

/// Store whose appends take a while to land.
struct SlowAppends {
    inner: Arc<RecordingStore>,
    delay: Duration,
}

#[async_trait]
impl UsageLogStore for SlowAppends {
    async fn append(&self, record: UsageLogRecord) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(record).await
    }

    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        self.inner.create_user(name).await
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        self.inner.get_user(id).await
    }
}

#[tokio::test]
async fn cancelled_dispatch_queues_no_side_effects() {
    let slow = RecordingBackend::slow("M", Duration::from_secs(5));
    let cache = RecordingCache::new();
    let store = RecordingStore::new();
    let gateway = orchestrator(
        registry(&[("m", slow.clone())]),
        Some(cache.clone()),
        Some(store.clone()),
        config(IdentityMode::Disabled),
    );

    let outcome = tokio::time::timeout(
        Duration::from_millis(30),
        gateway.process_request(request("P", None), Some("m")),
    )
    .await;
    assert!(outcome.is_err(), "caller deadline should win");
    assert_eq!(slow.calls(), 1);

    gateway.wait_idle().await;
    assert_eq!(cache.sets(), 0);
    assert!(store.records().is_empty());
    assert_eq!(gateway.metrics().detached_completed, 0);
}

#[tokio::test]
async fn queued_usage_log_lands_after_the_caller_is_gone() {
    let backend = RecordingBackend::replying("M", "hi", Some(sample_usage()));
    let store = RecordingStore::new();
    let gateway = Arc::new(
        Orchestrator::builder(registry(&[("m", backend)]))
            .config(config(IdentityMode::Disabled))
            .usage_store(Arc::new(SlowAppends {
                inner: store.clone(),
                delay: Duration::from_millis(50),
            }))
            .detached_pool(small_pool())
            .build(),
    );

    let caller = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            gateway
                .process_request(request("P", None), Some("m"))
                .await
                .map(|response| response.content)
        })
    };
    assert_eq!(caller.await.unwrap().unwrap(), "hi");
    assert!(store.records().is_empty());

    gateway.wait_idle().await;
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response, "hi");
}

#[tokio::test]
async fn aborting_the_caller_leaves_queued_work_running() {
    let backend = RecordingBackend::replying("M", "hi", None);
    let store = RecordingStore::new();
    let gateway = Arc::new(
        Orchestrator::builder(registry(&[("m", backend)]))
            .config(config(IdentityMode::Disabled))
            .usage_store(Arc::new(SlowAppends {
                inner: store.clone(),
                delay: Duration::from_millis(50),
            }))
            .detached_pool(small_pool())
            .build(),
    );

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let caller = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            let _ = gateway.process_request(request("P", None), Some("m")).await;
            let _ = done_tx.send(());
            std::future::pending::<()>().await;
        })
    };
    done_rx.await.unwrap();
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    gateway.wait_idle().await;
    assert_eq!(store.records().len(), 1);
}
