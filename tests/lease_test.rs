mod common;

use bucket_migrator::models::QueueMessage;
use bucket_migrator::services::lease::{LeaseManager, LeaseOutcome};
use common::FakeQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const VISIBILITY: Duration = Duration::from_secs(7200);
const EXTEND_EVERY: Duration = Duration::from_secs(300);

fn message(id: &str) -> QueueMessage {
    QueueMessage {
        id: id.to_string(),
        body: "{}".to_string(),
        receipt: format!("receipt-{}", id),
    }
}

fn manager() -> (Arc<FakeQueue>, LeaseManager) {
    let queue = Arc::new(FakeQueue::new());
    let leases = LeaseManager::new(queue.clone(), VISIBILITY, EXTEND_EVERY);
    (queue, leases)
}

#[tokio::test(start_paused = true)]
async fn test_touch_is_noop_within_interval() {
    let (queue, leases) = manager();
    let cancel = CancellationToken::new();
    let mut lease = leases.acquire(&message("m1"));

    tokio::time::advance(Duration::from_secs(299)).await;

    assert!(!leases.touch(&mut lease, &cancel).await);
    assert_eq!(queue.extension_count(), 0);
    assert_eq!(lease.extensions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_touch_extends_after_interval() {
    let (queue, leases) = manager();
    let cancel = CancellationToken::new();
    let mut lease = leases.acquire(&message("m1"));
    let first_deadline = lease.deadline();

    tokio::time::advance(EXTEND_EVERY).await;
    assert!(leases.touch(&mut lease, &cancel).await);

    assert_eq!(
        queue.extensions.lock().unwrap().clone(),
        vec![("receipt-m1".to_string(), VISIBILITY)]
    );
    assert_eq!(lease.extensions(), 1);
    assert_eq!(lease.deadline(), Instant::now() + VISIBILITY);
    assert!(lease.deadline() > first_deadline);

    // The interval restarts from the extension just made.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!leases.touch(&mut lease, &cancel).await);
    assert_eq!(queue.extension_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_extension_after_cancel() {
    let (queue, leases) = manager();
    let cancel = CancellationToken::new();
    let mut lease = leases.acquire(&message("m1"));

    cancel.cancel();
    tokio::time::advance(Duration::from_secs(3600)).await;

    assert!(!leases.touch(&mut lease, &cancel).await);
    assert_eq!(queue.extension_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_extension_failure_is_not_fatal() {
    let (queue, leases) = manager();
    let cancel = CancellationToken::new();
    let mut lease = leases.acquire(&message("m1"));
    let deadline = lease.deadline();
    queue.fail_extensions();

    tokio::time::advance(EXTEND_EVERY).await;

    assert!(!leases.touch(&mut lease, &cancel).await);
    assert_eq!(lease.extensions(), 0);
    assert_eq!(lease.deadline(), deadline);
}

#[tokio::test]
async fn test_release_success_deletes_message() {
    let (queue, leases) = manager();
    let lease = leases.acquire(&message("m1"));
    assert_eq!(lease.message_id(), "m1");

    leases.release(lease, LeaseOutcome::Success).await.unwrap();

    assert_eq!(queue.deleted(), vec!["receipt-m1".to_string()]);
}

#[tokio::test]
async fn test_release_without_success_keeps_message() {
    let (queue, leases) = manager();

    let failed = leases.acquire(&message("m1"));
    leases.release(failed, LeaseOutcome::Failure).await.unwrap();

    let cancelled = leases.acquire(&message("m2"));
    leases.release(cancelled, LeaseOutcome::Cancelled).await.unwrap();

    assert!(queue.deleted().is_empty());
    assert_eq!(queue.extension_count(), 0);
}
