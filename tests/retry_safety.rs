//! End-to-end retry-safety scenario: an idempotent write-and-read-back
//! operation driven into repeated chaos failures must converge to exactly one
//! committed row, no matter how many attempts were told they "failed".

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use txguard::{
    configure, inject_after, retry, transactional, ChaosKey, ChaosProfile, FailureKind,
    IsolationLevel, RetryPolicy,
};

use mock_store::MockStore;

// Serializes access to the process-global chaos switch.
static CHAOS_GUARD: Mutex<()> = Mutex::new(());

#[tokio::test(start_paused = true)]
async fn retried_write_commits_exactly_one_row_under_injected_faults() {
    let _guard = CHAOS_GUARD.lock();
    configure(true, 42);

    let store = MockStore::new();
    let profile =
        ChaosProfile::errors_only("flaky-commit", 0.25, ChaosProfile::UNLIMITED_ERRORS).unwrap();
    let key = ChaosKey::new("order-commit", profile);

    let policy = RetryPolicy::new(
        [FailureKind::ChaosInjected],
        5,
        Duration::from_millis(10),
        Duration::from_millis(200),
        2.0,
        0.2,
    )
    .unwrap();

    let invocations = AtomicU32::new(0);

    // Each attempt opens a write transaction, applies the write, and reads it
    // back. The chaos after-shape lets the write land before reporting
    // failure, so a failed attempt leaves exactly the state a real
    // post-commit fault would.
    let table = &store;
    let commit_site = &key;
    let calls = &invocations;
    let result = retry(&policy, move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        transactional(false, IsolationLevel::ReadCommitted, async move {
            inject_after(Some(commit_site), move || async move {
                table.upsert("order-1", 100)?;
                Ok(())
            })
            .await?;
            Ok(table.get("order-1"))
        })
        .await
    })
    .await;

    // Whatever the retry outcome, the store must hold exactly one committed
    // row for the key; the idempotent write makes repeats invisible.
    assert_eq!(store.row_count(), 1);
    assert_eq!(store.get("order-1"), Some(100));

    let attempts = invocations.load(Ordering::SeqCst);
    assert!(
        (1..=policy.max_attempts() + 1).contains(&attempts),
        "attempts {attempts}"
    );

    // On the success path the read-back must reflect the committed row.
    if let Ok(read_back) = result {
        assert_eq!(read_back, Some(100));
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_still_leave_consistent_state() {
    let _guard = CHAOS_GUARD.lock();
    configure(true, 7);

    let store = MockStore::new();
    // Every attempt fails: rate 1.0, budget beyond the attempt count.
    let profile =
        ChaosProfile::errors_only("always-fails", 1.0, ChaosProfile::UNLIMITED_ERRORS).unwrap();
    let key = ChaosKey::new("doomed-commit", profile);

    let policy = RetryPolicy::new(
        [FailureKind::ChaosInjected],
        3,
        Duration::from_millis(5),
        Duration::from_millis(50),
        2.0,
        0.0,
    )
    .unwrap();

    let invocations = AtomicU32::new(0);

    let table = &store;
    let commit_site = &key;
    let calls = &invocations;
    let result: txguard::Result<()> = retry(&policy, move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        inject_after(Some(commit_site), move || async move {
            table.upsert("row", 1)?;
            Ok(())
        })
        .await
    })
    .await;

    assert!(result.is_err());
    assert_eq!(invocations.load(Ordering::SeqCst), policy.max_attempts() + 1);
    // The write was applied on every attempt, yet idempotence keeps exactly
    // one row committed.
    assert_eq!(store.row_count(), 1);
    assert_eq!(key.errors_injected() as u32, policy.max_attempts() + 1);
}
