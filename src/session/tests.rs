use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;

const WINDOW: Duration = Duration::from_millis(100);

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move || {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_fires_once_after_duration() {
    let timeout = SessionTimeout::new();
    let (fired, on_expire) = counter();

    timeout.start(on_expire, WINDOW);
    assert!(timeout.is_pending());

    advance(99).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!timeout.is_expired());

    advance(2).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(timeout.is_expired());
    assert!(!timeout.is_pending());

    advance(500).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_fire() {
    let timeout = SessionTimeout::new();
    let (fired, on_expire) = counter();

    timeout.start(on_expire, WINDOW);
    advance(50).await;
    timeout.cancel();
    advance(200).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!timeout.is_expired());
    assert!(!timeout.is_pending());
    assert_eq!(timeout.remaining(), None);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_timer_is_noop() {
    let timeout = SessionTimeout::new();
    timeout.cancel();
    assert!(!timeout.is_pending());
    assert!(!timeout.is_expired());
}

#[tokio::test(start_paused = true)]
async fn test_reset_restarts_full_window() {
    let timeout = SessionTimeout::new();
    let (first, on_first) = counter();
    let (second, on_second) = counter();

    timeout.start(on_first, WINDOW);
    advance(50).await;
    timeout.reset(on_second, WINDOW);

    advance(99).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 0);

    advance(2).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_replaces_pending_timer() {
    let timeout = SessionTimeout::new();
    let (first, on_first) = counter();
    let (second, on_second) = counter();

    timeout.start(on_first, WINDOW);
    timeout.start(on_second, WINDOW * 2);

    advance(250).await;
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_clears_expired_flag() {
    let timeout = SessionTimeout::new();
    let (_, on_first) = counter();
    let (_, on_second) = counter();

    timeout.start(on_first, WINDOW);
    advance(101).await;
    assert!(timeout.is_expired());

    timeout.start(on_second, WINDOW);
    assert!(!timeout.is_expired());
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let timeout = SessionTimeout::new();
    assert_eq!(timeout.remaining(), None);

    let (_, on_expire) = counter();
    timeout.start(on_expire, WINDOW);
    advance(40).await;

    let left = timeout.remaining().unwrap();
    assert!(left <= Duration::from_millis(60));
    assert!(left >= Duration::from_millis(58));
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_timer() {
    let timeout = SessionTimeout::new();
    let observer = timeout.clone();
    let (_, on_expire) = counter();

    timeout.start(on_expire, WINDOW);
    observer.cancel();
    advance(200).await;

    assert!(!timeout.is_expired());
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_duration_stays_pending() {
    let timeout = SessionTimeout::new();
    let (fired, on_expire) = counter();

    timeout.start(on_expire, Duration::MAX);
    assert!(timeout.is_pending());
    assert_eq!(timeout.remaining(), None);

    advance(60_000).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    timeout.cancel();
    assert!(!timeout.is_pending());
    assert!(!timeout.is_expired());
}
