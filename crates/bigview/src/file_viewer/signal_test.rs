//! Tests for the coalescing update signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::signal::UpdateSignal;
use super::test_support::wait_until;

#[test]
fn raises_collapse_into_one_wake_up() {
    let signal = UpdateSignal::new();
    let cancelled = AtomicBool::new(false);
    for _ in 0..100 {
        signal.raise();
    }
    assert!(signal.is_pending());
    assert!(signal.wait(&cancelled));
    assert!(!signal.is_pending());
}

#[test]
fn wait_blocks_until_raised() {
    let signal = Arc::new(UpdateSignal::new());
    let cancelled = Arc::new(AtomicBool::new(false));
    let wakeups = Arc::new(AtomicUsize::new(0));

    let worker = {
        let (signal, cancelled, wakeups) = (Arc::clone(&signal), Arc::clone(&cancelled), Arc::clone(&wakeups));
        thread::spawn(move || {
            while signal.wait(&cancelled) {
                wakeups.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(wakeups.load(Ordering::SeqCst), 0);

    signal.raise();
    assert!(wait_until(Duration::from_secs(2), || wakeups.load(Ordering::SeqCst) == 1));

    cancelled.store(true, Ordering::SeqCst);
    signal.wake();
    worker.join().unwrap();
    assert_eq!(wakeups.load(Ordering::SeqCst), 1);
}

#[test]
fn cancellation_wins_over_a_pending_update() {
    let signal = UpdateSignal::new();
    let cancelled = AtomicBool::new(true);
    signal.raise();
    assert!(!signal.wait(&cancelled));
}
