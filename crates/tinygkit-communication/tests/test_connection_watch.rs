//! Tests for firmware::connection_watch

use crossbeam_channel::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use tinygkit_communication::firmware::connection_watch::*;

#[test]
fn test_watchdog_creation() {
    let watchdog = ConnectionWatchdog::new();
    assert!(!watchdog.is_armed());
    assert_eq!(watchdog.fired_count(), 0);
}

#[test]
fn test_expiry_injects_timeout_line() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let watchdog = ConnectionWatchdog::new();
    watchdog.arm(Duration::from_millis(50), tx);
    assert!(watchdog.is_armed());

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)),
        Ok(WATCHDOG_TIMEOUT_LINE.to_string())
    );
    assert!(!watchdog.is_armed());
    assert_eq!(watchdog.fired_count(), 1);
}

#[test]
fn test_disarm_prevents_expiry() {
    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    let watchdog = ConnectionWatchdog::new();
    watchdog.arm(Duration::from_millis(80), tx);
    thread::sleep(Duration::from_millis(20));
    watchdog.disarm();

    // the cancelled timer drops its sender without sending
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(300)),
        Err(RecvTimeoutError::Disconnected)
    );
    assert_eq!(watchdog.fired_count(), 0);
}

#[test]
fn test_fires_once_per_arm() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let watchdog = ConnectionWatchdog::new();

    watchdog.arm(Duration::from_millis(30), tx.clone());
    thread::sleep(Duration::from_millis(150));
    watchdog.arm(Duration::from_millis(30), tx);
    thread::sleep(Duration::from_millis(150));

    assert_eq!(rx.len(), 2);
    assert_eq!(watchdog.fired_count(), 2);
}

#[test]
fn test_closed_channel_swallows_expiry() {
    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    drop(rx);
    let watchdog = ConnectionWatchdog::new();
    watchdog.arm(Duration::from_millis(20), tx);
    thread::sleep(Duration::from_millis(120));
    assert_eq!(watchdog.fired_count(), 1);
    assert!(!watchdog.is_armed());
}
