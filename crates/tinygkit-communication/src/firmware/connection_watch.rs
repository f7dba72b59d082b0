//! Connection watchdog
//!
//! Armed after the build query goes out. If no build reply disarms it within
//! the timeout, it feeds a loopback line into the session's inbound line
//! channel so the parser reports the timeout on its own thread, in order with
//! real traffic.

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Line injected into the inbound channel when the watchdog expires
pub const WATCHDOG_TIMEOUT_LINE: &str = r#"{"tgfx":"timeout"}"#;

#[derive(Debug, Default)]
struct WatchState {
    /// Bumped by every arm and disarm; a timer thread only fires for its own
    generation: u64,
    /// Dropping this cancels the running timer
    cancel: Option<Sender<()>>,
    fired: u64,
}

/// Single-shot timer that reports a silent controller
pub struct ConnectionWatchdog {
    state: Arc<Mutex<WatchState>>,
}

impl Default for ConnectionWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionWatchdog {
    /// Create a disarmed watchdog
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WatchState::default())),
        }
    }

    /// Start the timer, replacing any running one. On expiry the timeout
    /// line is sent on `lines`.
    pub fn arm(&self, timeout: Duration, lines: Sender<String>) {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let generation = {
            let mut state = self.state.lock();
            state.generation = state.generation.wrapping_add(1);
            state.cancel = Some(cancel_tx);
            state.generation
        };

        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name("tinyg-watchdog".to_string())
            .spawn(move || {
                if cancel_rx.recv_timeout(timeout) != Err(RecvTimeoutError::Timeout) {
                    return;
                }
                {
                    let mut state = state.lock();
                    if state.generation != generation {
                        return;
                    }
                    state.cancel = None;
                    state.fired += 1;
                }
                tracing::warn!("No build reply within {:?}", timeout);
                if lines.send(WATCHDOG_TIMEOUT_LINE.to_string()).is_err() {
                    tracing::debug!("Line channel closed; timeout not delivered");
                }
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to start watchdog timer: {}", e);
            self.state.lock().cancel = None;
        }
    }

    /// Cancel the timer; no-op when not armed
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        if state.cancel.take().is_some() {
            tracing::debug!("Watchdog disarmed");
        }
        state.generation = state.generation.wrapping_add(1);
    }

    /// Whether a timer is running
    pub fn is_armed(&self) -> bool {
        self.state.lock().cancel.is_some()
    }

    /// How many times the watchdog has expired
    pub fn fired_count(&self) -> u64 {
        self.state.lock().fired
    }
}

impl Drop for ConnectionWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disarmed() {
        let watchdog = ConnectionWatchdog::new();
        assert!(!watchdog.is_armed());
        watchdog.disarm();
        assert_eq!(watchdog.fired_count(), 0);
    }

    #[test]
    fn test_rearm_replaces_timer() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watchdog = ConnectionWatchdog::new();
        watchdog.arm(Duration::from_millis(40), tx.clone());
        watchdog.arm(Duration::from_secs(10), tx);
        thread::sleep(Duration::from_millis(120));
        assert!(watchdog.is_armed());
        assert!(rx.is_empty());
        watchdog.disarm();
    }

    #[test]
    fn test_disarm_releases_sender() {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let watchdog = ConnectionWatchdog::new();
        watchdog.arm(Duration::from_secs(10), tx);
        watchdog.disarm();
        // The timer thread drops its sender once cancelled
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        );
    }
}
