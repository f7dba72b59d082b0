//! Receive-buffer accounting
//!
//! Tracks how many bytes the controller's serial receive buffer can still
//! take. The writer spends budget when it transmits; footers on responses
//! give it back. Budget, throttle flag and the clear epoch live under one
//! mutex with one condition variable; the writer waits on it, footer handling
//! and queue clears notify it.
//!
//! Invariant: `0 <= budget <= capacity` at every point where the lock is
//! released.

use crate::firmware::tinyg::footer::{is_benign_status, ResponseFooter};
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct BudgetState {
    budget: usize,
    throttled: bool,
    /// Advanced by every clear; a waiter that sees it move drops its command
    clear_epoch: u64,
}

/// Result of waiting for buffer space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Space was debited; the command may be transmitted
    Granted {
        /// Budget left after the debit
        remaining: usize,
    },
    /// The queue was cleared while waiting; drop the command
    Cleared,
}

/// What a footer did to the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterOutcome {
    /// Budget after applying the footer
    pub budget: usize,
    /// Status code, if it was not benign
    pub error_code: Option<i64>,
}

/// Budget and throttle state for one connection
#[derive(Debug)]
pub struct BufferAccounting {
    capacity: usize,
    throttle_on_zero_length_move: bool,
    state: Mutex<BudgetState>,
    changed: Condvar,
}

impl BufferAccounting {
    /// Create accounting for a device buffer of `capacity` bytes
    pub fn new(capacity: usize, throttle_on_zero_length_move: bool) -> Self {
        Self {
            capacity,
            throttle_on_zero_length_move,
            state: Mutex::new(BudgetState {
                budget: capacity,
                throttled: false,
                clear_epoch: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Device buffer size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes the device can currently accept
    pub fn budget(&self) -> usize {
        self.state.lock().budget
    }

    /// Whether the writer is holding back
    pub fn is_throttled(&self) -> bool {
        self.state.lock().throttled
    }

    /// Set the throttle flag; no-op when unchanged
    pub fn set_throttled(&self, throttled: bool) {
        let mut state = self.state.lock();
        if state.throttled == throttled {
            return;
        }
        state.throttled = throttled;
        tracing::debug!(
            "Writer {} (budget {})",
            if throttled { "throttled" } else { "flowing" },
            state.budget
        );
        self.changed.notify_all();
    }

    /// Credit bytes the device reports as consumed, clamped to capacity
    pub fn add_bytes_returned(&self, n: usize) -> usize {
        let mut state = self.state.lock();
        state.budget = state.budget.saturating_add(n).min(self.capacity);
        self.changed.notify_all();
        state.budget
    }

    /// Replace the budget with the device's own free-space report
    pub fn rebaseline(&self, rx: usize) -> usize {
        let mut state = self.state.lock();
        state.budget = rx.min(self.capacity);
        tracing::debug!("Buffer re-baselined to {}", state.budget);
        self.changed.notify_all();
        state.budget
    }

    /// Budget back to capacity
    pub fn reset_buffer(&self) {
        let mut state = self.state.lock();
        state.budget = self.capacity;
        self.changed.notify_all();
    }

    /// Current clear epoch; stamp queued commands with it
    pub fn clear_epoch(&self) -> u64 {
        self.state.lock().clear_epoch
    }

    /// Drop throttling, refill the budget, and cancel any waiting command
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.throttled = false;
        state.budget = self.capacity;
        state.clear_epoch = state.clear_epoch.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Debit `len` bytes, waiting while throttled and short of space
    ///
    /// `epoch` is the clear epoch the command was queued under. If a clear
    /// has happened since, the command is stale and nothing is debited.
    /// A command longer than the whole buffer waits for an empty buffer and
    /// then drains the budget to zero.
    pub fn reserve(&self, len: usize, epoch: u64) -> Reservation {
        let need = len.min(self.capacity);
        let mut state = self.state.lock();
        if state.clear_epoch != epoch {
            return Reservation::Cleared;
        }

        if need > state.budget && !state.throttled {
            tracing::debug!("Throttling: need {} bytes, budget {}", need, state.budget);
            state.throttled = true;
        }

        while state.throttled && need > state.budget {
            self.changed.wait(&mut state);
            if state.clear_epoch != epoch {
                return Reservation::Cleared;
            }
        }

        if state.throttled {
            state.throttled = false;
        }
        state.budget = state.budget.saturating_sub(need);
        Reservation::Granted {
            remaining: state.budget,
        }
    }

    /// Apply a response footer
    ///
    /// Non-benign status codes throttle the writer. Otherwise the footer's
    /// receive delta is credited, unless the budget is already full.
    pub fn apply_footer(&self, footer: &ResponseFooter) -> FooterOutcome {
        if !is_benign_status(footer.status_code, self.throttle_on_zero_length_move) {
            self.set_throttled(true);
            return FooterOutcome {
                budget: self.budget(),
                error_code: Some(footer.status_code),
            };
        }

        let mut state = self.state.lock();
        if state.budget < self.capacity && footer.rx_delta > 0 {
            let delta = usize::try_from(footer.rx_delta).unwrap_or(usize::MAX);
            state.budget = state.budget.saturating_add(delta).min(self.capacity);
            self.changed.notify_all();
        }
        FooterOutcome {
            budget: state.budget,
            error_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn footer(status_code: i64, rx_delta: i64) -> ResponseFooter {
        ResponseFooter {
            protocol_version: 1,
            status_code,
            rx_delta,
            checksum: 0,
        }
    }

    #[test]
    fn test_reserve_within_budget() {
        let acct = BufferAccounting::new(100, false);
        assert_eq!(
            acct.reserve(40, acct.clear_epoch()),
            Reservation::Granted { remaining: 60 }
        );
        assert_eq!(
            acct.reserve(60, acct.clear_epoch()),
            Reservation::Granted { remaining: 0 }
        );
        assert!(!acct.is_throttled());
    }

    #[test]
    fn test_add_bytes_clamped() {
        let acct = BufferAccounting::new(100, false);
        acct.reserve(30, acct.clear_epoch());
        assert_eq!(acct.add_bytes_returned(500), 100);
    }

    #[test]
    fn test_set_throttled_idempotent() {
        let acct = BufferAccounting::new(100, false);
        acct.set_throttled(true);
        acct.set_throttled(true);
        assert!(acct.is_throttled());
        acct.set_throttled(false);
        assert!(!acct.is_throttled());
    }

    #[test]
    fn test_waiter_resumes_after_credit() {
        let acct = Arc::new(BufferAccounting::new(10, false));
        acct.reserve(8, acct.clear_epoch());
        let waiter = {
            let acct = acct.clone();
            let epoch = acct.clear_epoch();
            thread::spawn(move || acct.reserve(5, epoch))
        };
        thread::sleep(Duration::from_millis(30));
        assert!(acct.is_throttled());
        acct.add_bytes_returned(8);
        assert_eq!(waiter.join().unwrap(), Reservation::Granted { remaining: 5 });
        assert!(!acct.is_throttled());
    }

    #[test]
    fn test_clear_cancels_waiter() {
        let acct = Arc::new(BufferAccounting::new(10, false));
        acct.reserve(10, acct.clear_epoch());
        let waiter = {
            let acct = acct.clone();
            let epoch = acct.clear_epoch();
            thread::spawn(move || acct.reserve(4, epoch))
        };
        thread::sleep(Duration::from_millis(30));
        acct.clear();
        assert_eq!(waiter.join().unwrap(), Reservation::Cleared);
        assert_eq!(acct.budget(), 10);
        assert!(!acct.is_throttled());
    }

    #[test]
    fn test_stale_epoch_never_debits() {
        let acct = BufferAccounting::new(100, false);
        let queued_under = acct.clear_epoch();
        acct.clear();
        assert_eq!(acct.reserve(10, queued_under), Reservation::Cleared);
        assert_eq!(acct.budget(), 100);
        assert_eq!(
            acct.reserve(10, acct.clear_epoch()),
            Reservation::Granted { remaining: 90 }
        );
    }

    #[test]
    fn test_oversized_command_drains_full_buffer() {
        let acct = BufferAccounting::new(10, false);
        assert_eq!(
            acct.reserve(25, acct.clear_epoch()),
            Reservation::Granted { remaining: 0 }
        );
    }

    #[test]
    fn test_footer_credit_and_ceiling() {
        let acct = BufferAccounting::new(100, false);
        acct.reserve(30, acct.clear_epoch());
        let outcome = acct.apply_footer(&footer(0, 10));
        assert_eq!(outcome.budget, 80);
        assert_eq!(outcome.error_code, None);

        acct.reset_buffer();
        assert_eq!(acct.apply_footer(&footer(0, 10)).budget, 100);
    }

    #[test]
    fn test_footer_error_throttles() {
        let acct = BufferAccounting::new(100, false);
        acct.reserve(30, acct.clear_epoch());
        let outcome = acct.apply_footer(&footer(40, 10));
        assert_eq!(outcome.error_code, Some(40));
        assert_eq!(outcome.budget, 70);
        assert!(acct.is_throttled());
    }

    #[test]
    fn test_zero_length_move_policy() {
        let lenient = BufferAccounting::new(100, false);
        assert_eq!(lenient.apply_footer(&footer(60, 0)).error_code, None);
        assert!(!lenient.is_throttled());

        let strict = BufferAccounting::new(100, true);
        assert_eq!(strict.apply_footer(&footer(60, 0)).error_code, Some(60));
        assert!(strict.is_throttled());
    }

    #[test]
    fn test_rebaseline_clamped() {
        let acct = BufferAccounting::new(100, false);
        assert_eq!(acct.rebaseline(40), 40);
        assert_eq!(acct.rebaseline(400), 100);
    }
}
