// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fence accounting.
//!
//! [`FenceLedger`] is a [`FenceDriver`] that hands out fake descriptors and
//! remembers which ones are open. Every open, dup, and close goes through it,
//! so a test can check at any point that the descriptors still open are
//! exactly the ones somebody legitimately holds, and that nothing was closed
//! twice.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashSet;
use stratum_core::fence::{Fence, FenceDriver, FenceError, RawFence, SharedFenceDriver};

const FIRST_DESCRIPTOR: i32 = 1000;

/// Counters reported by [`FenceLedger::report`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerReport {
    /// Descriptors created by [`FenceLedger::issue`].
    pub issued: usize,
    /// Descriptors created by duplication.
    pub duplicated: usize,
    /// Successful closes.
    pub closed: usize,
    /// Closes of a descriptor that was not open.
    pub double_closes: usize,
    /// Descriptors still open.
    pub live: usize,
}

impl LedgerReport {
    /// Descriptors ever opened.
    #[must_use]
    pub const fn opened(&self) -> usize {
        self.issued + self.duplicated
    }

    /// Whether opens, closes, and `handed_off` descriptors add up with no
    /// double close.
    #[must_use]
    pub const fn balances(&self, handed_off: usize) -> bool {
        self.double_closes == 0 && self.closed + handed_off == self.opened()
    }
}

#[derive(Debug, Default)]
struct State {
    live: HashSet<i32>,
    report: LedgerReport,
}

/// A [`FenceDriver`] that tracks every descriptor it hands out.
#[derive(Debug)]
pub struct FenceLedger {
    next: AtomicI32,
    state: Mutex<State>,
    fail_dup: Mutex<bool>,
}

impl Default for FenceLedger {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(FIRST_DESCRIPTOR),
            state: Mutex::new(State::default()),
            fail_dup: Mutex::new(false),
        }
    }
}

impl FenceLedger {
    /// Creates a shared ledger.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens a fresh fence, as a producer such as a decoder would.
    pub fn issue(self: &Arc<Self>) -> Fence {
        let raw = self.open();
        self.state().report.issued += 1;
        Fence::adopt(raw, Arc::clone(self) as SharedFenceDriver)
    }

    /// Makes every later [`dup`](FenceDriver::dup) fail with `EMFILE`.
    pub fn set_fail_dup(&self, fail: bool) {
        *self.fail_dup.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Descriptors still open.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state().live.len()
    }

    /// Whether `raw` is currently open.
    #[must_use]
    pub fn is_live(&self, raw: RawFence) -> bool {
        self.state().live.contains(&raw.0)
    }

    /// A snapshot of the counters.
    #[must_use]
    pub fn report(&self) -> LedgerReport {
        let state = self.state();
        LedgerReport {
            live: state.live.len(),
            ..state.report
        }
    }

    fn open(&self) -> RawFence {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        self.state().live.insert(raw);
        RawFence(raw)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FenceDriver for FenceLedger {
    fn dup(&self, raw: RawFence) -> Result<RawFence, FenceError> {
        if *self.fail_dup.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(FenceError::DupFailed(24));
        }
        if !self.is_live(raw) {
            return Err(FenceError::DupFailed(9));
        }
        let new = self.open();
        self.state().report.duplicated += 1;
        Ok(new)
    }

    fn close(&self, raw: RawFence) {
        let mut state = self.state();
        if state.live.remove(&raw.0) {
            state.report.closed += 1;
        } else {
            state.report.double_closes += 1;
        }
    }

    fn wait(&self, raw: RawFence, _timeout_ms: u32) -> Result<bool, FenceError> {
        if self.is_live(raw) {
            Ok(true)
        } else {
            Err(FenceError::WaitFailed(9))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_drop_balance() {
        let ledger = FenceLedger::shared();
        let a = ledger.issue();
        let b = a.try_clone().unwrap();
        assert_eq!(ledger.live(), 2);
        drop(a);
        assert!(ledger.is_live(b.raw()));
        drop(b);
        let report = ledger.report();
        assert_eq!(report.opened(), 2);
        assert_eq!(report.closed, 2);
        assert!(report.balances(0));
    }

    #[test]
    fn closing_twice_is_counted() {
        let ledger = FenceLedger::shared();
        let raw = ledger.issue().into_raw();
        ledger.close(raw);
        ledger.close(raw);
        let report = ledger.report();
        assert_eq!(report.double_closes, 1);
        assert!(!report.balances(0));
    }

    #[test]
    fn held_fences_count_as_handed_off() {
        let ledger = FenceLedger::shared();
        let kept = ledger.issue();
        drop(ledger.issue());
        assert!(ledger.report().balances(1));
        drop(kept);
        assert!(ledger.report().balances(0));
    }

    #[test]
    fn failing_dup_opens_nothing() {
        let ledger = FenceLedger::shared();
        let fence = ledger.issue();
        ledger.set_fail_dup(true);
        assert_eq!(fence.try_clone().unwrap_err(), FenceError::DupFailed(24));
        assert_eq!(ledger.live(), 1);
    }
}
