// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owned synchronization fences.
//!
//! A [`Fence`] wraps a raw descriptor together with the [`FenceDriver`] that
//! knows how to duplicate, wait on, and close it. Dropping a `Fence` closes
//! the descriptor, so every exit path releases it exactly once. Ownership
//! moves through the refresh pipeline by value:
//!
//! ```text
//!   Layer::acquire_fence ──► plane input (direct)
//!                        └─► scaler run (borrowed, then dropped)
//!   commit completion ──► try_clone() per plane ──► ReleaseFence::Pending
//!                                              └─► scaler ring slot
//! ```
//!
//! [`Fence::into_raw`] is the only way to give a descriptor away without
//! closing it.

use alloc::sync::Arc;
use core::fmt;

/// A raw fence descriptor as understood by a [`FenceDriver`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawFence(pub i32);

impl fmt::Debug for RawFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFence({})", self.0)
    }
}

/// Errors from fence operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceError {
    /// Duplicating the descriptor failed (OS error code).
    DupFailed(i32),
    /// Waiting on the descriptor failed (OS error code).
    WaitFailed(i32),
}

impl fmt::Display for FenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DupFailed(code) => write!(f, "fence dup failed ({code})"),
            Self::WaitFailed(code) => write!(f, "fence wait failed ({code})"),
        }
    }
}

impl core::error::Error for FenceError {}

/// Low-level descriptor operations behind [`Fence`].
///
/// Implemented over sync files by platform backends and by an accounting
/// ledger in tests.
pub trait FenceDriver: Send + Sync {
    /// Returns a new descriptor referring to the same fence.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DupFailed`] if the descriptor table is exhausted
    /// or `raw` is not valid.
    fn dup(&self, raw: RawFence) -> Result<RawFence, FenceError>;

    /// Closes `raw`. Called exactly once per descriptor.
    fn close(&self, raw: RawFence);

    /// Waits up to `timeout_ms` for the fence to signal. A zero timeout
    /// polls. Returns whether the fence has signaled.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::WaitFailed`] if the wait itself failed.
    fn wait(&self, raw: RawFence, timeout_ms: u32) -> Result<bool, FenceError>;
}

/// Shared handle to a fence driver.
pub type SharedFenceDriver = Arc<dyn FenceDriver>;

/// An owned fence descriptor, closed on drop.
pub struct Fence {
    raw: RawFence,
    driver: Option<SharedFenceDriver>,
}

impl Fence {
    /// Takes ownership of `raw`, which `driver` will close.
    #[must_use]
    pub fn adopt(raw: RawFence, driver: SharedFenceDriver) -> Self {
        Self {
            raw,
            driver: Some(driver),
        }
    }

    /// The underlying descriptor. Still owned by `self`.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> RawFence {
        self.raw
    }

    /// Duplicates the descriptor into a second, independently owned fence.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::DupFailed`] if the driver cannot duplicate.
    pub fn try_clone(&self) -> Result<Self, FenceError> {
        match &self.driver {
            Some(driver) => Ok(Self::adopt(driver.dup(self.raw)?, Arc::clone(driver))),
            None => Err(FenceError::DupFailed(0)),
        }
    }

    /// Waits up to `timeout_ms` for the fence to signal.
    ///
    /// # Errors
    ///
    /// Propagates driver failures.
    pub fn wait(&self, timeout_ms: u32) -> Result<bool, FenceError> {
        match &self.driver {
            Some(driver) => driver.wait(self.raw, timeout_ms),
            None => Ok(true),
        }
    }

    /// Hands the descriptor to the caller without closing it.
    #[must_use = "the descriptor leaks unless the caller closes it"]
    pub fn into_raw(mut self) -> RawFence {
        self.driver = None;
        self.raw
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.close(self.raw);
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fence").field(&self.raw.0).finish()
    }
}

/// What a layer gets back once a refresh is done with its buffer.
#[derive(Debug, Default)]
pub enum ReleaseFence {
    /// The buffer may be reused immediately.
    #[default]
    Signaled,
    /// The buffer may be reused once this fence signals.
    Pending(Fence),
}

impl ReleaseFence {
    /// Whether no wait is required.
    #[must_use]
    pub const fn is_signaled(&self) -> bool {
        matches!(self, Self::Signaled)
    }

    /// The pending fence, if any.
    #[must_use]
    pub fn into_fence(self) -> Option<Fence> {
        match self {
            Self::Signaled => None,
            Self::Pending(f) => Some(f),
        }
    }
}

impl From<Option<Fence>> for ReleaseFence {
    fn from(fence: Option<Fence>) -> Self {
        fence.map_or(Self::Signaled, Self::Pending)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    /// Hands out increasing descriptors and counts closes.
    #[derive(Debug, Default)]
    pub(crate) struct CountingDriver {
        next: AtomicI32,
        pub(crate) opened: AtomicUsize,
        pub(crate) closed: AtomicUsize,
    }

    impl CountingDriver {
        pub(crate) fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn issue(self: &Arc<Self>) -> Fence {
            let raw = RawFence(self.next.fetch_add(1, Ordering::Relaxed) + 100);
            self.opened.fetch_add(1, Ordering::Relaxed);
            Fence::adopt(raw, Arc::clone(self) as SharedFenceDriver)
        }

        pub(crate) fn open(&self) -> usize {
            self.opened.load(Ordering::Relaxed) - self.closed.load(Ordering::Relaxed)
        }
    }

    impl FenceDriver for CountingDriver {
        fn dup(&self, _raw: RawFence) -> Result<RawFence, FenceError> {
            self.opened.fetch_add(1, Ordering::Relaxed);
            Ok(RawFence(self.next.fetch_add(1, Ordering::Relaxed) + 100))
        }

        fn close(&self, _raw: RawFence) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }

        fn wait(&self, _raw: RawFence, _timeout_ms: u32) -> Result<bool, FenceError> {
            Ok(true)
        }
    }

    #[test]
    fn drop_closes_once() {
        let driver = CountingDriver::shared();
        let f = driver.issue();
        assert_eq!(driver.open(), 1);
        drop(f);
        assert_eq!(driver.open(), 0);
        assert_eq!(driver.closed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn try_clone_yields_independent_owner() {
        let driver = CountingDriver::shared();
        let a = driver.issue();
        let b = a.try_clone().unwrap();
        assert_ne!(a.raw(), b.raw());
        drop(a);
        assert_eq!(driver.open(), 1);
        drop(b);
        assert_eq!(driver.open(), 0);
    }

    #[test]
    fn into_raw_skips_close() {
        let driver = CountingDriver::shared();
        let raw = driver.issue().into_raw();
        assert_eq!(raw, RawFence(100));
        assert_eq!(driver.closed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn release_fence_from_option() {
        let driver = CountingDriver::shared();
        assert!(ReleaseFence::from(None).is_signaled());
        let pending = ReleaseFence::from(Some(driver.issue()));
        assert!(!pending.is_signaled());
        let fences: Vec<_> = pending.into_fence().into_iter().collect();
        assert_eq!(fences.len(), 1);
        drop(fences);
        assert_eq!(driver.open(), 0);
    }
}
