// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sync-file fences.
//!
//! A sync file becomes readable once its fence signals, so waiting is a
//! `poll` for `POLLIN`. Duplicates are made close-on-exec.

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use rustix::event::{PollFd, PollFlags, Timespec, poll};
use rustix::io::{Errno, fcntl_dupfd_cloexec};
use stratum_core::fence::{Fence, FenceDriver, FenceError, RawFence, SharedFenceDriver};

/// [`FenceDriver`] over kernel sync-file descriptors.
///
/// The driver owns every descriptor it hands out, through
/// [`adopt`](Self::adopt) or [`dup`](FenceDriver::dup), until
/// [`close`](FenceDriver::close) takes it back. Raw values it does not own
/// are never touched: waiting on them reports signaled, duplicating them
/// fails with `EBADF` and closing them does nothing.
#[derive(Debug, Default)]
pub struct SyncFileDriver {
    owned: Mutex<HashMap<i32, OwnedFd>>,
}

impl SyncFileDriver {
    /// Creates a shared driver.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wraps a sync file received from the kernel or a client.
    #[must_use]
    pub fn adopt(self: &Arc<Self>, fd: OwnedFd) -> Fence {
        let raw = fd.as_raw_fd();
        self.owned().insert(raw, fd);
        Fence::adopt(RawFence(raw), Arc::clone(self) as SharedFenceDriver)
    }

    /// Number of descriptors currently owned.
    #[must_use]
    pub fn held(&self) -> usize {
        self.owned().len()
    }

    fn owned(&self) -> MutexGuard<'_, HashMap<i32, OwnedFd>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn timeout(ms: u32) -> Timespec {
    Timespec {
        tv_sec: i64::from(ms / 1000),
        tv_nsec: i64::from(ms % 1000) * 1_000_000,
    }
}

impl FenceDriver for SyncFileDriver {
    fn dup(&self, raw: RawFence) -> Result<RawFence, FenceError> {
        let mut owned = self.owned();
        let Some(fd) = owned.get(&raw.0) else {
            return Err(FenceError::DupFailed(Errno::BADF.raw_os_error()));
        };
        let copy =
            fcntl_dupfd_cloexec(fd, 0).map_err(|e| FenceError::DupFailed(e.raw_os_error()))?;
        let copy_raw = copy.as_raw_fd();
        owned.insert(copy_raw, copy);
        Ok(RawFence(copy_raw))
    }

    fn close(&self, raw: RawFence) {
        let fd = self.owned().remove(&raw.0);
        drop(fd);
    }

    fn wait(&self, raw: RawFence, timeout_ms: u32) -> Result<bool, FenceError> {
        // Poll a private duplicate so the table is not locked while blocked.
        let fd = {
            let owned = self.owned();
            let Some(fd) = owned.get(&raw.0) else {
                return Ok(true);
            };
            fcntl_dupfd_cloexec(fd, 0).map_err(|e| FenceError::WaitFailed(e.raw_os_error()))?
        };
        let timeout = timeout(timeout_ms);
        loop {
            let mut fds = [PollFd::new(&fd, PollFlags::IN)];
            match poll(&mut fds, Some(&timeout)) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(fds[0].revents().contains(PollFlags::IN)),
                Err(Errno::INTR) => {}
                Err(e) => return Err(FenceError::WaitFailed(e.raw_os_error())),
            }
        }
    }
}
