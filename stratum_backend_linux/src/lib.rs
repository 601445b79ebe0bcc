// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linux backend for stratum.
//!
//! - [`SyncFileDriver`]: a [`FenceDriver`](stratum_core::fence::FenceDriver)
//!   over kernel sync-file descriptors it owns.
//! - [`now`] / [`timebase`]: `CLOCK_MONOTONIC` host time, the clock the
//!   kernel stamps vblank events with.

mod sync_file;
mod time;

pub use sync_file::SyncFileDriver;
pub use time::{now, timebase};
