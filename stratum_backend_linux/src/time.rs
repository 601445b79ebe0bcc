// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host clock.

use rustix::time::{ClockId, Timespec, clock_gettime};
use stratum_core::time::{HostTime, Timebase};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Host ticks are nanoseconds.
#[must_use]
pub const fn timebase() -> Timebase {
    Timebase::NANOS
}

/// Current `CLOCK_MONOTONIC` time in nanoseconds.
///
/// Suitable for [`Compositor::with_clock`](stratum_core::compositor::Compositor::with_clock)
/// and [`DeviceStateCell::record_vsync`](stratum_core::device::DeviceStateCell::record_vsync).
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);
    let ticks = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(ticks).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_is_nanoseconds() {
        assert_eq!(timebase(), Timebase::NANOS);
    }

    #[test]
    fn now_does_not_go_backwards() {
        let first = now();
        let second = now();
        assert!(second >= first, "monotonic clock went backwards");
        assert!(first.ticks() > 0, "monotonic clock reads zero");
    }

    #[test]
    fn timespec_becomes_nanosecond_ticks() {
        let input = Timespec {
            tv_sec: 3,
            tv_nsec: 500_000_001,
        };
        assert_eq!(timespec_to_host_time(input), HostTime(3_500_000_001));
    }

    #[test]
    fn huge_timespec_saturates() {
        let input = Timespec {
            tv_sec: i64::MAX,
            tv_nsec: 999_999_999,
        };
        assert_eq!(timespec_to_host_time(input), HostTime(u64::MAX));
    }

    #[test]
    fn negative_timespec_clamps_to_zero() {
        let input = Timespec {
            tv_sec: -1,
            tv_nsec: -5,
        };
        assert_eq!(timespec_to_host_time(input), HostTime(0));
    }
}
