// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A compositor wired to device doubles.

use std::sync::Arc;

use stratum_core::compositor::{Compositor, RefreshOutcome};
use stratum_core::config::{ConfigError, DeviceCaps};
use stratum_core::device::{DeviceState, DeviceStateCell, Hardware, OutputId};
use stratum_core::geometry::DisplaySize;
use stratum_core::layer::CompositionRequest;
use stratum_core::plan::{AssignmentPlan, ScalerId};
use stratum_core::time::HostTime;
use stratum_core::trace::Tracer;

use crate::ledger::FenceLedger;
use crate::mock::{MockAllocator, MockCommitter, MockScaler};

/// One display's compositor plus everything it talks to.
#[derive(Debug)]
pub struct Rig {
    /// Tracks every fence in the rig.
    pub ledger: Arc<FenceLedger>,
    /// Shared device state, as a monitor would update it.
    pub device: Arc<DeviceStateCell>,
    /// Plane commit double.
    pub committer: MockCommitter,
    /// Scaler engine double.
    pub scaler: MockScaler,
    /// Buffer allocator double.
    pub allocator: MockAllocator,
    /// The compositor under test.
    pub compositor: Compositor,
}

impl Rig {
    /// Creates a connected display of size `display`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] if `caps` is inconsistent.
    pub fn new(caps: DeviceCaps, display: DisplaySize) -> Result<Self, ConfigError> {
        let ledger = FenceLedger::shared();
        let device = Arc::new(DeviceStateCell::new(DeviceState {
            connected: true,
            display,
            last_vsync: HostTime(0),
        }));
        let compositor = Compositor::new(OutputId(0), caps, Arc::clone(&device))?;
        Ok(Self {
            committer: MockCommitter::new(Arc::clone(&ledger)),
            scaler: MockScaler::new(Arc::clone(&ledger)),
            allocator: MockAllocator::new(),
            ledger,
            device,
            compositor,
        })
    }

    /// Prepares and sets `request` in one go.
    pub fn refresh(&mut self, request: CompositionRequest) -> RefreshOutcome {
        let plan = self.compositor.prepare(&request, &mut Tracer::none());
        self.set(request, plan)
    }

    /// Finishes a refresh the test prepared itself.
    pub fn set(&mut self, request: CompositionRequest, plan: AssignmentPlan) -> RefreshOutcome {
        let hw = Hardware {
            planes: &mut self.committer,
            scalers: &mut self.scaler,
            allocator: &mut self.allocator,
        };
        self.compositor.set(request, plan, hw, &mut Tracer::none())
    }

    /// Unplugs the display and refreshes once, which releases every unit.
    pub fn unplug(&mut self) -> RefreshOutcome {
        let display = self.device.snapshot().display;
        self.device.set_hotplug(false, display);
        self.refresh(CompositionRequest::new(Vec::new(), true))
    }

    /// Plane releases parked in scaler rings.
    #[must_use]
    pub fn parked_releases(&self) -> usize {
        let scalers = self.compositor.scalers();
        (0..scalers.unit_count())
            .filter_map(|i| u32::try_from(i).ok())
            .filter_map(|i| scalers.status(ScalerId(i)))
            .map(|s| s.pending_releases)
            .sum()
    }

    /// Misuse the doubles noticed: stale fences, unknown engines, bad frees.
    #[must_use]
    pub fn device_faults(&self) -> usize {
        self.committer.stale_fences
            + self.scaler.stale_fences
            + self.scaler.bad_handles
            + self.allocator.bad_frees
    }
}

/// Releases in `outcome` the caller still has to wait on.
#[must_use]
pub fn pending_releases(outcome: &RefreshOutcome) -> usize {
    outcome.releases.iter().filter(|r| !r.is_signaled()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_refresh_commits_a_blank_frame() {
        let mut rig = Rig::new(DeviceCaps::single_scaler(), DisplaySize::new(800, 600)).unwrap();
        let out = rig.refresh(CompositionRequest::new(Vec::new(), true));
        assert_eq!(out.status, Ok(()));
        assert_eq!(pending_releases(&out), 0);
        let last = rig.committer.last().unwrap();
        assert!(last.accepted);
        assert!(last.configs.iter().all(|c| c.is_empty()));
        drop(out);
        assert!(rig.ledger.report().balances(0));
    }

    #[test]
    fn unplug_gates_the_output() {
        let mut rig = Rig::new(DeviceCaps::single_scaler(), DisplaySize::new(800, 600)).unwrap();
        drop(rig.refresh(CompositionRequest::new(Vec::new(), true)));
        assert!(rig.device.gate().is_enabled());
        let commits = rig.committer.submissions.len();
        drop(rig.unplug());
        assert!(!rig.device.gate().is_enabled());
        assert_eq!(rig.committer.submissions.len(), commits);
    }
}
