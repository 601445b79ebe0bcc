// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device doubles with failure injection.
//!
//! Each double records what it was asked to do and checks that every fence
//! it is shown is still open in the [`FenceLedger`].

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use stratum_core::commit::{CommitRequest, PlaneConfig};
use stratum_core::device::{
    BufferAllocator, BufferUsage, EngineHandle, FrameSide, PlaneCommitter, RunFences,
    ScalerDestination, ScalerEngine, ScalerSource,
};
use stratum_core::error::{DeviceError, ScalerStage};
use stratum_core::fence::Fence;
use stratum_core::layer::{Buffer, BufferId, PixelFormat};
use stratum_core::plan::ScalerId;

use crate::ledger::FenceLedger;

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// When an injected fault fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// On the next call only.
    Once(DeviceError),
    /// On every call until cleared.
    Always(DeviceError),
}

/// Per-stage fault table.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    table: HashMap<ScalerStage, Fault>,
}

impl Faults {
    /// Arms `fault` for `stage`.
    pub fn set(&mut self, stage: ScalerStage, fault: Fault) {
        self.table.insert(stage, fault);
    }

    /// Disarms every stage.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Consumes the fault armed for `stage`, if any.
    fn trip(&mut self, stage: ScalerStage) -> Result<(), DeviceError> {
        match self.table.get(&stage).copied() {
            None => Ok(()),
            Some(Fault::Always(e)) => Err(e),
            Some(Fault::Once(e)) => {
                self.table.remove(&stage);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Plane committer
// ---------------------------------------------------------------------------

/// One recorded commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Plane configurations, bottom first.
    pub configs: Vec<PlaneConfig>,
    /// Planes that carried an input fence.
    pub fences: usize,
    /// Whether the commit was accepted.
    pub accepted: bool,
}

/// Records commits and answers with ledger fences.
#[derive(Debug)]
pub struct MockCommitter {
    ledger: Arc<FenceLedger>,
    /// Every commit seen, oldest first.
    pub submissions: Vec<Submission>,
    /// Reject this many commits before accepting again.
    pub reject_next: usize,
    /// Error returned on rejection.
    pub error: DeviceError,
    /// Input fences that were already closed when submitted.
    pub stale_fences: usize,
}

impl MockCommitter {
    /// Creates a committer issuing fences from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<FenceLedger>) -> Self {
        Self {
            ledger,
            submissions: Vec::new(),
            reject_next: 0,
            error: DeviceError::Os(22),
            stale_fences: 0,
        }
    }

    /// The most recent commit.
    #[must_use]
    pub fn last(&self) -> Option<&Submission> {
        self.submissions.last()
    }
}

impl PlaneCommitter for MockCommitter {
    fn commit(&mut self, request: &CommitRequest) -> Result<Fence, DeviceError> {
        let fences: Vec<&Fence> = request
            .entries()
            .iter()
            .filter_map(|e| e.fence.as_ref())
            .collect();
        self.stale_fences += fences
            .iter()
            .filter(|f| !self.ledger.is_live(f.raw()))
            .count();
        let accepted = self.reject_next == 0;
        self.submissions.push(Submission {
            configs: request.entries().iter().map(|e| e.config).collect(),
            fences: fences.len(),
            accepted,
        });
        if !accepted {
            self.reject_next -= 1;
            return Err(self.error);
        }
        Ok(self.ledger.issue())
    }
}

// ---------------------------------------------------------------------------
// Scaler engine
// ---------------------------------------------------------------------------

/// State of one open engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineRecord {
    /// Unit it was opened for.
    pub unit: ScalerId,
    /// Opened for the local path.
    pub local: bool,
    /// Last applied configuration.
    pub config: Option<(ScalerSource, ScalerDestination)>,
    /// Conversions queued.
    pub runs: usize,
}

/// Scaler engine double.
#[derive(Debug)]
pub struct MockScaler {
    ledger: Arc<FenceLedger>,
    next: u64,
    /// Open engines.
    pub engines: HashMap<EngineHandle, EngineRecord>,
    /// Armed faults.
    pub faults: Faults,
    /// Engines opened in total.
    pub created: usize,
    /// Engines closed in total.
    pub destroyed: usize,
    /// Stop calls.
    pub stops: usize,
    /// Configure calls.
    pub configures: usize,
    /// Successful runs.
    pub runs: usize,
    /// Calls naming an engine that is not open.
    pub bad_handles: usize,
    /// Fences shown to `run` that were already closed.
    pub stale_fences: usize,
}

impl MockScaler {
    /// Creates an engine issuing fences from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<FenceLedger>) -> Self {
        Self {
            ledger,
            next: 0,
            engines: HashMap::new(),
            faults: Faults::default(),
            created: 0,
            destroyed: 0,
            stops: 0,
            configures: 0,
            runs: 0,
            bad_handles: 0,
            stale_fences: 0,
        }
    }

    /// The open engine serving `unit`, if any.
    #[must_use]
    pub fn engine_for(&self, unit: ScalerId) -> Option<&EngineRecord> {
        self.engines.values().find(|e| e.unit == unit)
    }

    fn check_fence(&mut self, fence: Option<&Fence>) {
        if let Some(f) = fence
            && !self.ledger.is_live(f.raw())
        {
            self.stale_fences += 1;
        }
    }
}

impl ScalerEngine for MockScaler {
    fn create(&mut self, unit: ScalerId, local: bool) -> Result<EngineHandle, DeviceError> {
        self.faults.trip(ScalerStage::Create)?;
        self.next += 1;
        self.created += 1;
        let handle = EngineHandle(self.next);
        self.engines.insert(
            handle,
            EngineRecord {
                unit,
                local,
                config: None,
                runs: 0,
            },
        );
        Ok(handle)
    }

    fn destroy(&mut self, handle: EngineHandle) {
        if self.engines.remove(&handle).is_some() {
            self.destroyed += 1;
        } else {
            self.bad_handles += 1;
        }
    }

    fn stop(&mut self, handle: EngineHandle) -> Result<(), DeviceError> {
        if !self.engines.contains_key(&handle) {
            self.bad_handles += 1;
        }
        self.stops += 1;
        self.faults.trip(ScalerStage::Stop)
    }

    fn configure(
        &mut self,
        handle: EngineHandle,
        src: &ScalerSource,
        dst: &ScalerDestination,
    ) -> Result<(), DeviceError> {
        self.configures += 1;
        self.faults.trip(ScalerStage::Configure)?;
        match self.engines.get_mut(&handle) {
            Some(record) => {
                record.config = Some((*src, *dst));
                Ok(())
            }
            None => {
                self.bad_handles += 1;
                Err(DeviceError::Os(9))
            }
        }
    }

    fn run(
        &mut self,
        handle: EngineHandle,
        src: FrameSide<'_>,
        dst: FrameSide<'_>,
    ) -> Result<RunFences, DeviceError> {
        self.check_fence(src.acquire);
        self.check_fence(dst.acquire);
        self.faults.trip(ScalerStage::Run)?;
        let Some(record) = self.engines.get_mut(&handle) else {
            self.bad_handles += 1;
            return Err(DeviceError::Os(9));
        };
        record.runs += 1;
        self.runs += 1;
        Ok(RunFences {
            source_release: Some(self.ledger.issue()),
            destination_release: Some(self.ledger.issue()),
        })
    }
}

// ---------------------------------------------------------------------------
// Buffer allocator
// ---------------------------------------------------------------------------

/// Allocator double tracking live buffers.
#[derive(Debug, Default)]
pub struct MockAllocator {
    next: u64,
    /// Buffers currently allocated.
    pub live: HashSet<BufferId>,
    /// Allocations in total.
    pub allocated: usize,
    /// Frees of a buffer that was not live.
    pub bad_frees: usize,
    /// Protected allocations in total.
    pub protected: usize,
    /// Fail once this many buffers are live.
    pub fail_at_live: Option<usize>,
}

impl MockAllocator {
    /// Creates an allocator with nothing live.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferAllocator for MockAllocator {
    fn alloc(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Result<Buffer, DeviceError> {
        if self.fail_at_live == Some(self.live.len()) {
            return Err(DeviceError::OutOfMemory);
        }
        self.next += 1;
        self.allocated += 1;
        let id = BufferId(0x10_0000 + self.next);
        self.live.insert(id);
        let buffer = Buffer::new(id, format, width, height);
        Ok(if usage.protected {
            self.protected += 1;
            buffer.protected()
        } else {
            buffer
        })
    }

    fn free(&mut self, buffer: Buffer) {
        if !self.live.remove(&buffer.id) {
            self.bad_frees += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_fault_fires_once() {
        let ledger = FenceLedger::shared();
        let mut scaler = MockScaler::new(ledger);
        scaler
            .faults
            .set(ScalerStage::Create, Fault::Once(DeviceError::Busy));
        assert_eq!(
            scaler.create(ScalerId(0), false),
            Err(DeviceError::Busy)
        );
        let handle = scaler.create(ScalerId(0), false).unwrap();
        assert_eq!(scaler.engine_for(ScalerId(0)).map(|e| e.local), Some(false));
        scaler.destroy(handle);
        scaler.destroy(handle);
        assert_eq!(scaler.bad_handles, 1);
    }

    #[test]
    fn run_hands_out_two_live_fences() {
        let ledger = FenceLedger::shared();
        let mut scaler = MockScaler::new(Arc::clone(&ledger));
        let handle = scaler.create(ScalerId(1), true).unwrap();
        let acquire = ledger.issue();
        let fences = scaler
            .run(
                handle,
                FrameSide {
                    buffer: Some(BufferId(7)),
                    acquire: Some(&acquire),
                },
                FrameSide {
                    buffer: None,
                    acquire: None,
                },
            )
            .unwrap();
        assert_eq!(ledger.live(), 3);
        drop(fences);
        drop(acquire);
        assert_eq!(ledger.live(), 0);
        assert_eq!(scaler.stale_fences, 0);
    }

    #[test]
    fn allocator_fails_at_threshold_and_flags_bad_frees() {
        let mut alloc = MockAllocator {
            fail_at_live: Some(1),
            ..MockAllocator::new()
        };
        let usage = BufferUsage {
            protected: true,
            scanout: true,
        };
        let buffer = alloc.alloc(64, 64, PixelFormat::Bgra8888, usage).unwrap();
        assert!(buffer.protected);
        assert_eq!(
            alloc.alloc(64, 64, PixelFormat::Bgra8888, usage),
            Err(DeviceError::OutOfMemory)
        );
        alloc.free(buffer);
        alloc.free(buffer);
        assert!(alloc.live.is_empty());
        assert_eq!(alloc.bad_frees, 1);
        assert_eq!(alloc.protected, 1);
    }
}
