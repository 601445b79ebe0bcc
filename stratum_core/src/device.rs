// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device collaborators and shared device state.
//!
//! The scheduler never talks to a kernel driver itself. It drives three
//! collaborator traits:
//!
//! - [`PlaneCommitter`] — applies one complete plane configuration
//!   atomically and returns a completion fence.
//! - [`ScalerEngine`] — the operation set of the scaling/conversion units.
//! - [`BufferAllocator`] — allocates scaler destination buffers.
//!
//! Hot-plug and vsync are observed by a monitor outside the refresh path,
//! which publishes into a [`DeviceStateCell`]. The compositor reads one
//! [`DeviceState`] snapshot per refresh and never rereads it mid-refresh.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::commit::CommitRequest;
use crate::error::DeviceError;
use crate::fence::Fence;
use crate::geometry::{DisplaySize, Rect};
use crate::layer::{Buffer, BufferId, PixelFormat, Transform};
use crate::plan::ScalerId;
use crate::time::HostTime;

/// Identifies a display output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Plane commit
// ---------------------------------------------------------------------------

/// Applies a complete plane configuration in one atomic step.
pub trait PlaneCommitter {
    /// Submits `request`. Input fences stay owned by the caller, which
    /// closes them once this returns.
    ///
    /// # Errors
    ///
    /// Returns the driver's rejection.
    fn commit(&mut self, request: &CommitRequest) -> Result<Fence, DeviceError>;
}

// ---------------------------------------------------------------------------
// Scaler engine
// ---------------------------------------------------------------------------

/// An open scaler engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// Source side of a scaler configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalerSource {
    /// Region read, in buffer pixels.
    pub crop: Rect,
    /// Row pitch in pixels.
    pub stride: u32,
    /// Allocated rows.
    pub vstride: u32,
    /// Input layout.
    pub format: PixelFormat,
    /// Secure input.
    pub protected: bool,
}

/// Destination side of a scaler configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalerDestination {
    /// Region written.
    pub rect: Rect,
    /// Width of the whole destination surface.
    pub full_width: u32,
    /// Height of the whole destination surface.
    pub full_height: u32,
    /// Output layout.
    pub format: PixelFormat,
    /// Rotation and mirroring applied on the way.
    pub transform: Transform,
    /// Secure output.
    pub protected: bool,
    /// Limited-range RGB output, used when converting from YUV.
    pub narrow_range: bool,
}

/// One side of a queued conversion. Fences are borrowed: the engine must
/// duplicate anything it keeps.
#[derive(Clone, Copy, Debug)]
pub struct FrameSide<'a> {
    /// Buffer read or written; `None` when the output goes straight to a
    /// plane.
    pub buffer: Option<BufferId>,
    /// Wait for this before touching the buffer.
    pub acquire: Option<&'a Fence>,
}

/// Fences returned by a queued conversion.
#[derive(Debug, Default)]
pub struct RunFences {
    /// Signals when the source buffer is no longer read.
    pub source_release: Option<Fence>,
    /// Signals when the destination buffer is fully written.
    pub destination_release: Option<Fence>,
}

/// Operation set of the scaling/conversion units.
pub trait ScalerEngine {
    /// Opens unit `unit`.
    ///
    /// # Errors
    ///
    /// Returns the driver's rejection.
    fn create(&mut self, unit: ScalerId, local: bool) -> Result<EngineHandle, DeviceError>;

    /// Closes an engine. Never fails.
    fn destroy(&mut self, handle: EngineHandle);

    /// Stops streaming. Stopping a stopped engine succeeds.
    ///
    /// # Errors
    ///
    /// Returns the driver's rejection.
    fn stop(&mut self, handle: EngineHandle) -> Result<(), DeviceError>;

    /// Applies a new configuration.
    ///
    /// # Errors
    ///
    /// Returns the driver's rejection.
    fn configure(
        &mut self,
        handle: EngineHandle,
        src: &ScalerSource,
        dst: &ScalerDestination,
    ) -> Result<(), DeviceError>;

    /// Queues one conversion.
    ///
    /// # Errors
    ///
    /// Returns the driver's rejection.
    fn run(
        &mut self,
        handle: EngineHandle,
        src: FrameSide<'_>,
        dst: FrameSide<'_>,
    ) -> Result<RunFences, DeviceError>;
}

// ---------------------------------------------------------------------------
// Buffer allocation
// ---------------------------------------------------------------------------

/// How an allocated buffer will be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BufferUsage {
    /// Contents must stay in protected memory.
    pub protected: bool,
    /// Planes scan the buffer out.
    pub scanout: bool,
}

/// Allocates scaler destination buffers.
pub trait BufferAllocator {
    /// Allocates a `width` × `height` buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::OutOfMemory`] or the driver's rejection.
    fn alloc(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Result<Buffer, DeviceError>;

    /// Releases a buffer.
    fn free(&mut self, buffer: Buffer);
}

/// The collaborators one refresh drives.
pub struct Hardware<'a> {
    /// Plane commit.
    pub planes: &'a mut dyn PlaneCommitter,
    /// Scaler units.
    pub scalers: &'a mut dyn ScalerEngine,
    /// Destination buffer allocator.
    pub allocator: &'a mut dyn BufferAllocator,
}

impl fmt::Debug for Hardware<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hardware").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// A point-in-time copy of the monitor-maintained device state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DeviceState {
    /// The output is attached.
    pub connected: bool,
    /// Resolution the planes scan out at.
    pub display: DisplaySize,
    /// Timestamp of the latest vsync.
    pub last_vsync: HostTime,
}

/// Device state shared between the monitor and the refresh path.
///
/// Connection state and mode are packed into one word, so a snapshot never
/// mixes two hot-plug events. Display edges are clamped to
/// [`MAX_DISPLAY_EDGE`].
#[derive(Debug, Default)]
pub struct DeviceStateCell {
    hotplug: AtomicU64,
    last_vsync: AtomicU64,
    gate: OutputGate,
}

/// Largest display width or height the shared state can hold.
pub const MAX_DISPLAY_EDGE: u32 = (1 << 31) - 1;

impl DeviceStateCell {
    /// Creates a cell holding `state`, with the output gate closed.
    #[must_use]
    pub fn new(state: DeviceState) -> Self {
        Self {
            hotplug: AtomicU64::new(pack(state.connected, state.display)),
            last_vsync: AtomicU64::new(state.last_vsync.ticks()),
            gate: OutputGate::new(false),
        }
    }

    /// Reads the current state.
    #[must_use]
    pub fn snapshot(&self) -> DeviceState {
        let (connected, display) = unpack(self.hotplug.load(Ordering::Acquire));
        DeviceState {
            connected,
            display,
            last_vsync: HostTime(self.last_vsync.load(Ordering::Relaxed)),
        }
    }

    /// Records a hot-plug transition.
    pub fn set_hotplug(&self, connected: bool, display: DisplaySize) {
        self.hotplug.store(pack(connected, display), Ordering::Release);
    }

    /// Records a vsync timestamp.
    pub fn record_vsync(&self, at: HostTime) {
        self.last_vsync.store(at.ticks(), Ordering::Relaxed);
    }

    /// The output enable gate.
    #[must_use]
    pub const fn gate(&self) -> &OutputGate {
        &self.gate
    }
}

// Width in bits 32..63, height in bits 1..31, connected in bit 0.
fn pack(connected: bool, size: DisplaySize) -> u64 {
    (u64::from(size.width.min(MAX_DISPLAY_EDGE)) << 32)
        | (u64::from(size.height.min(MAX_DISPLAY_EDGE)) << 1)
        | u64::from(connected)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "each edge of the packed word fits in a u32"
)]
fn unpack(word: u64) -> (bool, DisplaySize) {
    let width = (word >> 32) as u32;
    let height = ((word >> 1) as u32) & MAX_DISPLAY_EDGE;
    (word & 1 != 0, DisplaySize::new(width, height))
}

/// Result of an enable or disable request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The output changed state.
    Changed,
    /// The output was already in the requested state.
    Unchanged,
}

/// Idempotent output enable state.
///
/// Both the monitor and the refresh path may request a transition; only the
/// first request for a given state reports [`Transition::Changed`].
#[derive(Debug, Default)]
pub struct OutputGate {
    enabled: AtomicBool,
}

impl OutputGate {
    /// Creates a gate in the given state.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Enables the output.
    pub fn enable(&self) -> Transition {
        self.swap_to(true)
    }

    /// Disables the output.
    pub fn disable(&self) -> Transition {
        self.swap_to(false)
    }

    /// Whether the output is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn swap_to(&self, target: bool) -> Transition {
        match self
            .enabled
            .compare_exchange(!target, target, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Transition::Changed,
            Err(_) => Transition::Unchanged,
        }
    }
}
