// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scaler unit lifecycle.
//!
//! A [`ScalerManager`] owns every scaler unit of a display. Each unit caches
//! the source and destination configuration it was last set up with. A
//! memory-to-memory unit also owns a ring of destination buffers, so the
//! engine can write slot *k+1* while a plane still scans out slot *k*.
//!
//! ```text
//!            configs equal?
//!   layer ──► yes ─────────────────────────────┐
//!            no ──► stop ► configure ► realloc ─┤
//!                                               ▼
//!                     run(src + acquire, dst slot + slot release)
//!                                               │
//!                 source release ◄──────────────┴──► destination release
//!                 (to the layer)                     (plane input fence)
//! ```
//!
//! Any failure resets the unit: the engine is destroyed, the ring freed, and
//! the cache cleared, so the next refresh starts from scratch. Fences handed
//! to the manager are closed on every path.

use alloc::vec::Vec;
use core::fmt;

use crate::capability::{ScalerPath, align_crop_and_center};
use crate::config::DeviceCaps;
use crate::device::{
    BufferAllocator, BufferUsage, EngineHandle, FrameSide, RunFences, ScalerDestination,
    ScalerEngine, ScalerSource,
};
use crate::error::{DeviceError, Error, ScalerStage};
use crate::fence::{Fence, ReleaseFence};
use crate::geometry::{DisplaySize, Rect, clamp_to_i32};
use crate::layer::{Buffer, BufferId, Layer, PixelFormat};
use crate::plan::ScalerId;
use crate::trace::ScalerAction;

/// The format a scaler writes for a given input.
///
/// RGB inputs other than RGB565 keep their channel order; RGB565 and YUV
/// inputs come out with red and blue swapped.
#[must_use]
pub const fn destination_format(source: PixelFormat) -> PixelFormat {
    match source {
        PixelFormat::Rgb565 => PixelFormat::Bgra8888,
        f if f.is_rgb() => PixelFormat::Rgbx8888,
        _ => PixelFormat::Bgra8888,
    }
}

/// Where a memory-to-memory run left its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingOutput {
    /// The destination buffer written.
    pub buffer: Buffer,
    /// Its slot in the ring.
    pub slot: usize,
    /// The part of the buffer holding the image.
    pub crop: Rect,
}

/// A unit bound to a layer for this refresh.
#[derive(Debug)]
pub struct Binding {
    /// The unit.
    pub unit: ScalerId,
    /// How it feeds its plane.
    pub path: ScalerPath,
    /// The destination slot, for memory-to-memory units.
    pub output: Option<RingOutput>,
    /// Input fence for the plane scanning the output.
    pub plane_acquire: Option<Fence>,
    /// Release for the layer's source buffer.
    pub source_release: ReleaseFence,
    /// Whether the unit was reused, reconfigured, or skipped the run.
    pub action: ScalerAction,
}

/// Read-only view of one unit, for tests and dumps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitStatus {
    /// The open path, if the engine is open.
    pub path: Option<ScalerPath>,
    /// A configuration is cached.
    pub configured: bool,
    /// Destination buffers held.
    pub ring_len: usize,
    /// Slot the next run writes.
    pub next_slot: usize,
    /// Slots still waiting on a plane release.
    pub pending_releases: usize,
}

// ---------------------------------------------------------------------------
// Destination ring
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RingSlot {
    buffer: Buffer,
    release: Option<Fence>,
}

#[derive(Debug)]
struct DestinationRing {
    slots: Vec<RingSlot>,
    next: usize,
    last: Option<usize>,
}

impl DestinationRing {
    fn allocate(
        allocator: &mut dyn BufferAllocator,
        depth: usize,
        dst: &ScalerDestination,
    ) -> Result<Self, DeviceError> {
        let usage = BufferUsage {
            protected: dst.protected,
            scanout: true,
        };
        let mut slots = Vec::with_capacity(depth);
        for _ in 0..depth {
            match allocator.alloc(dst.full_width, dst.full_height, dst.format, usage) {
                Ok(buffer) => slots.push(RingSlot {
                    buffer,
                    release: None,
                }),
                Err(e) => {
                    for slot in slots {
                        allocator.free(slot.buffer);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            slots,
            next: 0,
            last: None,
        })
    }

    /// Frees every buffer once planes are done with it, waiting at most
    /// `wait_ms` per slot.
    fn teardown(self, allocator: &mut dyn BufferAllocator, wait_ms: u32) {
        for slot in self.slots {
            if let Some(release) = slot.release {
                // A timed-out or failed wait still frees the slot.
                let _ = release.wait(wait_ms);
            }
            allocator.free(slot.buffer);
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Unit {
    engine: Option<(EngineHandle, ScalerPath)>,
    config: Option<(ScalerSource, ScalerDestination)>,
    ring: Option<DestinationRing>,
    crop: Rect,
    last_source: Option<BufferId>,
}

impl Unit {
    const fn idle() -> Self {
        Self {
            engine: None,
            config: None,
            ring: None,
            crop: Rect::ZERO,
            last_source: None,
        }
    }

    fn is_idle(&self) -> bool {
        self.engine.is_none() && self.ring.is_none()
    }

    /// Brings the unit to `src`/`dst`. Returns whether anything changed.
    fn ensure_configured(
        &mut self,
        id: ScalerId,
        path: ScalerPath,
        src: ScalerSource,
        dst: ScalerDestination,
        crop: Rect,
        settings: &Settings,
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
    ) -> Result<bool, (ScalerStage, DeviceError)> {
        let unchanged = self.engine.is_some_and(|(_, p)| p == path)
            && self.config == Some((src, dst))
            && (path == ScalerPath::Local || self.ring.is_some());
        if unchanged {
            return Ok(false);
        }

        if let Some((handle, current)) = self.engine {
            if current == path {
                engine.stop(handle).map_err(|e| (ScalerStage::Stop, e))?;
            } else {
                // Switching paths needs a fresh engine.
                let _ = engine.stop(handle);
                engine.destroy(handle);
                self.engine = None;
            }
        }
        let handle = match self.engine {
            Some((handle, _)) => handle,
            None => {
                let handle = engine
                    .create(id, path == ScalerPath::Local)
                    .map_err(|e| (ScalerStage::Create, e))?;
                self.engine = Some((handle, path));
                handle
            }
        };

        self.config = None;
        self.last_source = None;
        engine
            .configure(handle, &src, &dst)
            .map_err(|e| (ScalerStage::Configure, e))?;

        if let Some(ring) = self.ring.take() {
            ring.teardown(allocator, settings.teardown_wait_ms);
        }
        if path == ScalerPath::MemoryToMemory {
            let ring = DestinationRing::allocate(allocator, settings.ring_depth, &dst)
                .map_err(|e| (ScalerStage::Allocate, e))?;
            self.ring = Some(ring);
        }
        self.config = Some((src, dst));
        self.crop = crop;
        Ok(true)
    }

    /// Tears the unit down to idle.
    fn reset(
        &mut self,
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
        wait_ms: u32,
    ) {
        if let Some((handle, _)) = self.engine.take() {
            let _ = engine.stop(handle);
            engine.destroy(handle);
        }
        if let Some(ring) = self.ring.take() {
            ring.teardown(allocator, wait_ms);
        }
        *self = Self::idle();
    }

    fn status(&self) -> UnitStatus {
        let (ring_len, next_slot, pending_releases) = match &self.ring {
            Some(ring) => (
                ring.slots.len(),
                ring.next,
                ring.slots.iter().filter(|s| s.release.is_some()).count(),
            ),
            None => (0, 0, 0),
        };
        UnitStatus {
            path: self.engine.map(|(_, path)| path),
            configured: self.config.is_some(),
            ring_len,
            next_slot,
            pending_releases,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Settings {
    ring_depth: usize,
    dst_crop_align: u32,
    dst_buffer_align: (u32, u32),
    skip_duplicates: bool,
    teardown_wait_ms: u32,
}

impl Settings {
    fn configs(
        &self,
        layer: &Layer,
        buffer: &Buffer,
        path: ScalerPath,
        display: DisplaySize,
    ) -> (ScalerSource, ScalerDestination, Rect) {
        let src = ScalerSource {
            crop: Rect::from_kurbo(layer.source_crop),
            stride: buffer.stride,
            vstride: buffer.vstride,
            format: buffer.format,
            protected: buffer.protected,
        };
        let frame = layer.display_frame.normalized();
        let format = destination_format(buffer.format);
        let narrow_range = buffer.format.is_yuv();
        match path {
            ScalerPath::Local => {
                let dst = ScalerDestination {
                    rect: frame,
                    full_width: display.width,
                    full_height: display.height,
                    format,
                    transform: layer.transform,
                    protected: false,
                    narrow_range,
                };
                (src, dst, frame)
            }
            ScalerPath::MemoryToMemory => {
                let (w, h) = (frame.width(), frame.height());
                let (w, h, crop) = if buffer.protected {
                    align_crop_and_center(w, h, self.dst_crop_align)
                } else {
                    (w, h, Rect::from_xywh(0, 0, clamp_to_i32(w), clamp_to_i32(h)))
                };
                let (align_w, align_h) = self.dst_buffer_align;
                let dst = ScalerDestination {
                    rect: crop,
                    full_width: w.next_multiple_of(align_w.max(1)),
                    full_height: h.next_multiple_of(align_h.max(1)),
                    format,
                    transform: layer.transform,
                    protected: buffer.protected,
                    narrow_range,
                };
                (src, dst, crop)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScalerManager
// ---------------------------------------------------------------------------

/// Owns the scaler units of one display.
#[derive(Debug)]
pub struct ScalerManager {
    units: Vec<Unit>,
    settings: Settings,
}

impl ScalerManager {
    /// Creates idle units for `caps.scalers`.
    #[must_use]
    pub fn new(caps: &DeviceCaps) -> Self {
        Self {
            units: (0..caps.scalers).map(|_| Unit::idle()).collect(),
            settings: Settings {
                ring_depth: caps.ring_depth,
                dst_crop_align: caps.dst_crop_align,
                dst_buffer_align: caps.dst_buffer_align,
                skip_duplicates: caps.skip_duplicate_frames,
                teardown_wait_ms: caps.ring_teardown_wait_ms,
            },
        }
    }

    /// Number of units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// State of one unit.
    #[must_use]
    pub fn status(&self, unit: ScalerId) -> Option<UnitStatus> {
        self.units.get(unit.index()).map(Unit::status)
    }

    /// Configures `unit` for `layer` if needed and queues one conversion.
    ///
    /// `acquire` is the layer's acquire fence; it is closed before this
    /// returns, on success and failure alike.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceConfigFailed`] or [`Error::DeviceRunFailed`].
    /// The unit has been reset by then.
    pub fn configure_and_run(
        &mut self,
        unit: ScalerId,
        path: ScalerPath,
        layer: &Layer,
        acquire: Option<Fence>,
        display: DisplaySize,
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
    ) -> Result<Binding, Error> {
        let settings = self.settings;
        let (Some(state), Some(buffer)) = (self.units.get_mut(unit.index()), layer.buffer) else {
            return Err(Error::DeviceConfigFailed {
                unit,
                stage: ScalerStage::Create,
                source: DeviceError::Unsupported,
            });
        };
        let (src, dst, crop) = settings.configs(layer, &buffer, path, display);
        let reconfigured = match state.ensure_configured(
            unit, path, src, dst, crop, &settings, engine, allocator,
        ) {
            Ok(changed) => changed,
            Err((stage, source)) => {
                state.reset(engine, allocator, settings.teardown_wait_ms);
                drop(acquire);
                return Err(Error::DeviceConfigFailed {
                    unit,
                    stage,
                    source,
                });
            }
        };

        if settings.skip_duplicates
            && !reconfigured
            && path == ScalerPath::MemoryToMemory
            && state.last_source == Some(buffer.id)
            && let Some(ring) = &mut state.ring
            && let Some(last) = ring.last
        {
            drop(acquire);
            let slot = &mut ring.slots[last];
            // Shown again; the old release no longer describes it.
            slot.release = None;
            return Ok(Binding {
                unit,
                path,
                output: Some(RingOutput {
                    buffer: slot.buffer,
                    slot: last,
                    crop: state.crop,
                }),
                plane_acquire: None,
                source_release: ReleaseFence::Signaled,
                action: ScalerAction::DuplicateSkipped,
            });
        }

        let Some((handle, _)) = state.engine else {
            drop(acquire);
            return Err(Error::DeviceRunFailed {
                unit,
                source: DeviceError::Unsupported,
            });
        };
        let (target, slot_release) = match &mut state.ring {
            Some(ring) => {
                let index = ring.next;
                let slot = &mut ring.slots[index];
                (Some((slot.buffer, index)), slot.release.take())
            }
            None => (None, None),
        };
        let result = engine.run(
            handle,
            FrameSide {
                buffer: Some(buffer.id),
                acquire: acquire.as_ref(),
            },
            FrameSide {
                buffer: target.map(|(b, _)| b.id),
                acquire: slot_release.as_ref(),
            },
        );
        drop(acquire);
        drop(slot_release);

        match result {
            Ok(RunFences {
                source_release,
                destination_release,
            }) => {
                state.last_source = Some(buffer.id);
                if let (Some(ring), Some((_, index))) = (&mut state.ring, target) {
                    ring.next = (index + 1) % ring.slots.len().max(1);
                    ring.last = Some(index);
                }
                let output = target.map(|(buffer, slot)| RingOutput {
                    buffer,
                    slot,
                    crop: state.crop,
                });
                // A local unit feeds its plane directly; nothing waits on
                // its destination side.
                let plane_acquire = match path {
                    ScalerPath::MemoryToMemory => destination_release,
                    ScalerPath::Local => None,
                };
                Ok(Binding {
                    unit,
                    path,
                    output,
                    plane_acquire,
                    source_release: source_release.into(),
                    action: if reconfigured {
                        ScalerAction::Reconfigured
                    } else {
                        ScalerAction::Reused
                    },
                })
            }
            Err(source) => {
                state.reset(engine, allocator, settings.teardown_wait_ms);
                Err(Error::DeviceRunFailed { unit, source })
            }
        }
    }

    /// Stores the plane's release for the slot a unit just produced.
    ///
    /// The fence is closed if the unit or slot no longer exists.
    pub fn attach_release(&mut self, unit: ScalerId, slot: usize, fence: Fence) {
        if let Some(ring) = self
            .units
            .get_mut(unit.index())
            .and_then(|u| u.ring.as_mut())
            && let Some(s) = ring.slots.get_mut(slot)
        {
            s.release = Some(fence);
        }
    }

    /// Tears down one unit.
    pub fn reset(
        &mut self,
        unit: ScalerId,
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
    ) {
        let wait = self.settings.teardown_wait_ms;
        if let Some(state) = self.units.get_mut(unit.index()) {
            state.reset(engine, allocator, wait);
        }
    }

    /// Tears down every active unit not listed in `keep`. Returns the units
    /// released.
    pub fn release_unused(
        &mut self,
        keep: &[ScalerId],
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
    ) -> Vec<ScalerId> {
        let wait = self.settings.teardown_wait_ms;
        let mut released = Vec::new();
        for (index, state) in self.units.iter_mut().enumerate() {
            let id = ScalerId(u32::try_from(index).unwrap_or(u32::MAX));
            if state.is_idle() || keep.contains(&id) {
                continue;
            }
            state.reset(engine, allocator, wait);
            released.push(id);
        }
        released
    }

    /// Tears down every active unit.
    pub fn release_all(
        &mut self,
        engine: &mut dyn ScalerEngine,
        allocator: &mut dyn BufferAllocator,
    ) -> Vec<ScalerId> {
        self.release_unused(&[], engine, allocator)
    }

    /// Writes one block per unit.
    ///
    /// # Errors
    ///
    /// Propagates formatter errors.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for (index, unit) in self.units.iter().enumerate() {
            let Some((handle, path)) = unit.engine else {
                writeln!(out, "scaler {index}: idle")?;
                continue;
            };
            writeln!(out, "scaler {index}: {path:?} engine={}", handle.0)?;
            if let Some((src, dst)) = &unit.config {
                writeln!(
                    out,
                    "  src {:?} crop={:?} stride={}x{} protected={}",
                    src.format, src.crop, src.stride, src.vstride, src.protected
                )?;
                writeln!(
                    out,
                    "  dst {:?} rect={:?} full={}x{} {:?}",
                    dst.format, dst.rect, dst.full_width, dst.full_height, dst.transform.rotation
                )?;
            }
            if let Some(ring) = &unit.ring {
                let status = unit.status();
                writeln!(
                    out,
                    "  ring {} slots, next={} last={:?} pending={}",
                    ring.slots.len(),
                    ring.next,
                    ring.last,
                    status.pending_releases
                )?;
            }
        }
        Ok(())
    }
}
