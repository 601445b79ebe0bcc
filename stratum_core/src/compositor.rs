// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-display refresh pipeline.
//!
//! A refresh runs in two calls on the display's composition thread:
//!
//! 1. [`Compositor::prepare`] snapshots the device state, solves the
//!    request, and consults the static-layer cache. The returned plan tells
//!    the caller which layers to compose in software into the framebuffer
//!    target.
//! 2. [`Compositor::set`] drives the scaler units, commits the plane
//!    configuration, and hands back one release per layer.
//!
//! Fences move by value through both calls. Whatever the outcome, every
//! acquire fence of the request is either submitted or closed, and every
//! release the caller receives is theirs to close.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use crate::cache::StaticLayerCache;
use crate::capability::ScalerPath;
use crate::commit::{CommitBuilder, PlaneConfig, buffer_plane};
use crate::config::{ConfigError, DeviceCaps};
use crate::device::{DeviceState, DeviceStateCell, Hardware, OutputId, Transition};
use crate::error::{Error, ScalerStage};
use crate::fence::ReleaseFence;
use crate::geometry::{DisplaySize, Rect};
use crate::layer::{CompositionRequest, LayerKind};
use crate::plan::{AssignmentPlan, PathMode, PlaneSource, ScalerId};
use crate::scaler::{Binding, ScalerManager};
use crate::solver::Solver;
use crate::time::HostTime;
use crate::trace::{
    CacheDecision, CacheEvent, CommitEvent, CommitOutcome, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, PlanEvent, RefreshBeginEvent, RefreshSummaryBuilder, ScalerAction, ScalerEvent,
    Tracer,
};

/// What a refresh hands back.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// One release per request layer, in request order.
    pub releases: Vec<ReleaseFence>,
    /// `Err` when the display was blanked.
    pub status: Result<(), Error>,
    /// Scaler failures that left a single layer without output.
    pub degraded: Vec<Error>,
    /// The plan that was carried out.
    pub plan: AssignmentPlan,
}

fn never() -> HostTime {
    HostTime(0)
}

/// Composition state for one display.
#[derive(Debug)]
pub struct Compositor {
    output: OutputId,
    caps: DeviceCaps,
    solver: Solver,
    cache: StaticLayerCache,
    scalers: ScalerManager,
    commit: CommitBuilder,
    device: Arc<DeviceStateCell>,
    snapshot: DeviceState,
    last_display: Option<DisplaySize>,
    refresh_index: u64,
    clock: fn() -> HostTime,
    summary: Option<RefreshSummaryBuilder>,
}

impl Compositor {
    /// Creates a compositor for `output`, reading device state from
    /// `device`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] if `caps` is inconsistent.
    pub fn new(
        output: OutputId,
        caps: DeviceCaps,
        device: Arc<DeviceStateCell>,
    ) -> Result<Self, ConfigError> {
        caps.validate()?;
        Ok(Self {
            output,
            caps,
            solver: Solver::new(caps),
            cache: StaticLayerCache::new(caps.skip_static_layers, caps.static_layer_capacity),
            scalers: ScalerManager::new(&caps),
            commit: CommitBuilder::new(caps.planes),
            device,
            snapshot: DeviceState::default(),
            last_display: None,
            refresh_index: 0,
            clock: never,
            summary: None,
        })
    }

    /// Uses `clock` for trace timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> HostTime) -> Self {
        self.clock = clock;
        self
    }

    /// The output this compositor drives.
    #[must_use]
    pub const fn output(&self) -> OutputId {
        self.output
    }

    /// The device limits in use.
    #[must_use]
    pub const fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    /// Shared device state.
    #[must_use]
    pub fn device(&self) -> &Arc<DeviceStateCell> {
        &self.device
    }

    /// The scaler units.
    #[must_use]
    pub const fn scalers(&self) -> &ScalerManager {
        &self.scalers
    }

    /// The plane configuration last committed.
    #[must_use]
    pub fn last_plane_configs(&self) -> &[PlaneConfig] {
        self.commit.last_configs()
    }

    /// Number of refreshes prepared so far.
    #[must_use]
    pub const fn refresh_index(&self) -> u64 {
        self.refresh_index
    }

    /// Starts a refresh: snapshots device state, solves `request`, and
    /// applies static-layer reuse.
    pub fn prepare(
        &mut self,
        request: &CompositionRequest,
        tracer: &mut Tracer<'_>,
    ) -> AssignmentPlan {
        self.refresh_index += 1;
        let refresh_index = self.refresh_index;
        let now = (self.clock)();
        self.snapshot = self.device.snapshot();
        let display = self.snapshot.display;
        let resized = self.last_display.is_some_and(|d| d != display);
        self.last_display = Some(display);

        let begin = RefreshBeginEvent {
            refresh_index,
            output: self.output,
            now,
            layer_count: count_u32(request.layers.len()),
            geometry_changed: request.geometry_changed || resized,
            display,
        };
        tracer.refresh_begin(&begin);
        let mut summary = RefreshSummaryBuilder::new(&begin);
        self.phase_begin(&mut summary, PhaseKind::Prepare, tracer);

        let solved = self
            .solver
            .solve_traced(request, display, refresh_index, tracer);
        let (decision, reused) = if resized {
            self.cache.invalidate();
            (CacheDecision::Invalidated, None)
        } else {
            self.cache.lookup(request, &solved)
        };
        tracer.cache(&CacheEvent {
            refresh_index,
            decision,
        });
        let plan = reused.unwrap_or(solved);

        let plan_event = PlanEvent {
            refresh_index,
            planes_used: count_u32(plan.planes_used()),
            fallback: plan.fallback(),
            scalers_bound: count_u32(plan.scaler_bindings().count()),
            passes: plan.passes(),
            reused: plan.is_reused(),
        };
        tracer.plan(&plan_event);
        summary.set_plan(&plan_event);
        self.phase_end(&mut summary, PhaseKind::Prepare, tracer);
        self.summary = Some(summary);
        plan
    }

    /// Finishes a refresh prepared with [`prepare`](Self::prepare).
    ///
    /// `request` must be the request `plan` was prepared for, with the
    /// framebuffer target filled in when the plan needs one.
    pub fn set(
        &mut self,
        mut request: CompositionRequest,
        plan: AssignmentPlan,
        mut hw: Hardware<'_>,
        tracer: &mut Tracer<'_>,
    ) -> RefreshOutcome {
        let refresh_index = self.refresh_index;
        let display = self.snapshot.display;
        let mut summary = self.summary.take();
        let mut releases: Vec<ReleaseFence> =
            request.layers.iter().map(|_| ReleaseFence::Signaled).collect();
        let mut degraded = Vec::new();

        if !self.snapshot.connected {
            if self.device.gate().disable() == Transition::Changed {
                self.release_units(&[], &mut hw, tracer);
            }
            self.finish(summary, false, tracer);
            return RefreshOutcome {
                releases,
                status: Ok(()),
                degraded,
                plan,
            };
        }
        self.device.gate().enable();

        let target = request.framebuffer_target();
        if plan.needs_framebuffer_target() && target.is_none() {
            let now = (self.clock)();
            let outcome = match self.commit.blank(&mut *hw.planes) {
                Ok(()) => CommitOutcome::Blanked,
                Err(_) => CommitOutcome::BlankFailed,
            };
            tracer.commit(&CommitEvent {
                refresh_index,
                submitted_at: now,
                planes_used: 0,
                outcome,
            });
            self.cache.invalidate();
            self.release_units(&[], &mut hw, tracer);
            self.finish(summary, true, tracer);
            return RefreshOutcome {
                releases,
                status: Err(Error::FramebufferTargetMissing),
                degraded,
                plan,
            };
        }

        // Scale.
        if let Some(s) = summary.as_mut() {
            self.phase_begin(s, PhaseKind::Scale, tracer);
        }
        let mut bindings: Vec<Option<Binding>> = request.layers.iter().map(|_| None).collect();
        let mut bound: Vec<ScalerId> = Vec::new();
        let jobs: Vec<(usize, PathMode)> = plan.scaler_bindings().collect();
        for (index, mode) in jobs {
            let (unit, path) = match mode {
                PathMode::Direct => continue,
                PathMode::Local(unit) => (unit, ScalerPath::Local),
                PathMode::MemoryToMemory(unit) => (unit, ScalerPath::MemoryToMemory),
            };
            let acquire = request.layers[index].acquire_fence.take();
            let result = self.scalers.configure_and_run(
                unit,
                path,
                &request.layers[index],
                acquire,
                display,
                &mut *hw.scalers,
                &mut *hw.allocator,
            );
            let action = match result {
                Ok(binding) => {
                    let action = binding.action;
                    bound.push(unit);
                    bindings[index] = Some(binding);
                    action
                }
                Err(e) => {
                    let stage = e.stage().unwrap_or(ScalerStage::Run);
                    degraded.push(e);
                    ScalerAction::Failed(stage)
                }
            };
            tracer.scaler(&ScalerEvent {
                refresh_index,
                unit,
                layer_index: Some(count_u32(index)),
                action,
            });
        }
        if let Some(s) = summary.as_mut() {
            self.phase_end(s, PhaseKind::Scale, tracer);
        }

        // Commit.
        if let Some(s) = summary.as_mut() {
            self.phase_begin(s, PhaseKind::Commit, tracer);
        }
        let mut commit = self.commit.request();
        for assignment in plan.planes() {
            let (config, fence) = match assignment.source {
                PlaneSource::Layer { index, path } => {
                    let layer = &mut request.layers[index];
                    match (path, layer.buffer, bindings[index].as_mut()) {
                        (PathMode::Direct, Some(buffer), _) => (
                            buffer_plane(
                                &buffer,
                                Rect::from_kurbo(layer.source_crop),
                                layer.display_frame,
                                layer.blend,
                                display,
                            ),
                            layer.acquire_fence.take(),
                        ),
                        (PathMode::Local(unit), _, Some(_)) => (
                            PlaneConfig::Scaler {
                                unit,
                                frame: layer.display_frame.normalized().intersect(display.bounds()),
                                blend: layer.blend,
                            },
                            None,
                        ),
                        (PathMode::MemoryToMemory(_), _, Some(binding)) => match binding.output {
                            Some(out) => (
                                buffer_plane(
                                    &out.buffer,
                                    out.crop,
                                    layer.display_frame,
                                    layer.blend,
                                    display,
                                ),
                                binding.plane_acquire.take(),
                            ),
                            None => (PlaneConfig::Empty, None),
                        },
                        // The scaler failed; the layer shows nothing.
                        _ => (PlaneConfig::Empty, None),
                    }
                }
                PlaneSource::Background { index } => match request.layers[index].kind {
                    LayerKind::Background(color) => (
                        PlaneConfig::SolidColor {
                            color,
                            frame: display.bounds(),
                        },
                        None,
                    ),
                    _ => (PlaneConfig::Empty, None),
                },
                PlaneSource::Fallback => {
                    match target.map(|t| &mut request.layers[t]) {
                        Some(layer) => match layer.buffer {
                            Some(buffer) => (
                                buffer_plane(
                                    &buffer,
                                    Rect::from_kurbo(layer.source_crop),
                                    layer.display_frame,
                                    layer.blend,
                                    display,
                                ),
                                layer.acquire_fence.take(),
                            ),
                            None => (PlaneConfig::Empty, None),
                        },
                        None => (PlaneConfig::Empty, None),
                    }
                }
                PlaneSource::Reused => (self.commit.last_config(assignment.plane), None),
            };
            commit.set(assignment.plane, config, fence);
        }
        // Everything not submitted is done with: software-composed and
        // reused layers, and the target when it is not shown.
        for layer in &mut request.layers {
            layer.acquire_fence = None;
        }

        let planes_used = count_u32(commit.planes_used());
        let submitted_at = (self.clock)();
        let (status, outcome) = match self.commit.commit(commit, &mut *hw.planes) {
            Ok(mut set) => {
                for assignment in plan.planes() {
                    let release = set.take(assignment.plane);
                    match assignment.source {
                        PlaneSource::Layer {
                            index,
                            path: PathMode::Direct,
                        } => releases[index] = release,
                        PlaneSource::Layer {
                            index,
                            path: PathMode::Local(_),
                        } => {
                            if let Some(binding) = bindings[index].as_mut() {
                                releases[index] = mem::take(&mut binding.source_release);
                            }
                        }
                        PlaneSource::Layer {
                            index,
                            path: PathMode::MemoryToMemory(unit),
                        } => {
                            if let Some(binding) = bindings[index].as_mut() {
                                releases[index] = mem::take(&mut binding.source_release);
                                if let (Some(out), Some(fence)) =
                                    (binding.output, release.into_fence())
                                {
                                    self.scalers.attach_release(unit, out.slot, fence);
                                }
                            }
                        }
                        PlaneSource::Fallback => {
                            if let Some(t) = target {
                                releases[t] = release;
                            }
                        }
                        PlaneSource::Background { .. } | PlaneSource::Reused => {}
                    }
                }
                (Ok(()), CommitOutcome::Committed)
            }
            Err(failure) => {
                self.cache.invalidate();
                // Queued conversions may still be reading their sources.
                for (index, binding) in bindings.iter_mut().enumerate() {
                    if let Some(binding) = binding.as_mut() {
                        releases[index] = mem::take(&mut binding.source_release);
                    }
                }
                let outcome = if failure.blanked {
                    CommitOutcome::Blanked
                } else {
                    CommitOutcome::BlankFailed
                };
                (Err(Error::CommitFailed(failure.error)), outcome)
            }
        };
        tracer.commit(&CommitEvent {
            refresh_index,
            submitted_at,
            planes_used,
            outcome,
        });
        drop(bindings);

        self.release_units(&bound, &mut hw, tracer);
        if let Some(s) = summary.as_mut() {
            self.phase_end(s, PhaseKind::Commit, tracer);
        }
        self.finish(summary, status.is_err() || !degraded.is_empty(), tracer);
        RefreshOutcome {
            releases,
            status,
            degraded,
            plan,
        }
    }

    /// Runs [`prepare`](Self::prepare) and [`set`](Self::set) back to back,
    /// for callers whose framebuffer target is already composed.
    pub fn refresh(
        &mut self,
        request: CompositionRequest,
        hw: Hardware<'_>,
        tracer: &mut Tracer<'_>,
    ) -> RefreshOutcome {
        let plan = self.prepare(&request, tracer);
        self.set(request, plan, hw, tracer)
    }

    /// Writes the last committed planes and every scaler unit.
    ///
    /// # Errors
    ///
    /// Propagates formatter errors.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let state = self.snapshot;
        writeln!(
            out,
            "output {} refresh {} {}x{} connected={} enabled={} cache={}",
            self.output.0,
            self.refresh_index,
            state.display.width,
            state.display.height,
            state.connected,
            self.device.gate().is_enabled(),
            if self.cache.is_armed() { "armed" } else { "empty" },
        )?;
        self.commit.dump(out)?;
        self.scalers.dump(out)
    }

    fn release_units(
        &mut self,
        keep: &[ScalerId],
        hw: &mut Hardware<'_>,
        tracer: &mut Tracer<'_>,
    ) {
        let released = self
            .scalers
            .release_unused(keep, &mut *hw.scalers, &mut *hw.allocator);
        for unit in released {
            tracer.scaler(&ScalerEvent {
                refresh_index: self.refresh_index,
                unit,
                layer_index: None,
                action: ScalerAction::Released,
            });
        }
    }

    fn phase_begin(
        &self,
        summary: &mut RefreshSummaryBuilder,
        phase: PhaseKind,
        tracer: &mut Tracer<'_>,
    ) {
        let timestamp = (self.clock)();
        summary.phase_begin(phase, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            refresh_index: self.refresh_index,
            phase,
            timestamp,
        });
    }

    fn phase_end(
        &self,
        summary: &mut RefreshSummaryBuilder,
        phase: PhaseKind,
        tracer: &mut Tracer<'_>,
    ) {
        let timestamp = (self.clock)();
        summary.phase_end(phase, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            refresh_index: self.refresh_index,
            phase,
            timestamp,
        });
    }

    fn finish(
        &self,
        summary: Option<RefreshSummaryBuilder>,
        failed: bool,
        tracer: &mut Tracer<'_>,
    ) {
        if let Some(mut summary) = summary {
            summary.set_failed(failed);
            tracer.refresh_summary(&summary.finish());
        }
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
