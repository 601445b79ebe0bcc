// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the refresh pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! compositor calls at each stage of a refresh. All method bodies default to
//! no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! [`RefreshSummaryBuilder`] collects phase timestamps during a refresh and
//! produces a [`RefreshSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) — gates [`LayerClassifiedEvent`] and the
//!   corresponding `TraceSink` method.

#[cfg(feature = "trace-rich")]
use crate::capability::Eligibility;
use crate::device::OutputId;
use crate::error::ScalerStage;
use crate::geometry::DisplaySize;
use crate::plan::{DemotionReason, FallbackRange, ScalerId};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a refresh is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Classification, solving, and cache lookup.
    Prepare,
    /// Configuring and running scaler units.
    Scale,
    /// Building and submitting the plane configuration.
    Commit,
}

/// What the static-layer cache decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheDecision {
    /// Skipping static layers is turned off.
    Disabled,
    /// Nothing to remember; the cache was cleared.
    Invalidated,
    /// A trailing range was remembered for the next refresh.
    Recorded,
    /// The remembered range did not match; the cache was cleared.
    Mismatch,
    /// The previous plane was reused.
    Reused,
}

/// What happened to a scaler unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalerAction {
    /// Configuration unchanged; ring reused.
    Reused,
    /// Stopped, reallocated, and reconfigured.
    Reconfigured,
    /// Source already processed; the run was skipped.
    DuplicateSkipped,
    /// The unit failed and was reset.
    Failed(ScalerStage),
    /// The unit was not needed and was torn down.
    Released,
}

/// Result of the plane commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitOutcome {
    /// The configuration was applied.
    Committed,
    /// The configuration was rejected; the display was blanked.
    Blanked,
    /// The configuration and the blank fallback were both rejected.
    BlankFailed,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a refresh starts.
#[derive(Clone, Copy, Debug)]
pub struct RefreshBeginEvent {
    /// Monotonic refresh counter.
    pub refresh_index: u64,
    /// Which output is refreshed.
    pub output: OutputId,
    /// Host time at the start of the refresh.
    pub now: HostTime,
    /// Layers in the request.
    pub layer_count: u32,
    /// The request flagged a geometry change.
    pub geometry_changed: bool,
    /// Display size from the device snapshot.
    pub display: DisplaySize,
}

/// Emitted for every buffer layer after classification.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct LayerClassifiedEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Layer index in the request.
    pub layer_index: u32,
    /// Outcome.
    pub eligibility: Eligibility,
}

/// Emitted when the solver pushes an eligible layer to software.
#[derive(Clone, Copy, Debug)]
pub struct DemotionEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Layer index in the request.
    pub layer_index: u32,
    /// Why.
    pub reason: DemotionReason,
    /// Feasibility pass, starting at 1.
    pub pass: u32,
}

/// Emitted once the plan is final.
#[derive(Clone, Copy, Debug)]
pub struct PlanEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Planes bound.
    pub planes_used: u32,
    /// Software range, if any.
    pub fallback: Option<FallbackRange>,
    /// Scaler units bound.
    pub scalers_bound: u32,
    /// Feasibility passes.
    pub passes: u32,
    /// Part of the previous refresh is reused.
    pub reused: bool,
}

/// Emitted after the static-layer cache lookup.
#[derive(Clone, Copy, Debug)]
pub struct CacheEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Decision.
    pub decision: CacheDecision,
}

/// Emitted for each scaler unit touched in a refresh.
#[derive(Clone, Copy, Debug)]
pub struct ScalerEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Unit.
    pub unit: ScalerId,
    /// Layer the unit served, if any.
    pub layer_index: Option<u32>,
    /// What happened.
    pub action: ScalerAction,
}

/// Marks the beginning of a refresh phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a refresh phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after the plane commit.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Host time of submission.
    pub submitted_at: HostTime,
    /// Planes carrying content.
    pub planes_used: u32,
    /// Result.
    pub outcome: CommitOutcome,
}

/// Per-refresh summary produced by [`RefreshSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct RefreshSummary {
    /// Refresh counter.
    pub refresh_index: u64,
    /// Which output.
    pub output: OutputId,
    /// Host time when the refresh began.
    pub now: HostTime,
    /// Layers in the request.
    pub layer_count: u32,
    /// Planes bound.
    pub planes_used: u32,
    /// Scaler units bound.
    pub scalers_bound: u32,
    /// Part of the previous refresh was reused.
    pub reused: bool,
    /// Prepare phase duration in ticks (0 if not measured).
    pub prepare_ticks: u64,
    /// Scale phase duration in ticks (0 if not measured).
    pub scale_ticks: u64,
    /// Commit phase duration in ticks (0 if not measured).
    pub commit_ticks: u64,
    /// The refresh reported an error.
    pub failed: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the refresh pipeline.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a refresh starts.
    fn on_refresh_begin(&mut self, e: &RefreshBeginEvent) {
        _ = e;
    }

    /// Called when a layer is demoted to software.
    fn on_demotion(&mut self, e: &DemotionEvent) {
        _ = e;
    }

    /// Called once the plan is final.
    fn on_plan(&mut self, e: &PlanEvent) {
        _ = e;
    }

    /// Called after the static-layer cache lookup.
    fn on_cache(&mut self, e: &CacheEvent) {
        _ = e;
    }

    /// Called for each scaler unit touched.
    fn on_scaler(&mut self, e: &ScalerEvent) {
        _ = e;
    }

    /// Called at the beginning of a refresh phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a refresh phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called after the plane commit.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called with a per-refresh summary.
    fn on_refresh_summary(&mut self, s: &RefreshSummary) {
        _ = s;
    }

    /// Called for each classified buffer layer (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    fn on_layer_classified(&mut self, e: &LayerClassifiedEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Generates a `Tracer` method forwarding one event to the sink.
macro_rules! forward {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $hook:ident) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$ty) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$hook(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    forward!(
        /// Emits a [`RefreshBeginEvent`].
        refresh_begin, RefreshBeginEvent, on_refresh_begin
    );
    forward!(
        /// Emits a [`DemotionEvent`].
        demotion, DemotionEvent, on_demotion
    );
    forward!(
        /// Emits a [`PlanEvent`].
        plan, PlanEvent, on_plan
    );
    forward!(
        /// Emits a [`CacheEvent`].
        cache, CacheEvent, on_cache
    );
    forward!(
        /// Emits a [`ScalerEvent`].
        scaler, ScalerEvent, on_scaler
    );
    forward!(
        /// Emits a [`PhaseBeginEvent`].
        phase_begin, PhaseBeginEvent, on_phase_begin
    );
    forward!(
        /// Emits a [`PhaseEndEvent`].
        phase_end, PhaseEndEvent, on_phase_end
    );
    forward!(
        /// Emits a [`CommitEvent`].
        commit, CommitEvent, on_commit
    );
    forward!(
        /// Emits a [`RefreshSummary`].
        refresh_summary, RefreshSummary, on_refresh_summary
    );

    /// Emits a [`LayerClassifiedEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layer_classified(&mut self, e: &LayerClassifiedEvent) {
        if let Some(s) = &mut self.sink {
            s.on_layer_classified(e);
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a refresh and produces a
/// [`RefreshSummary`].
#[derive(Debug)]
pub struct RefreshSummaryBuilder {
    begin: RefreshBeginEvent,
    plan: Option<PlanEvent>,
    phase_starts: [Option<HostTime>; 3],
    phase_ends: [Option<HostTime>; 3],
    failed: bool,
}

impl RefreshSummaryBuilder {
    /// Starts building a summary for the given refresh.
    #[must_use]
    pub fn new(begin: &RefreshBeginEvent) -> Self {
        Self {
            begin: *begin,
            plan: None,
            phase_starts: [None; 3],
            phase_ends: [None; 3],
            failed: false,
        }
    }

    /// Records the final plan.
    pub fn set_plan(&mut self, plan: &PlanEvent) {
        self.plan = Some(*plan);
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Marks the refresh as failed.
    pub fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }

    /// Consumes the builder and produces the final [`RefreshSummary`].
    #[must_use]
    pub fn finish(self) -> RefreshSummary {
        let plan = self.plan;
        RefreshSummary {
            refresh_index: self.begin.refresh_index,
            output: self.begin.output,
            now: self.begin.now,
            layer_count: self.begin.layer_count,
            planes_used: plan.map_or(0, |p| p.planes_used),
            scalers_bound: plan.map_or(0, |p| p.scalers_bound),
            reused: plan.is_some_and(|p| p.reused),
            prepare_ticks: self.phase_duration(PhaseKind::Prepare),
            scale_ticks: self.phase_duration(PhaseKind::Scale),
            commit_ticks: self.phase_duration(PhaseKind::Commit),
            failed: self.failed,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Prepare => 0,
        PhaseKind::Scale => 1,
        PhaseKind::Commit => 2,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_begin() -> RefreshBeginEvent {
        RefreshBeginEvent {
            refresh_index: 42,
            output: OutputId(0),
            now: HostTime(1_000_000),
            layer_count: 4,
            geometry_changed: false,
            display: DisplaySize::new(1280, 720),
        }
    }

    fn sample_plan() -> PlanEvent {
        PlanEvent {
            refresh_index: 42,
            planes_used: 3,
            fallback: None,
            scalers_bound: 1,
            passes: 2,
            reused: false,
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_refresh_begin(&sample_begin());
        sink.on_plan(&sample_plan());
        sink.on_cache(&CacheEvent {
            refresh_index: 0,
            decision: CacheDecision::Recorded,
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.refresh_begin(&sample_begin());
        tracer.plan(&sample_plan());
    }

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = RefreshSummaryBuilder::new(&sample_begin());
        builder.set_plan(&sample_plan());
        builder.phase_begin(PhaseKind::Prepare, HostTime(1_000_000));
        builder.phase_end(PhaseKind::Prepare, HostTime(1_000_100));
        builder.phase_begin(PhaseKind::Scale, HostTime(1_000_100));
        builder.phase_end(PhaseKind::Scale, HostTime(1_000_500));
        builder.phase_begin(PhaseKind::Commit, HostTime(1_000_500));
        builder.phase_end(PhaseKind::Commit, HostTime(1_002_000));

        let summary = builder.finish();
        assert_eq!(summary.prepare_ticks, 100);
        assert_eq!(summary.scale_ticks, 400);
        assert_eq!(summary.commit_ticks, 1500);
        assert_eq!(summary.planes_used, 3);
        assert_eq!(summary.scalers_bound, 1);
        assert!(!summary.failed);
        assert_eq!(summary.refresh_index, 42);
    }

    #[test]
    fn summary_builder_missing_phases_are_zero() {
        let builder = RefreshSummaryBuilder::new(&sample_begin());
        let summary = builder.finish();
        assert_eq!(summary.prepare_ticks, 0);
        assert_eq!(summary.scale_ticks, 0);
        assert_eq!(summary.commit_ticks, 0);
        assert_eq!(summary.planes_used, 0);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            demoted: Vec<u32>,
        }
        impl TraceSink for RecordingSink {
            fn on_demotion(&mut self, e: &DemotionEvent) {
                self.demoted.push(e.layer_index);
            }
        }

        let mut sink = RecordingSink {
            demoted: Vec::new(),
        };
        let mut tracer = Tracer::new(&mut sink);
        tracer.demotion(&DemotionEvent {
            refresh_index: 1,
            layer_index: 3,
            reason: DemotionReason::PixelBudget,
            pass: 1,
        });
        drop(tracer);
        assert_eq!(sink.demoted, &[3]);
    }
}
