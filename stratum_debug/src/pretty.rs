// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use stratum_core::capability::Eligibility;
use stratum_core::time::{HostTime, Timebase};
use stratum_core::trace::{
    CacheEvent, CommitEvent, CommitOutcome, DemotionEvent, LayerClassifiedEvent, PhaseBeginEvent,
    PhaseEndEvent, PhaseKind, PlanEvent, RefreshBeginEvent, RefreshSummary, ScalerAction,
    ScalerEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Prepare => "prepare",
        PhaseKind::Scale => "scale",
        PhaseKind::Commit => "commit",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_refresh_begin(&mut self, e: &RefreshBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[refresh] #{} output={} layers={} display={}x{} geometry_changed={} now={:.1}µs",
            e.refresh_index,
            e.output.0,
            e.layer_count,
            e.display.width,
            e.display.height,
            e.geometry_changed,
            self.host_us(e.now),
        );
    }

    fn on_layer_classified(&mut self, e: &LayerClassifiedEvent) {
        let path = match e.eligibility {
            Eligibility::DirectPlane => "direct".to_string(),
            Eligibility::NeedsConversion => "scaler".to_string(),
            Eligibility::Unsupported(reason) => format!("software ({reason:?})"),
        };
        let _ = writeln!(
            self.writer,
            "[classify] #{} layer={} {path}",
            e.refresh_index, e.layer_index,
        );
    }

    fn on_demotion(&mut self, e: &DemotionEvent) {
        let _ = writeln!(
            self.writer,
            "[demote] #{} layer={} reason={:?} pass={}",
            e.refresh_index, e.layer_index, e.reason, e.pass,
        );
    }

    fn on_plan(&mut self, e: &PlanEvent) {
        let fallback = match e.fallback {
            Some(r) if r.visible => format!("{}..={}", r.first, r.last),
            Some(r) => format!("{}..={} (hidden)", r.first, r.last),
            None => "none".to_string(),
        };
        let _ = writeln!(
            self.writer,
            "[plan] #{} planes={} scalers={} fallback={fallback} passes={}{}",
            e.refresh_index,
            e.planes_used,
            e.scalers_bound,
            e.passes,
            if e.reused { " reused" } else { "" },
        );
    }

    fn on_cache(&mut self, e: &CacheEvent) {
        let _ = writeln!(
            self.writer,
            "[cache] #{} {:?}",
            e.refresh_index, e.decision,
        );
    }

    fn on_scaler(&mut self, e: &ScalerEvent) {
        let action = match e.action {
            ScalerAction::Failed(stage) => format!("FAILED at {stage}"),
            other => format!("{other:?}"),
        };
        let layer = e
            .layer_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        let _ = writeln!(
            self.writer,
            "[scaler] #{} unit={} layer={layer} {action}",
            e.refresh_index, e.unit.0,
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] #{} {} at {:.1}µs",
            e.refresh_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] #{} {} at {:.1}µs",
            e.refresh_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        let outcome = match e.outcome {
            CommitOutcome::Committed => "ok",
            CommitOutcome::Blanked => "BLANKED",
            CommitOutcome::BlankFailed => "BLANK FAILED",
        };
        let _ = writeln!(
            self.writer,
            "[commit] #{} planes={} {outcome} at {:.1}µs",
            e.refresh_index,
            e.planes_used,
            self.host_us(e.submitted_at),
        );
    }

    fn on_refresh_summary(&mut self, s: &RefreshSummary) {
        let status = if s.failed { "FAILED" } else { "ok" };
        let _ = writeln!(
            self.writer,
            "[summary] #{} layers={} planes={} scalers={} prepare={:.1}µs \
             scale={:.1}µs commit={:.1}µs status={status}",
            s.refresh_index,
            s.layer_count,
            s.planes_used,
            s.scalers_bound,
            self.ticks_to_us(s.prepare_ticks),
            self.ticks_to_us(s.scale_ticks),
            self.ticks_to_us(s.commit_ticks),
        );
    }
}
