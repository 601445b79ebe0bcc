// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use stratum_core::capability::{Eligibility, RejectReason};
use stratum_core::device::OutputId;
use stratum_core::error::ScalerStage;
use stratum_core::geometry::DisplaySize;
use stratum_core::plan::{DemotionReason, FallbackRange, ScalerId};
use stratum_core::time::HostTime;
use stratum_core::trace::{
    CacheDecision, CacheEvent, CommitEvent, CommitOutcome, DemotionEvent, LayerClassifiedEvent,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, PlanEvent, RefreshBeginEvent, RefreshSummary,
    ScalerAction, ScalerEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_REFRESH_BEGIN: u8 = 1;
const TAG_LAYER_CLASSIFIED: u8 = 2;
const TAG_DEMOTION: u8 = 3;
const TAG_PLAN: u8 = 4;
const TAG_CACHE: u8 = 5;
const TAG_SCALER: u8 = 6;
const TAG_PHASE_BEGIN: u8 = 7;
const TAG_PHASE_END: u8 = 8;
const TAG_COMMIT: u8 = 9;
const TAG_REFRESH_SUMMARY: u8 = 10;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_index(&mut self, v: usize) {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "layer indices capped at u32::MAX for recording"
        )]
        self.write_u32(v.min(u32::MAX as usize) as u32);
    }

    fn write_option_u32(&mut self, v: Option<u32>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u32(val);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
            }
        }
    }

    fn write_fallback(&mut self, v: Option<FallbackRange>) {
        match v {
            Some(range) => {
                self.write_u8(1);
                self.write_index(range.first);
                self.write_index(range.last);
                self.write_bool(range.visible);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
                self.write_u32(0);
                self.write_u8(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Prepare => 0,
            PhaseKind::Scale => 1,
            PhaseKind::Commit => 2,
        });
    }

    fn write_stage(&mut self, s: ScalerStage) {
        self.write_u8(match s {
            ScalerStage::Create => 0,
            ScalerStage::Stop => 1,
            ScalerStage::Configure => 2,
            ScalerStage::Allocate => 3,
            ScalerStage::Run => 4,
        });
    }

    fn write_eligibility(&mut self, e: Eligibility) {
        match e {
            Eligibility::DirectPlane => {
                self.write_u8(0);
                self.write_u8(0);
            }
            Eligibility::NeedsConversion => {
                self.write_u8(1);
                self.write_u8(0);
            }
            Eligibility::Unsupported(reason) => {
                self.write_u8(2);
                self.write_u8(match reason {
                    RejectReason::SkipRequested => 0,
                    RejectReason::NoBuffer => 1,
                    RejectReason::Format => 2,
                    RejectReason::Blend => 3,
                    RejectReason::OffScreen => 4,
                    RejectReason::TooNarrow => 5,
                    RejectReason::ScalerLimits => 6,
                });
            }
        }
    }

    fn write_demotion(&mut self, r: DemotionReason) {
        self.write_u8(match r {
            DemotionReason::PlaneBudget => 0,
            DemotionReason::PixelBudget => 1,
            DemotionReason::ScalerBusy => 2,
            DemotionReason::OverlapDepth => 3,
            DemotionReason::Contiguity => 4,
        });
    }

    fn write_cache_decision(&mut self, d: CacheDecision) {
        self.write_u8(match d {
            CacheDecision::Disabled => 0,
            CacheDecision::Invalidated => 1,
            CacheDecision::Recorded => 2,
            CacheDecision::Mismatch => 3,
            CacheDecision::Reused => 4,
        });
    }

    fn write_scaler_action(&mut self, a: ScalerAction) {
        match a {
            ScalerAction::Reused => self.write_u8(0),
            ScalerAction::Reconfigured => self.write_u8(1),
            ScalerAction::DuplicateSkipped => self.write_u8(2),
            ScalerAction::Failed(stage) => {
                self.write_u8(3);
                self.write_stage(stage);
                return;
            }
            ScalerAction::Released => self.write_u8(4),
        }
        self.write_u8(0);
    }

    fn write_commit_outcome(&mut self, o: CommitOutcome) {
        self.write_u8(match o {
            CommitOutcome::Committed => 0,
            CommitOutcome::Blanked => 1,
            CommitOutcome::BlankFailed => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_refresh_begin(&mut self, e: &RefreshBeginEvent) {
        self.write_u8(TAG_REFRESH_BEGIN);
        self.write_u64(e.refresh_index);
        self.write_u32(e.output.0);
        self.write_u64(e.now.ticks());
        self.write_u32(e.layer_count);
        self.write_bool(e.geometry_changed);
        self.write_u32(e.display.width);
        self.write_u32(e.display.height);
    }

    fn on_layer_classified(&mut self, e: &LayerClassifiedEvent) {
        self.write_u8(TAG_LAYER_CLASSIFIED);
        self.write_u64(e.refresh_index);
        self.write_u32(e.layer_index);
        self.write_eligibility(e.eligibility);
    }

    fn on_demotion(&mut self, e: &DemotionEvent) {
        self.write_u8(TAG_DEMOTION);
        self.write_u64(e.refresh_index);
        self.write_u32(e.layer_index);
        self.write_demotion(e.reason);
        self.write_u32(e.pass);
    }

    fn on_plan(&mut self, e: &PlanEvent) {
        self.write_u8(TAG_PLAN);
        self.write_u64(e.refresh_index);
        self.write_u32(e.planes_used);
        self.write_fallback(e.fallback);
        self.write_u32(e.scalers_bound);
        self.write_u32(e.passes);
        self.write_bool(e.reused);
    }

    fn on_cache(&mut self, e: &CacheEvent) {
        self.write_u8(TAG_CACHE);
        self.write_u64(e.refresh_index);
        self.write_cache_decision(e.decision);
    }

    fn on_scaler(&mut self, e: &ScalerEvent) {
        self.write_u8(TAG_SCALER);
        self.write_u64(e.refresh_index);
        self.write_u32(e.unit.0);
        self.write_option_u32(e.layer_index);
        self.write_scaler_action(e.action);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.refresh_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.refresh_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.write_u8(TAG_COMMIT);
        self.write_u64(e.refresh_index);
        self.write_u64(e.submitted_at.ticks());
        self.write_u32(e.planes_used);
        self.write_commit_outcome(e.outcome);
    }

    fn on_refresh_summary(&mut self, s: &RefreshSummary) {
        self.write_u8(TAG_REFRESH_SUMMARY);
        self.write_u64(s.refresh_index);
        self.write_u32(s.output.0);
        self.write_u64(s.now.ticks());
        self.write_u32(s.layer_count);
        self.write_u32(s.planes_used);
        self.write_u32(s.scalers_bound);
        self.write_bool(s.reused);
        self.write_u64(s.prepare_ticks);
        self.write_u64(s.scale_ticks);
        self.write_u64(s.commit_ticks);
        self.write_bool(s.failed);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`RefreshBeginEvent`].
    RefreshBegin(RefreshBeginEvent),
    /// A [`LayerClassifiedEvent`].
    LayerClassified(LayerClassifiedEvent),
    /// A [`DemotionEvent`].
    Demotion(DemotionEvent),
    /// A [`PlanEvent`].
    Plan(PlanEvent),
    /// A [`CacheEvent`].
    Cache(CacheEvent),
    /// A [`ScalerEvent`].
    Scaler(ScalerEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`CommitEvent`].
    Commit(CommitEvent),
    /// A [`RefreshSummary`].
    RefreshSummary(RefreshSummary),
}

impl RecordedEvent {
    /// The refresh the event belongs to.
    #[must_use]
    pub fn refresh_index(&self) -> u64 {
        match self {
            Self::RefreshBegin(e) => e.refresh_index,
            Self::LayerClassified(e) => e.refresh_index,
            Self::Demotion(e) => e.refresh_index,
            Self::Plan(e) => e.refresh_index,
            Self::Cache(e) => e.refresh_index,
            Self::Scaler(e) => e.refresh_index,
            Self::PhaseBegin(e) => e.refresh_index,
            Self::PhaseEnd(e) => e.refresh_index,
            Self::Commit(e) => e.refresh_index,
            Self::RefreshSummary(s) => s.refresh_index,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
///
/// Stops at the first unknown tag or truncated record.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_option_u32(&mut self) -> Option<Option<u32>> {
        let present = self.read_u8()?;
        let val = self.read_u32()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_fallback(&mut self) -> Option<Option<FallbackRange>> {
        let present = self.read_u8()?;
        let first = self.read_u32()? as usize;
        let last = self.read_u32()? as usize;
        let visible = self.read_bool()?;
        Some((present != 0).then_some(FallbackRange {
            first,
            last,
            visible,
        }))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Prepare,
            1 => PhaseKind::Scale,
            _ => PhaseKind::Commit,
        })
    }

    fn read_stage(&mut self) -> Option<ScalerStage> {
        Some(match self.read_u8()? {
            0 => ScalerStage::Create,
            1 => ScalerStage::Stop,
            2 => ScalerStage::Configure,
            3 => ScalerStage::Allocate,
            _ => ScalerStage::Run,
        })
    }

    fn read_eligibility(&mut self) -> Option<Eligibility> {
        let kind = self.read_u8()?;
        let reason = self.read_u8()?;
        Some(match kind {
            0 => Eligibility::DirectPlane,
            1 => Eligibility::NeedsConversion,
            _ => Eligibility::Unsupported(match reason {
                0 => RejectReason::SkipRequested,
                1 => RejectReason::NoBuffer,
                2 => RejectReason::Format,
                3 => RejectReason::Blend,
                4 => RejectReason::OffScreen,
                5 => RejectReason::TooNarrow,
                _ => RejectReason::ScalerLimits,
            }),
        })
    }

    fn read_demotion(&mut self) -> Option<DemotionReason> {
        Some(match self.read_u8()? {
            0 => DemotionReason::PlaneBudget,
            1 => DemotionReason::PixelBudget,
            2 => DemotionReason::ScalerBusy,
            3 => DemotionReason::OverlapDepth,
            _ => DemotionReason::Contiguity,
        })
    }

    fn read_cache_decision(&mut self) -> Option<CacheDecision> {
        Some(match self.read_u8()? {
            0 => CacheDecision::Disabled,
            1 => CacheDecision::Invalidated,
            2 => CacheDecision::Recorded,
            3 => CacheDecision::Mismatch,
            _ => CacheDecision::Reused,
        })
    }

    fn read_scaler_action(&mut self) -> Option<ScalerAction> {
        let kind = self.read_u8()?;
        if kind == 3 {
            return Some(ScalerAction::Failed(self.read_stage()?));
        }
        self.read_u8()?;
        Some(match kind {
            0 => ScalerAction::Reused,
            1 => ScalerAction::Reconfigured,
            2 => ScalerAction::DuplicateSkipped,
            _ => ScalerAction::Released,
        })
    }

    fn read_commit_outcome(&mut self) -> Option<CommitOutcome> {
        Some(match self.read_u8()? {
            0 => CommitOutcome::Committed,
            1 => CommitOutcome::Blanked,
            _ => CommitOutcome::BlankFailed,
        })
    }

    fn decode_refresh_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RefreshBegin(RefreshBeginEvent {
            refresh_index: self.read_u64()?,
            output: OutputId(self.read_u32()?),
            now: HostTime(self.read_u64()?),
            layer_count: self.read_u32()?,
            geometry_changed: self.read_bool()?,
            display: DisplaySize::new(self.read_u32()?, self.read_u32()?),
        }))
    }

    fn decode_layer_classified(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayerClassified(LayerClassifiedEvent {
            refresh_index: self.read_u64()?,
            layer_index: self.read_u32()?,
            eligibility: self.read_eligibility()?,
        }))
    }

    fn decode_demotion(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Demotion(DemotionEvent {
            refresh_index: self.read_u64()?,
            layer_index: self.read_u32()?,
            reason: self.read_demotion()?,
            pass: self.read_u32()?,
        }))
    }

    fn decode_plan(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Plan(PlanEvent {
            refresh_index: self.read_u64()?,
            planes_used: self.read_u32()?,
            fallback: self.read_fallback()?,
            scalers_bound: self.read_u32()?,
            passes: self.read_u32()?,
            reused: self.read_bool()?,
        }))
    }

    fn decode_cache(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Cache(CacheEvent {
            refresh_index: self.read_u64()?,
            decision: self.read_cache_decision()?,
        }))
    }

    fn decode_scaler(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Scaler(ScalerEvent {
            refresh_index: self.read_u64()?,
            unit: ScalerId(self.read_u32()?),
            layer_index: self.read_option_u32()?,
            action: self.read_scaler_action()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            refresh_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            refresh_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_commit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Commit(CommitEvent {
            refresh_index: self.read_u64()?,
            submitted_at: HostTime(self.read_u64()?),
            planes_used: self.read_u32()?,
            outcome: self.read_commit_outcome()?,
        }))
    }

    fn decode_refresh_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RefreshSummary(RefreshSummary {
            refresh_index: self.read_u64()?,
            output: OutputId(self.read_u32()?),
            now: HostTime(self.read_u64()?),
            layer_count: self.read_u32()?,
            planes_used: self.read_u32()?,
            scalers_bound: self.read_u32()?,
            reused: self.read_bool()?,
            prepare_ticks: self.read_u64()?,
            scale_ticks: self.read_u64()?,
            commit_ticks: self.read_u64()?,
            failed: self.read_bool()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_REFRESH_BEGIN => self.decode_refresh_begin(),
            TAG_LAYER_CLASSIFIED => self.decode_layer_classified(),
            TAG_DEMOTION => self.decode_demotion(),
            TAG_PLAN => self.decode_plan(),
            TAG_CACHE => self.decode_cache(),
            TAG_SCALER => self.decode_scaler(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_COMMIT => self.decode_commit(),
            TAG_REFRESH_SUMMARY => self.decode_refresh_summary(),
            _ => None,
        }
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
            refresh_index: 7,
            output: OutputId(1),
            now: HostTime(1_000_000),
            layer_count: 5,
            geometry_changed: true,
            display: DisplaySize::new(1920, 1080),
        }
    }

    fn sample_summary() -> RefreshSummary {
        RefreshSummary {
            refresh_index: 7,
            output: OutputId(1),
            now: HostTime(1_000_000),
            layer_count: 5,
            planes_used: 3,
            scalers_bound: 1,
            reused: false,
            prepare_ticks: 100,
            scale_ticks: 400,
            commit_ticks: 1500,
            failed: true,
        }
    }

    #[test]
    fn refresh_begin_survives_recording() {
        let mut rec = RecorderSink::new();
        let orig = sample_begin();
        rec.on_refresh_begin(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RecordedEvent::RefreshBegin(e) => {
                assert_eq!(e.refresh_index, orig.refresh_index);
                assert_eq!(e.output, orig.output);
                assert_eq!(e.now, orig.now);
                assert_eq!(e.layer_count, 5);
                assert!(e.geometry_changed);
                assert_eq!(e.display, orig.display);
            }
            other => panic!("expected RefreshBegin, got {other:?}"),
        }
    }

    #[test]
    fn plan_keeps_fallback_range() {
        let mut rec = RecorderSink::new();
        rec.on_plan(&PlanEvent {
            refresh_index: 3,
            planes_used: 2,
            fallback: Some(FallbackRange {
                first: 1,
                last: 4,
                visible: true,
            }),
            scalers_bound: 1,
            passes: 2,
            reused: false,
        });
        rec.on_plan(&PlanEvent {
            refresh_index: 4,
            planes_used: 1,
            fallback: None,
            scalers_bound: 0,
            passes: 1,
            reused: true,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (RecordedEvent::Plan(a), RecordedEvent::Plan(b)) => {
                let range = a.fallback.expect("first plan has a range");
                assert_eq!((range.first, range.last, range.visible), (1, 4, true));
                assert_eq!(a.passes, 2);
                assert!(b.fallback.is_none());
                assert!(b.reused);
            }
            other => panic!("expected two Plan events, got {other:?}"),
        }
    }

    #[test]
    fn scaler_failure_keeps_stage() {
        let mut rec = RecorderSink::new();
        rec.on_scaler(&ScalerEvent {
            refresh_index: 9,
            unit: ScalerId(2),
            layer_index: Some(4),
            action: ScalerAction::Failed(ScalerStage::Allocate),
        });
        rec.on_scaler(&ScalerEvent {
            refresh_index: 9,
            unit: ScalerId(0),
            layer_index: None,
            action: ScalerAction::Released,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        match &events[0] {
            RecordedEvent::Scaler(e) => {
                assert_eq!(e.unit, ScalerId(2));
                assert_eq!(e.layer_index, Some(4));
                assert_eq!(e.action, ScalerAction::Failed(ScalerStage::Allocate));
            }
            other => panic!("expected Scaler, got {other:?}"),
        }
        match &events[1] {
            RecordedEvent::Scaler(e) => {
                assert_eq!(e.layer_index, None);
                assert_eq!(e.action, ScalerAction::Released);
            }
            other => panic!("expected Scaler, got {other:?}"),
        }
    }

    #[test]
    fn classification_keeps_reject_reason() {
        let mut rec = RecorderSink::new();
        rec.on_layer_classified(&LayerClassifiedEvent {
            refresh_index: 1,
            layer_index: 0,
            eligibility: Eligibility::Unsupported(RejectReason::TooNarrow),
        });
        rec.on_layer_classified(&LayerClassifiedEvent {
            refresh_index: 1,
            layer_index: 1,
            eligibility: Eligibility::NeedsConversion,
        });

        let kinds: Vec<_> = decode(rec.as_bytes())
            .map(|e| match e {
                RecordedEvent::LayerClassified(e) => e.eligibility,
                other => panic!("expected LayerClassified, got {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [
                Eligibility::Unsupported(RejectReason::TooNarrow),
                Eligibility::NeedsConversion,
            ]
        );
    }

    #[test]
    fn mixed_stream_keeps_order() {
        let mut rec = RecorderSink::new();
        rec.on_refresh_begin(&sample_begin());
        rec.on_phase_begin(&PhaseBeginEvent {
            refresh_index: 7,
            phase: PhaseKind::Prepare,
            timestamp: HostTime(1000),
        });
        rec.on_demotion(&DemotionEvent {
            refresh_index: 7,
            layer_index: 2,
            reason: DemotionReason::OverlapDepth,
            pass: 1,
        });
        rec.on_cache(&CacheEvent {
            refresh_index: 7,
            decision: CacheDecision::Recorded,
        });
        rec.on_commit(&CommitEvent {
            refresh_index: 7,
            submitted_at: HostTime(5000),
            planes_used: 3,
            outcome: CommitOutcome::Blanked,
        });
        rec.on_refresh_summary(&sample_summary());

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], RecordedEvent::RefreshBegin(_)));
        assert!(matches!(events[1], RecordedEvent::PhaseBegin(_)));
        assert!(matches!(
            events[2],
            RecordedEvent::Demotion(DemotionEvent {
                reason: DemotionReason::OverlapDepth,
                ..
            })
        ));
        assert!(matches!(
            events[3],
            RecordedEvent::Cache(CacheEvent {
                decision: CacheDecision::Recorded,
                ..
            })
        ));
        assert!(matches!(
            events[4],
            RecordedEvent::Commit(CommitEvent {
                outcome: CommitOutcome::Blanked,
                ..
            })
        ));
        match &events[5] {
            RecordedEvent::RefreshSummary(s) => {
                assert_eq!(s.commit_ticks, 1500);
                assert!(s.failed);
            }
            other => panic!("expected RefreshSummary, got {other:?}"),
        }
        assert!(events.iter().all(|e| e.refresh_index() == 7));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_refresh_begin(&sample_begin());
        rec.on_refresh_summary(&sample_summary());
        let bytes = rec.into_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 3]).collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }
}
