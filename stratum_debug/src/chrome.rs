// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Phase events become duration slices; everything else becomes an instant
//! event stamped with the most recent timestamp seen for its refresh.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use stratum_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut pid = 0_u32;
    let mut last_us = 0.0_f64;

    for recorded in decode(bytes) {
        let refresh_index = recorded.refresh_index();
        match recorded {
            RecordedEvent::RefreshBegin(e) => {
                pid = e.output.0;
                last_us = ticks_to_us(e.now.ticks(), timebase);
                events.push(instant(
                    "RefreshBegin",
                    "Refresh",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "layers": e.layer_count,
                        "display": format!("{}x{}", e.display.width, e.display.height),
                        "geometry_changed": e.geometry_changed,
                    }),
                ));
            }
            RecordedEvent::LayerClassified(e) => {
                events.push(instant(
                    "Classified",
                    "Rich",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "layer": e.layer_index,
                        "eligibility": format!("{:?}", e.eligibility),
                    }),
                ));
            }
            RecordedEvent::Demotion(e) => {
                events.push(instant(
                    "Demotion",
                    "Solver",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "layer": e.layer_index,
                        "reason": format!("{:?}", e.reason),
                        "pass": e.pass,
                    }),
                ));
            }
            RecordedEvent::Plan(e) => {
                events.push(instant(
                    "Plan",
                    "Solver",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "planes": e.planes_used,
                        "scalers": e.scalers_bound,
                        "fallback": e.fallback.map(|r| json!({
                            "first": r.first,
                            "last": r.last,
                            "visible": r.visible,
                        })),
                        "passes": e.passes,
                        "reused": e.reused,
                    }),
                ));
            }
            RecordedEvent::Cache(e) => {
                events.push(instant(
                    "Cache",
                    "Solver",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "decision": format!("{:?}", e.decision),
                    }),
                ));
            }
            RecordedEvent::Scaler(e) => {
                events.push(instant(
                    "Scaler",
                    "Scaler",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "unit": e.unit.0,
                        "layer": e.layer_index,
                        "action": format!("{:?}", e.action),
                    }),
                ));
            }
            RecordedEvent::PhaseBegin(e) => {
                last_us = ticks_to_us(e.timestamp.ticks(), timebase);
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Refresh",
                    "ts": last_us,
                    "pid": pid,
                    "tid": 0,
                    "args": {
                        "refresh_index": refresh_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last_us = ticks_to_us(e.timestamp.ticks(), timebase);
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Refresh",
                    "ts": last_us,
                    "pid": pid,
                    "tid": 0,
                    "args": {
                        "refresh_index": refresh_index,
                    }
                }));
            }
            RecordedEvent::Commit(e) => {
                last_us = ticks_to_us(e.submitted_at.ticks(), timebase);
                events.push(instant(
                    "Commit",
                    "Refresh",
                    last_us,
                    pid,
                    json!({
                        "refresh_index": refresh_index,
                        "planes": e.planes_used,
                        "outcome": format!("{:?}", e.outcome),
                    }),
                ));
            }
            RecordedEvent::RefreshSummary(s) => {
                events.push(instant(
                    "RefreshSummary",
                    "Summary",
                    ticks_to_us(s.now.ticks(), timebase),
                    s.output.0,
                    json!({
                        "refresh_index": refresh_index,
                        "layers": s.layer_count,
                        "planes": s.planes_used,
                        "scalers": s.scalers_bound,
                        "reused": s.reused,
                        "prepare_us": ticks_to_us(s.prepare_ticks, timebase),
                        "scale_us": ticks_to_us(s.scale_ticks, timebase),
                        "commit_us": ticks_to_us(s.commit_ticks, timebase),
                        "failed": s.failed,
                    }),
                ));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn instant(name: &str, cat: &str, ts: f64, pid: u32, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": cat,
        "ts": ts,
        "pid": pid,
        "tid": 0,
        "s": "p",
        "args": args,
    })
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use stratum_core::device::OutputId;
    use stratum_core::geometry::DisplaySize;
    use stratum_core::time::HostTime;
    use stratum_core::trace::{
        CommitEvent, CommitOutcome, PhaseBeginEvent, PhaseEndEvent, PhaseKind, RefreshBeginEvent,
        TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_refresh_begin(&RefreshBeginEvent {
            refresh_index: 0,
            output: OutputId(2),
            now: HostTime(1_000_000),
            layer_count: 2,
            geometry_changed: false,
            display: DisplaySize::new(800, 600),
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            refresh_index: 0,
            phase: PhaseKind::Prepare,
            timestamp: HostTime(1_000_000),
        });
        rec.on_phase_end(&PhaseEndEvent {
            refresh_index: 0,
            phase: PhaseKind::Prepare,
            timestamp: HostTime(1_000_100),
        });
        rec.on_commit(&CommitEvent {
            refresh_index: 0,
            submitted_at: HostTime(1_002_000),
            planes_used: 2,
            outcome: CommitOutcome::Committed,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["ph"], "i");
        assert_eq!(parsed[0]["name"], "RefreshBegin");
        assert_eq!(parsed[0]["pid"], 2);
        assert_eq!(parsed[0]["args"]["display"], "800x600");

        assert_eq!(parsed[1]["ph"], "B");
        assert_eq!(parsed[1]["name"], "Prepare");
        assert_eq!(parsed[2]["ph"], "E");
        assert_eq!(parsed[2]["ts"], 1000.1);

        assert_eq!(parsed[3]["name"], "Commit");
        assert_eq!(parsed[3]["args"]["outcome"], "Committed");
        assert_eq!(parsed[3]["ts"], 1002.0);
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
