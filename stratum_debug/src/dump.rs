// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Text dumps of plans and compositor state, for bug reports and logs.

use std::fmt::Write as _;
use std::io::{self, Write};

use stratum_core::compositor::Compositor;
use stratum_core::plan::{AssignmentPlan, Composition, FallbackCause, PathMode, PlaneSource};

/// Writes one line per layer and one per plane.
///
/// ```text
/// passes=2 planes=2 fallback=1..=2 (visible)
/// layer 0: overlay
/// layer 1: software (rejected: Format)
/// layer 2: software (demoted: Contiguity)
/// plane 0: layer 0 direct
/// plane 1: framebuffer target
/// ```
///
/// # Errors
///
/// Propagates writer errors.
pub fn write_plan(plan: &AssignmentPlan, out: &mut dyn Write) -> io::Result<()> {
    write!(out, "passes={} planes={}", plan.passes(), plan.planes_used())?;
    match plan.fallback() {
        Some(f) => writeln!(
            out,
            " fallback={}..={} ({})",
            f.first,
            f.last,
            if f.visible { "visible" } else { "elided" }
        )?,
        None => writeln!(out, " fallback=none")?,
    }
    for (index, comp) in plan.compositions().iter().enumerate() {
        let what = match comp {
            Composition::Overlay => "overlay".to_owned(),
            Composition::Background => "background".to_owned(),
            Composition::FramebufferTarget => "framebuffer target".to_owned(),
            Composition::Reused => "reused".to_owned(),
            Composition::Fallback(FallbackCause::Rejected(r)) => {
                format!("software (rejected: {r:?})")
            }
            Composition::Fallback(FallbackCause::Demoted(d)) => {
                format!("software (demoted: {d:?})")
            }
        };
        writeln!(out, "layer {index}: {what}")?;
    }
    for assignment in plan.planes() {
        let what = match assignment.source {
            PlaneSource::Layer { index, path } => match path {
                PathMode::Direct => format!("layer {index} direct"),
                PathMode::Local(unit) => format!("layer {index} via scaler {} (local)", unit.0),
                PathMode::MemoryToMemory(unit) => {
                    format!("layer {index} via scaler {} (m2m)", unit.0)
                }
            },
            PlaneSource::Background { index } => format!("layer {index} solid colour"),
            PlaneSource::Fallback => "framebuffer target".to_owned(),
            PlaneSource::Reused => "previous image".to_owned(),
        };
        writeln!(out, "plane {}: {what}", assignment.plane)?;
    }
    Ok(())
}

/// The compositor's own dump as a string.
#[must_use]
pub fn compositor_state(compositor: &Compositor) -> String {
    let mut out = String::new();
    if compositor.dump(&mut out).is_err() {
        let _ = writeln!(out, "<dump failed>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::config::DeviceCaps;
    use stratum_core::geometry::DisplaySize;
    use stratum_core::layer::{Buffer, BufferId, CompositionRequest, Layer, PixelFormat};
    use stratum_core::solver::Solver;

    #[test]
    fn plan_dump_lists_layers_and_planes() {
        let request = CompositionRequest::new(
            vec![
                Layer::unscaled(Buffer::new(BufferId(1), PixelFormat::Rgba8888, 400, 400), 0, 0),
                Layer::unscaled(Buffer::new(BufferId(2), PixelFormat::Rgb888, 256, 256), 600, 0),
            ],
            true,
        );
        let plan = Solver::new(DeviceCaps::single_scaler())
            .solve(&request, DisplaySize::new(1280, 720));
        let mut out = Vec::new();
        write_plan(&plan, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("passes=1 planes=2 fallback=1..=1 (visible)"), "{text}");
        assert!(text.contains("layer 0: overlay"), "{text}");
        assert!(text.contains("layer 1: software (rejected: Format)"), "{text}");
        assert!(text.contains("plane 0: layer 0 direct"), "{text}");
        assert!(text.contains("plane 1: framebuffer target"), "{text}");
    }

    #[test]
    fn empty_plan_dump() {
        let mut out = Vec::new();
        write_plan(&AssignmentPlan::empty(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "passes=0 planes=0 fallback=none\n");
    }
}
