// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Checks an [`AssignmentPlan`] against the structural invariants every plan
//! must satisfy, independently of how the solver got there.
//!
//! - [`check_exclusive`]: a layer with a plane is never also in software,
//!   and every hardware layer has exactly one plane.
//! - [`check_contiguous`]: software layers form one z-order range.
//! - [`check_budgets`]: plane count, pixel bandwidth, and scaler units.
//! - [`check_overlap`]: no pixel is covered by more than two planes.

use std::fmt;

use hashbrown::HashSet;
use stratum_core::config::DeviceCaps;
use stratum_core::geometry::{DisplaySize, Rect, coverage_depth};
use stratum_core::layer::CompositionRequest;
use stratum_core::plan::{AssignmentPlan, Composition, PlaneSource};

/// A broken plan invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A software-composed layer also has a plane, or a layer has two.
    DoubleAssignment {
        /// The layer.
        layer: usize,
    },
    /// A hardware layer has no plane.
    MissingPlane {
        /// The layer.
        layer: usize,
    },
    /// A hardware layer sits inside the software range.
    NotContiguous {
        /// The layer.
        layer: usize,
    },
    /// More planes than the device has, or a plane bound twice.
    TooManyPlanes {
        /// Planes bound.
        used: usize,
        /// Planes available.
        limit: usize,
    },
    /// Pixel bandwidth exceeded.
    PixelBudget {
        /// Pixels fetched.
        used: u64,
        /// Device cap.
        limit: u64,
    },
    /// More scaler units bound than may run at once, or a unit bound twice.
    ScalersOverCommitted {
        /// Units bound.
        bound: usize,
        /// Units allowed.
        limit: usize,
    },
    /// Some pixel is covered by more than two planes.
    OverlapDepth {
        /// Deepest coverage found.
        depth: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleAssignment { layer } => {
                write!(f, "layer {layer} is assigned twice")
            }
            Self::MissingPlane { layer } => write!(f, "hardware layer {layer} has no plane"),
            Self::NotContiguous { layer } => {
                write!(f, "hardware layer {layer} splits the software range")
            }
            Self::TooManyPlanes { used, limit } => {
                write!(f, "{used} planes bound, {limit} available")
            }
            Self::PixelBudget { used, limit } => {
                write!(f, "{used} pixels fetched, cap is {limit}")
            }
            Self::ScalersOverCommitted { bound, limit } => {
                write!(f, "{bound} scaler units bound, {limit} allowed")
            }
            Self::OverlapDepth { depth } => write!(f, "some pixel is covered {depth} times"),
        }
    }
}

impl std::error::Error for Violation {}

/// Runs every check, returning the first violation.
///
/// # Errors
///
/// Returns the first broken invariant.
pub fn check_plan(
    request: &CompositionRequest,
    plan: &AssignmentPlan,
    caps: &DeviceCaps,
    display: DisplaySize,
) -> Result<(), Violation> {
    check_exclusive(plan)?;
    check_contiguous(plan)?;
    check_budgets(request, plan, caps, display)?;
    check_overlap(request, plan, display)
}

/// Layers with a plane are hardware-composed, and each has exactly one.
///
/// # Errors
///
/// Returns [`Violation::DoubleAssignment`] or [`Violation::MissingPlane`].
pub fn check_exclusive(plan: &AssignmentPlan) -> Result<(), Violation> {
    let mut seen = HashSet::new();
    for assignment in plan.planes() {
        let layer = match assignment.source {
            PlaneSource::Layer { index, .. } | PlaneSource::Background { index } => index,
            PlaneSource::Fallback | PlaneSource::Reused => continue,
        };
        let hardware = plan.composition(layer).is_some_and(Composition::is_hardware);
        if !hardware || !seen.insert(layer) {
            return Err(Violation::DoubleAssignment { layer });
        }
    }
    match plan.hardware_layers().find(|i| !seen.contains(i)) {
        Some(layer) => Err(Violation::MissingPlane { layer }),
        None => Ok(()),
    }
}

/// Software layers form one range, possibly enclosing the framebuffer
/// target.
///
/// # Errors
///
/// Returns [`Violation::NotContiguous`] naming the first intruder.
pub fn check_contiguous(plan: &AssignmentPlan) -> Result<(), Violation> {
    let comps = plan.compositions();
    let Some(first) = comps.iter().position(|c| c.is_fallback()) else {
        return Ok(());
    };
    let last = comps.iter().rposition(|c| c.is_fallback()).unwrap_or(first);
    for (layer, comp) in comps.iter().enumerate().take(last + 1).skip(first) {
        if !matches!(comp, Composition::Fallback(_) | Composition::FramebufferTarget) {
            return Err(Violation::NotContiguous { layer });
        }
    }
    Ok(())
}

/// Planes, pixels, and scaler units stay within the device limits.
///
/// A software image shown on a plane is charged the whole display.
///
/// # Errors
///
/// Returns the first exceeded budget.
pub fn check_budgets(
    request: &CompositionRequest,
    plan: &AssignmentPlan,
    caps: &DeviceCaps,
    display: DisplaySize,
) -> Result<(), Violation> {
    let planes: HashSet<usize> = plan.planes().iter().map(|p| p.plane).collect();
    let used = plan.planes_used();
    if used > caps.planes || planes.len() != used || planes.iter().any(|&p| p >= caps.planes) {
        return Err(Violation::TooManyPlanes {
            used,
            limit: caps.planes,
        });
    }

    let pixels: u64 = plan
        .planes()
        .iter()
        .map(|p| match p.source {
            PlaneSource::Layer { index, .. } => request.layers[index].display_frame.normalized().area(),
            PlaneSource::Fallback | PlaneSource::Reused => display.area(),
            PlaneSource::Background { .. } => 0,
        })
        .sum();
    if pixels > caps.max_pixels {
        return Err(Violation::PixelBudget {
            used: pixels,
            limit: caps.max_pixels,
        });
    }

    let units: HashSet<_> = plan.scaler_bindings().filter_map(|(_, p)| p.scaler()).collect();
    let bound = plan.scaler_bindings().count();
    let limit = caps.concurrent_conversions.min(caps.scalers);
    if bound > limit || units.len() != bound {
        return Err(Violation::ScalersOverCommitted { bound, limit });
    }
    Ok(())
}

/// No pixel is covered by more than two planes that fetch memory.
///
/// # Errors
///
/// Returns [`Violation::OverlapDepth`] with the deepest coverage.
pub fn check_overlap(
    request: &CompositionRequest,
    plan: &AssignmentPlan,
    display: DisplaySize,
) -> Result<(), Violation> {
    let rects: Vec<Rect> = plan
        .planes()
        .iter()
        .filter_map(|p| match p.source {
            PlaneSource::Layer { index, .. } => {
                Some(request.layers[index].display_frame.normalized())
            }
            PlaneSource::Fallback | PlaneSource::Reused => Some(display.bounds()),
            PlaneSource::Background { .. } => None,
        })
        .collect();
    let depth = coverage_depth(&rects);
    if depth > 2 {
        Err(Violation::OverlapDepth { depth })
    } else {
        Ok(())
    }
}
