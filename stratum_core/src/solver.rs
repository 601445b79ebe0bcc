// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane and scaler assignment.
//!
//! The [`Solver`] turns a [`CompositionRequest`] into an [`AssignmentPlan`]
//! by iterative constraint repair:
//!
//! 1. Classify every buffer layer. Layers without a hardware path start in
//!    software.
//! 2. Close the software set over its z-order span, since planes can only
//!    sit below and above a single software-composed image.
//! 3. Walk the layers bottom to top against the shared budgets (planes,
//!    pixels, concurrent scalers, overlap depth). The first layer that does
//!    not fit is demoted, the span is closed again, and the walk restarts.
//!    A walk without demotions ends the loop.
//! 4. Bind planes in z-order and scaler units to converted layers.
//!
//! Every demotion moves a layer into software for good, so the loop runs at
//! most once per layer plus one final clean walk. In the worst case every
//! layer ends up in software and the plan uses a single plane.
//!
//! A software span none of whose layers reach the screen takes no plane and
//! no budget: its layers stay in software but nothing is shown for them.

use alloc::vec;
use alloc::vec::Vec;

use crate::capability::{Eligibility, ScalerPath, classify, preferred_path};
use crate::config::DeviceCaps;
use crate::geometry::{DisplaySize, OverlapTracker};
use crate::layer::{CompositionRequest, Layer, LayerKind};
use crate::plan::{
    AssignmentPlan, Composition, DemotionReason, FallbackCause, FallbackRange, PathMode,
    PlaneAssignment, PlaneSource, ScalerId,
};
#[cfg(feature = "trace-rich")]
use crate::trace::LayerClassifiedEvent;
use crate::trace::{DemotionEvent, Tracer};

/// Deterministic plane/scaler assignment for one display.
#[derive(Clone, Copy, Debug)]
pub struct Solver {
    caps: DeviceCaps,
}

impl Solver {
    /// Creates a solver for the given device limits.
    #[must_use]
    pub const fn new(caps: DeviceCaps) -> Self {
        Self { caps }
    }

    /// The device limits in use.
    #[must_use]
    pub const fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    /// Solves `request` for a display of the given size.
    #[must_use]
    pub fn solve(&self, request: &CompositionRequest, display: DisplaySize) -> AssignmentPlan {
        self.solve_traced(request, display, 0, &mut Tracer::none())
    }

    /// Like [`solve`](Self::solve), reporting classifications and demotions.
    #[must_use]
    pub fn solve_traced(
        &self,
        request: &CompositionRequest,
        display: DisplaySize,
        refresh_index: u64,
        tracer: &mut Tracer<'_>,
    ) -> AssignmentPlan {
        let layers = &request.layers;
        let mut convert = vec![false; layers.len()];
        let mut comps: Vec<Composition> = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| match layer.kind {
                LayerKind::Background(_) => Composition::Background,
                LayerKind::FramebufferTarget => Composition::FramebufferTarget,
                LayerKind::Buffer => {
                    let eligibility = classify(layer, &self.caps, display);
                    #[cfg(feature = "trace-rich")]
                    tracer.layer_classified(&LayerClassifiedEvent {
                        refresh_index,
                        layer_index: index_u32(i),
                        eligibility,
                    });
                    match eligibility {
                        Eligibility::Unsupported(reason) => {
                            Composition::Fallback(FallbackCause::Rejected(reason))
                        }
                        Eligibility::NeedsConversion => {
                            convert[i] = true;
                            Composition::Overlay
                        }
                        Eligibility::DirectPlane => Composition::Overlay,
                    }
                }
            })
            .collect();

        let mut passes = 0;
        close_span(&mut comps, refresh_index, passes, tracer);
        loop {
            passes += 1;
            let Some((index, reason)) = self.first_violation(layers, &comps, &convert, display)
            else {
                break;
            };
            comps[index] = Composition::Fallback(FallbackCause::Demoted(reason));
            tracer.demotion(&DemotionEvent {
                refresh_index,
                layer_index: index_u32(index),
                reason,
                pass: passes,
            });
            close_span(&mut comps, refresh_index, passes, tracer);
        }

        let fallback = fallback_range(layers, &comps, display);
        let planes = self.bind(layers, &comps, &convert, fallback, display);
        AssignmentPlan {
            compositions: comps,
            planes,
            fallback,
            passes,
        }
    }

    /// One bottom-to-top walk. Returns the first layer that does not fit.
    fn first_violation(
        &self,
        layers: &[Layer],
        comps: &[Composition],
        convert: &[bool],
        display: DisplaySize,
    ) -> Option<(usize, DemotionReason)> {
        let mut planes_left = self.caps.planes;
        let mut pixels_left = self.caps.max_pixels;
        let mut scalers_left = self.caps.concurrent_conversions.min(self.caps.scalers);
        let mut tracker = OverlapTracker::new();

        if fallback_range(layers, comps, display).is_some_and(|f| f.visible) {
            planes_left = planes_left.saturating_sub(1);
            pixels_left = pixels_left.saturating_sub(display.area());
            tracker.insert(display.bounds());
        }

        for (i, comp) in comps.iter().enumerate() {
            match comp {
                Composition::Background => {
                    if planes_left == 0 {
                        return Some((i, DemotionReason::PlaneBudget));
                    }
                    planes_left -= 1;
                }
                Composition::Overlay => {
                    let rect = layers[i].display_frame.normalized();
                    let area = rect.area();
                    let reason = if planes_left == 0 {
                        DemotionReason::PlaneBudget
                    } else if area > pixels_left {
                        DemotionReason::PixelBudget
                    } else if convert[i] && scalers_left == 0 {
                        DemotionReason::ScalerBusy
                    } else if tracker.would_exceed_depth(rect) {
                        DemotionReason::OverlapDepth
                    } else {
                        tracker.insert(rect);
                        planes_left -= 1;
                        pixels_left -= area;
                        if convert[i] {
                            scalers_left -= 1;
                        }
                        continue;
                    };
                    return Some((i, reason));
                }
                _ => {}
            }
        }
        None
    }

    /// Binds planes bottom to top and numbers scaler units in order.
    fn bind(
        &self,
        layers: &[Layer],
        comps: &[Composition],
        convert: &[bool],
        fallback: Option<FallbackRange>,
        display: DisplaySize,
    ) -> Vec<PlaneAssignment> {
        let mut sources = Vec::new();
        let mut next_scaler = 0;
        for (index, comp) in comps.iter().enumerate() {
            if fallback.is_some_and(|f| f.visible && f.first == index) {
                sources.push(PlaneSource::Fallback);
            }
            match comp {
                Composition::Background => sources.push(PlaneSource::Background { index }),
                Composition::Overlay => {
                    let path = if convert[index] {
                        let id = ScalerId(next_scaler);
                        next_scaler += 1;
                        match preferred_path(&layers[index], &self.caps, display) {
                            ScalerPath::Local => PathMode::Local(id),
                            ScalerPath::MemoryToMemory => PathMode::MemoryToMemory(id),
                        }
                    } else {
                        PathMode::Direct
                    };
                    sources.push(PlaneSource::Layer { index, path });
                }
                _ => {}
            }
        }
        sources
            .into_iter()
            .enumerate()
            .map(|(plane, source)| PlaneAssignment { plane, source })
            .collect()
    }
}

/// Forces every hardware layer inside the software span into software.
fn close_span(comps: &mut [Composition], refresh_index: u64, pass: u32, tracer: &mut Tracer<'_>) {
    let Some((first, last)) = span(comps) else {
        return;
    };
    for (index, comp) in comps.iter_mut().enumerate().take(last + 1).skip(first) {
        if comp.is_hardware() {
            *comp = Composition::Fallback(FallbackCause::Demoted(DemotionReason::Contiguity));
            tracer.demotion(&DemotionEvent {
                refresh_index,
                layer_index: index_u32(index),
                reason: DemotionReason::Contiguity,
                pass,
            });
        }
    }
}

fn span(comps: &[Composition]) -> Option<(usize, usize)> {
    let first = comps.iter().position(|c| c.is_fallback())?;
    let last = comps.iter().rposition(|c| c.is_fallback())?;
    Some((first, last))
}

fn fallback_range(
    layers: &[Layer],
    comps: &[Composition],
    display: DisplaySize,
) -> Option<FallbackRange> {
    let (first, last) = span(comps)?;
    let visible = (first..=last)
        .filter(|&i| comps[i].is_fallback())
        .any(|i| reaches_screen(&layers[i], display));
    Some(FallbackRange {
        first,
        last,
        visible,
    })
}

fn reaches_screen(layer: &Layer, display: DisplaySize) -> bool {
    match layer.kind {
        LayerKind::Background(_) => true,
        LayerKind::FramebufferTarget => false,
        LayerKind::Buffer => layer
            .display_frame
            .normalized()
            .intersects(display.bounds()),
    }
}

fn index_u32(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}
