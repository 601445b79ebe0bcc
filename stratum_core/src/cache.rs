// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Static trailing-layer reuse.
//!
//! When the software-composed layers at the top of the stack show the same
//! buffers two refreshes in a row, the framebuffer image from the previous
//! refresh is still correct. [`StaticLayerCache`] detects that and turns the
//! freshly solved plan into one that shows the previous plane configuration
//! again, so the renderer can skip composing those layers.
//!
//! The cache is all-or-nothing: any difference in the trailing range, a
//! geometry change, or a range that no longer qualifies clears it. A mismatch
//! does not record the new handles, so reuse resumes at the earliest two
//! refreshes after the range settles.

use alloc::vec::Vec;

use crate::layer::{BufferId, CompositionRequest, LayerKind};
use crate::plan::{AssignmentPlan, Composition, PlaneSource};
use crate::trace::CacheDecision;

/// The remembered trailing range.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Snapshot {
    start: usize,
    plane: usize,
    handles: Vec<BufferId>,
}

/// Remembers the trailing software range of the previous refresh.
#[derive(Clone, Debug)]
pub struct StaticLayerCache {
    enabled: bool,
    capacity: usize,
    snapshot: Option<Snapshot>,
}

impl StaticLayerCache {
    /// Creates a cache remembering at most `capacity - 1` trailing layers.
    #[must_use]
    pub const fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity,
            snapshot: None,
        }
    }

    /// Forgets the remembered range.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Whether a range is remembered.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Checks `request` against the previous refresh.
    ///
    /// `solved` must be the plan the solver produced for `request`. Returns a
    /// plan reusing the previous software image when the trailing range is
    /// unchanged.
    pub fn maybe_reuse(
        &mut self,
        request: &CompositionRequest,
        solved: &AssignmentPlan,
    ) -> Option<AssignmentPlan> {
        self.lookup(request, solved).1
    }

    /// Like [`maybe_reuse`](Self::maybe_reuse), also reporting the decision.
    pub fn lookup(
        &mut self,
        request: &CompositionRequest,
        solved: &AssignmentPlan,
    ) -> (CacheDecision, Option<AssignmentPlan>) {
        if !self.enabled {
            return (CacheDecision::Disabled, None);
        }
        if request.geometry_changed {
            self.invalidate();
            return (CacheDecision::Invalidated, None);
        }
        let Some(candidate) = self.candidate(request, solved) else {
            self.invalidate();
            return (CacheDecision::Invalidated, None);
        };
        match &self.snapshot {
            Some(previous) if *previous == candidate => {
                (CacheDecision::Reused, Some(reuse(solved, &candidate)))
            }
            Some(_) => {
                self.invalidate();
                (CacheDecision::Mismatch, None)
            }
            None => {
                self.snapshot = Some(candidate);
                (CacheDecision::Recorded, None)
            }
        }
    }

    /// The trailing software range of `request`, if it qualifies.
    ///
    /// The range runs from just above the topmost hardware layer to the top
    /// of the stack, ignoring the framebuffer target. It must be non-empty,
    /// shorter than the capacity, entirely in software, shown on a plane,
    /// and made of ordinary buffer layers the caller has not flagged.
    fn candidate(&self, request: &CompositionRequest, solved: &AssignmentPlan) -> Option<Snapshot> {
        let comps = solved.compositions();
        let end = request
            .layers
            .iter()
            .rposition(|l| !matches!(l.kind, LayerKind::FramebufferTarget))?
            + 1;
        let start = comps[..end]
            .iter()
            .rposition(|c| c.is_hardware())
            .map_or(0, |i| i + 1);
        let len = end.checked_sub(start)?;
        if len == 0 || len >= self.capacity {
            return None;
        }
        let mut handles = Vec::with_capacity(len);
        for (layer, comp) in request.layers[start..end].iter().zip(&comps[start..end]) {
            if !comp.is_fallback() || !layer.is_buffer() || layer.skip {
                return None;
            }
            handles.push(layer.handle()?);
        }
        let plane = solved.fallback_plane()?;
        Some(Snapshot {
            start,
            plane,
            handles,
        })
    }
}

fn reuse(solved: &AssignmentPlan, snapshot: &Snapshot) -> AssignmentPlan {
    let mut plan = solved.clone();
    let end = snapshot.start + snapshot.handles.len();
    for comp in &mut plan.compositions[snapshot.start..end] {
        *comp = Composition::Reused;
    }
    for assignment in &mut plan.planes {
        if assignment.plane == snapshot.plane {
            assignment.source = PlaneSource::Reused;
        }
    }
    plan.fallback = None;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCaps;
    use crate::geometry::{DisplaySize, Rect};
    use crate::layer::{Buffer, Layer, PixelFormat};
    use crate::solver::Solver;
    use alloc::vec;

    const DISPLAY: DisplaySize = DisplaySize::new(1280, 720);

    fn layer(id: u64, format: PixelFormat, x: i32) -> Layer {
        Layer::unscaled(Buffer::new(BufferId(id), format, 256, 256), x, 0)
    }

    /// One plane-able layer under two software-only layers, plus the target.
    fn request(top: u64, geometry_changed: bool) -> CompositionRequest {
        let target = Buffer::new(BufferId(0xf00), PixelFormat::Rgba8888, 1280, 720);
        CompositionRequest::new(
            vec![
                layer(1, PixelFormat::Rgba8888, 0),
                layer(2, PixelFormat::Rgb888, 300),
                layer(top, PixelFormat::Rgb888, 600),
                Layer::framebuffer_target(target, Rect::new(0, 0, 1280, 720)),
            ],
            geometry_changed,
        )
    }

    fn solve(req: &CompositionRequest) -> AssignmentPlan {
        Solver::new(DeviceCaps::single_scaler()).solve(req, DISPLAY)
    }

    #[test]
    fn second_identical_refresh_reuses() {
        let mut cache = StaticLayerCache::new(true, 5);
        let first = request(3, true);
        assert_eq!(cache.lookup(&first, &solve(&first)).0, CacheDecision::Invalidated);

        let second = request(3, false);
        assert_eq!(cache.lookup(&second, &solve(&second)).0, CacheDecision::Recorded);

        let third = request(3, false);
        let (decision, plan) = cache.lookup(&third, &solve(&third));
        assert_eq!(decision, CacheDecision::Reused);
        let plan = plan.unwrap();
        assert!(plan.is_reused());
        assert!(!plan.needs_framebuffer_target());
        assert_eq!(plan.composition(0), Some(Composition::Overlay));
        assert_eq!(plan.composition(1), Some(Composition::Reused));
        assert_eq!(plan.composition(2), Some(Composition::Reused));
        assert_eq!(plan.planes_used(), 2);
    }

    #[test]
    fn changed_handle_invalidates_everything() {
        let mut cache = StaticLayerCache::new(true, 5);
        for _ in 0..2 {
            let req = request(3, false);
            let plan = solve(&req);
            let _ = cache.maybe_reuse(&req, &plan);
        }
        let changed = request(4, false);
        assert_eq!(cache.lookup(&changed, &solve(&changed)).0, CacheDecision::Mismatch);
        assert!(!cache.is_armed());

        // The mismatching handles were not recorded.
        let again = request(4, false);
        assert_eq!(cache.lookup(&again, &solve(&again)).0, CacheDecision::Recorded);
    }

    #[test]
    fn geometry_change_clears() {
        let mut cache = StaticLayerCache::new(true, 5);
        let req = request(3, false);
        let _ = cache.maybe_reuse(&req, &solve(&req));
        assert!(cache.is_armed());
        let req = request(3, true);
        assert!(cache.maybe_reuse(&req, &solve(&req)).is_none());
        assert!(!cache.is_armed());
    }

    #[test]
    fn range_must_fit_capacity() {
        let mut cache = StaticLayerCache::new(true, 2);
        let req = request(3, false);
        assert_eq!(cache.lookup(&req, &solve(&req)).0, CacheDecision::Invalidated);
    }

    #[test]
    fn disabled_cache_never_reuses() {
        let mut cache = StaticLayerCache::new(false, 5);
        for _ in 0..3 {
            let req = request(3, false);
            assert_eq!(cache.lookup(&req, &solve(&req)).0, CacheDecision::Disabled);
        }
    }

    #[test]
    fn hardware_top_layer_disqualifies() {
        let mut cache = StaticLayerCache::new(true, 5);
        let req = CompositionRequest::new(
            vec![
                layer(2, PixelFormat::Rgb888, 0),
                layer(1, PixelFormat::Rgba8888, 600),
            ],
            false,
        );
        assert_eq!(cache.lookup(&req, &solve(&req)).0, CacheDecision::Invalidated);
    }
}
