// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer display rectangles and overlap-depth tracking.
//!
//! Display geometry is integral: planes address whole pixels. [`Rect`] uses
//! half-open bounds (`right` and `bottom` are exclusive), so two rectangles
//! that merely touch do not intersect and an empty rectangle intersects
//! nothing.
//!
//! [`OverlapTracker`] holds the rectangles accepted for hardware planes during
//! one feasibility pass, together with every pairwise intersection between
//! them. A candidate that touches any recorded intersection would make some
//! pixel three planes deep.

use alloc::vec::Vec;

/// Size of the display the planes scan out to, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct DisplaySize {
    /// Horizontal resolution.
    pub width: u32,
    /// Vertical resolution.
    pub height: u32,
}

impl DisplaySize {
    /// Creates a display size.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The rectangle covering the whole display.
    #[must_use]
    pub fn bounds(self) -> Rect {
        Rect::new(0, 0, clamp_to_i32(self.width), clamp_to_i32(self.height))
    }
}

/// An axis-aligned integer rectangle with exclusive right and bottom edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge (inclusive).
    pub left: i32,
    /// Top edge (inclusive).
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    /// Creates a rectangle from its edges.
    #[inline]
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Creates a rectangle from an origin and a size.
    #[inline]
    #[must_use]
    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Rounds a fractional rectangle to whole pixels.
    ///
    /// Edges are rounded independently, so a crop of `0.4..10.6` becomes
    /// `0..11`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "float-to-int `as` saturates; crops are far inside i32 range"
    )]
    pub fn from_kurbo(rect: kurbo::Rect) -> Self {
        let r = rect.round();
        Self::new(r.x0 as i32, r.y0 as i32, r.x1 as i32, r.y1 as i32)
    }

    /// Converts to a `kurbo` rectangle.
    #[must_use]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.left),
            f64::from(self.top),
            f64::from(self.right),
            f64::from(self.bottom),
        )
    }

    /// Returns the rectangle with its edges swapped where inverted.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::new(
            self.left.min(self.right),
            self.top.min(self.bottom),
            self.left.max(self.right),
            self.top.max(self.bottom),
        )
    }

    /// Width in pixels, zero when inverted.
    #[inline]
    #[must_use]
    pub fn width(self) -> u32 {
        span(self.left, self.right)
    }

    /// Height in pixels, zero when inverted.
    #[inline]
    #[must_use]
    pub fn height(self) -> u32 {
        span(self.top, self.bottom)
    }

    /// Pixel area.
    #[inline]
    #[must_use]
    pub fn area(self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Whether the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// The overlapping part of two rectangles. Empty if they do not overlap.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let r = Self::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { Self::ZERO } else { r }
    }

    /// Whether the two rectangles share at least one pixel.
    #[inline]
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains_rect(self, other: Self) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Whether the pixel at `(x, y)` lies inside the rectangle.
    #[inline]
    #[must_use]
    pub fn contains_point(self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

fn span(lo: i32, hi: i32) -> u32 {
    u32::try_from(i64::from(hi) - i64::from(lo)).unwrap_or(0)
}

pub(crate) fn clamp_to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Accepted plane rectangles plus their pairwise intersections.
#[derive(Clone, Debug, Default)]
pub struct OverlapTracker {
    accepted: Vec<Rect>,
    overlaps: Vec<Rect>,
}

impl OverlapTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accepted: Vec::new(),
            overlaps: Vec::new(),
        }
    }

    /// Whether accepting `rect` would cover some pixel three times.
    #[must_use]
    pub fn would_exceed_depth(&self, rect: Rect) -> bool {
        self.overlaps.iter().any(|o| o.intersects(rect))
    }

    /// Records `rect` as accepted.
    ///
    /// Every non-empty intersection with a previously accepted rectangle is
    /// remembered as an overlap region.
    pub fn insert(&mut self, rect: Rect) {
        for a in &self.accepted {
            let i = a.intersect(rect);
            if !i.is_empty() {
                self.overlaps.push(i);
            }
        }
        self.accepted.push(rect);
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.accepted.clear();
        self.overlaps.clear();
    }

    /// Rectangles accepted so far, in insertion order.
    #[must_use]
    pub fn accepted(&self) -> &[Rect] {
        &self.accepted
    }

    /// Recorded pairwise overlap regions.
    #[must_use]
    pub fn overlaps(&self) -> &[Rect] {
        &self.overlaps
    }
}

/// The maximum number of `rects` covering any single pixel.
///
/// The deepest point of an arrangement of rectangles is always at some
/// `(left_i, top_j)` corner, so only those candidates are sampled.
#[must_use]
pub fn coverage_depth(rects: &[Rect]) -> usize {
    let mut best = 0;
    for a in rects.iter().filter(|r| !r.is_empty()) {
        for b in rects.iter().filter(|r| !r.is_empty()) {
            let (x, y) = (a.left, b.top);
            let depth = rects.iter().filter(|r| r.contains_point(x, y)).count();
            best = best.max(depth);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        assert!(!a.intersects(b), "shared edge is not an overlap");
        assert!(a.intersect(b).is_empty());
    }

    #[test]
    fn empty_rect_intersects_nothing() {
        let e = Rect::new(5, 5, 5, 9);
        let full = Rect::new(0, 0, 100, 100);
        assert!(!e.intersects(full));
        assert!(!full.intersects(e));
    }

    #[test]
    fn normalized_swaps_inverted_edges() {
        let r = Rect::new(10, 20, 0, 5).normalized();
        assert_eq!(r, Rect::new(0, 5, 10, 20));
        assert_eq!(r.area(), 150);
    }

    #[test]
    fn inverted_rect_has_zero_extent() {
        let r = Rect::new(10, 10, 0, 0);
        assert_eq!(r.width(), 0);
        assert_eq!(r.height(), 0);
        assert!(r.is_empty());
    }

    #[test]
    fn kurbo_round_trip_rounds_edges() {
        let r = Rect::from_kurbo(kurbo::Rect::new(0.4, 1.6, 10.5, 20.2));
        assert_eq!(r, Rect::new(0, 2, 11, 20));
        assert_eq!(Rect::from_kurbo(r.to_kurbo()), r);
    }

    #[test]
    fn tracker_allows_two_deep() {
        let mut t = OverlapTracker::new();
        t.insert(Rect::new(0, 0, 100, 100));
        let b = Rect::new(50, 50, 150, 150);
        assert!(!t.would_exceed_depth(b));
        t.insert(b);
        assert_eq!(t.overlaps(), &[Rect::new(50, 50, 100, 100)]);
    }

    #[test]
    fn tracker_rejects_three_deep() {
        let mut t = OverlapTracker::new();
        t.insert(Rect::new(0, 0, 100, 100));
        t.insert(Rect::new(50, 50, 150, 150));
        assert!(t.would_exceed_depth(Rect::new(60, 60, 70, 70)));
        // Overlaps one accepted rect only: still fine.
        assert!(!t.would_exceed_depth(Rect::new(0, 120, 10, 130)));
    }

    #[test]
    fn tracker_accepts_rect_touching_two_disjoint_rects() {
        let mut t = OverlapTracker::new();
        t.insert(Rect::new(0, 0, 10, 10));
        t.insert(Rect::new(20, 0, 30, 10));
        // Spans both accepted rects but never stacks three deep.
        assert!(!t.would_exceed_depth(Rect::new(5, 0, 25, 10)));
    }

    #[test]
    fn coverage_depth_counts_stacked_pixels() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(5, 5, 15, 15),
            Rect::new(8, 8, 20, 20),
        ];
        assert_eq!(coverage_depth(&rects), 3);
        assert_eq!(coverage_depth(&rects[..2]), 2);
        assert_eq!(coverage_depth(&[]), 0);
    }
}
