// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-refresh assignment plan.
//!
//! An [`AssignmentPlan`] records how every layer of a request is composed and
//! which plane shows what. Plans are values: the solver derives a fresh one
//! every refresh and the static-layer cache derives a reused variant from
//! it, but nothing edits a plan once built.

use alloc::vec::Vec;
use core::fmt;

use crate::capability::RejectReason;

/// Index of a scaler unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScalerId(pub u32);

impl ScalerId {
    /// The unit index as a `usize`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ScalerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScalerId({})", self.0)
    }
}

/// Why the solver pushed an eligible layer to software.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DemotionReason {
    /// Every plane was taken.
    PlaneBudget,
    /// The pixel budget could not cover the layer.
    PixelBudget,
    /// The layer needs a scaler and none was free.
    ScalerBusy,
    /// Some pixel would have been covered three times.
    OverlapDepth,
    /// The layer sat between two software layers.
    Contiguity,
}

/// Why a layer ended up in software.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FallbackCause {
    /// The layer has no hardware path at all.
    Rejected(RejectReason),
    /// The layer was eligible but lost out to shared budgets.
    Demoted(DemotionReason),
}

/// How one layer reaches the display this refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Composition {
    /// Shown on its own plane.
    Overlay,
    /// Composed by the software renderer into the framebuffer target.
    Fallback(FallbackCause),
    /// A solid colour on its own plane.
    Background,
    /// The framebuffer target.
    FramebufferTarget,
    /// Unchanged since the previous refresh; its old composition is shown
    /// again.
    Reused,
}

impl Composition {
    /// Whether the software renderer draws this layer.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Whether the layer has a plane of its own.
    #[must_use]
    pub const fn is_hardware(self) -> bool {
        matches!(self, Self::Overlay | Self::Background)
    }
}

/// How a plane receives a layer's pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathMode {
    /// The plane scans the layer's buffer itself.
    Direct,
    /// A scaler feeds the plane without an intermediate buffer.
    Local(ScalerId),
    /// A scaler writes a destination buffer the plane scans out.
    MemoryToMemory(ScalerId),
}

impl PathMode {
    /// The scaler involved, if any.
    #[must_use]
    pub const fn scaler(self) -> Option<ScalerId> {
        match self {
            Self::Direct => None,
            Self::Local(id) | Self::MemoryToMemory(id) => Some(id),
        }
    }
}

/// What a plane shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneSource {
    /// A buffer layer.
    Layer {
        /// Index into the request.
        index: usize,
        /// How pixels get to the plane.
        path: PathMode,
    },
    /// A background colour layer.
    Background {
        /// Index into the request.
        index: usize,
    },
    /// The framebuffer target holding the software-composed range.
    Fallback,
    /// Whatever this plane showed last refresh.
    Reused,
}

/// One bound plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneAssignment {
    /// Hardware plane index; higher is nearer the viewer.
    pub plane: usize,
    /// What it shows.
    pub source: PlaneSource,
}

/// The contiguous range of software-composed layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FallbackRange {
    /// Lowest fallback layer index.
    pub first: usize,
    /// Highest fallback layer index.
    pub last: usize,
    /// Whether any layer in the range lands on screen. An invisible range
    /// takes no plane.
    pub visible: bool,
}

/// Result of solving one composition request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentPlan {
    pub(crate) compositions: Vec<Composition>,
    pub(crate) planes: Vec<PlaneAssignment>,
    pub(crate) fallback: Option<FallbackRange>,
    pub(crate) passes: u32,
}

impl AssignmentPlan {
    /// A plan for an empty request.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            compositions: Vec::new(),
            planes: Vec::new(),
            fallback: None,
            passes: 0,
        }
    }

    /// Per-layer composition, indexed like the request.
    #[must_use]
    pub fn compositions(&self) -> &[Composition] {
        &self.compositions
    }

    /// Composition of one layer.
    #[must_use]
    pub fn composition(&self, index: usize) -> Option<Composition> {
        self.compositions.get(index).copied()
    }

    /// Bound planes in plane order.
    #[must_use]
    pub fn planes(&self) -> &[PlaneAssignment] {
        &self.planes
    }

    /// Number of planes in use.
    #[must_use]
    pub fn planes_used(&self) -> usize {
        self.planes.len()
    }

    /// The software range, if any layer is composed in software.
    #[must_use]
    pub const fn fallback(&self) -> Option<FallbackRange> {
        self.fallback
    }

    /// Feasibility passes the solver ran.
    #[must_use]
    pub const fn passes(&self) -> u32 {
        self.passes
    }

    /// Whether the framebuffer target must be supplied and shown.
    #[must_use]
    pub fn needs_framebuffer_target(&self) -> bool {
        self.planes
            .iter()
            .any(|p| matches!(p.source, PlaneSource::Fallback))
    }

    /// Whether this plan reuses part of the previous refresh.
    #[must_use]
    pub fn is_reused(&self) -> bool {
        self.planes
            .iter()
            .any(|p| matches!(p.source, PlaneSource::Reused))
    }

    /// The plane showing layer `index`, if it has one.
    #[must_use]
    pub fn plane_for_layer(&self, index: usize) -> Option<&PlaneAssignment> {
        self.planes.iter().find(|p| match p.source {
            PlaneSource::Layer { index: i, .. } | PlaneSource::Background { index: i } => {
                i == index
            }
            PlaneSource::Fallback | PlaneSource::Reused => false,
        })
    }

    /// The plane showing the software range or its reused image.
    #[must_use]
    pub fn fallback_plane(&self) -> Option<usize> {
        self.planes
            .iter()
            .find(|p| matches!(p.source, PlaneSource::Fallback | PlaneSource::Reused))
            .map(|p| p.plane)
    }

    /// Layers bound to scalers, with their path.
    pub fn scaler_bindings(&self) -> impl Iterator<Item = (usize, PathMode)> + '_ {
        self.planes.iter().filter_map(|p| match p.source {
            PlaneSource::Layer { index, path } if path.scaler().is_some() => Some((index, path)),
            _ => None,
        })
    }

    /// Indices of layers with a plane of their own.
    pub fn hardware_layers(&self) -> impl Iterator<Item = usize> + '_ {
        self.compositions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_hardware())
            .map(|(i, _)| i)
    }
}

impl Default for AssignmentPlan {
    fn default() -> Self {
        Self::empty()
    }
}
