// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane configuration and the atomic commit.
//!
//! A [`CommitRequest`] holds one [`PlaneEntry`] per hardware plane, bottom
//! first. Entries own their input fences, so whatever happens to the commit
//! the fences are closed when the request is dropped. [`CommitBuilder`]
//! submits requests, blanks the display when a commit is rejected, and
//! remembers the last committed configuration for reuse and dumps.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::device::PlaneCommitter;
use crate::error::DeviceError;
use crate::fence::{Fence, ReleaseFence};
use crate::geometry::{DisplaySize, Rect};
use crate::layer::{BlendMode, Buffer, BufferId, Color, PixelFormat};
use crate::plan::ScalerId;

/// A plane scanning out a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferPlane {
    /// The buffer.
    pub buffer: BufferId,
    /// Its layout.
    pub format: PixelFormat,
    /// On-screen position, clipped to the display.
    pub frame: Rect,
    /// Byte offset of the first visible pixel.
    pub offset: u64,
    /// Row pitch in bytes.
    pub stride_bytes: u32,
    /// Blending with lower planes.
    pub blend: BlendMode,
    /// Protected content.
    pub protected: bool,
}

/// What one plane does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PlaneConfig {
    /// Disabled.
    #[default]
    Empty,
    /// A solid colour.
    SolidColor {
        /// The colour.
        color: Color,
        /// Covered area.
        frame: Rect,
    },
    /// Scans out a buffer.
    Buffer(BufferPlane),
    /// Fed directly by a scaler unit.
    Scaler {
        /// The feeding unit.
        unit: ScalerId,
        /// On-screen position.
        frame: Rect,
        /// Blending with lower planes.
        blend: BlendMode,
    },
}

impl PlaneConfig {
    /// Whether the plane is disabled.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    fn without_blending(self) -> Self {
        match self {
            Self::Buffer(plane) => Self::Buffer(BufferPlane {
                blend: BlendMode::None,
                ..plane
            }),
            Self::Scaler { unit, frame, .. } => Self::Scaler {
                unit,
                frame,
                blend: BlendMode::None,
            },
            other => other,
        }
    }
}

/// Buffer plane showing `crop` of `buffer` at `frame`.
///
/// The parts of `frame` outside the display are cut off and the crop origin
/// moves by the same amount, on every edge. Returns [`PlaneConfig::Empty`]
/// if nothing is left.
#[must_use]
pub fn buffer_plane(
    buffer: &Buffer,
    crop: Rect,
    frame: Rect,
    blend: BlendMode,
    display: DisplaySize,
) -> PlaneConfig {
    let frame = frame.normalized();
    let visible = frame.intersect(display.bounds());
    if visible.is_empty() {
        return PlaneConfig::Empty;
    }
    let bpp = u64::from(buffer.format.bits_per_pixel());
    let stride = u64::from(buffer.stride);
    let left = i64::from(crop.left) + i64::from(visible.left) - i64::from(frame.left);
    let top = i64::from(crop.top) + i64::from(visible.top) - i64::from(frame.top);
    let left = u64::try_from(left).unwrap_or(0);
    let top = u64::try_from(top).unwrap_or(0);
    PlaneConfig::Buffer(BufferPlane {
        buffer: buffer.id,
        format: buffer.format,
        frame: visible,
        offset: (top * stride + left) * bpp / 8,
        stride_bytes: u32::try_from(stride * bpp / 8).unwrap_or(u32::MAX),
        blend,
        protected: buffer.protected,
    })
}

/// One plane of a commit.
#[derive(Debug, Default)]
pub struct PlaneEntry {
    /// What the plane shows.
    pub config: PlaneConfig,
    /// Wait for this before scanning out.
    pub fence: Option<Fence>,
}

/// A complete plane configuration, one entry per plane.
#[derive(Debug)]
pub struct CommitRequest {
    entries: Vec<PlaneEntry>,
}

impl CommitRequest {
    /// Every plane disabled.
    #[must_use]
    pub fn blank(planes: usize) -> Self {
        Self {
            entries: (0..planes).map(|_| PlaneEntry::default()).collect(),
        }
    }

    /// Sets one plane. The bottom plane cannot blend, so its blend mode is
    /// dropped. An out-of-range plane closes `fence` and changes nothing.
    pub fn set(&mut self, plane: usize, config: PlaneConfig, fence: Option<Fence>) {
        let config = if plane == 0 {
            config.without_blending()
        } else {
            config
        };
        if let Some(entry) = self.entries.get_mut(plane) {
            *entry = PlaneEntry { config, fence };
        }
    }

    /// All entries, bottom first.
    #[must_use]
    pub fn entries(&self) -> &[PlaneEntry] {
        &self.entries
    }

    /// Number of planes that are not disabled.
    #[must_use]
    pub fn planes_used(&self) -> usize {
        self.entries.iter().filter(|e| !e.config.is_empty()).count()
    }

    /// Whether every plane is disabled.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.planes_used() == 0
    }
}

/// Release fences produced by a successful commit.
#[derive(Debug)]
pub struct ReleaseFenceSet {
    completion: Fence,
    planes: Vec<Option<Fence>>,
}

impl ReleaseFenceSet {
    /// Duplicates `completion` once for each plane in use. A failed
    /// duplicate leaves that plane without a fence.
    fn new(completion: Fence, request: &CommitRequest) -> Self {
        let planes = request
            .entries
            .iter()
            .map(|e| {
                if e.config.is_empty() {
                    None
                } else {
                    completion.try_clone().ok()
                }
            })
            .collect();
        Self { completion, planes }
    }

    /// Takes the release for `plane`.
    pub fn take(&mut self, plane: usize) -> ReleaseFence {
        self.planes
            .get_mut(plane)
            .and_then(Option::take)
            .into()
    }

    /// The commit-wide completion fence.
    #[must_use]
    pub const fn completion(&self) -> &Fence {
        &self.completion
    }
}

/// A rejected commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitFailure {
    /// What the committer reported.
    pub error: DeviceError,
    /// Whether the blank configuration was applied afterwards.
    pub blanked: bool,
}

/// Submits plane configurations and remembers the last one applied.
#[derive(Clone, Debug)]
pub struct CommitBuilder {
    last: Vec<PlaneConfig>,
}

impl CommitBuilder {
    /// A builder for `planes` planes, all disabled.
    #[must_use]
    pub fn new(planes: usize) -> Self {
        Self {
            last: vec![PlaneConfig::Empty; planes],
        }
    }

    /// Number of planes.
    #[must_use]
    pub fn planes(&self) -> usize {
        self.last.len()
    }

    /// An empty request sized for this device.
    #[must_use]
    pub fn request(&self) -> CommitRequest {
        CommitRequest::blank(self.planes())
    }

    /// The configuration last applied to `plane`.
    #[must_use]
    pub fn last_config(&self, plane: usize) -> PlaneConfig {
        self.last.get(plane).copied().unwrap_or_default()
    }

    /// The configurations last applied, bottom first.
    #[must_use]
    pub fn last_configs(&self) -> &[PlaneConfig] {
        &self.last
    }

    /// Submits `request` as one atomic update.
    ///
    /// The request's input fences are closed before this returns.
    ///
    /// # Errors
    ///
    /// If the committer rejects the request, the blank configuration is
    /// submitted in its place and the rejection is returned.
    pub fn commit(
        &mut self,
        request: CommitRequest,
        committer: &mut dyn PlaneCommitter,
    ) -> Result<ReleaseFenceSet, CommitFailure> {
        match committer.commit(&request) {
            Ok(completion) => {
                let set = ReleaseFenceSet::new(completion, &request);
                self.last = request.entries.iter().map(|e| e.config).collect();
                Ok(set)
            }
            Err(error) => {
                drop(request);
                let blanked = self.blank(committer).is_ok();
                Err(CommitFailure { error, blanked })
            }
        }
    }

    /// Disables every plane. The completion fence is closed at once.
    ///
    /// # Errors
    ///
    /// Returns the committer's rejection.
    pub fn blank(&mut self, committer: &mut dyn PlaneCommitter) -> Result<(), DeviceError> {
        let result = committer.commit(&self.request()).map(drop);
        self.last.fill(PlaneConfig::Empty);
        result
    }

    /// Writes one line per plane.
    ///
    /// # Errors
    ///
    /// Propagates formatter errors.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for (plane, config) in self.last.iter().enumerate() {
            match config {
                PlaneConfig::Empty => writeln!(out, "plane {plane}: empty")?,
                PlaneConfig::SolidColor { color, frame } => writeln!(
                    out,
                    "plane {plane}: color #{:02x}{:02x}{:02x}{:02x} {frame:?}",
                    color.r, color.g, color.b, color.a
                )?,
                PlaneConfig::Buffer(p) => writeln!(
                    out,
                    "plane {plane}: buffer {:?} {:?} {:?} offset={} stride={} blend={:?}",
                    p.buffer, p.format, p.frame, p.offset, p.stride_bytes, p.blend
                )?,
                PlaneConfig::Scaler { unit, frame, blend } => writeln!(
                    out,
                    "plane {plane}: scaler {} {frame:?} blend={blend:?}",
                    unit.0
                )?,
            }
        }
        Ok(())
    }
}
