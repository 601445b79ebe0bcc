// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device capability limits.
//!
//! [`DeviceCaps`] gathers every budget and alignment the scheduler honours.
//! Presets are `const fn`s; adjust individual fields with struct update
//! syntax and check the result with [`DeviceCaps::validate`].

use core::fmt;

use crate::geometry::DisplaySize;

/// Budgets and limits of one display's composition hardware.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceCaps {
    /// Number of hardware planes (windows).
    pub planes: usize,
    /// Pixels all planes together may fetch per refresh.
    pub max_pixels: u64,
    /// Number of scaler units.
    pub scalers: usize,
    /// Scaler units that may be bound in one refresh.
    pub concurrent_conversions: usize,
    /// Destination buffers per memory-to-memory scaler unit.
    pub ring_depth: usize,
    /// Narrowest on-screen row a plane may fetch, in bytes.
    pub min_burst_bytes: u32,
    /// Largest source/destination shrink factor.
    pub max_downscale: u32,
    /// Largest destination/source growth factor.
    pub max_upscale: u32,
    /// Scalers may feed planes directly.
    pub local_path: bool,
    /// Largest scaler source size, unrotated.
    pub max_source: (u32, u32),
    /// Largest scaler source size when rotating by a quarter turn.
    pub max_source_rotated: (u32, u32),
    /// Required alignment of source pitches, in pixels and rows.
    pub source_stride_align: (u32, u32),
    /// Required alignment of a scaler's destination crop width.
    pub dst_crop_align: u32,
    /// Alignment destination buffers are allocated to, in pixels and rows.
    pub dst_buffer_align: (u32, u32),
    /// Reuse the previous plane for an unchanged trailing layer range.
    pub skip_static_layers: bool,
    /// Longest trailing range the static-layer cache remembers.
    pub static_layer_capacity: usize,
    /// Skip scaler runs that would reprocess the same source buffer.
    pub skip_duplicate_frames: bool,
    /// How long ring teardown waits on an in-flight slot, in milliseconds.
    pub ring_teardown_wait_ms: u32,
}

impl DeviceCaps {
    /// Five planes and a single scaler unit.
    #[must_use]
    pub const fn single_scaler() -> Self {
        Self {
            planes: 5,
            max_pixels: 2560 * 1600 * 2,
            scalers: 1,
            concurrent_conversions: 1,
            ring_depth: 3,
            min_burst_bytes: 128,
            max_downscale: 16,
            max_upscale: 8,
            local_path: true,
            max_source: (4800, 3344),
            max_source_rotated: (2048, 2048),
            source_stride_align: (16, 16),
            dst_crop_align: 32,
            dst_buffer_align: (32, 1),
            skip_static_layers: true,
            static_layer_capacity: 5,
            skip_duplicate_frames: false,
            ring_teardown_wait_ms: 0,
        }
    }

    /// Five planes fed by two scaler units that may run in the same refresh.
    #[must_use]
    pub const fn dual_scaler() -> Self {
        Self {
            scalers: 2,
            concurrent_conversions: 2,
            ..Self::single_scaler()
        }
    }

    /// Downscale bound on the local path, which depends on how many pixels
    /// the display scans out per line.
    #[must_use]
    pub const fn local_max_downscale(display: DisplaySize) -> u32 {
        match (display.width, display.height) {
            (720 | 640, 480) | (1280, 720) => 4,
            (1280, 800) => 3,
            (1920, 1080) | (800, 1280) => 2,
            _ => 1,
        }
    }

    /// Checks the limits for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.planes == 0 {
            return Err(ConfigError::NoPlanes);
        }
        if self.max_pixels == 0 {
            return Err(ConfigError::NoPixelBudget);
        }
        if self.ring_depth < 2 {
            return Err(ConfigError::RingTooShallow(self.ring_depth));
        }
        if self.concurrent_conversions > self.scalers {
            return Err(ConfigError::TooManyConversions {
                concurrent: self.concurrent_conversions,
                scalers: self.scalers,
            });
        }
        if self.max_downscale == 0 || self.max_upscale == 0 {
            return Err(ConfigError::ZeroScaleBound);
        }
        Ok(())
    }
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self::single_scaler()
    }
}

/// Inconsistent [`DeviceCaps`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `planes` is zero.
    NoPlanes,
    /// `max_pixels` is zero.
    NoPixelBudget,
    /// `ring_depth` cannot double-buffer.
    RingTooShallow(usize),
    /// More concurrent conversions than scaler units.
    TooManyConversions {
        /// Requested concurrent conversions.
        concurrent: usize,
        /// Available units.
        scalers: usize,
    },
    /// A scale bound of zero admits nothing.
    ZeroScaleBound,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlanes => write!(f, "device has no planes"),
            Self::NoPixelBudget => write!(f, "pixel budget is zero"),
            Self::RingTooShallow(depth) => {
                write!(f, "destination ring depth {depth} is below 2")
            }
            Self::TooManyConversions {
                concurrent,
                scalers,
            } => write!(
                f,
                "{concurrent} concurrent conversions requested with {scalers} scaler units"
            ),
            Self::ZeroScaleBound => write!(f, "scale bounds must be at least 1"),
        }
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        assert_eq!(DeviceCaps::single_scaler().validate(), Ok(()));
        assert_eq!(DeviceCaps::dual_scaler().validate(), Ok(()));
    }

    #[test]
    fn shallow_ring_rejected() {
        let caps = DeviceCaps {
            ring_depth: 1,
            ..DeviceCaps::single_scaler()
        };
        assert_eq!(caps.validate(), Err(ConfigError::RingTooShallow(1)));
    }

    #[test]
    fn conversions_bounded_by_units() {
        let caps = DeviceCaps {
            concurrent_conversions: 2,
            ..DeviceCaps::single_scaler()
        };
        assert!(matches!(
            caps.validate(),
            Err(ConfigError::TooManyConversions { .. })
        ));
    }

    #[test]
    fn local_downscale_table() {
        assert_eq!(DeviceCaps::local_max_downscale(DisplaySize::new(1280, 720)), 4);
        assert_eq!(DeviceCaps::local_max_downscale(DisplaySize::new(1280, 800)), 3);
        assert_eq!(DeviceCaps::local_max_downscale(DisplaySize::new(1920, 1080)), 2);
        assert_eq!(DeviceCaps::local_max_downscale(DisplaySize::new(2560, 1600)), 1);
    }
}
