// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use core::fmt;

use crate::plan::ScalerId;

/// Failure reported by a device collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// The device is busy with earlier work.
    Busy,
    /// The device cannot handle the requested configuration.
    Unsupported,
    /// Out of buffer or descriptor memory.
    OutOfMemory,
    /// Any other OS error code.
    Os(i32),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "device busy"),
            Self::Unsupported => write!(f, "configuration not supported by device"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Os(code) => write!(f, "os error {code}"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// Which step of bringing up a scaler unit failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalerStage {
    /// Opening the engine.
    Create,
    /// Stopping the engine before reconfiguration.
    Stop,
    /// Applying source and destination configuration.
    Configure,
    /// Allocating the destination ring.
    Allocate,
    /// Queueing the conversion.
    Run,
}

impl fmt::Display for ScalerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Stop => "stop",
            Self::Configure => "configure",
            Self::Allocate => "allocate",
            Self::Run => "run",
        })
    }
}

/// Errors surfaced by a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A scaler unit rejected its setup. The unit was reset and its layer
    /// shows nothing this refresh.
    DeviceConfigFailed {
        /// The failing unit.
        unit: ScalerId,
        /// The failing step.
        stage: ScalerStage,
        /// What the device reported.
        source: DeviceError,
    },
    /// A scaler unit failed to queue a conversion. The unit was reset and its
    /// layer shows nothing this refresh.
    DeviceRunFailed {
        /// The failing unit.
        unit: ScalerId,
        /// What the device reported.
        source: DeviceError,
    },
    /// The plane configuration was rejected; the display was blanked.
    CommitFailed(DeviceError),
    /// Software-composed layers are visible but no framebuffer target was
    /// supplied; the display was blanked.
    FramebufferTargetMissing,
}

impl Error {
    /// The scaler unit involved, if any.
    #[must_use]
    pub const fn unit(&self) -> Option<ScalerId> {
        match self {
            Self::DeviceConfigFailed { unit, .. } | Self::DeviceRunFailed { unit, .. } => {
                Some(*unit)
            }
            Self::CommitFailed(_) | Self::FramebufferTargetMissing => None,
        }
    }

    /// The scaler step that failed, if a scaler failed.
    #[must_use]
    pub const fn stage(&self) -> Option<ScalerStage> {
        match self {
            Self::DeviceConfigFailed { stage, .. } => Some(*stage),
            Self::DeviceRunFailed { .. } => Some(ScalerStage::Run),
            Self::CommitFailed(_) | Self::FramebufferTargetMissing => None,
        }
    }

    /// Whether the whole display was affected rather than a single layer.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CommitFailed(_) | Self::FramebufferTargetMissing)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceConfigFailed {
                unit,
                stage,
                source,
            } => write!(f, "scaler {} failed to {stage}: {source}", unit.0),
            Self::DeviceRunFailed { unit, source } => {
                write!(f, "scaler {} failed to run: {source}", unit.0)
            }
            Self::CommitFailed(source) => write!(f, "plane commit failed: {source}"),
            Self::FramebufferTargetMissing => {
                write!(f, "software-composed layers visible without a framebuffer target")
            }
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::DeviceConfigFailed { source, .. }
            | Self::DeviceRunFailed { source, .. }
            | Self::CommitFailed(source) => Some(source),
            Self::FramebufferTargetMissing => None,
        }
    }
}
