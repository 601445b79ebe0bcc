// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware composition resource scheduling.
//!
//! `stratum_core` decides, once per display refresh, which layers a display
//! controller shows on its fixed-function planes, which of them go through a
//! shared scaling/conversion unit first, and which fall back to the software
//! renderer. It then drives the scaler units and commits the resulting plane
//! configuration in one atomic step, handing a release fence back for every
//! layer. It is `no_std` compatible (with `alloc`) and never talks to a
//! kernel driver itself: device access goes through the traits in
//! [`device`].
//!
//! # Architecture
//!
//! ```text
//!   DeviceStateCell ──snapshot──┐
//!                               ▼
//!   CompositionRequest ──► Compositor::prepare()
//!                               │  classify ─► Solver ─► StaticLayerCache
//!                               ▼
//!                         AssignmentPlan ──► (caller composes fallback)
//!                               │
//!                               ▼
//!                         Compositor::set()
//!                               │  ScalerManager ─► CommitBuilder
//!                               ▼
//!                         RefreshOutcome (one ReleaseFence per layer)
//! ```
//!
//! **[`capability`]** — Per-layer eligibility: direct plane, plane behind a
//! scaler, or software only.
//!
//! **[`solver`]** — Iterative constraint repair over planes, pixel
//! bandwidth, concurrent conversions, and overlap depth, keeping the
//! software-composed layers contiguous in z-order.
//!
//! **[`cache`]** — Reuse of the previous framebuffer image when the trailing
//! software-composed layers did not change.
//!
//! **[`scaler`]** — Scaler unit lifecycle with cached configurations and a
//! ring of destination buffers per unit.
//!
//! **[`commit`]** — Plane configuration, the atomic commit, and the blank
//! fallback.
//!
//! **[`fence`]** — Owned fence descriptors, closed exactly once.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types
//! for refresh instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-layer
//!   classification events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod cache;
pub mod capability;
pub mod commit;
pub mod compositor;
pub mod config;
pub mod device;
pub mod error;
pub mod fence;
pub mod geometry;
pub mod layer;
pub mod plan;
pub mod scaler;
pub mod solver;
pub mod time;
pub mod trace;
