// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Randomized checks of the solver and of fence ownership across refreshes.

use std::sync::Arc;

use hashbrown::HashSet;
use proptest::prelude::*;
use stratum_core::config::DeviceCaps;
use stratum_core::error::{DeviceError, ScalerStage};
use stratum_core::geometry::{DisplaySize, Rect};
use stratum_core::layer::{
    Buffer, BufferId, Color, CompositionRequest, Layer, PixelFormat, Rotation, Transform,
};
use stratum_core::solver::Solver;
use stratum_harness::invariants::check_plan;
use stratum_harness::ledger::FenceLedger;
use stratum_harness::mock::Fault;
use stratum_harness::rig::{Rig, pending_releases};

const DISPLAY: DisplaySize = DisplaySize::new(1280, 720);

// ── Strategies ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct LayerSpec {
    background: bool,
    id: u64,
    format: PixelFormat,
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    frame_w: i32,
    frame_h: i32,
    rotation: Rotation,
    skip: bool,
}

impl LayerSpec {
    fn build(&self, ledger: Option<&Arc<FenceLedger>>) -> Layer {
        if self.background {
            return Layer::background(Color::BLACK);
        }
        let buffer = Buffer::new(BufferId(self.id), self.format, self.width, self.height);
        let crop = kurbo::Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));
        let frame = Rect::from_xywh(self.x, self.y, self.frame_w, self.frame_h);
        let layer = Layer::buffer(buffer, crop, frame)
            .with_transform(Transform::rotate(self.rotation))
            .with_skip(self.skip);
        match ledger {
            Some(ledger) => layer.with_acquire_fence(ledger.issue()),
            None => layer,
        }
    }
}

fn arb_format() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        3 => Just(PixelFormat::Rgba8888),
        1 => Just(PixelFormat::Rgbx8888),
        1 => Just(PixelFormat::Bgra8888),
        1 => Just(PixelFormat::Rgb565),
        1 => Just(PixelFormat::Rgb888),
        2 => Just(PixelFormat::Nv12),
        1 => Just(PixelFormat::Yv12),
        1 => Just(PixelFormat::Nv21),
    ]
}

fn arb_rotation() -> impl Strategy<Value = Rotation> {
    prop_oneof![
        4 => Just(Rotation::None),
        1 => Just(Rotation::Deg90),
        1 => Just(Rotation::Deg180),
        1 => Just(Rotation::Deg270),
    ]
}

fn arb_layer() -> impl Strategy<Value = LayerSpec> {
    (
        prop::bool::weighted(0.05),
        1u64..8,
        arb_format(),
        (4u32..200, 4u32..200),
        (-200i32..1400, -200i32..800),
        prop::option::weighted(0.4, (4i32..400, 4i32..250)),
        arb_rotation(),
        prop::bool::weighted(0.1),
    )
        .prop_map(|(background, id, format, (w, h), (x, y), scaled, rotation, skip)| {
            let (width, height) = (w * 4, h * 4);
            let (frame_w, frame_h) = match scaled {
                Some((fw, fh)) => (fw * 4, fh * 4),
                None => (
                    i32::try_from(width).unwrap_or(i32::MAX),
                    i32::try_from(height).unwrap_or(i32::MAX),
                ),
            };
            LayerSpec {
                background,
                id,
                format,
                width,
                height,
                x,
                y,
                frame_w,
                frame_h,
                rotation,
                skip,
            }
        })
}

fn arb_layers() -> impl Strategy<Value = Vec<LayerSpec>> {
    prop::collection::vec(arb_layer(), 0..8)
}

fn arb_caps() -> impl Strategy<Value = DeviceCaps> {
    (any::<bool>(), any::<bool>(), 2usize..6).prop_map(|(dual, skip_duplicates, planes)| {
        let base = if dual {
            DeviceCaps::dual_scaler()
        } else {
            DeviceCaps::single_scaler()
        };
        DeviceCaps {
            planes,
            skip_duplicate_frames: skip_duplicates,
            ..base
        }
    })
}

fn request(specs: &[LayerSpec], ledger: Option<&Arc<FenceLedger>>) -> CompositionRequest {
    CompositionRequest::new(specs.iter().map(|s| s.build(ledger)).collect(), true)
}

/// Something that goes wrong during one refresh.
#[derive(Clone, Copy, Debug)]
enum Mishap {
    Create,
    Stop,
    Configure,
    Run,
    Allocation,
    Commit,
    Dup,
    Disconnect,
}

fn arb_mishap() -> impl Strategy<Value = Option<Mishap>> {
    prop::option::weighted(
        0.3,
        prop_oneof![
            Just(Mishap::Create),
            Just(Mishap::Stop),
            Just(Mishap::Configure),
            Just(Mishap::Run),
            Just(Mishap::Allocation),
            Just(Mishap::Commit),
            Just(Mishap::Dup),
            Just(Mishap::Disconnect),
        ],
    )
}

#[derive(Clone, Debug)]
struct Frame {
    scene: usize,
    geometry_changed: bool,
    with_target: bool,
    mishap: Option<Mishap>,
}

fn arb_frames() -> impl Strategy<Value = Vec<Frame>> {
    prop::collection::vec(
        (
            0usize..2,
            prop::bool::weighted(0.2),
            prop::bool::weighted(0.9),
            arb_mishap(),
        )
            .prop_map(|(scene, geometry_changed, with_target, mishap)| Frame {
                scene,
                geometry_changed,
                with_target,
                mishap,
            }),
        1..10,
    )
}

fn arm(rig: &mut Rig, mishap: Mishap) {
    match mishap {
        Mishap::Create => rig
            .scaler
            .faults
            .set(ScalerStage::Create, Fault::Once(DeviceError::Busy)),
        Mishap::Stop => rig
            .scaler
            .faults
            .set(ScalerStage::Stop, Fault::Once(DeviceError::Os(5))),
        Mishap::Configure => rig
            .scaler
            .faults
            .set(ScalerStage::Configure, Fault::Once(DeviceError::Unsupported)),
        Mishap::Run => rig
            .scaler
            .faults
            .set(ScalerStage::Run, Fault::Always(DeviceError::Os(5))),
        Mishap::Allocation => rig.allocator.fail_at_live = Some(rig.allocator.live.len() + 1),
        Mishap::Commit => rig.committer.reject_next = 1,
        Mishap::Dup => rig.ledger.set_fail_dup(true),
        Mishap::Disconnect => rig.device.set_hotplug(false, DISPLAY),
    }
}

fn disarm(rig: &mut Rig) {
    rig.scaler.faults.clear();
    rig.allocator.fail_at_live = None;
    rig.committer.reject_next = 0;
    rig.ledger.set_fail_dup(false);
    rig.device.set_hotplug(true, DISPLAY);
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every plan the solver produces respects exclusivity, contiguity,
    /// the device budgets, and the overlap depth.
    #[test]
    fn solved_plans_hold_invariants(specs in arb_layers(), caps in arb_caps()) {
        let request = request(&specs, None);
        let plan = Solver::new(caps).solve(&request, DISPLAY);
        prop_assert_eq!(check_plan(&request, &plan, &caps, DISPLAY), Ok(()));
        prop_assert_eq!(plan.compositions().len(), specs.len());
    }

    /// Solving the same request twice gives the same plan.
    #[test]
    fn solving_is_deterministic(specs in arb_layers(), caps in arb_caps()) {
        let request = request(&specs, None);
        let solver = Solver::new(caps);
        prop_assert_eq!(solver.solve(&request, DISPLAY), solver.solve(&request, DISPLAY));
    }

    /// Covering the stack with a software-only layer never moves a layer
    /// onto a plane.
    #[test]
    fn software_layer_on_top_never_adds_planes(
        specs in arb_layers(),
        caps in arb_caps(),
        (x, y) in (-300i32..1300, -300i32..800),
    ) {
        let solver = Solver::new(caps);
        let before = solver.solve(&request(&specs, None), DISPLAY);

        let mut covered = request(&specs, None);
        covered.layers.push(Layer::unscaled(
            Buffer::new(BufferId(99), PixelFormat::Rgb888, 256, 256),
            x,
            y,
        ));
        let after = solver.solve(&covered, DISPLAY);

        let old: HashSet<usize> = before.hardware_layers().collect();
        let new: HashSet<usize> = after.hardware_layers().collect();
        prop_assert!(new.is_subset(&old), "before {:?}, after {:?}", old, new);
    }

    /// Across refreshes with injected failures, every open fence belongs to
    /// the caller or to a scaler ring, nothing is closed twice, and an
    /// unplug leaves nothing behind.
    #[test]
    fn fences_are_always_accounted_for(
        scenes in (arb_layers(), arb_layers()),
        frames in arb_frames(),
        caps in arb_caps(),
    ) {
        let scenes = [scenes.0, scenes.1];
        let mut rig = Rig::new(caps, DISPLAY).unwrap();
        for frame in &frames {
            let mut request = request(&scenes[frame.scene], Some(&rig.ledger));
            request.geometry_changed = frame.geometry_changed;
            if frame.with_target {
                request.layers.push(
                    Layer::framebuffer_target(
                        Buffer::new(BufferId(0xf0), PixelFormat::Rgba8888, 1280, 720),
                        DISPLAY.bounds(),
                    )
                    .with_acquire_fence(rig.ledger.issue()),
                );
            }
            if let Some(mishap) = frame.mishap {
                arm(&mut rig, mishap);
            }

            let out = rig.refresh(request);
            prop_assert_eq!(
                rig.ledger.live(),
                pending_releases(&out) + rig.parked_releases()
            );
            prop_assert_eq!(rig.ledger.report().double_closes, 0);
            prop_assert_eq!(rig.device_faults(), 0);
            if out.status.is_err() {
                // Only a queued conversion can still hold a layer's buffer.
                let converted: HashSet<usize> =
                    out.plan.scaler_bindings().map(|(index, _)| index).collect();
                for (index, release) in out.releases.iter().enumerate() {
                    prop_assert!(release.is_signaled() || converted.contains(&index));
                }
            }
            drop(out);
            prop_assert_eq!(rig.ledger.live(), rig.parked_releases());
            disarm(&mut rig);
        }

        drop(rig.unplug());
        prop_assert!(rig.allocator.live.is_empty());
        prop_assert!(rig.scaler.engines.is_empty());
        prop_assert_eq!(rig.ledger.live(), 0);
        prop_assert!(rig.ledger.report().balances(0));
        prop_assert_eq!(rig.device_faults(), 0);
    }
}
