// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer hardware eligibility.
//!
//! [`classify`] is a pure function of a layer, the device limits, and the
//! display size. It never looks at other layers; budgets shared between
//! layers are the solver's business.

use crate::config::DeviceCaps;
use crate::geometry::{DisplaySize, Rect, clamp_to_i32};
use crate::layer::{Buffer, Layer, LayerKind};

/// How a layer can reach the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eligibility {
    /// Only the software renderer can show it.
    Unsupported(RejectReason),
    /// A plane can scan the buffer out as is.
    DirectPlane,
    /// A plane can show it once a scaler has converted it.
    NeedsConversion,
}

impl Eligibility {
    /// Whether some hardware path exists.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Why a layer was routed to software.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The caller asked for software composition.
    SkipRequested,
    /// No buffer to scan out.
    NoBuffer,
    /// Neither planes nor scalers read the pixel format.
    Format,
    /// Planes cannot perform the blend.
    Blend,
    /// Nothing of the layer lands on the display.
    OffScreen,
    /// The visible part is narrower than one fetch burst.
    TooNarrow,
    /// Conversion is needed but exceeds scaler limits.
    ScalerLimits,
}

/// Which way a scaler feeds its plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalerPath {
    /// Straight into the plane, no intermediate buffer.
    Local,
    /// Through a destination buffer the plane scans out.
    MemoryToMemory,
}

/// Classifies one layer.
///
/// Backgrounds and framebuffer targets always have a plane path.
#[must_use]
pub fn classify(layer: &Layer, caps: &DeviceCaps, display: DisplaySize) -> Eligibility {
    match layer.kind {
        LayerKind::Background(_) | LayerKind::FramebufferTarget => return Eligibility::DirectPlane,
        LayerKind::Buffer => {}
    }
    if layer.skip {
        return Eligibility::Unsupported(RejectReason::SkipRequested);
    }
    let Some(buffer) = layer.buffer else {
        return Eligibility::Unsupported(RejectReason::NoBuffer);
    };
    if !layer.blend.plane_supported() {
        return Eligibility::Unsupported(RejectReason::Blend);
    }
    if is_offscreen(layer, display) {
        return Eligibility::Unsupported(RejectReason::OffScreen);
    }
    let convert = requires_conversion(layer, &buffer);
    if visible_width_bytes(layer, &buffer, display, convert) < caps.min_burst_bytes {
        return Eligibility::Unsupported(RejectReason::TooNarrow);
    }
    if convert {
        if !buffer.format.scaler_supported() {
            return Eligibility::Unsupported(RejectReason::Format);
        }
        let local = caps.local_path && scaler_supports(layer, &buffer, caps, display, ScalerPath::Local);
        if local || scaler_supports(layer, &buffer, caps, display, ScalerPath::MemoryToMemory) {
            Eligibility::NeedsConversion
        } else {
            Eligibility::Unsupported(RejectReason::ScalerLimits)
        }
    } else if buffer.format.plane_supported() {
        Eligibility::DirectPlane
    } else {
        Eligibility::Unsupported(RejectReason::Format)
    }
}

/// The path a conversion layer should take: local when it qualifies.
#[must_use]
pub fn preferred_path(layer: &Layer, caps: &DeviceCaps, display: DisplaySize) -> ScalerPath {
    match layer.buffer {
        Some(buffer)
            if caps.local_path
                && scaler_supports(layer, &buffer, caps, display, ScalerPath::Local) =>
        {
            ScalerPath::Local
        }
        _ => ScalerPath::MemoryToMemory,
    }
}

/// Whether the layer cannot be scanned out without a scaler.
#[must_use]
pub fn requires_conversion(layer: &Layer, buffer: &Buffer) -> bool {
    buffer.format.requires_conversion()
        || is_scaled(layer)
        || !layer.transform.is_identity()
        || !is_x_aligned(layer.display_frame, buffer.format.bits_per_pixel())
}

fn is_scaled(layer: &Layer) -> bool {
    let frame = layer.display_frame;
    let crop = layer.source_crop;
    crop.width() != f64::from(frame.width()) || crop.height() != f64::from(frame.height())
}

/// Planes fetch whole 32-bit words: a 16-bit layer must start and end on
/// even pixels.
fn is_x_aligned(frame: Rect, bpp: u32) -> bool {
    let align = 32 / bpp.max(1);
    if align <= 1 {
        return true;
    }
    let align = clamp_to_i32(align);
    frame.left.rem_euclid(align) == 0 && frame.right.rem_euclid(align) == 0
}

fn is_offscreen(layer: &Layer, display: DisplaySize) -> bool {
    let w = f64::from(display.width);
    let h = f64::from(display.height);
    let crop = layer.source_crop;
    let crop_off = crop.x0 > w || crop.x1 < 0.0 || crop.y0 > h || crop.y1 < 0.0;
    crop_off || !layer.display_frame.normalized().intersects(display.bounds())
}

/// Bytes per line the plane actually fetches.
fn visible_width_bytes(layer: &Layer, buffer: &Buffer, display: DisplaySize, convert: bool) -> u32 {
    let bpp = if convert { 32 } else { buffer.format.bits_per_pixel() };
    let frame = layer.display_frame.normalized();
    let left = frame.left.max(0);
    let right = frame.right.min(clamp_to_i32(display.width));
    let visible = u32::try_from(right - left).unwrap_or(0);
    visible.saturating_mul(bpp) / 8
}

/// Rounds a destination width up to `align` and scales the height to keep
/// the aspect ratio. Returns the new size and where the original image sits
/// inside it.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded aspect-scaled height stays within the u32 input range"
)]
pub fn align_crop_and_center(width: u32, height: u32, align: u32) -> (u32, u32, Rect) {
    if width == 0 || align == 0 {
        return (width, height, Rect::from_xywh(0, 0, clamp_to_i32(width), clamp_to_i32(height)));
    }
    let aspect = f64::from(height) / f64::from(width);
    let w = width.next_multiple_of(align);
    // Round half up; both factors are non-negative.
    let h = (aspect * f64::from(w) + 0.5) as u32;
    let left = clamp_to_i32((w - width) / 2);
    let top = clamp_to_i32(h.saturating_sub(height) / 2);
    let crop = Rect::from_xywh(left, top, clamp_to_i32(width), clamp_to_i32(height));
    (w, h, crop)
}

/// Destination size in the scaler's rotated frame, after the protected
/// content alignment.
fn scaler_dest_size(layer: &Layer, buffer: &Buffer, caps: &DeviceCaps) -> (u32, u32) {
    let frame = layer.display_frame.normalized();
    let (mut w, mut h) = if layer.transform.swaps_axes() {
        (frame.height(), frame.width())
    } else {
        (frame.width(), frame.height())
    };
    if buffer.protected {
        (w, h, _) = align_crop_and_center(w, h, caps.dst_crop_align);
    }
    (w, h)
}

/// Whether a scaler on `path` can take this layer.
#[must_use]
pub fn scaler_supports(
    layer: &Layer,
    buffer: &Buffer,
    caps: &DeviceCaps,
    display: DisplaySize,
    path: ScalerPath,
) -> bool {
    if !buffer.format.scaler_supported() {
        return false;
    }
    let rotated = layer.transform.swaps_axes();
    let (max_w, max_h) = if rotated {
        caps.max_source_rotated
    } else {
        caps.max_source
    };
    let (dest_w, dest_h) = scaler_dest_size(layer, buffer, caps);
    let src_w = layer.source_crop.width();
    let src_h = layer.source_crop.height();
    let max_down = match path {
        ScalerPath::Local => DeviceCaps::local_max_downscale(display),
        ScalerPath::MemoryToMemory => caps.max_downscale,
    };
    let scale_ok = src_w <= f64::from(dest_w) * f64::from(max_down)
        && f64::from(dest_w) <= src_w * f64::from(caps.max_upscale)
        && src_h <= f64::from(dest_h) * f64::from(max_down)
        && f64::from(dest_h) <= src_h * f64::from(caps.max_upscale);
    let size_ok = buffer.stride <= max_w && buffer.vstride <= max_h;
    if !(scale_ok && size_ok) {
        return false;
    }

    match path {
        ScalerPath::Local => {
            !rotated
                && display.bounds().contains_rect(layer.display_frame.normalized())
                && !buffer.protected
                && buffer.format.local_path_supported()
                && dest_w % 2 == 0
                && dest_h % 2 == 0
        }
        ScalerPath::MemoryToMemory => {
            let (align_w, align_h) = caps.source_stride_align;
            let crop = Rect::from_kurbo(layer.source_crop);
            dest_w % caps.dst_crop_align.max(1) == 0
                && buffer.stride % align_w.max(1) == 0
                && buffer.vstride % align_h.max(1) == 0
                && (!rotated || (crop.left % 2 == 0 && crop.top % 2 == 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{BlendMode, BufferId, Color, PixelFormat, Rotation, Transform};

    const DISPLAY: DisplaySize = DisplaySize::new(1280, 720);

    fn caps() -> DeviceCaps {
        DeviceCaps::single_scaler()
    }

    fn rgba(w: u32, h: u32) -> Buffer {
        Buffer::new(BufferId(1), PixelFormat::Rgba8888, w, h)
    }

    #[test]
    fn exact_size_rgba_is_direct() {
        let layer = Layer::unscaled(rgba(640, 480), 0, 0);
        assert_eq!(classify(&layer, &caps(), DISPLAY), Eligibility::DirectPlane);
    }

    #[test]
    fn background_is_always_direct() {
        let layer = Layer::background(Color::BLACK);
        assert_eq!(classify(&layer, &caps(), DISPLAY), Eligibility::DirectPlane);
    }

    #[test]
    fn skip_flag_wins() {
        let layer = Layer::unscaled(rgba(640, 480), 0, 0).with_skip(true);
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::SkipRequested)
        );
    }

    #[test]
    fn unknown_blend_rejected() {
        let layer = Layer::unscaled(rgba(640, 480), 0, 0).with_blend(BlendMode::Other(7));
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::Blend)
        );
    }

    #[test]
    fn offscreen_rejected() {
        let buf = Buffer::new(BufferId(3), PixelFormat::Rgb565, 200, 200);
        let layer = Layer::unscaled(buf, 2000, 2000);
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::OffScreen)
        );
    }

    #[test]
    fn narrow_sliver_rejected() {
        // 16 px * 4 bytes = 64 bytes < 128-byte burst.
        let layer = Layer::unscaled(rgba(16, 400), 0, 0);
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::TooNarrow)
        );
    }

    #[test]
    fn sliver_measured_after_clipping() {
        // 100 px wide but only 20 px remain on screen.
        let layer = Layer::unscaled(rgba(100, 100), 1260, 0);
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::TooNarrow)
        );
    }

    #[test]
    fn packed_rgb888_unsupported() {
        let buf = Buffer::new(BufferId(4), PixelFormat::Rgb888, 256, 256);
        let layer = Layer::unscaled(buf, 0, 0);
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::Format)
        );
    }

    #[test]
    fn rotated_yuv_needs_m2m() {
        let buf = Buffer::new(BufferId(5), PixelFormat::Nv12, 320, 160);
        let layer = Layer::buffer(
            buf,
            kurbo::Rect::new(0.0, 0.0, 320.0, 160.0),
            Rect::from_xywh(0, 0, 320, 640),
        )
        .with_transform(Transform::rotate(Rotation::Deg90));
        assert_eq!(classify(&layer, &caps(), DISPLAY), Eligibility::NeedsConversion);
        assert_eq!(preferred_path(&layer, &caps(), DISPLAY), ScalerPath::MemoryToMemory);
    }

    #[test]
    fn on_screen_yuv_prefers_local() {
        let buf = Buffer::new(BufferId(6), PixelFormat::Nv12, 640, 360);
        let layer = Layer::buffer(
            buf,
            kurbo::Rect::new(0.0, 0.0, 640.0, 360.0),
            Rect::from_xywh(0, 0, 1280, 720),
        );
        assert_eq!(classify(&layer, &caps(), DISPLAY), Eligibility::NeedsConversion);
        assert_eq!(preferred_path(&layer, &caps(), DISPLAY), ScalerPath::Local);
    }

    #[test]
    fn protected_yuv_avoids_local() {
        let buf = Buffer::new(BufferId(7), PixelFormat::Nv12, 640, 360).protected();
        let layer = Layer::buffer(
            buf,
            kurbo::Rect::new(0.0, 0.0, 640.0, 360.0),
            Rect::from_xywh(0, 0, 1280, 720),
        );
        assert_eq!(preferred_path(&layer, &caps(), DISPLAY), ScalerPath::MemoryToMemory);
    }

    #[test]
    fn excessive_upscale_rejected() {
        let buf = Buffer::new(BufferId(8), PixelFormat::Nv12, 64, 64);
        let layer = Layer::buffer(
            buf,
            kurbo::Rect::new(0.0, 0.0, 64.0, 64.0),
            Rect::from_xywh(0, 0, 640, 640),
        );
        assert_eq!(
            classify(&layer, &caps(), DISPLAY),
            Eligibility::Unsupported(RejectReason::ScalerLimits)
        );
    }

    #[test]
    fn odd_aligned_rgb565_needs_conversion() {
        let buf = Buffer::new(BufferId(9), PixelFormat::Rgb565, 320, 96);
        let layer = Layer::unscaled(buf, 1, 0);
        assert_eq!(classify(&layer, &caps(), DISPLAY), Eligibility::NeedsConversion);
    }

    #[test]
    fn align_crop_and_center_keeps_aspect() {
        let (w, h, crop) = align_crop_and_center(100, 50, 32);
        assert_eq!(w, 128);
        assert_eq!(h, 64);
        assert_eq!(crop, Rect::from_xywh(14, 7, 100, 50));
    }
}
