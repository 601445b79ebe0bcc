// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layers and composition requests.
//!
//! A [`CompositionRequest`] is the per-refresh input: layers in z-order
//! (bottom first) plus a flag telling the scheduler that geometry changed
//! since the previous refresh. Layers own their acquire fences; the
//! compositor consumes the request and hands back one release per layer.

use alloc::vec::Vec;

use crate::fence::Fence;
use crate::geometry::Rect;

/// Pixel layouts a layer buffer may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGBA.
    Rgba8888,
    /// 32-bit RGB with ignored alpha.
    Rgbx8888,
    /// 32-bit BGRA.
    Bgra8888,
    /// 32-bit BGR with ignored alpha.
    Bgrx8888,
    /// Packed 24-bit RGB.
    Rgb888,
    /// 16-bit RGB.
    Rgb565,
    /// 16-bit RGBA with one alpha bit.
    Rgba5551,
    /// Planar YUV 4:2:0, V before U.
    Yv12,
    /// Semi-planar YUV 4:2:0, interleaved CbCr.
    Nv12,
    /// Semi-planar YUV 4:2:0, interleaved CrCb.
    Nv21,
    /// Semi-planar YUV 4:2:0 in the decoder's macroblock-tiled layout.
    Nv12Tiled,
}

impl PixelFormat {
    /// Bits per pixel of the (luma) plane.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rgbx8888 | Self::Bgra8888 | Self::Bgrx8888 => 32,
            Self::Rgb888 => 24,
            Self::Rgb565 | Self::Rgba5551 => 16,
            Self::Yv12 | Self::Nv12 | Self::Nv21 | Self::Nv12Tiled => 12,
        }
    }

    /// Whether this is an RGB layout.
    #[must_use]
    pub const fn is_rgb(self) -> bool {
        !self.is_yuv()
    }

    /// Whether this is a YUV layout.
    #[must_use]
    pub const fn is_yuv(self) -> bool {
        matches!(self, Self::Yv12 | Self::Nv12 | Self::Nv21 | Self::Nv12Tiled)
    }

    /// Whether a plane can scan this format out directly.
    #[must_use]
    pub const fn plane_supported(self) -> bool {
        matches!(
            self,
            Self::Rgba8888
                | Self::Rgbx8888
                | Self::Bgra8888
                | Self::Bgrx8888
                | Self::Rgb565
                | Self::Rgba5551
        )
    }

    /// Whether a scaler accepts this format as input.
    #[must_use]
    pub const fn scaler_supported(self) -> bool {
        matches!(
            self,
            Self::Rgbx8888 | Self::Rgb565 | Self::Yv12 | Self::Nv12 | Self::Nv21 | Self::Nv12Tiled
        )
    }

    /// Whether showing this format on a plane always takes a scaler.
    #[must_use]
    pub const fn requires_conversion(self) -> bool {
        self.scaler_supported() && !matches!(self, Self::Rgbx8888 | Self::Rgb565)
    }

    /// Whether a scaler can feed a plane from this format without an
    /// intermediate buffer.
    #[must_use]
    pub const fn local_path_supported(self) -> bool {
        matches!(self, Self::Yv12 | Self::Nv12 | Self::Nv12Tiled)
    }
}

/// Quarter-turn rotation applied before display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90° clockwise.
    Deg90,
    /// 180°.
    Deg180,
    /// 270° clockwise.
    Deg270,
}

/// Rotation combined with optional mirroring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Transform {
    /// Rotation.
    pub rotation: Rotation,
    /// Mirror horizontally.
    pub flip_h: bool,
    /// Mirror vertically.
    pub flip_v: bool,
}

impl Transform {
    /// No rotation, no mirroring.
    pub const IDENTITY: Self = Self {
        rotation: Rotation::None,
        flip_h: false,
        flip_v: false,
    };

    /// Pure rotation.
    #[must_use]
    pub const fn rotate(rotation: Rotation) -> Self {
        Self {
            rotation,
            flip_h: false,
            flip_v: false,
        }
    }

    /// Whether the transform leaves pixels where they are.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self.rotation, Rotation::None) && !self.flip_h && !self.flip_v
    }

    /// Whether width and height trade places.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self.rotation, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// How a layer is blended with what lies beneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Opaque copy.
    #[default]
    None,
    /// Source is alpha-premultiplied.
    Premultiplied,
    /// Source is multiplied by its alpha while blending.
    Coverage,
    /// A mode planes cannot express, identified by the caller's raw value.
    Other(u32),
}

impl BlendMode {
    /// Whether a plane can perform this blend.
    #[must_use]
    pub const fn plane_supported(self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// An 8-bit-per-channel colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgba(0, 0, 0, 0xff);

    /// Creates a colour from its components.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Opaque identity of a graphics buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl core::fmt::Debug for BufferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BufferId({:#x})", self.0)
    }
}

/// Description of a graphics buffer a layer samples from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Buffer {
    /// Identity; equal ids mean equal contents for static-layer detection.
    pub id: BufferId,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Allocated width in pixels.
    pub width: u32,
    /// Allocated height in pixels.
    pub height: u32,
    /// Row pitch in pixels.
    pub stride: u32,
    /// Allocated rows, including padding.
    pub vstride: u32,
    /// Contents must never reach unprotected memory.
    pub protected: bool,
}

impl Buffer {
    /// Unpadded, unprotected buffer.
    #[must_use]
    pub const fn new(id: BufferId, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            id,
            format,
            width,
            height,
            stride: width,
            vstride: height,
            protected: false,
        }
    }

    /// Marks the buffer as protected.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Overrides the pitches.
    #[must_use]
    pub const fn with_strides(mut self, stride: u32, vstride: u32) -> Self {
        self.stride = stride;
        self.vstride = vstride;
        self
    }
}

/// What a layer contributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    /// Content sampled from the layer's buffer.
    Buffer,
    /// A solid colour filling the display.
    Background(Color),
    /// The buffer the software renderer composes fallback layers into.
    FramebufferTarget,
}

/// One surface of a composition request.
#[derive(Debug)]
pub struct Layer {
    /// What the layer contributes.
    pub kind: LayerKind,
    /// The buffer sampled; absent for backgrounds.
    pub buffer: Option<Buffer>,
    /// Region of the buffer shown, in buffer pixels.
    pub source_crop: kurbo::Rect,
    /// Where the crop lands on the display.
    pub display_frame: Rect,
    /// Rotation and mirroring.
    pub transform: Transform,
    /// Blending with lower layers.
    pub blend: BlendMode,
    /// The caller insists on software composition.
    pub skip: bool,
    /// Signals when the buffer contents are ready.
    pub acquire_fence: Option<Fence>,
}

impl Layer {
    /// A buffer layer showing `crop` of `buffer` at `frame`.
    #[must_use]
    pub fn buffer(buffer: Buffer, crop: kurbo::Rect, frame: Rect) -> Self {
        Self {
            kind: LayerKind::Buffer,
            buffer: Some(buffer),
            source_crop: crop,
            display_frame: frame,
            transform: Transform::IDENTITY,
            blend: BlendMode::None,
            skip: false,
            acquire_fence: None,
        }
    }

    /// A buffer layer shown unscaled at `(x, y)`.
    #[must_use]
    pub fn unscaled(buffer: Buffer, x: i32, y: i32) -> Self {
        let w = f64::from(buffer.width);
        let h = f64::from(buffer.height);
        let frame = Rect::from_xywh(
            x,
            y,
            crate::geometry::clamp_to_i32(buffer.width),
            crate::geometry::clamp_to_i32(buffer.height),
        );
        Self::buffer(buffer, kurbo::Rect::new(0.0, 0.0, w, h), frame)
    }

    /// A solid colour covering the display.
    #[must_use]
    pub fn background(color: Color) -> Self {
        Self {
            kind: LayerKind::Background(color),
            buffer: None,
            source_crop: kurbo::Rect::ZERO,
            display_frame: Rect::ZERO,
            transform: Transform::IDENTITY,
            blend: BlendMode::None,
            skip: false,
            acquire_fence: None,
        }
    }

    /// The software renderer's output buffer, shown at `frame`.
    #[must_use]
    pub fn framebuffer_target(buffer: Buffer, frame: Rect) -> Self {
        Self {
            kind: LayerKind::FramebufferTarget,
            blend: BlendMode::Premultiplied,
            ..Self::unscaled(buffer, frame.left, frame.top)
        }
    }

    /// Sets the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Sets the blend mode.
    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Forces software composition.
    #[must_use]
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Attaches the acquire fence.
    #[must_use]
    pub fn with_acquire_fence(mut self, fence: Fence) -> Self {
        self.acquire_fence = Some(fence);
        self
    }

    /// The buffer identity, if the layer samples one.
    #[must_use]
    pub fn handle(&self) -> Option<BufferId> {
        self.buffer.map(|b| b.id)
    }

    /// Whether this is an ordinary buffer layer.
    #[must_use]
    pub const fn is_buffer(&self) -> bool {
        matches!(self.kind, LayerKind::Buffer)
    }
}

/// One refresh worth of layers for a display.
#[derive(Debug, Default)]
pub struct CompositionRequest {
    /// Layers bottom to top.
    pub layers: Vec<Layer>,
    /// Geometry changed since the previous refresh.
    pub geometry_changed: bool,
}

impl CompositionRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(layers: Vec<Layer>, geometry_changed: bool) -> Self {
        Self {
            layers,
            geometry_changed,
        }
    }

    /// Index of the framebuffer target, if supplied.
    #[must_use]
    pub fn framebuffer_target(&self) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| matches!(l.kind, LayerKind::FramebufferTarget))
    }
}
