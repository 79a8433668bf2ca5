//! Raster overlay surface.

use image::{Rgba, RgbaImage};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::tools::SerializableColor;

/// Pixel dimensions of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of a page of `width` x `height` points rendered at `scale`.
    ///
    /// Never returns a zero dimension.
    pub fn from_points(width: f64, height: f64, scale: f64) -> Self {
        Self {
            width: ((width * scale).round() as u32).max(1),
            height: ((height * scale).round() as u32).max(1),
        }
    }
}

/// Compositing rule applied where a stroke covers the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    /// Paint the color on top of existing content ("source-over").
    SourceOver(SerializableColor),
    /// Remove existing content ("destination-out").
    DestinationOut,
}

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A transparent RGBA layer aligned pixel-for-pixel with a rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySurface {
    pixels: RgbaImage,
}

impl OverlaySurface {
    /// Create a fully transparent surface.
    pub fn new(size: PixelSize) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(size.width, size.height, TRANSPARENT),
        }
    }

    /// Wrap existing RGBA pixels.
    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.pixels.width(), self.pixels.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.pixels.width() && y < self.pixels.height() {
            Some(self.pixels.get_pixel(x, y).0)
        } else {
            None
        }
    }

    /// True when nothing visible is drawn on the surface.
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[3] == 0)
    }

    /// Number of pixels with non-zero alpha.
    pub fn painted_pixels(&self) -> usize {
        self.pixels.pixels().filter(|p| p.0[3] != 0).count()
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Replace the surface content with `other`, which must have the same size.
    pub fn copy_from(&mut self, other: &RgbaImage) -> bool {
        if other.dimensions() != self.pixels.dimensions() {
            return false;
        }
        self.pixels.copy_from_slice(other.as_raw());
        true
    }

    /// Apply `blend` to every pixel whose center lies within `width / 2` of the
    /// segment `from`-`to`.
    ///
    /// Coverage is hard-edged and the ends are round, so a chain of segments
    /// sharing endpoints renders with round caps and joins.
    pub fn stroke_segment(&mut self, from: Point, to: Point, width: f64, blend: Blend) {
        let radius = (width / 2.0).max(0.5);
        let bounds = Rect::from_points(from, to).inflate(radius, radius);
        let (w, h) = self.pixels.dimensions();

        let x0 = bounds.x0.floor().max(0.0) as u32;
        let y0 = bounds.y0.floor().max(0.0) as u32;
        let x1 = (bounds.x1.ceil().max(0.0) as u32).min(w);
        let y1 = (bounds.y1.ceil().max(0.0) as u32).min(h);

        let radius_sq = radius * radius;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if distance_sq_to_segment(center, from, to) <= radius_sq {
                    let pixel = self.pixels.get_pixel_mut(x, y);
                    *pixel = apply_blend(*pixel, blend);
                }
            }
        }
    }
}

/// Squared distance from `point` to the segment `start`-`end`.
fn distance_sq_to_segment(point: Point, start: Point, end: Point) -> f64 {
    let line_vec: Vec2 = end - start;
    let point_vec: Vec2 = point - start;

    let line_len_sq = line_vec.hypot2();
    if line_len_sq < f64::EPSILON {
        return point_vec.hypot2();
    }

    let t = (point_vec.dot(line_vec) / line_len_sq).clamp(0.0, 1.0);
    let projection = start + line_vec * t;
    (point - projection).hypot2()
}

fn apply_blend(dst: Rgba<u8>, blend: Blend) -> Rgba<u8> {
    match blend {
        Blend::DestinationOut => TRANSPARENT,
        Blend::SourceOver(color) => source_over(dst, color),
    }
}

/// Straight-alpha source-over.
fn source_over(dst: Rgba<u8>, src: SerializableColor) -> Rgba<u8> {
    let sa = src.a as f32 / 255.0;
    if sa >= 1.0 {
        return Rgba([src.r, src.g, src.b, 255]);
    }
    if sa <= 0.0 {
        return dst;
    }

    let [dr, dg, db, da] = dst.0;
    let da = da as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| -> u8 {
        let v = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(src.r, dr),
        channel(src.g, dg),
        channel(src.b, db),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
