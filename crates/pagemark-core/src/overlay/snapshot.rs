//! Encoded, at-rest form of an overlay surface.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::{OverlaySurface, PixelSize};

/// Overlay codec errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error("PNG decoding failed: {0}")]
    Decode(String),
    #[error("Snapshot is {found:?} but the surface is {expected:?}")]
    SizeMismatch { expected: PixelSize, found: PixelSize },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// A lossless PNG encoding of one page's overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub size: PixelSize,
    /// PNG bytes, base64-encoded when serialized.
    #[serde(with = "base64_bytes")]
    png: Vec<u8>,
}

impl Snapshot {
    /// Encode the surface as 8-bit RGBA PNG.
    pub fn encode(surface: &OverlaySurface) -> SnapshotResult<Self> {
        let size = surface.size();
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, size.width, size.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| SnapshotError::Encode(e.to_string()))?;
            writer
                .write_image_data(surface.image().as_raw())
                .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        }
        Ok(Self { size, png: png_data })
    }

    /// Wrap PNG bytes produced elsewhere. The image is decoded once to learn
    /// and validate its size.
    pub fn from_png(png: Vec<u8>) -> SnapshotResult<Self> {
        let image = decode_png(&png)?;
        Ok(Self {
            size: PixelSize::new(image.width(), image.height()),
            png,
        })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Decode into straight-alpha RGBA pixels.
    pub fn decode(&self) -> SnapshotResult<RgbaImage> {
        let image = decode_png(&self.png)?;
        let found = PixelSize::new(image.width(), image.height());
        if found != self.size {
            return Err(SnapshotError::SizeMismatch {
                expected: self.size,
                found,
            });
        }
        Ok(image)
    }

    /// Paint the decoded snapshot onto `surface`, replacing its content.
    pub fn restore_into(&self, surface: &mut OverlaySurface) -> SnapshotResult<()> {
        if surface.size() != self.size {
            return Err(SnapshotError::SizeMismatch {
                expected: surface.size(),
                found: self.size,
            });
        }
        let image = self.decode()?;
        surface.copy_from(&image);
        Ok(())
    }
}

fn decode_png(bytes: &[u8]) -> SnapshotResult<RgbaImage> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(image.to_rgba8())
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{SerializableColor, ToolState, draw_segment};
    use kurbo::Point;

    fn drawn_surface() -> OverlaySurface {
        let mut surface = OverlaySurface::new(PixelSize::new(40, 30));
        let tool = ToolState::marker(SerializableColor::new(10, 200, 30, 180), 5.0);
        draw_segment(&mut surface, Point::new(3.0, 3.0), Point::new(35.0, 25.0), &tool);
        surface
    }

    #[test]
    fn test_encode_restore_is_lossless() {
        let original = drawn_surface();
        let snapshot = Snapshot::encode(&original).unwrap();

        let mut restored = OverlaySurface::new(original.size());
        snapshot.restore_into(&mut restored).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_restore_rejects_mismatched_surface() {
        let snapshot = Snapshot::encode(&drawn_surface()).unwrap();
        let mut other = OverlaySurface::new(PixelSize::new(41, 30));

        let result = snapshot.restore_into(&mut other);
        assert!(matches!(result, Err(SnapshotError::SizeMismatch { .. })));
        assert!(other.is_blank());
    }

    #[test]
    fn test_from_png_rejects_garbage() {
        let result = Snapshot::from_png(b"not a png".to_vec());
        assert!(matches!(result, Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn test_json_uses_base64() {
        let snapshot = Snapshot::encode(&drawn_surface()).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"png\":\"iVBOR"));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
