use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{LiveryError, LiveryResult};
use crate::foundation::math::{premultiply_rgba8_in_place, unpremultiply_rgba8_in_place};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Largest canvas edge the CPU rasterizer accepts.
pub const MAX_CANVAS_DIM: u32 = u16::MAX as u32;

/// Canonical raster dimensions of a slot in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CanvasSize {
    /// Create a validated canvas size.
    pub fn new(width: u32, height: u32) -> LiveryResult<Self> {
        if width == 0 || height == 0 {
            return Err(LiveryError::validation("canvas dimensions must be > 0"));
        }
        if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
            return Err(LiveryError::validation(format!(
                "canvas {width}x{height} exceeds {MAX_CANVAS_DIM}x{MAX_CANVAS_DIM}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Canonical size for a slot: `(base, base / aspect_ratio)`, height rounded and at least 1.
    pub fn for_aspect(base_size: u32, aspect_ratio: f64) -> LiveryResult<Self> {
        if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
            return Err(LiveryError::validation(
                "aspect ratio must be finite and > 0",
            ));
        }
        let height = (f64::from(base_size) / aspect_ratio).round().max(1.0);
        if height > f64::from(MAX_CANVAS_DIM) {
            return Err(LiveryError::validation(format!(
                "aspect ratio {aspect_ratio} yields a canvas taller than {MAX_CANVAS_DIM}"
            )));
        }
        Self::new(base_size, height as u32)
    }

    /// Number of bytes of a tightly packed RGBA8 buffer of this size.
    pub fn rgba8_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }

    /// Center of the canvas in canonical pixel space.
    pub fn center(self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

/// Color space tag carried by texture frames handed to the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorSpace {
    /// sRGB-encoded 8-bit channels.
    #[default]
    Srgb,
}

/// An opaque sRGB color as supplied by the palette collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Construct from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (leading `#` optional, case-insensitive).
    pub fn from_hex(s: &str) -> LiveryResult<Self> {
        parse_hex(s).map_err(LiveryError::validation)
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Fully opaque premultiplied RGBA8 (opaque, so identical to straight).
    pub fn to_rgba8(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl Serialize for Rgb8 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb8 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Obj { r: u8, g: u8, b: u8 },
            Arr(Vec<u8>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => parse_hex(&s).map_err(serde::de::Error::custom),
            Repr::Obj { r, g, b } => Ok(Self::new(r, g, b)),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self::new(*r, *g, *b)),
                _ => Err(serde::de::Error::custom("rgb array must have len 3")),
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<Rgb8, String> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);
    if s.len() != 6 || !s.is_ascii() {
        return Err(format!("color \"{s}\" must be #RRGGBB"));
    }

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    Ok(Rgb8::new(
        hex_byte(&s[0..2])?,
        hex_byte(&s[2..4])?,
        hex_byte(&s[4..6])?,
    ))
}

/// Decoded raster image in premultiplied RGBA8 form.
///
/// Pixel storage is shared: cloning a bitmap is cheap and pass-through processing hands out the
/// same buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl Bitmap {
    /// Wrap premultiplied bytes, checking the buffer length.
    pub fn from_premul(width: u32, height: u32, rgba8_premul: Vec<u8>) -> LiveryResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| LiveryError::decode("bitmap size overflow"))?;
        if rgba8_premul.len() != expected {
            return Err(LiveryError::decode(format!(
                "bitmap byte len {} does not match {width}x{height}",
                rgba8_premul.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        })
    }

    /// Premultiply straight-alpha bytes and wrap them.
    pub fn from_straight(width: u32, height: u32, mut rgba8: Vec<u8>) -> LiveryResult<Self> {
        premultiply_rgba8_in_place(&mut rgba8);
        Self::from_premul(width, height, rgba8)
    }

    /// Fully transparent bitmap.
    pub fn transparent(size: CanvasSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            rgba8_premul: Arc::new(vec![0u8; size.rgba8_len()]),
        }
    }

    /// Dimensions as a [`CanvasSize`] (unvalidated).
    pub fn size(&self) -> CanvasSize {
        CanvasSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Premultiplied pixel at `(x, y)`, or `None` outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.rgba8_premul.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy out straight-alpha RGBA8 bytes, e.g. for PNG export.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.rgba8_premul.as_ref().clone();
        unpremultiply_rgba8_in_place(&mut out);
        out
    }

    /// Return `true` when both bitmaps share the same pixel storage.
    pub fn shares_pixels_with(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.rgba8_premul, &other.rgba8_premul)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
