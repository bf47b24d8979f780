use std::io::Cursor;

use crate::assets::svg_raster::{rasterize_svg_to_premul_rgba8, svg_intrinsic_size};
use crate::foundation::core::{Bitmap, MAX_CANVAS_DIM};
use crate::foundation::error::{LiveryError, LiveryResult};

/// Decode encoded image bytes (any raster format `image` knows, or SVG) into a premultiplied
/// bitmap.
pub fn decode_image(bytes: &[u8]) -> LiveryResult<Bitmap> {
    if looks_like_svg(bytes) {
        return decode_svg(bytes);
    }

    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| LiveryError::decode(format!("decode image from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(LiveryError::decode(format!(
            "image {width}x{height} exceeds {MAX_CANVAS_DIM}x{MAX_CANVAS_DIM}"
        )));
    }
    Bitmap::from_straight(width, height, rgba.into_raw())
}

/// Parse SVG bytes and rasterize them at intrinsic size.
pub fn decode_svg(bytes: &[u8]) -> LiveryResult<Bitmap> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts)
        .map_err(|e| LiveryError::decode(format!("parse svg tree: {e}")))?;
    let (width, height) = svg_intrinsic_size(&tree)?;
    let premul = rasterize_svg_to_premul_rgba8(&tree, width, height)?;
    Bitmap::from_premul(width, height, premul)
}

/// Encode a bitmap as an sRGB PNG with straight alpha.
pub fn encode_png(bitmap: &Bitmap) -> LiveryResult<Vec<u8>> {
    let img = image::RgbaImage::from_raw(bitmap.width, bitmap.height, bitmap.to_straight_rgba())
        .ok_or_else(|| LiveryError::validation("bitmap buffer does not match its dimensions"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| anyhow::anyhow!("encode png: {e}"))?;
    Ok(buf)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let Ok(text) = std::str::from_utf8(head) else {
        // A multi-byte char may straddle the cut; fall back to a lossy check.
        return String::from_utf8_lossy(head).contains("<svg");
    };
    let t = text.trim_start_matches('\u{feff}').trim_start();
    t.starts_with("<svg") || (t.starts_with("<?xml") && t.contains("<svg"))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
