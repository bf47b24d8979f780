use crate::foundation::core::MAX_CANVAS_DIM;
use crate::foundation::error::{LiveryError, LiveryResult};

/// Pixel size used to rasterize an SVG logo at its intrinsic size.
///
/// Logos are composited like any other bitmap, so they are rasterized once at their declared
/// size; layers that scale up far beyond it should ship a larger `viewBox`.
pub fn svg_intrinsic_size(tree: &usvg::Tree) -> LiveryResult<(u32, u32)> {
    fn to_px(v: f32) -> LiveryResult<u32> {
        if !v.is_finite() || v <= 0.0 {
            return Err(LiveryError::decode("svg has invalid width/height"));
        }
        Ok((v.ceil() as u32).max(1))
    }

    let size = tree.size();
    let w = to_px(size.width())?;
    let h = to_px(size.height())?;
    if w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
        return Err(LiveryError::decode(format!(
            "svg raster size too large: {w}x{h} (max {MAX_CANVAS_DIM}x{MAX_CANVAS_DIM})"
        )));
    }
    Ok((w, h))
}

/// Render `tree` into a premultiplied RGBA8 buffer of `width x height`.
pub fn rasterize_svg_to_premul_rgba8(
    tree: &usvg::Tree,
    width: u32,
    height: u32,
) -> LiveryResult<Vec<u8>> {
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| LiveryError::decode("failed to allocate svg pixmap"))?;

    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);

    resvg::render(tree, xform, &mut pixmap.as_mut());
    Ok(pixmap.data().to_vec())
}
