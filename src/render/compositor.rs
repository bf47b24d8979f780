use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::effects::composite::{composite_in_place, fill_in_place};
use crate::effects::gradient;
use crate::foundation::core::{Affine, Bitmap, CanvasSize, MAX_CANVAS_DIM};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::render::fingerprint::fingerprint_gradient;
use crate::render::texture::TextureFrame;
use crate::scene::model::{BlendMode, GradientSettings};
use crate::slots::store::SlotSnapshot;

const GRADIENT_CACHE_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GradientKey {
    fingerprint: u64,
    width: u32,
    height: u32,
}

/// Rasterizes slot snapshots into texture frames on the CPU.
///
/// Draw order: background fill, gradient (with its opacity and blend mode), then layers by
/// `z_index` with insertion order breaking ties. Layers without a ready bitmap are skipped.
/// Identical snapshots produce identical bytes.
#[derive(Debug, Default)]
pub struct Compositor {
    gradient_cache: Mutex<HashMap<GradientKey, Bitmap>>,
}

impl Compositor {
    /// Compositor with an empty gradient cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<GradientKey, Bitmap>> {
        self.gradient_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Composite one slot.
    #[tracing::instrument(level = "debug", skip(self, snapshot), fields(slot = %snapshot.name, revision = snapshot.revision))]
    pub fn composite(&self, snapshot: &SlotSnapshot) -> LiveryResult<TextureFrame> {
        let canvas = snapshot.canvas;
        let mut buf = vec![0u8; canvas.rgba8_len()];

        if let Some(bg) = snapshot.background {
            fill_in_place(&mut buf, bg.to_rgba8());
        }

        if let Some(g) = snapshot.gradient.as_ref().filter(|g| g.enabled) {
            let raster = self.gradient_raster(g, canvas)?;
            composite_in_place(&mut buf, &raster.rgba8_premul, g.opacity as f32, g.blend_mode)?;
        }

        self.draw_layers(snapshot, &mut buf)?;

        Ok(TextureFrame::srgb(Bitmap::from_premul(
            canvas.width,
            canvas.height,
            buf,
        )?))
    }

    fn gradient_raster(&self, g: &GradientSettings, canvas: CanvasSize) -> LiveryResult<Bitmap> {
        let key = GradientKey {
            fingerprint: fingerprint_gradient(g),
            width: canvas.width,
            height: canvas.height,
        };
        if let Some(hit) = self.cache().get(&key).cloned() {
            return Ok(hit);
        }
        let raster = gradient::rasterize(g, canvas)?;
        let mut cache = self.cache();
        if cache.len() >= GRADIENT_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(key, raster.clone());
        Ok(raster)
    }

    fn draw_layers(&self, snapshot: &SlotSnapshot, buf: &mut [u8]) -> LiveryResult<()> {
        let drawable = snapshot
            .layers
            .iter()
            .filter_map(|l| {
                let b = snapshot.bitmaps.get(&l.id)?;
                let usable = b.width > 0
                    && b.height > 0
                    && b.width <= MAX_CANVAS_DIM
                    && b.height <= MAX_CANVAS_DIM;
                if !usable {
                    tracing::warn!(layer = %l.id, width = b.width, height = b.height, "layer bitmap not drawable");
                }
                usable.then_some((l, b))
            })
            .collect::<Vec<_>>();
        if drawable.is_empty() {
            return Ok(());
        }

        let (w, h) = canvas_u16(snapshot.canvas)?;
        let mut ctx = vello_cpu::RenderContext::new(w, h);
        for (layer, bitmap) in drawable {
            let paint = bitmap_to_image(bitmap)?;
            ctx.set_transform(affine_to_cpu(layer.transform(bitmap.width, bitmap.height)));
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(bitmap.width),
                f64::from(bitmap.height),
            ));
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);
        composite_in_place(buf, pixmap.data_as_u8_slice(), 1.0, BlendMode::Normal)
    }
}

fn canvas_u16(canvas: CanvasSize) -> LiveryResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| LiveryError::composite("canvas width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| LiveryError::composite("canvas height exceeds u16"))?;
    Ok((w, h))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bitmap_to_image(bitmap: &Bitmap) -> LiveryResult<vello_cpu::Image> {
    let (w, h) = canvas_u16(bitmap.size())?;
    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(bitmap.width as usize * bitmap.height as usize);
    for px in bitmap.rgba8_premul.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        });
    }
    if pixels.len() != bitmap.width as usize * bitmap.height as usize {
        return Err(LiveryError::composite(format!(
            "bitmap byte len {} does not match {}x{}",
            bitmap.rgba8_premul.len(),
            bitmap.width,
            bitmap.height
        )));
    }
    let pixmap = vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities);
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
