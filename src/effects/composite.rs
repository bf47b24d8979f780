use crate::foundation::error::{LiveryError, LiveryResult};
use crate::foundation::math::mul_div255_u8;
use crate::scene::model::BlendMode;

/// One premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Source-over of one premultiplied pixel with an extra opacity factor.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Fill a premultiplied buffer with one pixel value.
pub fn fill_in_place(dst: &mut [u8], px: PremulRgba8) {
    for d in dst.chunks_exact_mut(4) {
        d.copy_from_slice(&px);
    }
}

/// Composite `src` onto `dst` (both premultiplied, same size) with `opacity` and `blend`.
pub fn composite_in_place(
    dst: &mut [u8],
    src: &[u8],
    opacity: f32,
    blend: BlendMode,
) -> LiveryResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(LiveryError::composite(
            "composite_in_place expects equal-length rgba8 buffers",
        ));
    }

    // Dispatch once per buffer; each arm gets its own monomorphized kernel.
    match blend {
        BlendMode::Normal => {
            over_in_place(dst, src, opacity);
            Ok(())
        }
        BlendMode::Multiply => blend_in_place(dst, src, opacity, |s, d| s * d),
        BlendMode::Screen => blend_in_place(dst, src, opacity, |s, d| s + d - s * d),
        BlendMode::Overlay => blend_in_place(dst, src, opacity, |s, d| {
            if d <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        BlendMode::Darken => blend_in_place(dst, src, opacity, |s, d| s.min(d)),
        BlendMode::Lighten => blend_in_place(dst, src, opacity, |s, d| s.max(d)),
        BlendMode::ColorDodge => blend_in_place(dst, src, opacity, |s, d| {
            if s >= 1.0 {
                1.0
            } else {
                (d / (1.0 - s)).min(1.0)
            }
        }),
        BlendMode::ColorBurn => blend_in_place(dst, src, opacity, |s, d| {
            if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - d) / s).min(1.0)
            }
        }),
        BlendMode::SoftLight => blend_in_place(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                d - (1.0 - 2.0 * s) * d * (1.0 - d)
            } else {
                let g = if d <= 0.25 {
                    ((16.0 * d - 12.0) * d + 4.0) * d
                } else {
                    d.sqrt()
                };
                d + (2.0 * s - 1.0) * (g - d)
            }
        }),
        BlendMode::HardLight => blend_in_place(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        BlendMode::Difference => blend_in_place(dst, src, opacity, |s, d| (d - s).abs()),
        BlendMode::Exclusion => blend_in_place(dst, src, opacity, |s, d| d + s - 2.0 * d * s),
    }
}

fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) {
    if opacity <= 0.0 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
}

#[inline(always)]
fn blend_in_place<F>(dst: &mut [u8], src: &[u8], opacity: f32, blend_fn: F) -> LiveryResult<()>
where
    F: Fn(f32, f32) -> f32,
{
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return Ok(());
    }

    let unpremul = |p: f32, a: f32| -> f32 { if a > 0.0 { (p / a).clamp(0.0, 1.0) } else { 0.0 } };

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        // Source-over with the blend applied to unpremultiplied channels:
        // out_a = sa + da * (1 - sa)
        // out_p = sp * (1 - da) + dp * (1 - sa) + B(sc, dc) * sa * da
        let sa = (f32::from(s[3]) / 255.0) * opacity;
        if sa <= 0.0 {
            continue;
        }
        let da = f32::from(d[3]) / 255.0;

        for c in 0..3 {
            let sp = (f32::from(s[c]) / 255.0) * opacity;
            let dp = f32::from(d[c]) / 255.0;
            let b = blend_fn(unpremul(sp, sa), unpremul(dp, da)).clamp(0.0, 1.0);
            let out_p = (sp * (1.0 - da) + dp * (1.0 - sa) + b * sa * da).clamp(0.0, 1.0);
            d[c] = (out_p * 255.0).round() as u8;
        }
        let out_a = (sa + da * (1.0 - sa)).clamp(0.0, 1.0);
        d[3] = (out_a * 255.0).round() as u8;
    }

    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/effects/composite.rs"]
mod tests;
