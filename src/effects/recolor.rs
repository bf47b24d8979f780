use serde::{Deserialize, Serialize};

use crate::foundation::core::{Bitmap, Rgb8};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::foundation::math::mul_div255_u8;

/// How [`recolor`] treats the alpha channel of covered pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecolorMode {
    /// Every covered pixel becomes fully opaque target color. Anti-aliased edges are
    /// flattened into a hard silhouette.
    #[default]
    FlatSilhouette,
    /// Only RGB is replaced; the source alpha channel is kept exactly.
    PreserveAlpha,
}

/// Tint every non-transparent pixel of `bitmap` with `target`.
///
/// Pixels with alpha 0 stay fully transparent. The input is never modified.
pub fn recolor(bitmap: &Bitmap, target: Rgb8, mode: RecolorMode) -> LiveryResult<Bitmap> {
    let expected = (bitmap.width as usize)
        .checked_mul(bitmap.height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| LiveryError::decode("bitmap size overflow"))?;
    let src = bitmap.rgba8_premul.as_slice();
    if src.len() != expected {
        return Err(LiveryError::decode(format!(
            "recolor expects {expected} bytes for {}x{}, got {}",
            bitmap.width,
            bitmap.height,
            src.len()
        )));
    }

    let mut out = vec![0u8; expected];
    match mode {
        RecolorMode::FlatSilhouette => {
            let solid = target.to_rgba8();
            for (d, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                if s[3] != 0 {
                    d.copy_from_slice(&solid);
                }
            }
        }
        RecolorMode::PreserveAlpha => {
            for (d, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let a = s[3];
                if a == 0 {
                    continue;
                }
                let a16 = u16::from(a);
                d[0] = mul_div255_u8(u16::from(target.r), a16);
                d[1] = mul_div255_u8(u16::from(target.g), a16);
                d[2] = mul_div255_u8(u16::from(target.b), a16);
                d[3] = a;
            }
        }
    }

    Bitmap::from_premul(bitmap.width, bitmap.height, out)
}

#[cfg(test)]
#[path = "../../tests/unit/effects/recolor.rs"]
mod tests;
