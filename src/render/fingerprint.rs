use crate::foundation::math::StableHasher;
use crate::scene::model::{
    BlendMode, GradientKind, GradientSettings, GradientTransition, LinearDirection,
};
use crate::slots::store::SlotSnapshot;

/// Stable hash of everything that affects a slot's composited pixels.
///
/// Layer names and the content revision are left out, so a rename or an undo back to an
/// identical state fingerprints the same as the texture already committed.
pub(crate) fn fingerprint_snapshot(snapshot: &SlotSnapshot) -> u64 {
    let mut h = StableHasher::new();
    h.write_u32(snapshot.canvas.width);
    h.write_u32(snapshot.canvas.height);

    match snapshot.background {
        None => h.write_u8(0),
        Some(c) => {
            h.write_u8(1);
            h.write_bytes(&[c.r, c.g, c.b]);
        }
    }
    match &snapshot.gradient {
        Some(g) if g.enabled => {
            h.write_u8(1);
            write_gradient(&mut h, g);
        }
        _ => h.write_u8(0),
    }

    h.write_u64(snapshot.layers.len() as u64);
    for (layer, (key, ready)) in snapshot.layers.iter().zip(&snapshot.entries) {
        key.hash_into(&mut h);
        h.write_bool(*ready);
        if let Some(b) = snapshot.bitmaps.get(&layer.id) {
            h.write_u32(b.width);
            h.write_u32(b.height);
        }
        h.write_f64(layer.position.x);
        h.write_f64(layer.position.y);
        h.write_f64(layer.scale.x);
        h.write_f64(layer.scale.y);
        h.write_f64(layer.rotation_deg);
        h.write_i32(layer.z_index);
    }
    h.finish()
}

/// Stable hash of the gradient's raster inputs (opacity and blend mode included).
pub(crate) fn fingerprint_gradient(g: &GradientSettings) -> u64 {
    let mut h = StableHasher::new();
    write_gradient(&mut h, g);
    h.finish()
}

fn write_gradient(h: &mut StableHasher, g: &GradientSettings) {
    h.write_u8(match g.kind {
        GradientKind::Linear => 0,
        GradientKind::Radial => 1,
        GradientKind::Conic => 2,
    });
    h.write_u8(match g.direction {
        LinearDirection::Horizontal => 0,
        LinearDirection::Vertical => 1,
        LinearDirection::Diagonal => 2,
        LinearDirection::AntiDiagonal => 3,
    });
    h.write_u8(match g.transition {
        GradientTransition::Smooth => 0,
        GradientTransition::HardStop => 1,
        GradientTransition::Stepped => 2,
        GradientTransition::EaseIn => 3,
        GradientTransition::EaseOut => 4,
    });
    h.write_u8(blend_tag(g.blend_mode));
    h.write_f64(g.angle_deg);
    h.write_f64(g.center_x);
    h.write_f64(g.center_y);
    h.write_f64(g.radius_x);
    h.write_f64(g.radius_y);
    h.write_f64(g.opacity);
    h.write_bool(g.enabled);
    h.write_u64(g.color_stops.len() as u64);
    for s in &g.color_stops {
        h.write_bytes(&[s.color.r, s.color.g, s.color.b]);
        h.write_f64(s.position);
    }
}

fn blend_tag(b: BlendMode) -> u8 {
    match b {
        BlendMode::Normal => 0,
        BlendMode::Multiply => 1,
        BlendMode::Screen => 2,
        BlendMode::Overlay => 3,
        BlendMode::Darken => 4,
        BlendMode::Lighten => 5,
        BlendMode::ColorDodge => 6,
        BlendMode::ColorBurn => 7,
        BlendMode::SoftLight => 8,
        BlendMode::HardLight => 9,
        BlendMode::Difference => 10,
        BlendMode::Exclusion => 11,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/fingerprint.rs"]
mod tests;
