use crate::foundation::core::{Bitmap, CanvasSize, Rgb8};
use crate::foundation::error::LiveryResult;
use crate::scene::model::{
    ColorStop, GradientKind, GradientSettings, GradientTransition, LinearDirection,
};

/// Offset of the duplicated stop inserted before each later stop in hard-stop mode.
pub const HARD_STOP_EPSILON: f64 = 1e-4;

/// Number of solid wedges used to approximate conic gradients.
pub const CONIC_SEGMENTS: usize = 360;

/// Stops sorted by position; equal positions are ordered by color so the result does not depend
/// on the caller's ordering.
pub fn sorted_stops(stops: &[ColorStop]) -> Vec<ColorStop> {
    let mut out = stops.to_vec();
    out.sort_by(|a, b| {
        a.position
            .total_cmp(&b.position)
            .then_with(|| (a.color.r, a.color.g, a.color.b).cmp(&(b.color.r, b.color.g, b.color.b)))
    });
    out
}

/// Sorted stop ramp with the transition applied, ready for [`sample`].
pub fn transition_ramp(stops: &[ColorStop], transition: GradientTransition) -> Vec<ColorStop> {
    let sorted = sorted_stops(stops);
    match transition {
        GradientTransition::Smooth => sorted,
        GradientTransition::EaseIn => sorted
            .into_iter()
            .map(|s| ColorStop::new(s.color, s.position * s.position))
            .collect(),
        GradientTransition::EaseOut => sorted
            .into_iter()
            .map(|s| {
                let inv = 1.0 - s.position;
                ColorStop::new(s.color, 1.0 - inv * inv)
            })
            .collect(),
        GradientTransition::HardStop => {
            let mut out = Vec::with_capacity(sorted.len() * 2);
            for (i, s) in sorted.iter().enumerate() {
                if i > 0 {
                    let prev = sorted[i - 1];
                    let pos = (s.position - HARD_STOP_EPSILON).max(prev.position);
                    out.push(ColorStop::new(prev.color, pos));
                }
                out.push(*s);
            }
            out
        }
        GradientTransition::Stepped => {
            let mut out = Vec::with_capacity(sorted.len() * 3);
            for (i, s) in sorted.iter().enumerate() {
                out.push(*s);
                if let Some(next) = sorted.get(i + 1) {
                    let mid = (s.position + next.position) / 2.0;
                    out.push(ColorStop::new(s.color, mid));
                    out.push(ColorStop::new(next.color, mid));
                }
            }
            out
        }
    }
}

/// Color of a sorted ramp at `t`. Outside the first/last stop the end colors extend.
pub fn sample(ramp: &[ColorStop], t: f64) -> Rgb8 {
    let (Some(first), Some(last)) = (ramp.first(), ramp.last()) else {
        return Rgb8::new(0, 0, 0);
    };
    if t.is_nan() || t <= first.position {
        return first.color;
    }
    if t >= last.position {
        return last.color;
    }

    let Some(j) = ramp.iter().position(|s| s.position > t) else {
        return last.color;
    };
    let a = ramp[j - 1];
    let b = ramp[j];
    let span = b.position - a.position;
    let f = if span > 0.0 {
        ((t - a.position) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let lerp = |x: u8, y: u8| -> u8 {
        let xf = f64::from(x);
        let yf = f64::from(y);
        (xf + (yf - xf) * f).round().clamp(0.0, 255.0) as u8
    };
    Rgb8::new(
        lerp(a.color.r, b.color.r),
        lerp(a.color.g, b.color.g),
        lerp(a.color.b, b.color.b),
    )
}

/// Rasterize `gradient` into an opaque bitmap of `size`.
///
/// Opacity, blend mode and the `enabled` flag are compositing concerns and are ignored here.
/// Pixels are sampled at their centers; the output is byte-identical for identical inputs.
#[tracing::instrument(level = "trace", skip(gradient), fields(kind = ?gradient.kind))]
pub fn rasterize(gradient: &GradientSettings, size: CanvasSize) -> LiveryResult<Bitmap> {
    gradient.validate()?;
    let ramp = transition_ramp(&gradient.color_stops, gradient.transition);
    let w = f64::from(size.width);
    let h = f64::from(size.height);
    let mut bytes = vec![0u8; size.rgba8_len()];

    match gradient.kind {
        GradientKind::Linear => {
            let t_at = linear_param(gradient.direction, w, h);
            for y in 0..size.height {
                let py = f64::from(y) + 0.5;
                for x in 0..size.width {
                    let px = f64::from(x) + 0.5;
                    let c = sample(&ramp, t_at(px, py));
                    put(&mut bytes, size.width, x, y, c);
                }
            }
        }
        GradientKind::Radial => {
            let cx = gradient.center_x * w;
            let cy = gradient.center_y * h;
            let rx = gradient.radius_x * w;
            let ry = gradient.radius_y * h;
            for y in 0..size.height {
                let dy = (f64::from(y) + 0.5 - cy) / ry;
                for x in 0..size.width {
                    let dx = (f64::from(x) + 0.5 - cx) / rx;
                    let c = sample(&ramp, (dx * dx + dy * dy).sqrt());
                    put(&mut bytes, size.width, x, y, c);
                }
            }
        }
        GradientKind::Conic => {
            let cx = gradient.center_x * w;
            let cy = gradient.center_y * h;
            let wedge = 360.0 / CONIC_SEGMENTS as f64;
            let colors = (0..CONIC_SEGMENTS)
                .map(|i| sample(&ramp, i as f64 / CONIC_SEGMENTS as f64))
                .collect::<Vec<_>>();
            for y in 0..size.height {
                let dy = f64::from(y) + 0.5 - cy;
                for x in 0..size.width {
                    let dx = f64::from(x) + 0.5 - cx;
                    // clockwise from 12 o'clock
                    let angle = dx.atan2(-dy).to_degrees();
                    let rel = (angle - gradient.angle_deg).rem_euclid(360.0);
                    let seg = ((rel / wedge).floor() as usize).min(CONIC_SEGMENTS - 1);
                    put(&mut bytes, size.width, x, y, colors[seg]);
                }
            }
        }
    }

    Bitmap::from_premul(size.width, size.height, bytes)
}

fn linear_param(direction: LinearDirection, w: f64, h: f64) -> impl Fn(f64, f64) -> f64 {
    let diag = w * w + h * h;
    move |px, py| {
        let t = match direction {
            LinearDirection::Horizontal => px / w,
            LinearDirection::Vertical => py / h,
            LinearDirection::Diagonal => (px * w + py * h) / diag,
            LinearDirection::AntiDiagonal => (px * w - (py - h) * h) / diag,
        };
        t.clamp(0.0, 1.0)
    }
}

fn put(bytes: &mut [u8], width: u32, x: u32, y: u32, c: Rgb8) {
    let idx = ((y as usize) * (width as usize) + (x as usize)) * 4;
    bytes[idx..idx + 4].copy_from_slice(&c.to_rgba8());
}

#[cfg(test)]
#[path = "../../tests/unit/effects/gradient.rs"]
mod tests;
