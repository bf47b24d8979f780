use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assets::blob::BlobHandle;
use crate::foundation::core::{Affine, CanvasSize, Point, Rgb8};
use crate::foundation::error::{LiveryError, LiveryResult};

/// Name of a UV texture region; matches the material name baked into the 3D asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotName(String);

impl SlotName {
    /// Wrap a slot name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable layer identifier, unique within its slot and never reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generated ids look like `HEAD_TUBE#3`.
    pub(crate) fn generated(slot: &SlotName, seq: u64) -> Self {
        Self(format!("{slot}#{seq}"))
    }

    /// Sequence number of an id generated for `slot`, if it has that shape.
    pub(crate) fn generated_seq(&self, slot: &SlotName) -> Option<u64> {
        self.0
            .strip_prefix(slot.as_str())
            .and_then(|rest| rest.strip_prefix('#'))
            .and_then(|n| n.parse().ok())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a layer's pixels come from. Exactly one source is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayerSource {
    /// Static asset or remote reference.
    Url(String),
    /// User-uploaded bytes owned by the layer.
    Blob(BlobHandle),
}

impl LayerSource {
    /// The owned blob, if any.
    pub fn blob(&self) -> Option<BlobHandle> {
        match self {
            Self::Url(_) => None,
            Self::Blob(b) => Some(*b),
        }
    }
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => f.write_str(u),
            Self::Blob(b) => write!(f, "{b}"),
        }
    }
}

/// Independent horizontal/vertical scale factors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerScale {
    /// Horizontal factor, `> 0`.
    pub x: f64,
    /// Vertical factor, `> 0`.
    pub y: f64,
}

impl Default for LayerScale {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

impl LayerScale {
    /// Uniform scale.
    pub fn uniform(s: f64) -> Self {
        Self { x: s, y: s }
    }

    fn validate(self) -> LiveryResult<()> {
        if !(self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0) {
            return Err(LiveryError::validation(format!(
                "layer scale must be finite and > 0, got ({}, {})",
                self.x, self.y
            )));
        }
        Ok(())
    }
}

/// One placed image within a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    /// Stable identifier.
    pub id: LayerId,
    /// Pixel source.
    pub source: LayerSource,
    /// Display label.
    pub name: String,
    /// Center point in canonical slot space.
    pub position: Point,
    /// Non-uniform scale.
    pub scale: LayerScale,
    /// Clockwise rotation in degrees.
    pub rotation_deg: f64,
    /// Optional flat tint.
    pub color: Option<Rgb8>,
    /// Stacking order; ties keep insertion order.
    pub z_index: i32,
}

impl Layer {
    /// Map the layer's own bitmap space (`0..w, 0..h`) into canonical slot space.
    ///
    /// translate(position) · rotate(rotation) · scale(scale) · translate(-w/2, -h/2)
    pub fn transform(&self, bitmap_width: u32, bitmap_height: u32) -> Affine {
        Affine::translate(self.position.to_vec2())
            * Affine::rotate(self.rotation_deg.to_radians())
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate((
                -f64::from(bitmap_width) / 2.0,
                -f64::from(bitmap_height) / 2.0,
            ))
    }

    pub(crate) fn validate(&self) -> LiveryResult<()> {
        self.scale.validate()?;
        if !(self.position.x.is_finite() && self.position.y.is_finite()) {
            return Err(LiveryError::validation("layer position must be finite"));
        }
        if !self.rotation_deg.is_finite() {
            return Err(LiveryError::validation("layer rotation must be finite"));
        }
        if let LayerSource::Url(u) = &self.source
            && u.trim().is_empty()
        {
            return Err(LiveryError::validation("layer url must be non-empty"));
        }
        Ok(())
    }
}

/// Description of a new layer; the store assigns the id.
#[derive(Clone, Debug)]
pub struct LayerDraft {
    /// Pixel source.
    pub source: LayerSource,
    /// Display label.
    pub name: String,
    /// Center point; defaults to the canvas center.
    pub position: Option<Point>,
    /// Scale; defaults to 1.
    pub scale: LayerScale,
    /// Rotation in degrees.
    pub rotation_deg: f64,
    /// Optional tint.
    pub color: Option<Rgb8>,
    /// Stacking order; defaults to one above the current top layer.
    pub z_index: Option<i32>,
}

impl LayerDraft {
    /// Draft with defaults for everything but the source and label.
    pub fn new(source: LayerSource, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            position: None,
            scale: LayerScale::default(),
            rotation_deg: 0.0,
            color: None,
            z_index: None,
        }
    }

    /// Set the center point.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    /// Set the tint.
    pub fn tinted(mut self, color: Rgb8) -> Self {
        self.color = Some(color);
        self
    }

    /// Set the stacking order.
    pub fn with_z(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Set the scale.
    pub fn scaled(mut self, scale: LayerScale) -> Self {
        self.scale = scale;
        self
    }

    /// Set the rotation.
    pub fn rotated(mut self, rotation_deg: f64) -> Self {
        self.rotation_deg = rotation_deg;
        self
    }

    pub(crate) fn into_layer(self, id: LayerId, canvas: CanvasSize, z_default: i32) -> Layer {
        Layer {
            id,
            source: self.source,
            name: self.name,
            position: self.position.unwrap_or_else(|| canvas.center()),
            scale: self.scale,
            rotation_deg: self.rotation_deg,
            color: self.color,
            z_index: self.z_index.unwrap_or(z_default),
        }
    }
}

/// Partial update applied by [`crate::SlotStore::update_layer`]. `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerPatch {
    /// New label.
    pub name: Option<String>,
    /// New center point.
    pub position: Option<Point>,
    /// New scale.
    pub scale: Option<LayerScale>,
    /// New rotation in degrees.
    pub rotation_deg: Option<f64>,
    /// New tint; `Some(None)` clears it.
    pub color: Option<Option<Rgb8>>,
    /// New stacking order.
    pub z_index: Option<i32>,
    /// Replacement source; an owned blob being replaced is released.
    pub source: Option<LayerSource>,
}

impl LayerPatch {
    /// Patch that only moves the layer.
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            position: Some(Point::new(x, y)),
            ..Self::default()
        }
    }

    /// Patch that only changes the tint.
    pub fn color(color: Option<Rgb8>) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    /// Return `true` when the patch touches nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply_to(&self, layer: &mut Layer) {
        if let Some(name) = &self.name {
            layer.name = name.clone();
        }
        if let Some(p) = self.position {
            layer.position = p;
        }
        if let Some(s) = self.scale {
            layer.scale = s;
        }
        if let Some(r) = self.rotation_deg {
            layer.rotation_deg = r;
        }
        if let Some(c) = self.color {
            layer.color = c;
        }
        if let Some(z) = self.z_index {
            layer.z_index = z;
        }
        if let Some(src) = &self.source {
            layer.source = src.clone();
        }
    }
}

/// Blend modes available to gradient backgrounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    /// Source-over.
    #[default]
    Normal,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Overlay.
    Overlay,
    /// Darken.
    Darken,
    /// Lighten.
    Lighten,
    /// Color dodge.
    ColorDodge,
    /// Color burn.
    ColorBurn,
    /// Soft light.
    SoftLight,
    /// Hard light.
    HardLight,
    /// Difference.
    Difference,
    /// Exclusion.
    Exclusion,
}

/// Gradient geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientKind {
    /// Along one of the canonical directions.
    #[default]
    Linear,
    /// Elliptical rings around the center.
    Radial,
    /// Sweep around the center.
    Conic,
}

/// The four canonical linear gradient axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinearDirection {
    /// Left edge to right edge.
    #[default]
    Horizontal,
    /// Top edge to bottom edge.
    Vertical,
    /// Top-left corner to bottom-right corner.
    Diagonal,
    /// Bottom-left corner to top-right corner.
    AntiDiagonal,
}

/// How colors move between stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientTransition {
    /// Linear interpolation.
    #[default]
    Smooth,
    /// Sharp edge at each stop.
    HardStop,
    /// Flat band per stop.
    Stepped,
    /// Stop positions remapped by `p²`.
    EaseIn,
    /// Stop positions remapped by `1-(1-p)²`.
    EaseOut,
}

/// One gradient color stop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Stop color.
    pub color: Rgb8,
    /// Position in `[0, 1]`.
    pub position: f64,
}

impl ColorStop {
    /// Construct a stop.
    pub fn new(color: Rgb8, position: f64) -> Self {
        Self { color, position }
    }
}

/// Background gradient configuration for frame-like slots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientSettings {
    /// Geometry.
    pub kind: GradientKind,
    /// Axis for linear gradients.
    pub direction: LinearDirection,
    /// Start angle for conic gradients, clockwise from 12 o'clock.
    pub angle_deg: f64,
    /// Center x as a fraction of the width.
    pub center_x: f64,
    /// Center y as a fraction of the height.
    pub center_y: f64,
    /// Radial x radius as a fraction of the width.
    pub radius_x: f64,
    /// Radial y radius as a fraction of the height.
    pub radius_y: f64,
    /// Stop transition mode.
    pub transition: GradientTransition,
    /// Stops in any order.
    pub color_stops: Vec<ColorStop>,
    /// Opacity in `[0, 1]` used when compositing over the background.
    pub opacity: f64,
    /// Blend mode used when compositing over the background.
    pub blend_mode: BlendMode,
    /// Disabled gradients are kept but not drawn.
    pub enabled: bool,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            kind: GradientKind::Linear,
            direction: LinearDirection::Horizontal,
            angle_deg: 0.0,
            center_x: 0.5,
            center_y: 0.5,
            radius_x: 0.5,
            radius_y: 0.5,
            transition: GradientTransition::Smooth,
            color_stops: vec![
                ColorStop::new(Rgb8::new(255, 255, 255), 0.0),
                ColorStop::new(Rgb8::new(0, 0, 0), 1.0),
            ],
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            enabled: true,
        }
    }
}

impl GradientSettings {
    /// Linear gradient between the given stops.
    pub fn linear(direction: LinearDirection, stops: Vec<ColorStop>) -> Self {
        Self {
            direction,
            color_stops: stops,
            ..Self::default()
        }
    }

    /// Builder-style transition override.
    pub fn with_transition(mut self, transition: GradientTransition) -> Self {
        self.transition = transition;
        self
    }

    /// Validate stop count and numeric ranges.
    pub fn validate(&self) -> LiveryResult<()> {
        if self.color_stops.len() < 2 {
            return Err(LiveryError::validation(
                "gradient needs at least 2 color stops",
            ));
        }
        for s in &self.color_stops {
            if !s.position.is_finite() || !(0.0..=1.0).contains(&s.position) {
                return Err(LiveryError::validation(format!(
                    "color stop position {} outside [0, 1]",
                    s.position
                )));
            }
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(LiveryError::validation("gradient opacity outside [0, 1]"));
        }
        if !(self.center_x.is_finite() && self.center_y.is_finite()) {
            return Err(LiveryError::validation("gradient center must be finite"));
        }
        if !self.angle_deg.is_finite() {
            return Err(LiveryError::validation("gradient angle must be finite"));
        }
        if self.kind == GradientKind::Radial
            && !(self.radius_x.is_finite()
                && self.radius_y.is_finite()
                && self.radius_x > 0.0
                && self.radius_y > 0.0)
        {
            return Err(LiveryError::validation(
                "radial gradient radii must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
