use serde::{Deserialize, Serialize};

use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::model::SlotName;

/// Static description of one UV texture region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotDef {
    /// Material/region name.
    pub name: SlotName,
    /// Width:height ratio of the canonical raster.
    pub aspect_ratio: f64,
    /// Whether the slot accepts a gradient background (frame-like slots).
    #[serde(default)]
    pub gradient: bool,
}

impl SlotDef {
    /// Logo slot without gradient support.
    pub fn logo(name: &str, aspect_ratio: f64) -> Self {
        Self {
            name: SlotName::new(name),
            aspect_ratio,
            gradient: false,
        }
    }

    /// Frame-texture slot with gradient support.
    pub fn frame(name: &str, aspect_ratio: f64) -> Self {
        Self {
            name: SlotName::new(name),
            aspect_ratio,
            gradient: true,
        }
    }
}

/// The fixed set of slots known for a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotCatalog(Vec<SlotDef>);

impl Default for SlotCatalog {
    fn default() -> Self {
        Self::bicycle()
    }
}

impl SlotCatalog {
    /// Build a validated catalog.
    pub fn new(defs: Vec<SlotDef>) -> LiveryResult<Self> {
        let out = Self(defs);
        out.validate()?;
        Ok(out)
    }

    /// Slots of the bicycle frame model.
    pub fn bicycle() -> Self {
        Self(vec![
            SlotDef::frame("FRAME", 1.0),
            SlotDef::logo("HEAD_TUBE", 1.0),
            SlotDef::logo("DOWN_TUBE_LEFT", 8.0),
            SlotDef::logo("DOWN_TUBE_RIGHT", 8.0),
            SlotDef::logo("TOP_TUBE_LEFT", 8.0),
            SlotDef::logo("TOP_TUBE_RIGHT", 8.0),
            SlotDef::logo("SEAT_TUBE", 4.0),
        ])
    }

    /// Iterate slot definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SlotDef> {
        self.0.iter()
    }

    /// Look up a slot definition by name.
    pub fn get(&self, name: &SlotName) -> Option<&SlotDef> {
        self.0.iter().find(|d| &d.name == name)
    }

    /// Reject empty catalogs, duplicate names and unusable aspect ratios.
    pub fn validate(&self) -> LiveryResult<()> {
        if self.0.is_empty() {
            return Err(LiveryError::validation("slot catalog must not be empty"));
        }
        for (i, def) in self.0.iter().enumerate() {
            if def.name.as_str().is_empty() {
                return Err(LiveryError::validation("slot names must be non-empty"));
            }
            if !def.aspect_ratio.is_finite() || def.aspect_ratio <= 0.0 {
                return Err(LiveryError::validation(format!(
                    "slot {} has invalid aspect ratio {}",
                    def.name, def.aspect_ratio
                )));
            }
            if self.0[..i].iter().any(|d| d.name == def.name) {
                return Err(LiveryError::validation(format!(
                    "duplicate slot name {}",
                    def.name
                )));
            }
        }
        Ok(())
    }
}
