use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Point, Rgb8};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::model::{GradientSettings, Layer, LayerId, LayerScale, LayerSource, SlotName};
use crate::slots::store::{SlotContents, SlotStore};

/// Current saved-configuration format.
pub const SAVED_FORMAT_VERSION: u32 = 1;

/// Persisted state of every slot: stable fields only, no bitmaps, textures or blob handles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedConfiguration {
    /// Format version.
    pub version: u32,
    /// Slots by name; slots without content may be omitted.
    #[serde(default)]
    pub slots: BTreeMap<SlotName, SavedSlot>,
}

/// Persisted content of one slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSlot {
    /// Layers in insertion order.
    #[serde(default)]
    pub layers: Vec<SavedLayer>,
    /// Gradient background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient: Option<GradientSettings>,
    /// Solid background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Rgb8>,
}

/// Persisted layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedLayer {
    /// Layer id, preserved across save/load.
    pub id: LayerId,
    /// Display label.
    #[serde(default)]
    pub name: String,
    /// Source reference.
    pub url: String,
    /// Center x.
    pub x: f64,
    /// Center y.
    pub y: f64,
    /// Horizontal scale.
    #[serde(default = "unit")]
    pub scale_x: f64,
    /// Vertical scale.
    #[serde(default = "unit")]
    pub scale_y: f64,
    /// Rotation in degrees.
    #[serde(default)]
    pub rotation: f64,
    /// Stacking order.
    #[serde(default)]
    pub z_index: i32,
    /// Tint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb8>,
}

fn unit() -> f64 {
    1.0
}

impl SavedLayer {
    fn from_layer(layer: &Layer) -> Option<Self> {
        let LayerSource::Url(url) = &layer.source else {
            return None;
        };
        Some(Self {
            id: layer.id.clone(),
            name: layer.name.clone(),
            url: url.clone(),
            x: layer.position.x,
            y: layer.position.y,
            scale_x: layer.scale.x,
            scale_y: layer.scale.y,
            rotation: layer.rotation_deg,
            z_index: layer.z_index,
            color: layer.color,
        })
    }

    fn into_layer(self) -> Layer {
        Layer {
            id: self.id,
            source: LayerSource::Url(self.url),
            name: self.name,
            position: Point::new(self.x, self.y),
            scale: LayerScale {
                x: self.scale_x,
                y: self.scale_y,
            },
            rotation_deg: self.rotation,
            color: self.color,
            z_index: self.z_index,
        }
    }
}

/// Result of [`SavedConfiguration::capture`].
#[derive(Clone, Debug, PartialEq)]
pub struct SaveReport {
    /// What will be written.
    pub configuration: SavedConfiguration,
    /// Layers left out because their pixels live in an in-memory blob.
    pub skipped_blob_layers: Vec<(SlotName, LayerId)>,
}

impl SavedConfiguration {
    /// Parse and version-check a saved configuration.
    pub fn from_json(s: &str) -> LiveryResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| LiveryError::configuration(format!("saved configuration: {e}")))?;
        if cfg.version != SAVED_FORMAT_VERSION {
            return Err(LiveryError::configuration(format!(
                "unsupported saved configuration version {} (expected {SAVED_FORMAT_VERSION})",
                cfg.version
            )));
        }
        Ok(cfg)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> LiveryResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LiveryError::Other(anyhow::Error::new(e).context("serialize configuration")))
    }

    /// Capture the stable state of every non-empty slot.
    pub fn capture(store: &SlotStore) -> LiveryResult<SaveReport> {
        let mut slots = BTreeMap::new();
        let mut skipped = Vec::new();
        for name in store.slot_names() {
            let mut layers = Vec::new();
            for layer in store.layers(&name)? {
                match SavedLayer::from_layer(&layer) {
                    Some(l) => layers.push(l),
                    None => skipped.push((name.clone(), layer.id)),
                }
            }
            let slot = SavedSlot {
                layers,
                gradient: store.gradient(&name)?,
                background_color: store.background_color(&name)?,
            };
            if slot != SavedSlot::default() {
                slots.insert(name, slot);
            }
        }
        if !skipped.is_empty() {
            tracing::warn!(count = skipped.len(), "uploaded images are not persisted");
        }
        Ok(SaveReport {
            configuration: Self {
                version: SAVED_FORMAT_VERSION,
                slots,
            },
            skipped_blob_layers: skipped,
        })
    }

    /// Replace the store's content with this configuration.
    ///
    /// All-or-nothing: a configuration that fails validation leaves the store untouched.
    /// Processed bitmaps and textures are rebuilt by the scheduler afterwards.
    pub fn apply(self, store: &SlotStore) -> LiveryResult<()> {
        let contents = self
            .slots
            .into_iter()
            .map(|(name, slot)| {
                (
                    name,
                    SlotContents {
                        layers: slot.layers.into_iter().map(SavedLayer::into_layer).collect(),
                        gradient: slot.gradient,
                        background: slot.background_color,
                    },
                )
            })
            .collect();
        store.restore(contents)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/saved.rs"]
mod tests;
