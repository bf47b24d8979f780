use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::assets::loader::ImageLoader;
use crate::effects::recolor::{RecolorMode, recolor};
use crate::foundation::core::{Bitmap, Rgb8};
use crate::foundation::error::LiveryResult;
use crate::foundation::math::StableHasher;
use crate::scene::model::{Layer, LayerId, LayerSource, SlotName};
use crate::slots::store::{CommitOutcome, SlotStore};

/// Everything a processed bitmap depends on. Any change means the bitmap must be rebuilt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    /// Owning layer.
    pub layer: LayerId,
    /// Tint applied, if any.
    pub color: Option<Rgb8>,
    /// Pixel source.
    pub source: LayerSource,
}

impl ProcessKey {
    /// Key of the layer as it is now.
    pub fn for_layer(layer: &Layer) -> Self {
        Self {
            layer: layer.id.clone(),
            color: layer.color,
            source: layer.source.clone(),
        }
    }

    /// Return `true` if this key was computed from `layer`'s current id, tint and source.
    pub fn matches(&self, layer: &Layer) -> bool {
        self.layer == layer.id && self.color == layer.color && self.source == layer.source
    }

    pub(crate) fn hash_into(&self, h: &mut StableHasher) {
        h.write_str(self.layer.as_str());
        match self.color {
            None => h.write_u8(0),
            Some(c) => {
                h.write_u8(1);
                h.write_bytes(&[c.r, c.g, c.b]);
            }
        }
        match &self.source {
            LayerSource::Url(u) => {
                h.write_u8(0);
                h.write_str(u);
            }
            LayerSource::Blob(b) => {
                h.write_u8(1);
                h.write_u64(b.as_u64());
            }
        }
    }
}

/// Decoded and optionally tinted pixels of one layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedBitmap {
    /// Inputs the bitmap was built from.
    pub key: ProcessKey,
    /// Premultiplied pixels.
    pub bitmap: Bitmap,
    /// The tint was applied (false for untinted layers and for recolor fallbacks).
    pub recolored: bool,
}

/// What the store keeps per layer after processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessedEntry {
    /// Pixels are available.
    Ready(ProcessedBitmap),
    /// Loading failed for this key; the layer is left out of the composite until its key
    /// changes.
    Failed {
        /// Inputs that failed.
        key: ProcessKey,
        /// Error message.
        reason: String,
    },
}

impl ProcessedEntry {
    /// Key the entry was computed for.
    pub fn key(&self) -> &ProcessKey {
        match self {
            Self::Ready(p) => &p.key,
            Self::Failed { key, .. } => key,
        }
    }

    /// Pixels, if ready.
    pub fn bitmap(&self) -> Option<&Bitmap> {
        match self {
            Self::Ready(p) => Some(&p.bitmap),
            Self::Failed { .. } => None,
        }
    }

    /// Return `true` for [`ProcessedEntry::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Result of [`LayerProcessor::refresh_layer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The stored entry already matched; nothing ran.
    Cached,
    /// A fresh bitmap was stored.
    Committed,
    /// A failure was recorded for the current key.
    Failed,
    /// The layer changed or vanished while processing; the result was dropped.
    StaleDiscarded,
}

/// Turns layers into processed bitmaps: load, then tint when a color is set.
#[derive(Debug)]
pub struct LayerProcessor<L> {
    loader: Arc<L>,
    recolor_mode: RecolorMode,
    calls: AtomicU64,
}

impl<L: ImageLoader> LayerProcessor<L> {
    /// Processor loading through `loader`.
    pub fn new(loader: Arc<L>, recolor_mode: RecolorMode) -> Self {
        Self {
            loader,
            recolor_mode,
            calls: AtomicU64::new(0),
        }
    }

    /// The loader in use.
    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    /// Number of [`Self::process_layer`] invocations so far.
    pub fn process_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Load the layer's source and tint it.
    ///
    /// Untinted layers get the loaded bitmap itself. A recolor failure falls back to the
    /// untinted bitmap rather than dropping the layer.
    pub async fn process_layer(&self, layer: &Layer) -> LiveryResult<ProcessedBitmap> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = ProcessKey::for_layer(layer);
        let loaded = self.loader.load(&layer.source).await?;

        let Some(color) = layer.color else {
            return Ok(ProcessedBitmap {
                key,
                bitmap: loaded,
                recolored: false,
            });
        };
        match recolor(&loaded, color, self.recolor_mode) {
            Ok(bitmap) => Ok(ProcessedBitmap {
                key,
                bitmap,
                recolored: true,
            }),
            Err(e) => {
                tracing::warn!(layer = %layer.id, error = %e, "recolor failed, using source colors");
                Ok(ProcessedBitmap {
                    key,
                    bitmap: loaded,
                    recolored: false,
                })
            }
        }
    }

    /// Bring one layer's processed entry up to date and hand it to the store.
    ///
    /// Does nothing when the stored entry already has the layer's key. The store decides on
    /// commit whether the result is still current.
    pub async fn refresh_layer(
        &self,
        store: &SlotStore,
        slot: &SlotName,
        layer: &Layer,
    ) -> LiveryResult<RefreshOutcome> {
        if store
            .processed(slot, &layer.id)?
            .is_some_and(|e| e.key().matches(layer))
        {
            return Ok(RefreshOutcome::Cached);
        }

        let (entry, ok) = match self.process_layer(layer).await {
            Ok(p) => (ProcessedEntry::Ready(p), true),
            Err(e) => {
                tracing::warn!(%slot, layer = %layer.id, source = %layer.source, error = %e, "layer processing failed");
                (
                    ProcessedEntry::Failed {
                        key: ProcessKey::for_layer(layer),
                        reason: e.to_string(),
                    },
                    false,
                )
            }
        };

        Ok(match store.commit_processed(slot, entry)? {
            CommitOutcome::StaleDiscarded => RefreshOutcome::StaleDiscarded,
            CommitOutcome::Inserted if ok => RefreshOutcome::Committed,
            CommitOutcome::Inserted => RefreshOutcome::Failed,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/slots/processor.rs"]
mod tests;
