use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};

use crate::assets::blob::{BlobHandle, BlobStore};
use crate::foundation::core::{Bitmap, CanvasSize, Rgb8};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::render::texture::TextureHandle;
use crate::scene::catalog::{SlotCatalog, SlotDef};
use crate::scene::model::{
    GradientSettings, Layer, LayerDraft, LayerId, LayerPatch, LayerSource, SlotName,
};
use crate::slots::processor::{ProcessKey, ProcessedEntry};

const READY_CHANNEL_CAPACITY: usize = 64;

/// What subscribers of a slot see after every mutation.
#[derive(Clone, Debug)]
pub struct SlotView {
    /// Content revision (bumped by every edit that changes layers or background).
    pub revision: u64,
    /// Layers in insertion order.
    pub layers: Arc<[Layer]>,
    /// Committed texture, if any.
    pub texture: Option<TextureHandle>,
    /// The texture lags behind the content.
    pub dirty: bool,
}

/// A processed bitmap for the layer's current key has been committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerReady {
    /// Slot of the layer.
    pub slot: SlotName,
    /// The layer.
    pub layer: LayerId,
    /// Processed bitmap width.
    pub width: u32,
    /// Processed bitmap height.
    pub height: u32,
}

/// Result of handing a processed entry back to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The entry matches the layer's current key and was stored.
    Inserted,
    /// The layer was removed or its key changed while the work was in flight.
    StaleDiscarded,
}

/// Result of [`SlotStore::set_texture`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureCommit {
    /// Stored. `previous` is the texture it replaced; the caller releases it.
    Committed {
        /// Replaced texture.
        previous: Option<TextureHandle>,
    },
    /// The content moved on past the composited revision; nothing was stored.
    Superseded,
}

/// Replacement contents for one slot, used when restoring a saved configuration.
#[derive(Clone, Debug, Default)]
pub struct SlotContents {
    /// Layers with their persisted ids.
    pub layers: Vec<Layer>,
    /// Gradient background.
    pub gradient: Option<GradientSettings>,
    /// Solid background.
    pub background: Option<Rgb8>,
}

/// Immutable copy of everything the compositor needs for one slot.
#[derive(Clone, Debug)]
pub struct SlotSnapshot {
    /// Slot name.
    pub name: SlotName,
    /// Canonical raster size.
    pub canvas: CanvasSize,
    /// Content revision the snapshot was taken at.
    pub revision: u64,
    /// Layers in draw order: `z_index` ascending, ties in insertion order.
    pub layers: Vec<Layer>,
    /// Gradient background.
    pub gradient: Option<GradientSettings>,
    /// Solid background.
    pub background: Option<Rgb8>,
    /// Processed bitmaps of layers whose current key is ready.
    pub bitmaps: HashMap<LayerId, Bitmap>,
    /// Process keys of the drawn layers together with their readiness.
    pub entries: Vec<(ProcessKey, bool)>,
}

impl SlotSnapshot {
    /// No layers and no background: the slot carries no texture.
    pub fn is_blank(&self) -> bool {
        self.layers.is_empty()
            && self.background.is_none()
            && !self.gradient.as_ref().is_some_and(|g| g.enabled)
    }
}

#[derive(Debug, Default)]
struct SlotState {
    layers: Vec<Layer>,
    next_seq: u64,
    gradient: Option<GradientSettings>,
    background: Option<Rgb8>,
    processed: HashMap<LayerId, ProcessedEntry>,
    texture: Option<TextureHandle>,
    revision: u64,
    committed_revision: u64,
    committed_fingerprint: Option<u64>,
}

impl SlotState {
    fn layer_index(&self, slot: &SlotName, id: &LayerId) -> LiveryResult<usize> {
        self.layers
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| LiveryError::validation(format!("slot {slot} has no layer {id}")))
    }

    fn is_dirty(&self) -> bool {
        self.revision > self.committed_revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn view(&self) -> SlotView {
        SlotView {
            revision: self.revision,
            layers: self.layers.clone().into(),
            texture: self.texture.clone(),
            dirty: self.is_dirty(),
        }
    }

    fn current_entry(&self, layer: &Layer) -> Option<&ProcessedEntry> {
        self.processed
            .get(&layer.id)
            .filter(|e| e.key().matches(layer))
    }
}

struct Slot {
    def: SlotDef,
    canvas: CanvasSize,
    state: Mutex<SlotState>,
    view_tx: watch::Sender<SlotView>,
    ready_tx: broadcast::Sender<LayerReady>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SlotState) {
        self.view_tx.send_replace(state.view());
    }
}

struct StoreInner {
    base_size: u32,
    slots: BTreeMap<SlotName, Arc<Slot>>,
    blobs: BlobStore,
}

/// Owner of every slot's layers, processed bitmaps and committed texture.
///
/// Each slot sits behind its own mutex; all mutations are synchronous and immediately visible
/// to readers and subscribers. Cloning the store shares the same slots.
#[derive(Clone)]
pub struct SlotStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore")
            .field("base_size", &self.inner.base_size)
            .field("slots", &self.inner.slots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SlotStore {
    /// Create one empty slot per catalog entry, each sized `(base_size, base_size / aspect)`.
    pub fn new(catalog: &SlotCatalog, base_size: u32, blobs: BlobStore) -> LiveryResult<Self> {
        catalog.validate()?;
        let mut slots = BTreeMap::new();
        for def in catalog.iter() {
            let canvas = CanvasSize::for_aspect(base_size, def.aspect_ratio)?;
            let state = SlotState::default();
            let (view_tx, _) = watch::channel(state.view());
            let (ready_tx, _) = broadcast::channel(READY_CHANNEL_CAPACITY);
            slots.insert(
                def.name.clone(),
                Arc::new(Slot {
                    def: def.clone(),
                    canvas,
                    state: Mutex::new(state),
                    view_tx,
                    ready_tx,
                }),
            );
        }
        Ok(Self {
            inner: Arc::new(StoreInner {
                base_size,
                slots,
                blobs,
            }),
        })
    }

    fn slot(&self, name: &SlotName) -> LiveryResult<&Arc<Slot>> {
        self.inner
            .slots
            .get(name)
            .ok_or_else(|| LiveryError::validation(format!("unknown slot {name}")))
    }

    fn release_blob(&self, slot: &SlotName, handle: BlobHandle) {
        if let Err(e) = self.inner.blobs.release(handle) {
            tracing::warn!(%slot, blob = %handle, error = %e, "blob release failed");
        }
    }

    fn ensure_blob_alive(&self, source: Option<&LayerSource>) -> LiveryResult<()> {
        match source.and_then(LayerSource::blob) {
            Some(h) if !self.inner.blobs.is_alive(h) => Err(LiveryError::validation(format!(
                "{h} has already been released"
            ))),
            _ => Ok(()),
        }
    }

    /// Width used for every slot's canonical raster.
    pub fn base_size(&self) -> u32 {
        self.inner.base_size
    }

    /// Slot names in sorted order.
    pub fn slot_names(&self) -> Vec<SlotName> {
        self.inner.slots.keys().cloned().collect()
    }

    /// Canonical raster size of `slot`.
    pub fn canvas(&self, slot: &SlotName) -> LiveryResult<CanvasSize> {
        Ok(self.slot(slot)?.canvas)
    }

    /// Catalog entry of `slot`.
    pub fn slot_def(&self, slot: &SlotName) -> LiveryResult<SlotDef> {
        Ok(self.slot(slot)?.def.clone())
    }

    /// Blob store shared with loaders.
    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    /// Add a layer and return its freshly assigned id.
    ///
    /// The position defaults to the canvas center and the z-index to one above the current top
    /// layer. A blob source passes its reference to the layer; on validation failure that
    /// reference is released. Blobs that were already released are rejected.
    pub fn add_layer(&self, slot: &SlotName, draft: LayerDraft) -> LiveryResult<LayerId> {
        let s = self.slot(slot)?;
        self.ensure_blob_alive(Some(&draft.source))?;
        let blob = draft.source.blob();
        let mut state = s.lock();
        let z_default = state
            .layers
            .iter()
            .map(|l| l.z_index)
            .max()
            .map_or(0, |z| z.saturating_add(1));
        let seq = state.next_seq + 1;
        let layer = draft.into_layer(LayerId::generated(slot, seq), s.canvas, z_default);
        if let Err(e) = layer.validate() {
            drop(state);
            if let Some(h) = blob {
                self.release_blob(slot, h);
            }
            return Err(e);
        }

        state.next_seq = seq;
        let id = layer.id.clone();
        tracing::debug!(%slot, layer = %id, source = %layer.source, "layer added");
        state.layers.push(layer);
        state.touch();
        s.publish(&state);
        Ok(id)
    }

    /// Remove a layer, purge its processed entry and release its owned blob.
    pub fn remove_layer(&self, slot: &SlotName, id: &LayerId) -> LiveryResult<Layer> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        let idx = state.layer_index(slot, id)?;
        let layer = state.layers.remove(idx);
        state.processed.remove(id);
        state.touch();
        s.publish(&state);
        drop(state);

        if let Some(h) = layer.source.blob() {
            self.release_blob(slot, h);
        }
        tracing::debug!(%slot, layer = %id, "layer removed");
        Ok(layer)
    }

    /// Apply a partial update. Returns `true` if the layer changed.
    ///
    /// A replaced blob source is released; a rejected patch releases the blob it carried. A
    /// patch pointing at an already released blob is rejected as is.
    pub fn update_layer(
        &self,
        slot: &SlotName,
        id: &LayerId,
        patch: LayerPatch,
    ) -> LiveryResult<bool> {
        let s = self.slot(slot)?;
        self.ensure_blob_alive(patch.source.as_ref())?;
        let mut state = s.lock();
        let idx = match state.layer_index(slot, id) {
            Ok(idx) => idx,
            Err(e) => {
                drop(state);
                self.release_patch_blob(slot, &patch, None);
                return Err(e);
            }
        };

        let old = state.layers[idx].clone();
        let mut next = old.clone();
        patch.apply_to(&mut next);
        if let Err(e) = next.validate() {
            drop(state);
            self.release_patch_blob(slot, &patch, Some(&old.source));
            return Err(e);
        }
        if next == old {
            return Ok(false);
        }

        state.layers[idx] = next;
        state.touch();
        s.publish(&state);
        drop(state);

        if let Some(h) = old.source.blob()
            && patch.source.as_ref().is_some_and(|src| src != &old.source)
        {
            self.release_blob(slot, h);
        }
        Ok(true)
    }

    fn release_patch_blob(&self, slot: &SlotName, patch: &LayerPatch, current: Option<&LayerSource>) {
        if let Some(src) = &patch.source
            && current != Some(src)
            && let Some(h) = src.blob()
        {
            self.release_blob(slot, h);
        }
    }

    /// Swap a layer's source, releasing the previous blob exactly once.
    pub fn replace_source(
        &self,
        slot: &SlotName,
        id: &LayerId,
        source: LayerSource,
    ) -> LiveryResult<bool> {
        self.update_layer(
            slot,
            id,
            LayerPatch {
                source: Some(source),
                ..LayerPatch::default()
            },
        )
    }

    /// Restack layers: `order` lists every layer id bottom to top and each layer's `z_index`
    /// becomes its position in that list.
    pub fn reorder_layers(&self, slot: &SlotName, order: &[LayerId]) -> LiveryResult<()> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        let unique = order.iter().collect::<HashSet<_>>();
        if order.len() != state.layers.len()
            || unique.len() != order.len()
            || state.layers.iter().any(|l| !unique.contains(&l.id))
        {
            return Err(LiveryError::validation(format!(
                "reorder of slot {slot} must list each layer exactly once"
            )));
        }

        let mut changed = false;
        for (z, id) in order.iter().enumerate() {
            let z = i32::try_from(z)
                .map_err(|_| LiveryError::validation("too many layers to reorder"))?;
            let idx = state.layer_index(slot, id)?;
            if state.layers[idx].z_index != z {
                state.layers[idx].z_index = z;
                changed = true;
            }
        }
        if changed {
            state.touch();
            s.publish(&state);
        }
        Ok(())
    }

    /// Set or clear the gradient background. Only gradient-capable slots accept one.
    pub fn set_gradient(
        &self,
        slot: &SlotName,
        gradient: Option<GradientSettings>,
    ) -> LiveryResult<()> {
        let s = self.slot(slot)?;
        if let Some(g) = &gradient {
            if !s.def.gradient {
                return Err(LiveryError::validation(format!(
                    "slot {slot} does not take a gradient background"
                )));
            }
            g.validate()?;
        }
        let mut state = s.lock();
        if state.gradient != gradient {
            state.gradient = gradient;
            state.touch();
            s.publish(&state);
        }
        Ok(())
    }

    /// Set or clear the solid background color.
    pub fn set_background_color(&self, slot: &SlotName, color: Option<Rgb8>) -> LiveryResult<()> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        if state.background != color {
            state.background = color;
            state.touch();
            s.publish(&state);
        }
        Ok(())
    }

    /// Commit a composited texture for content `revision`.
    ///
    /// Reserved for the scheduler. A texture built from a revision older than the current one
    /// is refused so an out-of-date composite never becomes visible.
    pub fn set_texture(
        &self,
        slot: &SlotName,
        texture: Option<TextureHandle>,
        revision: u64,
        fingerprint: u64,
    ) -> LiveryResult<TextureCommit> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        if revision < state.revision {
            tracing::debug!(%slot, revision, current = state.revision, "texture superseded");
            return Ok(TextureCommit::Superseded);
        }
        let previous = std::mem::replace(&mut state.texture, texture);
        state.committed_revision = revision;
        state.committed_fingerprint = Some(fingerprint);
        s.publish(&state);
        Ok(TextureCommit::Committed { previous })
    }

    /// Mark `revision` as committed without a new texture, because its composite would equal
    /// the one already committed.
    pub fn commit_unchanged(&self, slot: &SlotName, revision: u64) -> LiveryResult<bool> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        if revision < state.revision {
            return Ok(false);
        }
        state.committed_revision = revision;
        s.publish(&state);
        Ok(true)
    }

    /// Fingerprint of the last committed composite.
    pub fn committed_fingerprint(&self, slot: &SlotName) -> LiveryResult<Option<u64>> {
        Ok(self.slot(slot)?.lock().committed_fingerprint)
    }

    /// Layers in insertion order.
    pub fn layers(&self, slot: &SlotName) -> LiveryResult<Vec<Layer>> {
        Ok(self.slot(slot)?.lock().layers.clone())
    }

    /// One layer by id.
    pub fn layer(&self, slot: &SlotName, id: &LayerId) -> LiveryResult<Layer> {
        let state = self.slot(slot)?.lock();
        let idx = state.layer_index(slot, id)?;
        Ok(state.layers[idx].clone())
    }

    /// Gradient background.
    pub fn gradient(&self, slot: &SlotName) -> LiveryResult<Option<GradientSettings>> {
        Ok(self.slot(slot)?.lock().gradient.clone())
    }

    /// Solid background.
    pub fn background_color(&self, slot: &SlotName) -> LiveryResult<Option<Rgb8>> {
        Ok(self.slot(slot)?.lock().background)
    }

    /// Committed texture.
    pub fn texture(&self, slot: &SlotName) -> LiveryResult<Option<TextureHandle>> {
        Ok(self.slot(slot)?.lock().texture.clone())
    }

    /// Content revision.
    pub fn revision(&self, slot: &SlotName) -> LiveryResult<u64> {
        Ok(self.slot(slot)?.lock().revision)
    }

    /// The committed texture lags behind the content.
    pub fn is_dirty(&self, slot: &SlotName) -> LiveryResult<bool> {
        Ok(self.slot(slot)?.lock().is_dirty())
    }

    /// Watch the slot's layers, texture and dirty flag.
    pub fn subscribe(&self, slot: &SlotName) -> LiveryResult<watch::Receiver<SlotView>> {
        Ok(self.slot(slot)?.view_tx.subscribe())
    }

    /// Receive an event each time a processed bitmap for a current layer key is committed.
    pub fn subscribe_ready(
        &self,
        slot: &SlotName,
    ) -> LiveryResult<broadcast::Receiver<LayerReady>> {
        Ok(self.slot(slot)?.ready_tx.subscribe())
    }

    /// Processed entry stored for a layer, whatever key it was computed for.
    pub fn processed(&self, slot: &SlotName, id: &LayerId) -> LiveryResult<Option<ProcessedEntry>> {
        Ok(self.slot(slot)?.lock().processed.get(id).cloned())
    }

    /// Size of the layer's processed bitmap if its current key is ready.
    pub fn bitmap_size(&self, slot: &SlotName, id: &LayerId) -> LiveryResult<Option<(u32, u32)>> {
        let state = self.slot(slot)?.lock();
        let idx = state.layer_index(slot, id)?;
        Ok(state
            .current_entry(&state.layers[idx])
            .and_then(ProcessedEntry::bitmap)
            .map(|b| (b.width, b.height)))
    }

    /// Current revision and the layers whose processed entry is missing or keyed differently.
    pub fn pending_layers(&self, slot: &SlotName) -> LiveryResult<(u64, Vec<Layer>)> {
        let state = self.slot(slot)?.lock();
        let pending = state
            .layers
            .iter()
            .filter(|l| state.current_entry(l).is_none())
            .cloned()
            .collect();
        Ok((state.revision, pending))
    }

    /// Store a processed entry if its key still matches the layer.
    pub fn commit_processed(
        &self,
        slot: &SlotName,
        entry: ProcessedEntry,
    ) -> LiveryResult<CommitOutcome> {
        let s = self.slot(slot)?;
        let mut state = s.lock();
        let key = entry.key().clone();
        let current = state.layers.iter().find(|l| l.id == key.layer);
        if !current.is_some_and(|l| key.matches(l)) {
            tracing::debug!(%slot, layer = %key.layer, "stale processing result discarded");
            return Ok(CommitOutcome::StaleDiscarded);
        }

        let ready = entry.bitmap().map(|b| LayerReady {
            slot: slot.clone(),
            layer: key.layer.clone(),
            width: b.width,
            height: b.height,
        });
        state.processed.insert(key.layer, entry);
        drop(state);

        if let Some(ev) = ready {
            // No receivers is fine.
            let _ = s.ready_tx.send(ev);
        }
        Ok(CommitOutcome::Inserted)
    }

    /// Copy out what the compositor needs.
    pub fn snapshot(&self, slot: &SlotName) -> LiveryResult<SlotSnapshot> {
        let s = self.slot(slot)?;
        let state = s.lock();
        let mut layers = state.layers.clone();
        // stable: ties keep insertion order
        layers.sort_by_key(|l| l.z_index);

        let mut bitmaps = HashMap::new();
        let mut entries = Vec::with_capacity(layers.len());
        for layer in &layers {
            let bitmap = state.current_entry(layer).and_then(ProcessedEntry::bitmap);
            if let Some(b) = bitmap {
                bitmaps.insert(layer.id.clone(), b.clone());
            }
            entries.push((ProcessKey::for_layer(layer), bitmap.is_some()));
        }

        Ok(SlotSnapshot {
            name: slot.clone(),
            canvas: s.canvas,
            revision: state.revision,
            layers,
            gradient: state.gradient.clone(),
            background: state.background,
            bitmaps,
            entries,
        })
    }

    /// Replace the contents of every slot at once.
    ///
    /// Everything is validated before anything changes; slots missing from `contents` are
    /// cleared. Blobs owned by the replaced layers are released.
    pub fn restore(&self, contents: BTreeMap<SlotName, SlotContents>) -> LiveryResult<()> {
        for (name, c) in &contents {
            let s = self
                .inner
                .slots
                .get(name)
                .ok_or_else(|| LiveryError::configuration(format!("unknown slot {name}")))?;
            let mut ids = HashSet::new();
            for layer in &c.layers {
                layer
                    .validate()
                    .map_err(|e| LiveryError::configuration(format!("{name}/{}: {e}", layer.id)))?;
                if !ids.insert(&layer.id) {
                    return Err(LiveryError::configuration(format!(
                        "duplicate layer id {} in slot {name}",
                        layer.id
                    )));
                }
            }
            if let Some(g) = &c.gradient {
                if !s.def.gradient {
                    return Err(LiveryError::configuration(format!(
                        "slot {name} does not take a gradient background"
                    )));
                }
                g.validate()
                    .map_err(|e| LiveryError::configuration(format!("{name}: {e}")))?;
            }
        }

        let mut contents = contents;
        for (name, s) in &self.inner.slots {
            let c = contents.remove(name).unwrap_or_default();
            let mut state = s.lock();
            let max_seq = c
                .layers
                .iter()
                .filter_map(|l| l.id.generated_seq(name))
                .max()
                .unwrap_or(0);
            state.next_seq = state.next_seq.max(max_seq);
            let old = std::mem::replace(&mut state.layers, c.layers);
            state.gradient = c.gradient;
            state.background = c.background;
            state.processed.clear();
            state.touch();
            s.publish(&state);
            drop(state);

            for h in old.iter().filter_map(|l| l.source.blob()) {
                self.release_blob(name, h);
            }
        }
        tracing::info!(slots = self.inner.slots.len(), "configuration restored");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/slots/store.rs"]
mod tests;
