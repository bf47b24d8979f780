//! Wiring of store, loader, processor, scheduler and uploader into one session.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::assets::blob::BlobStore;
use crate::assets::decode::encode_png;
use crate::assets::loader::{AssetLoader, CachedLoader};
use crate::config::EngineConfig;
use crate::editor::LayerEditor;
use crate::foundation::error::LiveryResult;
use crate::render::texture::{CpuTextureUploader, TextureFrame};
use crate::scene::model::SlotName;
use crate::scene::saved::{SaveReport, SavedConfiguration};
use crate::slots::processor::LayerProcessor;
use crate::slots::store::SlotStore;
use crate::sync::scheduler::{PassOutcome, SchedulerHandle, SyncScheduler};

/// Loader stack used by the engine: filesystem and blob assets behind a decode cache.
pub type EngineLoader = CachedLoader<AssetLoader>;

/// A configured texture pipeline with an in-memory texture target.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: SlotStore,
    uploader: Arc<CpuTextureUploader>,
    scheduler: Arc<SyncScheduler<EngineLoader>>,
}

impl Engine {
    /// Build every component from `config`.
    pub fn new(config: EngineConfig) -> LiveryResult<Self> {
        config.validate()?;
        let blobs = BlobStore::new();
        let store = SlotStore::new(&config.slots, config.base_size, blobs.clone())?;
        let loader = Arc::new(CachedLoader::new(AssetLoader::new(
            config.assets_root.clone(),
            blobs,
        )));
        let processor = Arc::new(LayerProcessor::new(loader, config.recolor_mode));
        let uploader = Arc::new(CpuTextureUploader::new());
        let scheduler = Arc::new(SyncScheduler::new(
            store.clone(),
            processor,
            uploader.clone(),
            config.scheduler_options(),
        ));
        tracing::debug!(
            base_size = config.base_size,
            slots = store.slot_names().len(),
            root = %config.assets_root.display(),
            "engine ready"
        );
        Ok(Self {
            config,
            store,
            uploader,
            scheduler,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Slot state; all edits go through here.
    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Arc<SyncScheduler<EngineLoader>> {
        &self.scheduler
    }

    /// Texture target holding every committed frame.
    pub fn uploader(&self) -> &Arc<CpuTextureUploader> {
        &self.uploader
    }

    /// Start the per-slot background tasks. Requires a Tokio runtime.
    pub fn spawn(&self) -> LiveryResult<SchedulerHandle> {
        Arc::clone(&self.scheduler).spawn()
    }

    /// Editor for `slot` shown at `proxy_width` pixels.
    pub fn editor(&self, slot: &SlotName, proxy_width: f64) -> LiveryResult<LayerEditor> {
        LayerEditor::new(self.store.clone(), slot.clone(), proxy_width)
    }

    /// Replace all slot content with a saved configuration.
    pub fn load_configuration(&self, json: &str) -> LiveryResult<()> {
        SavedConfiguration::from_json(json)?.apply(&self.store)
    }

    /// Capture the persistable part of the current content.
    pub fn save_configuration(&self) -> LiveryResult<SaveReport> {
        SavedConfiguration::capture(&self.store)
    }

    /// Run passes on every slot until each is clean or failed.
    pub async fn settle_all(&self) -> BTreeMap<SlotName, LiveryResult<PassOutcome>> {
        self.scheduler.settle_all().await
    }

    /// Pixels of the slot's committed texture.
    pub fn texture_frame(&self, slot: &SlotName) -> LiveryResult<Option<Arc<TextureFrame>>> {
        Ok(self
            .store
            .texture(slot)?
            .and_then(|h| self.uploader.frame(&h)))
    }

    /// Write the slot's committed texture as a PNG. Returns `false` when the slot has none.
    pub async fn export_png(&self, slot: &SlotName, path: &Path) -> LiveryResult<bool> {
        let Some(frame) = self.texture_frame(slot)? else {
            return Ok(false);
        };
        let png = encode_png(&frame.bitmap)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("write png '{}'", path.display()))?;
        tracing::info!(%slot, path = %path.display(), "texture exported");
        Ok(true)
    }
}
