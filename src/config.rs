//! Engine configuration, loadable from JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::effects::recolor::RecolorMode;
use crate::foundation::core::MAX_CANVAS_DIM;
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::catalog::SlotCatalog;
use crate::sync::scheduler::SchedulerOptions;

/// Everything needed to stand up an [`crate::Engine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Width of every slot's canonical raster; height follows the slot's aspect ratio.
    pub base_size: u32,
    /// Quiescence window in milliseconds.
    pub debounce_ms: u64,
    /// How tints are applied.
    pub recolor_mode: RecolorMode,
    /// Directory asset URLs are resolved against.
    pub assets_root: PathBuf,
    /// Slot catalog.
    pub slots: SlotCatalog,
    /// Passes a settle may run before giving up.
    pub max_settle_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_size: 1024,
            debounce_ms: 48,
            recolor_mode: RecolorMode::default(),
            assets_root: PathBuf::from("."),
            slots: SlotCatalog::bicycle(),
            max_settle_passes: 16,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> LiveryResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read engine config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .map_err(|e| LiveryError::configuration(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject sizes and catalogs the engine cannot work with.
    pub fn validate(&self) -> LiveryResult<()> {
        if self.base_size == 0 || self.base_size > MAX_CANVAS_DIM {
            return Err(LiveryError::validation(format!(
                "base_size must be in 1..={MAX_CANVAS_DIM}, got {}",
                self.base_size
            )));
        }
        if self.max_settle_passes == 0 {
            return Err(LiveryError::validation("max_settle_passes must be > 0"));
        }
        self.slots.validate()
    }

    /// Scheduler options derived from this config.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            max_settle_passes: self.max_settle_passes,
        }
    }
}
