//! Livery keeps the textures of a 3D product configurator in step with what the user edits.
//!
//! Each named slot (a UV region of the model) holds layers of logo artwork, an optional gradient
//! and an optional background color. Edits go through the [`SlotStore`]; the
//! [`SyncScheduler`] notices them, loads and tints the affected layers, composites the slot on
//! the CPU and hands the result to a [`TextureUploader`].
//!
//! - Build an [`Engine`] from an [`EngineConfig`]
//! - Edit slots through [`Engine::store`] or a [`LayerEditor`]
//! - Let the scheduler run in the background ([`Engine::spawn`]) or drive it with
//!   [`Engine::settle_all`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod config;
mod editor;
mod effects;
mod engine;
mod foundation;
mod render;
mod scene;
mod slots;
mod sync;

pub use crate::foundation::core::{
    Affine, Bitmap, CanvasSize, ColorSpace, MAX_CANVAS_DIM, Point, Rect, Rgb8, Vec2,
};
pub use crate::foundation::error::{LiveryError, LiveryResult};

pub use crate::assets::blob::{BlobHandle, BlobStats, BlobStore};
pub use crate::assets::decode::{decode_image, decode_svg, encode_png};
pub use crate::assets::loader::{AssetLoader, CachedLoader, ImageLoader, normalize_rel_path};
pub use crate::config::EngineConfig;
pub use crate::editor::{LayerEditor, MIN_SCALE, Selection};
pub use crate::effects::gradient::rasterize as rasterize_gradient;
pub use crate::effects::recolor::{RecolorMode, recolor};
pub use crate::engine::{Engine, EngineLoader};
pub use crate::render::compositor::Compositor;
pub use crate::render::texture::{
    CpuTextureUploader, TextureFormat, TextureFrame, TextureHandle, TextureId, TextureUploader,
};
pub use crate::scene::catalog::{SlotCatalog, SlotDef};
pub use crate::scene::model::{
    BlendMode, ColorStop, GradientKind, GradientSettings, GradientTransition, Layer, LayerDraft,
    LayerId, LayerPatch, LayerScale, LayerSource, LinearDirection, SlotName,
};
pub use crate::scene::saved::{
    SAVED_FORMAT_VERSION, SaveReport, SavedConfiguration, SavedLayer, SavedSlot,
};
pub use crate::slots::processor::{
    LayerProcessor, ProcessKey, ProcessedBitmap, ProcessedEntry, RefreshOutcome,
};
pub use crate::slots::store::{
    CommitOutcome, LayerReady, SlotContents, SlotSnapshot, SlotStore, SlotView, TextureCommit,
};
pub use crate::sync::phase::{SyncEvent, SyncPhase};
pub use crate::sync::scheduler::{
    DEFAULT_DEBOUNCE, PassOutcome, SchedulerHandle, SchedulerOptions, SyncScheduler,
};
