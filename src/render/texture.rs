use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Bitmap, CanvasSize, ColorSpace};
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::model::SlotName;

/// Opaque id of an uploaded texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(u64);

impl TextureId {
    /// Wrap a raw id handed out by an uploader.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Pixel format of uploaded textures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB-encoded color, premultiplied alpha.
    #[default]
    Rgba8UnormSrgb,
}

/// What the 3D renderer receives for a slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// Uploader-assigned id.
    pub id: TextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color space tag.
    pub color_space: ColorSpace,
    /// Pixel format.
    pub format: TextureFormat,
}

impl TextureHandle {
    /// Handle for an sRGB RGBA8 texture of `size`.
    pub fn new(id: TextureId, size: CanvasSize) -> Self {
        Self {
            id,
            width: size.width,
            height: size.height,
            color_space: ColorSpace::Srgb,
            format: TextureFormat::Rgba8UnormSrgb,
        }
    }
}

/// A composited slot image ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureFrame {
    /// Premultiplied pixels.
    pub bitmap: Bitmap,
    /// Color space the bytes are encoded in.
    pub color_space: ColorSpace,
}

impl TextureFrame {
    /// sRGB-tagged frame.
    pub fn srgb(bitmap: Bitmap) -> Self {
        Self {
            bitmap,
            color_space: ColorSpace::Srgb,
        }
    }

    /// Frame dimensions.
    pub fn size(&self) -> CanvasSize {
        self.bitmap.size()
    }
}

/// Bridge to whatever owns GPU textures.
///
/// The scheduler uploads one frame per committed composite and releases handles it replaced
/// or that were superseded before they could be committed.
pub trait TextureUploader: Send + Sync {
    /// Create a texture holding `frame`.
    fn upload(&self, slot: &SlotName, frame: &TextureFrame) -> LiveryResult<TextureHandle>;

    /// Drop a texture that is no longer referenced.
    fn release(&self, handle: &TextureHandle);
}

/// In-memory uploader: frames stay in a map and can be read back by handle.
#[derive(Debug, Default)]
pub struct CpuTextureUploader {
    next_id: AtomicU64,
    frames: Mutex<HashMap<TextureId, (SlotName, Arc<TextureFrame>)>>,
}

impl CpuTextureUploader {
    /// Empty uploader.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TextureId, (SlotName, Arc<TextureFrame>)>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pixels behind a live handle.
    pub fn frame(&self, handle: &TextureHandle) -> Option<Arc<TextureFrame>> {
        self.lock().get(&handle.id).map(|(_, f)| f.clone())
    }

    /// Number of live textures.
    pub fn live(&self) -> usize {
        self.lock().len()
    }

    /// Number of live textures uploaded for `slot`.
    pub fn live_for(&self, slot: &SlotName) -> usize {
        self.lock().values().filter(|(s, _)| s == slot).count()
    }

    /// Total uploads so far.
    pub fn uploads(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl TextureUploader for CpuTextureUploader {
    fn upload(&self, slot: &SlotName, frame: &TextureFrame) -> LiveryResult<TextureHandle> {
        let size = frame.size();
        if size.rgba8_len() != frame.bitmap.rgba8_premul.len() {
            return Err(LiveryError::composite(format!(
                "frame for {slot} has {} bytes, expected {}",
                frame.bitmap.rgba8_premul.len(),
                size.rgba8_len()
            )));
        }
        let id = TextureId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock()
            .insert(id, (slot.clone(), Arc::new(frame.clone())));
        Ok(TextureHandle::new(id, size))
    }

    fn release(&self, handle: &TextureHandle) {
        if self.lock().remove(&handle.id).is_none() {
            tracing::warn!(texture = %handle.id, "release of unknown texture");
        }
    }
}
