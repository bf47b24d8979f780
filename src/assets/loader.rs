use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::assets::blob::BlobStore;
use crate::assets::decode::decode_image;
use crate::foundation::core::Bitmap;
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::scene::model::LayerSource;

/// Resolves a layer source to a decoded bitmap.
///
/// Loads for distinct sources run independently; implementations must not assume any ordering
/// between concurrent calls. Failures are [`LiveryError::Load`] or [`LiveryError::Decode`].
pub trait ImageLoader: Send + Sync + 'static {
    /// Fetch and decode `source`.
    fn load(&self, source: &LayerSource) -> impl Future<Output = LiveryResult<Bitmap>> + Send;
}

/// Normalize and validate asset-root-relative paths.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths
/// or parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> LiveryResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(LiveryError::load("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(LiveryError::load("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(LiveryError::load("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(LiveryError::load("asset path must contain a file name"));
    }

    Ok(out.join("/"))
}

/// Loader for static assets under a root directory plus in-memory uploads.
///
/// URLs may be plain relative paths or `file://` relative paths. `http(s)` URLs are rejected:
/// hosts that fetch remote images provide their own [`ImageLoader`].
#[derive(Clone, Debug)]
pub struct AssetLoader {
    root: PathBuf,
    blobs: BlobStore,
}

impl AssetLoader {
    /// Loader reading relative URLs under `root` and blobs from `blobs`.
    pub fn new(root: impl Into<PathBuf>, blobs: BlobStore) -> Self {
        Self {
            root: root.into(),
            blobs,
        }
    }

    /// Asset root directory.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Map a URL onto a path under the asset root.
    pub fn resolve_url(&self, url: &str) -> LiveryResult<PathBuf> {
        let url = url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            return Err(LiveryError::load(format!(
                "remote url {url} needs a network-capable loader"
            )));
        }
        let rel = url.strip_prefix("file://").unwrap_or(url);
        Ok(self.root.join(normalize_rel_path(rel)?))
    }

    async fn read_file(&self, url: &str) -> LiveryResult<Vec<u8>> {
        let path = self.resolve_url(url)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| LiveryError::load(format!("read {}: {e}", path.display())))
    }
}

impl ImageLoader for AssetLoader {
    async fn load(&self, source: &LayerSource) -> LiveryResult<Bitmap> {
        match source {
            LayerSource::Url(url) => decode_image(&self.read_file(url).await?),
            // Decoded straight from the shared upload.
            LayerSource::Blob(handle) => decode_image(&self.blobs.bytes(*handle)?),
        }
    }
}

/// Decoded-bitmap cache in front of another loader.
///
/// Only successful loads of URL sources are cached. Blob sources always go through the wrapped
/// loader, so a released upload can never be served from here. Concurrent first loads of the
/// same source are not coalesced; both decode and the later result wins the cache slot.
#[derive(Debug)]
pub struct CachedLoader<L> {
    inner: L,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    bitmaps: HashMap<LayerSource, Bitmap>,
    decodes: HashMap<LayerSource, u64>,
}

impl<L: ImageLoader> CachedLoader<L> {
    /// Wrap `inner`.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wrapped loader.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// How many times `source` went through the wrapped loader successfully.
    pub fn decode_count(&self, source: &LayerSource) -> u64 {
        self.lock().decodes.get(source).copied().unwrap_or(0)
    }

    /// Drop the cached bitmap for `source`, e.g. after the asset changed on disk.
    pub fn evict(&self, source: &LayerSource) -> bool {
        self.lock().bitmaps.remove(source).is_some()
    }

    /// Number of cached bitmaps.
    pub fn len(&self) -> usize {
        self.lock().bitmaps.len()
    }

    /// Return `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: ImageLoader> ImageLoader for CachedLoader<L> {
    async fn load(&self, source: &LayerSource) -> LiveryResult<Bitmap> {
        if matches!(source, LayerSource::Blob(_)) {
            return self.inner.load(source).await;
        }
        let hit = self.lock().bitmaps.get(source).cloned();
        if let Some(hit) = hit {
            return Ok(hit);
        }
        let bitmap = self.inner.load(source).await?;
        let mut state = self.lock();
        *state.decodes.entry(source.clone()).or_insert(0) += 1;
        state.bitmaps.insert(source.clone(), bitmap.clone());
        Ok(bitmap)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
