use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::error::{LiveryError, LiveryResult};

/// Handle to user-uploaded bytes held by a [`BlobStore`].
///
/// Handles are plain ids; ownership is tracked by the store's reference counts, so a handle
/// must be released once per reference it was handed out (or retained) with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHandle(u64);

impl BlobHandle {
    /// Raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:livery/{}", self.0)
    }
}

#[derive(Debug)]
struct BlobEntry {
    bytes: Arc<Vec<u8>>,
    refs: u32,
}

#[derive(Debug, Default)]
struct BlobInner {
    next_id: u64,
    entries: HashMap<BlobHandle, BlobEntry>,
    release_calls: u64,
    revoked: u64,
}

/// Counters exposed for leak/double-free checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobStats {
    /// Blobs currently alive.
    pub live: usize,
    /// Successful `release` calls.
    pub release_calls: u64,
    /// Blobs whose last reference was released.
    pub revoked: u64,
}

/// Reference-counted store of in-memory image uploads.
///
/// Cloning the store shares the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct BlobStore {
    inner: Arc<Mutex<BlobInner>>,
}

impl BlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BlobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of uploaded bytes. The returned handle carries one reference.
    pub fn insert(&self, bytes: Vec<u8>) -> BlobHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let handle = BlobHandle(inner.next_id);
        inner.entries.insert(
            handle,
            BlobEntry {
                bytes: Arc::new(bytes),
                refs: 1,
            },
        );
        tracing::debug!(blob = %handle, "blob inserted");
        handle
    }

    /// Add a reference for a second owner of the same bytes.
    pub fn retain(&self, handle: BlobHandle) -> LiveryResult<()> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(&handle)
            .ok_or_else(|| LiveryError::validation(format!("{handle} is not alive")))?;
        entry.refs = entry.refs.saturating_add(1);
        Ok(())
    }

    /// Drop one reference. Returns `true` when this was the last one and the bytes are gone.
    ///
    /// Releasing a handle that is no longer alive is an error (double release).
    pub fn release(&self, handle: BlobHandle) -> LiveryResult<bool> {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(&handle) else {
            tracing::warn!(blob = %handle, "release of a blob that is not alive");
            return Err(LiveryError::validation(format!(
                "{handle} released more than once"
            )));
        };
        entry.refs = entry.refs.saturating_sub(1);
        let revoke = entry.refs == 0;
        if revoke {
            inner.entries.remove(&handle);
            inner.revoked += 1;
        }
        inner.release_calls += 1;
        tracing::debug!(blob = %handle, revoked = revoke, "blob released");
        Ok(revoke)
    }

    /// Shared bytes of a live blob.
    pub fn bytes(&self, handle: BlobHandle) -> LiveryResult<Arc<Vec<u8>>> {
        self.lock()
            .entries
            .get(&handle)
            .map(|e| Arc::clone(&e.bytes))
            .ok_or_else(|| LiveryError::load(format!("{handle} has been released")))
    }

    /// Return `true` while the blob has at least one reference.
    pub fn is_alive(&self, handle: BlobHandle) -> bool {
        self.lock().entries.contains_key(&handle)
    }

    /// Current counters.
    pub fn stats(&self) -> BlobStats {
        let inner = self.lock();
        BlobStats {
            live: inner.entries.len(),
            release_calls: inner.release_calls,
            revoked: inner.revoked,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/blob.rs"]
mod tests;
