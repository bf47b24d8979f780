use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::assets::loader::ImageLoader;
use crate::foundation::error::{LiveryError, LiveryResult};
use crate::render::compositor::Compositor;
use crate::render::fingerprint::fingerprint_snapshot;
use crate::render::texture::{TextureHandle, TextureUploader};
use crate::scene::model::SlotName;
use crate::slots::processor::LayerProcessor;
use crate::slots::store::{SlotStore, SlotView, TextureCommit};
use crate::sync::phase::{SyncEvent, SyncPhase};

/// Default quiescence window before a dirty slot is recomposited.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(48);

/// Tuning knobs of the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Edits closer together than this coalesce into one pass.
    pub debounce: Duration,
    /// Upper bound on passes [`SyncScheduler::settle`] runs before giving up.
    pub max_settle_passes: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_settle_passes: 16,
        }
    }
}

/// What one synchronization pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The slot was not dirty.
    Clean,
    /// A new texture was uploaded and committed.
    Committed(TextureHandle),
    /// Nothing that affects pixels changed; the committed texture was kept.
    Unchanged,
    /// The slot became blank and its texture was dropped.
    Cleared,
    /// Content changed during the pass; its result was thrown away.
    Superseded,
}

/// Keeps every slot's texture in step with its content.
///
/// Each pass processes the layers whose key changed (concurrently), composites once every layer
/// has a current entry and commits the texture only if no edit happened in between.
pub struct SyncScheduler<L> {
    store: SlotStore,
    processor: Arc<LayerProcessor<L>>,
    compositor: Compositor,
    uploader: Arc<dyn TextureUploader>,
    opts: SchedulerOptions,
    phases: BTreeMap<SlotName, watch::Sender<SyncPhase>>,
}

impl<L> std::fmt::Debug for SyncScheduler<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("store", &self.store)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl<L: ImageLoader> SyncScheduler<L> {
    /// Scheduler over every slot of `store`.
    pub fn new(
        store: SlotStore,
        processor: Arc<LayerProcessor<L>>,
        uploader: Arc<dyn TextureUploader>,
        opts: SchedulerOptions,
    ) -> Self {
        let phases = store
            .slot_names()
            .into_iter()
            .map(|name| (name, watch::channel(SyncPhase::Idle).0))
            .collect();
        Self {
            store,
            processor,
            compositor: Compositor::new(),
            uploader,
            opts,
            phases,
        }
    }

    /// The store being synchronized.
    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    /// The layer processor.
    pub fn processor(&self) -> &Arc<LayerProcessor<L>> {
        &self.processor
    }

    /// Options in effect.
    pub fn options(&self) -> &SchedulerOptions {
        &self.opts
    }

    fn phase_tx(&self, slot: &SlotName) -> LiveryResult<&watch::Sender<SyncPhase>> {
        self.phases
            .get(slot)
            .ok_or_else(|| LiveryError::validation(format!("unknown slot {slot}")))
    }

    /// Current phase of `slot`.
    pub fn phase(&self, slot: &SlotName) -> LiveryResult<SyncPhase> {
        Ok(*self.phase_tx(slot)?.borrow())
    }

    /// Watch phase transitions of `slot`.
    pub fn subscribe_phase(&self, slot: &SlotName) -> LiveryResult<watch::Receiver<SyncPhase>> {
        Ok(self.phase_tx(slot)?.subscribe())
    }

    fn advance(&self, slot: &SlotName, event: SyncEvent) {
        let Some(tx) = self.phases.get(slot) else {
            return;
        };
        tx.send_if_modified(|p| {
            let next = p.next(event);
            if next == *p {
                return false;
            }
            tracing::trace!(%slot, from = %p, to = %next, ?event, "phase");
            *p = next;
            true
        });
    }

    /// Run one pass for `slot`: process changed layers, then composite and commit.
    ///
    /// Errors are composite or upload failures; the previously committed texture stays in
    /// place and the slot stays dirty until the next edit.
    pub async fn run_pass(&self, slot: &SlotName) -> LiveryResult<PassOutcome> {
        self.pass(slot, &mut None).await
    }

    /// [`Self::run_pass`], recording in `attempted` the revision the pass worked on.
    #[tracing::instrument(level = "debug", skip(self, slot, attempted), fields(slot = %slot))]
    async fn pass(
        &self,
        slot: &SlotName,
        attempted: &mut Option<u64>,
    ) -> LiveryResult<PassOutcome> {
        if !self.store.is_dirty(slot)? {
            self.advance(slot, SyncEvent::Clean);
            return Ok(PassOutcome::Clean);
        }
        self.advance(slot, SyncEvent::Edited);
        self.advance(slot, SyncEvent::QuiescenceElapsed);

        let (revision, pending) = self.store.pending_layers(slot)?;
        *attempted = Some(revision);
        if !pending.is_empty() {
            tracing::debug!(%slot, revision, layers = pending.len(), "processing layers");
            let mut set = JoinSet::new();
            for layer in pending {
                let processor = Arc::clone(&self.processor);
                let store = self.store.clone();
                let slot = slot.clone();
                set.spawn(async move { processor.refresh_layer(&store, &slot, &layer).await });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(%slot, error = %e, "layer refresh failed"),
                    Err(e) => tracing::warn!(%slot, error = %e, "layer task aborted"),
                }
            }
        }

        if self.store.revision(slot)? != revision {
            self.advance(slot, SyncEvent::Superseded);
            return Ok(PassOutcome::Superseded);
        }
        self.advance(slot, SyncEvent::LayersReady);

        let snapshot = self.store.snapshot(slot)?;
        if snapshot.revision != revision {
            self.advance(slot, SyncEvent::Superseded);
            return Ok(PassOutcome::Superseded);
        }
        let fingerprint = fingerprint_snapshot(&snapshot);

        if snapshot.is_blank() {
            let refused = self.commit(slot, None, revision, fingerprint)?;
            return Ok(refused.unwrap_or(PassOutcome::Cleared));
        }

        if self.store.committed_fingerprint(slot)? == Some(fingerprint)
            && self.store.texture(slot)?.is_some()
        {
            return Ok(if self.store.commit_unchanged(slot, revision)? {
                tracing::debug!(%slot, revision, "composite unchanged, texture kept");
                self.advance(slot, SyncEvent::Composited);
                PassOutcome::Unchanged
            } else {
                self.advance(slot, SyncEvent::Superseded);
                PassOutcome::Superseded
            });
        }

        let uploaded = self
            .compositor
            .composite(&snapshot)
            .and_then(|frame| self.uploader.upload(slot, &frame));
        let handle = match uploaded {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(%slot, revision, error = %e, "composite failed, keeping last texture");
                self.advance(slot, SyncEvent::Failed);
                return Err(e);
            }
        };
        Ok(self
            .commit(slot, Some(handle.clone()), revision, fingerprint)?
            .unwrap_or(PassOutcome::Committed(handle)))
    }

    /// Commit `texture`; `Some(Superseded)` when the store refused it.
    fn commit(
        &self,
        slot: &SlotName,
        texture: Option<TextureHandle>,
        revision: u64,
        fingerprint: u64,
    ) -> LiveryResult<Option<PassOutcome>> {
        match self
            .store
            .set_texture(slot, texture.clone(), revision, fingerprint)?
        {
            TextureCommit::Committed { previous } => {
                if let Some(old) = previous {
                    self.uploader.release(&old);
                }
                tracing::debug!(%slot, revision, cleared = texture.is_none(), "texture committed");
                self.advance(slot, SyncEvent::Composited);
                Ok(None)
            }
            TextureCommit::Superseded => {
                if let Some(h) = texture {
                    self.uploader.release(&h);
                }
                self.advance(slot, SyncEvent::Superseded);
                Ok(Some(PassOutcome::Superseded))
            }
        }
    }

    /// Run passes until `slot` is clean.
    ///
    /// Returns the last meaningful outcome, or the first composite failure.
    pub async fn settle(&self, slot: &SlotName) -> LiveryResult<PassOutcome> {
        let mut last = PassOutcome::Clean;
        for _ in 0..self.opts.max_settle_passes {
            match self.run_pass(slot).await? {
                PassOutcome::Clean => return Ok(last),
                PassOutcome::Superseded => continue,
                outcome => last = outcome,
            }
            if !self.store.is_dirty(slot)? {
                return Ok(last);
            }
        }
        Err(LiveryError::Other(anyhow::anyhow!(
            "slot {slot} still dirty after {} passes",
            self.opts.max_settle_passes
        )))
    }

    /// Settle every slot, one after the other. Failures stay local to their slot.
    pub async fn settle_all(&self) -> BTreeMap<SlotName, LiveryResult<PassOutcome>> {
        let mut out = BTreeMap::new();
        for slot in self.phases.keys() {
            let result = self.settle(slot).await;
            if let Err(e) = &result {
                tracing::warn!(%slot, error = %e, "slot failed to settle");
            }
            out.insert(slot.clone(), result);
        }
        out
    }

    /// Start one background task per slot that reacts to edits after the debounce window.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self: Arc<Self>) -> LiveryResult<SchedulerHandle> {
        let mut tasks = Vec::with_capacity(self.phases.len());
        for slot in self.phases.keys() {
            let view = self.store.subscribe(slot)?;
            let sched = Arc::clone(&self);
            let slot = slot.clone();
            tasks.push(tokio::spawn(async move { sched.slot_loop(slot, view).await }));
        }
        tracing::info!(
            slots = tasks.len(),
            debounce_ms = self.opts.debounce.as_millis() as u64,
            "scheduler started"
        );
        Ok(SchedulerHandle { tasks })
    }

    async fn slot_loop(
        self: Arc<Self>,
        slot: SlotName,
        mut view: watch::Receiver<SlotView>,
    ) {
        // Revision whose pass failed; not retried until the content changes again.
        let mut failed_at = None;
        loop {
            let wanted = {
                let v = view.borrow_and_update();
                v.dirty && failed_at != Some(v.revision)
            };
            if !wanted {
                if view.changed().await.is_err() {
                    return;
                }
                continue;
            }

            self.advance(&slot, SyncEvent::Edited);
            loop {
                tokio::select! {
                    changed = view.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(self.opts.debounce) => break,
                }
            }

            let mut attempted = None;
            match self.pass(&slot, &mut attempted).await {
                Ok(PassOutcome::Superseded) => {}
                Ok(_) => failed_at = None,
                // Edits that landed during the failed pass still get their own pass.
                Err(_) => failed_at = attempted.or_else(|| self.store.revision(&slot).ok()),
            }
        }
    }
}

/// Running per-slot scheduler tasks. Dropping the handle stops them.
#[derive(Debug)]
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every slot task and wait for them to wind down.
    pub async fn shutdown(mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sync/scheduler.rs"]
mod tests;
