use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::*;
use crate::assets::blob::BlobStore;
use crate::effects::recolor::RecolorMode;
use crate::foundation::core::{Bitmap, Rgb8};
use crate::foundation::error::LiveryError;
use crate::render::texture::{CpuTextureUploader, TextureFrame};
use crate::scene::catalog::SlotCatalog;
use crate::scene::model::{LayerDraft, LayerPatch, LayerSource};

struct MapLoader(HashMap<String, Bitmap>);

impl ImageLoader for MapLoader {
    async fn load(&self, source: &LayerSource) -> LiveryResult<Bitmap> {
        match source {
            LayerSource::Url(u) => self
                .0
                .get(u)
                .cloned()
                .ok_or_else(|| LiveryError::load(format!("no such asset {u}"))),
            LayerSource::Blob(h) => Err(LiveryError::load(format!("{h} unknown"))),
        }
    }
}

/// Uploader that can be switched into failing.
#[derive(Default)]
struct FlakyUploader {
    inner: CpuTextureUploader,
    failing: AtomicBool,
    attempts: AtomicU64,
}

impl TextureUploader for FlakyUploader {
    fn upload(&self, slot: &SlotName, frame: &TextureFrame) -> LiveryResult<TextureHandle> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(LiveryError::composite("device lost"));
        }
        self.inner.upload(slot, frame)
    }

    fn release(&self, handle: &TextureHandle) {
        self.inner.release(handle);
    }
}

fn setup() -> (SyncScheduler<MapLoader>, Arc<FlakyUploader>, SlotName) {
    let logo = Bitmap::from_straight(2, 2, [255, 255, 255, 255].repeat(4)).unwrap();
    let loader = MapLoader(HashMap::from([("logo.png".to_string(), logo)]));
    let store = SlotStore::new(&SlotCatalog::bicycle(), 32, BlobStore::new()).unwrap();
    let processor = Arc::new(LayerProcessor::new(
        Arc::new(loader),
        RecolorMode::FlatSilhouette,
    ));
    let uploader = Arc::new(FlakyUploader::default());
    let sched = SyncScheduler::new(
        store,
        processor,
        uploader.clone(),
        SchedulerOptions::default(),
    );
    (sched, uploader, SlotName::new("HEAD_TUBE"))
}

fn logo() -> LayerDraft {
    LayerDraft::new(LayerSource::Url("logo.png".into()), "logo").at(16.0, 16.0)
}

#[tokio::test]
async fn fresh_slots_are_clean() {
    let (sched, uploader, slot) = setup();
    assert_eq!(sched.run_pass(&slot).await.unwrap(), PassOutcome::Clean);
    assert_eq!(sched.phase(&slot).unwrap(), SyncPhase::Idle);
    assert_eq!(uploader.attempts.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn a_pass_processes_composites_and_commits() {
    let (sched, uploader, slot) = setup();
    sched.store().add_layer(&slot, logo()).unwrap();

    let PassOutcome::Committed(handle) = sched.run_pass(&slot).await.unwrap() else {
        panic!("expected a committed texture");
    };
    assert_eq!(sched.store().texture(&slot).unwrap(), Some(handle.clone()));
    assert!(!sched.store().is_dirty(&slot).unwrap());
    assert_eq!(sched.phase(&slot).unwrap(), SyncPhase::Idle);
    assert_eq!(sched.processor().process_calls(), 1);

    let frame = uploader.inner.frame(&handle).unwrap();
    assert_eq!(frame.bitmap.pixel(16, 16), Some([255, 255, 255, 255]));
    assert_eq!(sched.run_pass(&slot).await.unwrap(), PassOutcome::Clean);
}

#[tokio::test]
async fn new_textures_release_the_previous_one() {
    let (sched, uploader, slot) = setup();
    let id = sched.store().add_layer(&slot, logo()).unwrap();
    sched.settle(&slot).await.unwrap();
    sched
        .store()
        .update_layer(&slot, &id, LayerPatch::color(Some(Rgb8::new(0, 0, 255))))
        .unwrap();
    sched.settle(&slot).await.unwrap();

    assert_eq!(uploader.inner.uploads(), 2);
    assert_eq!(uploader.inner.live_for(&slot), 1);
    assert_eq!(sched.processor().process_calls(), 2);
}

#[tokio::test]
async fn renames_keep_the_committed_texture() {
    let (sched, uploader, slot) = setup();
    let id = sched.store().add_layer(&slot, logo()).unwrap();
    let committed = sched.settle(&slot).await.unwrap();

    let patch = LayerPatch {
        name: Some("renamed".into()),
        ..LayerPatch::default()
    };
    assert!(sched.store().update_layer(&slot, &id, patch).unwrap());
    assert!(sched.store().is_dirty(&slot).unwrap());

    assert_eq!(sched.run_pass(&slot).await.unwrap(), PassOutcome::Unchanged);
    assert!(!sched.store().is_dirty(&slot).unwrap());
    assert_eq!(uploader.inner.uploads(), 1);
    let PassOutcome::Committed(handle) = committed else {
        panic!("expected a committed texture");
    };
    assert_eq!(sched.store().texture(&slot).unwrap(), Some(handle));
}

#[tokio::test]
async fn removing_the_last_layer_clears_the_texture() {
    let (sched, uploader, slot) = setup();
    let id = sched.store().add_layer(&slot, logo()).unwrap();
    sched.settle(&slot).await.unwrap();
    sched.store().remove_layer(&slot, &id).unwrap();

    assert_eq!(sched.run_pass(&slot).await.unwrap(), PassOutcome::Cleared);
    assert_eq!(sched.store().texture(&slot).unwrap(), None);
    assert_eq!(uploader.inner.live(), 0);
}

#[tokio::test]
async fn upload_failures_keep_the_last_texture() {
    let (sched, uploader, slot) = setup();
    let id = sched.store().add_layer(&slot, logo()).unwrap();
    sched.settle(&slot).await.unwrap();
    let before = sched.store().texture(&slot).unwrap();

    uploader.failing.store(true, Ordering::Relaxed);
    sched
        .store()
        .update_layer(&slot, &id, LayerPatch::position(4.0, 4.0))
        .unwrap();
    let err = sched.run_pass(&slot).await.unwrap_err();
    assert!(matches!(err, LiveryError::Composite(_)));
    assert_eq!(sched.store().texture(&slot).unwrap(), before);
    assert!(sched.store().is_dirty(&slot).unwrap());
    assert_eq!(sched.phase(&slot).unwrap(), SyncPhase::Failed);

    uploader.failing.store(false, Ordering::Relaxed);
    assert!(matches!(
        sched.run_pass(&slot).await.unwrap(),
        PassOutcome::Committed(_)
    ));
    assert_eq!(sched.phase(&slot).unwrap(), SyncPhase::Idle);
}

#[tokio::test]
async fn missing_assets_leave_the_layer_out() {
    let (sched, uploader, slot) = setup();
    sched
        .store()
        .add_layer(
            &slot,
            LayerDraft::new(LayerSource::Url("gone.png".into()), "gone"),
        )
        .unwrap();
    sched
        .store()
        .set_background_color(&slot, Some(Rgb8::new(0, 128, 0)))
        .unwrap();

    let PassOutcome::Committed(handle) = sched.settle(&slot).await.unwrap() else {
        panic!("expected a committed texture");
    };
    let frame = uploader.inner.frame(&handle).unwrap();
    assert_eq!(frame.bitmap.pixel(16, 16), Some([0, 128, 0, 255]));

    // The failure is remembered for the same key.
    sched
        .store()
        .set_background_color(&slot, Some(Rgb8::new(0, 0, 0)))
        .unwrap();
    sched.settle(&slot).await.unwrap();
    assert_eq!(sched.processor().process_calls(), 1);
}

#[tokio::test]
async fn settle_all_reports_per_slot() {
    let (sched, _uploader, slot) = setup();
    sched.store().add_layer(&slot, logo()).unwrap();

    let out = sched.settle_all().await;
    assert_eq!(out.len(), sched.store().slot_names().len());
    assert!(matches!(out[&slot], Ok(PassOutcome::Committed(_))));
    assert!(matches!(out[&SlotName::new("FRAME")], Ok(PassOutcome::Clean)));
}

#[tokio::test]
async fn unknown_slots_are_rejected() {
    let (sched, _uploader, _) = setup();
    let nope = SlotName::new("NOPE");
    assert!(sched.phase(&nope).is_err());
    assert!(sched.run_pass(&nope).await.is_err());
}
