use super::*;
use crate::foundation::core::Point;
use crate::render::texture::TextureId;
use crate::scene::model::{ColorStop, LayerScale, LinearDirection};
use crate::slots::processor::ProcessedBitmap;

fn store() -> SlotStore {
    SlotStore::new(&SlotCatalog::bicycle(), 1024, BlobStore::new()).unwrap()
}

fn head() -> SlotName {
    SlotName::new("HEAD_TUBE")
}

fn url(u: &str) -> LayerSource {
    LayerSource::Url(u.to_string())
}

fn ready_entry(layer: &Layer) -> ProcessedEntry {
    ProcessedEntry::Ready(ProcessedBitmap {
        key: ProcessKey::for_layer(layer),
        bitmap: Bitmap::from_premul(2, 2, vec![255u8; 16]).unwrap(),
        recolored: false,
    })
}

fn texture(id: u64, store: &SlotStore, slot: &SlotName) -> TextureHandle {
    TextureHandle::new(TextureId::new(id), store.canvas(slot).unwrap())
}

#[test]
fn canvas_sizes_follow_aspect_ratios() {
    let s = store();
    let c = s.canvas(&SlotName::new("DOWN_TUBE_LEFT")).unwrap();
    assert_eq!((c.width, c.height), (1024, 128));
    let c = s.canvas(&SlotName::new("SEAT_TUBE")).unwrap();
    assert_eq!((c.width, c.height), (1024, 256));
    let c = s.canvas(&head()).unwrap();
    assert_eq!((c.width, c.height), (1024, 1024));
    assert!(s.canvas(&SlotName::new("NOPE")).is_err());
}

#[test]
fn add_layer_assigns_defaults_and_fresh_ids() {
    let s = store();
    let a = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let b = s.add_layer(&head(), LayerDraft::new(url("b.png"), "b")).unwrap();
    assert_eq!(a.as_str(), "HEAD_TUBE#1");

    let la = s.layer(&head(), &a).unwrap();
    assert_eq!(la.position, Point::new(512.0, 512.0));
    assert_eq!(la.z_index, 0);
    assert_eq!(s.layer(&head(), &b).unwrap().z_index, 1);

    s.remove_layer(&head(), &b).unwrap();
    let c = s.add_layer(&head(), LayerDraft::new(url("c.png"), "c")).unwrap();
    assert_ne!(c, b);
    assert_eq!(c.as_str(), "HEAD_TUBE#3");
}

#[test]
fn add_layer_rejects_invalid_drafts_and_releases_their_blob() {
    let s = store();
    let h = s.blobs().insert(vec![1, 2, 3]);
    let draft = LayerDraft::new(LayerSource::Blob(h), "bad").scaled(LayerScale::uniform(0.0));
    assert!(matches!(
        s.add_layer(&head(), draft).unwrap_err(),
        LiveryError::Validation(_)
    ));
    assert!(!s.blobs().is_alive(h));
    assert!(s.layers(&head()).unwrap().is_empty());
    assert_eq!(s.revision(&head()).unwrap(), 0);
}

#[test]
fn remove_layer_purges_processed_entry_and_releases_blob() {
    let s = store();
    let h = s.blobs().insert(vec![0u8; 4]);
    let id = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Blob(h), "logo"))
        .unwrap();
    let layer = s.layer(&head(), &id).unwrap();
    assert_eq!(
        s.commit_processed(&head(), ready_entry(&layer)).unwrap(),
        CommitOutcome::Inserted
    );
    assert!(s.processed(&head(), &id).unwrap().is_some());

    s.remove_layer(&head(), &id).unwrap();
    assert!(s.processed(&head(), &id).unwrap().is_none());
    let stats = s.blobs().stats();
    assert_eq!(stats.release_calls, 1);
    assert_eq!(stats.live, 0);
}

#[test]
fn n_blob_layer_removals_release_n_blobs() {
    let s = store();
    let ids = (0..5)
        .map(|i| {
            let h = s.blobs().insert(vec![i]);
            s.add_layer(&head(), LayerDraft::new(LayerSource::Blob(h), format!("l{i}")))
                .unwrap()
        })
        .collect::<Vec<_>>();
    for id in &ids {
        s.remove_layer(&head(), id).unwrap();
    }
    let stats = s.blobs().stats();
    assert_eq!(stats.release_calls, 5);
    assert_eq!(stats.revoked, 5);
    assert_eq!(stats.live, 0);
}

#[test]
fn replace_source_releases_the_old_blob_exactly_once() {
    let s = store();
    let first = s.blobs().insert(vec![1]);
    let second = s.blobs().insert(vec![2]);
    let id = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Blob(first), "logo"))
        .unwrap();

    // same source again: nothing to release
    assert!(!s.replace_source(&head(), &id, LayerSource::Blob(first)).unwrap());
    assert!(s.blobs().is_alive(first));

    assert!(s.replace_source(&head(), &id, LayerSource::Blob(second)).unwrap());
    assert!(!s.blobs().is_alive(first));
    assert!(s.blobs().is_alive(second));

    assert!(s.replace_source(&head(), &id, url("plain.png")).unwrap());
    assert!(!s.blobs().is_alive(second));
    assert_eq!(s.blobs().stats().release_calls, 2);
}

#[test]
fn released_blobs_are_rejected_without_a_second_release() {
    let s = store();
    let gone = s.blobs().insert(vec![1]);
    s.blobs().release(gone).unwrap();

    let err = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Blob(gone), "stale"))
        .unwrap_err();
    assert!(matches!(err, LiveryError::Validation(_)));
    assert!(s.layers(&head()).unwrap().is_empty());

    let id = s
        .add_layer(&head(), LayerDraft::new(url("plain.png"), "logo"))
        .unwrap();
    let revision = s.revision(&head()).unwrap();
    let err = s
        .replace_source(&head(), &id, LayerSource::Blob(gone))
        .unwrap_err();
    assert!(matches!(err, LiveryError::Validation(_)));
    assert_eq!(s.layer(&head(), &id).unwrap().source, url("plain.png"));
    assert_eq!(s.revision(&head()).unwrap(), revision);

    s.remove_layer(&head(), &id).unwrap();
    assert_eq!(s.blobs().stats().release_calls, 1);
}

#[test]
fn update_layer_is_validated_and_reports_changes() {
    let s = store();
    let id = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let rev = s.revision(&head()).unwrap();

    let bad = LayerPatch {
        scale: Some(LayerScale { x: 1.0, y: -1.0 }),
        ..LayerPatch::default()
    };
    assert!(s.update_layer(&head(), &id, bad).is_err());
    assert_eq!(s.revision(&head()).unwrap(), rev);

    assert!(!s.update_layer(&head(), &id, LayerPatch::default()).unwrap());
    assert!(s.update_layer(&head(), &id, LayerPatch::position(10.0, 20.0)).unwrap());
    assert_eq!(s.revision(&head()).unwrap(), rev + 1);
    assert_eq!(s.layer(&head(), &id).unwrap().position, Point::new(10.0, 20.0));

    let missing = LayerId::new("HEAD_TUBE#99");
    assert!(s.update_layer(&head(), &missing, LayerPatch::position(0.0, 0.0)).is_err());
}

#[test]
fn reorder_layers_rewrites_z_indices() {
    let s = store();
    let a = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let b = s.add_layer(&head(), LayerDraft::new(url("b.png"), "b")).unwrap();
    let c = s.add_layer(&head(), LayerDraft::new(url("c.png"), "c")).unwrap();

    s.reorder_layers(&head(), &[c.clone(), a.clone(), b.clone()])
        .unwrap();
    assert_eq!(s.layer(&head(), &c).unwrap().z_index, 0);
    assert_eq!(s.layer(&head(), &a).unwrap().z_index, 1);
    assert_eq!(s.layer(&head(), &b).unwrap().z_index, 2);

    assert!(s.reorder_layers(&head(), &[a.clone(), b.clone()]).is_err());
    assert!(s.reorder_layers(&head(), &[a.clone(), a.clone(), b]).is_err());
}

#[test]
fn gradients_only_on_gradient_slots() {
    let s = store();
    let g = GradientSettings::linear(
        LinearDirection::Vertical,
        vec![
            ColorStop::new(Rgb8::new(255, 0, 0), 0.0),
            ColorStop::new(Rgb8::new(0, 0, 255), 1.0),
        ],
    );
    assert!(s.set_gradient(&head(), Some(g.clone())).is_err());

    let frame = SlotName::new("FRAME");
    s.set_gradient(&frame, Some(g.clone())).unwrap();
    assert_eq!(s.gradient(&frame).unwrap(), Some(g));
    assert!(s.is_dirty(&frame).unwrap());

    let bad = GradientSettings {
        color_stops: vec![ColorStop::new(Rgb8::new(0, 0, 0), 0.0)],
        ..GradientSettings::default()
    };
    assert!(s.set_gradient(&frame, Some(bad)).is_err());
}

#[test]
fn set_texture_refuses_superseded_revisions() {
    let s = store();
    let id = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let rev = s.revision(&head()).unwrap();
    assert!(s.is_dirty(&head()).unwrap());

    s.update_layer(&head(), &id, LayerPatch::position(1.0, 1.0))
        .unwrap();
    let old = texture(1, &s, &head());
    assert_eq!(
        s.set_texture(&head(), Some(old), rev, 7).unwrap(),
        TextureCommit::Superseded
    );
    assert!(s.texture(&head()).unwrap().is_none());

    let current = texture(2, &s, &head());
    let rev = s.revision(&head()).unwrap();
    assert_eq!(
        s.set_texture(&head(), Some(current.clone()), rev, 8).unwrap(),
        TextureCommit::Committed { previous: None }
    );
    assert_eq!(s.texture(&head()).unwrap(), Some(current));
    assert!(!s.is_dirty(&head()).unwrap());
    assert_eq!(s.committed_fingerprint(&head()).unwrap(), Some(8));
}

#[test]
fn stale_processing_results_are_discarded() {
    let s = store();
    let id = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let before = s.layer(&head(), &id).unwrap();

    s.update_layer(&head(), &id, LayerPatch::color(Some(Rgb8::new(1, 2, 3))))
        .unwrap();
    assert_eq!(
        s.commit_processed(&head(), ready_entry(&before)).unwrap(),
        CommitOutcome::StaleDiscarded
    );
    assert!(s.processed(&head(), &id).unwrap().is_none());

    let removed = s.remove_layer(&head(), &id).unwrap();
    assert_eq!(
        s.commit_processed(&head(), ready_entry(&removed)).unwrap(),
        CommitOutcome::StaleDiscarded
    );
}

#[test]
fn pending_layers_lists_only_changed_keys() {
    let s = store();
    let a = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    let b = s.add_layer(&head(), LayerDraft::new(url("b.png"), "b")).unwrap();
    for id in [&a, &b] {
        let l = s.layer(&head(), id).unwrap();
        s.commit_processed(&head(), ready_entry(&l)).unwrap();
    }
    assert!(s.pending_layers(&head()).unwrap().1.is_empty());

    // moving does not invalidate, tinting does
    s.update_layer(&head(), &a, LayerPatch::position(5.0, 5.0))
        .unwrap();
    s.update_layer(&head(), &b, LayerPatch::color(Some(Rgb8::new(9, 9, 9))))
        .unwrap();
    let (rev, pending) = s.pending_layers(&head()).unwrap();
    assert_eq!(rev, s.revision(&head()).unwrap());
    assert_eq!(pending.iter().map(|l| &l.id).collect::<Vec<_>>(), vec![&b]);
    assert!(s.bitmap_size(&head(), &a).unwrap().is_some());
    assert!(s.bitmap_size(&head(), &b).unwrap().is_none());
}

#[test]
fn snapshot_orders_by_z_then_insertion_and_keeps_current_bitmaps() {
    let s = store();
    let a = s
        .add_layer(&head(), LayerDraft::new(url("a.png"), "a").with_z(1))
        .unwrap();
    let b = s
        .add_layer(&head(), LayerDraft::new(url("b.png"), "b").with_z(0))
        .unwrap();
    let c = s
        .add_layer(&head(), LayerDraft::new(url("c.png"), "c").with_z(1))
        .unwrap();
    let la = s.layer(&head(), &a).unwrap();
    s.commit_processed(&head(), ready_entry(&la)).unwrap();

    let snap = s.snapshot(&head()).unwrap();
    let order = snap.layers.iter().map(|l| l.id.clone()).collect::<Vec<_>>();
    assert_eq!(order, vec![b, a.clone(), c]);
    assert_eq!(snap.bitmaps.len(), 1);
    assert!(snap.bitmaps.contains_key(&a));
    assert!(!snap.is_blank());
    assert_eq!(snap.entries.iter().filter(|(_, ready)| *ready).count(), 1);
}

#[test]
fn blank_means_no_layers_and_no_background() {
    let s = store();
    let frame = SlotName::new("FRAME");
    assert!(s.snapshot(&frame).unwrap().is_blank());

    let disabled = GradientSettings {
        enabled: false,
        ..GradientSettings::default()
    };
    s.set_gradient(&frame, Some(disabled)).unwrap();
    assert!(s.snapshot(&frame).unwrap().is_blank());

    s.set_background_color(&frame, Some(Rgb8::new(1, 1, 1)))
        .unwrap();
    assert!(!s.snapshot(&frame).unwrap().is_blank());
}

#[test]
fn subscribers_see_every_mutation() {
    let s = store();
    let mut view = s.subscribe(&head()).unwrap();
    let mut ready = s.subscribe_ready(&head()).unwrap();
    assert_eq!(view.borrow_and_update().revision, 0);

    let id = s.add_layer(&head(), LayerDraft::new(url("a.png"), "a")).unwrap();
    assert!(view.has_changed().unwrap());
    let v = view.borrow_and_update().clone();
    assert_eq!(v.revision, 1);
    assert_eq!(v.layers.len(), 1);
    assert!(v.dirty);

    let l = s.layer(&head(), &id).unwrap();
    s.commit_processed(&head(), ready_entry(&l)).unwrap();
    let ev = ready.try_recv().unwrap();
    assert_eq!(
        ev,
        LayerReady {
            slot: head(),
            layer: id,
            width: 2,
            height: 2
        }
    );
}

#[test]
fn restore_is_all_or_nothing() {
    let s = store();
    let keep = s.add_layer(&head(), LayerDraft::new(url("keep.png"), "keep")).unwrap();

    let layer = LayerDraft::new(url("x.png"), "x").into_layer(
        LayerId::new("HEAD_TUBE#7"),
        s.canvas(&head()).unwrap(),
        0,
    );
    let mut bad = BTreeMap::new();
    bad.insert(
        head(),
        SlotContents {
            layers: vec![layer.clone(), layer.clone()],
            ..SlotContents::default()
        },
    );
    assert!(matches!(
        s.restore(bad).unwrap_err(),
        LiveryError::ConfigurationParse(_)
    ));
    assert!(s.layer(&head(), &keep).is_ok());

    let mut unknown = BTreeMap::new();
    unknown.insert(SlotName::new("SADDLE"), SlotContents::default());
    assert!(s.restore(unknown).is_err());

    let mut good = BTreeMap::new();
    good.insert(
        head(),
        SlotContents {
            layers: vec![layer],
            ..SlotContents::default()
        },
    );
    s.restore(good).unwrap();
    assert!(s.layer(&head(), &keep).is_err());
    assert_eq!(s.layers(&head()).unwrap().len(), 1);

    // ids keep counting past restored ones
    let next = s.add_layer(&head(), LayerDraft::new(url("n.png"), "n")).unwrap();
    assert_eq!(next.as_str(), "HEAD_TUBE#8");
}
