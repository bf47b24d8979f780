use super::*;
use crate::assets::blob::BlobStore;
use crate::scene::catalog::SlotCatalog;
use crate::scene::model::{ColorStop, GradientTransition, LayerDraft, LinearDirection};

fn store() -> SlotStore {
    SlotStore::new(&SlotCatalog::bicycle(), 64, BlobStore::new()).unwrap()
}

fn head() -> SlotName {
    SlotName::new("HEAD_TUBE")
}

#[test]
fn capture_then_apply_restores_stable_fields() {
    let a = store();
    let id = a
        .add_layer(
            &head(),
            LayerDraft::new(LayerSource::Url("logo.svg".into()), "brand")
                .at(10.0, 20.0)
                .tinted(Rgb8::new(1, 2, 3))
                .with_z(4)
                .rotated(15.0),
        )
        .unwrap();
    let frame = SlotName::new("FRAME");
    let gradient = GradientSettings::linear(
        LinearDirection::Vertical,
        vec![
            ColorStop::new(Rgb8::new(255, 0, 0), 0.0),
            ColorStop::new(Rgb8::new(0, 0, 255), 1.0),
        ],
    )
    .with_transition(GradientTransition::HardStop);
    a.set_gradient(&frame, Some(gradient.clone())).unwrap();
    a.set_background_color(&frame, Some(Rgb8::new(9, 9, 9)))
        .unwrap();

    let report = SavedConfiguration::capture(&a).unwrap();
    assert!(report.skipped_blob_layers.is_empty());
    assert_eq!(report.configuration.slots.len(), 2);
    let json = report.configuration.to_json_pretty().unwrap();

    let b = store();
    SavedConfiguration::from_json(&json).unwrap().apply(&b).unwrap();
    assert_eq!(b.layers(&head()).unwrap(), a.layers(&head()).unwrap());
    assert_eq!(b.layer(&head(), &id).unwrap().rotation_deg, 15.0);
    assert_eq!(b.gradient(&frame).unwrap(), Some(gradient));
    assert_eq!(b.background_color(&frame).unwrap(), Some(Rgb8::new(9, 9, 9)));
    assert!(b.processed(&head(), &id).unwrap().is_none());
    assert!(b.texture(&head()).unwrap().is_none());
}

#[test]
fn blob_layers_are_skipped_and_reported() {
    let s = store();
    let blob = s.blobs().insert(vec![1, 2, 3]);
    let id = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Blob(blob), "upload"))
        .unwrap();

    let report = SavedConfiguration::capture(&s).unwrap();
    assert_eq!(report.skipped_blob_layers, vec![(head(), id)]);
    assert!(report.configuration.slots.is_empty());
}

#[test]
fn ids_survive_and_new_ids_do_not_collide() {
    let json = r##"{
        "version": 1,
        "slots": {
            "HEAD_TUBE": {
                "layers": [
                    { "id": "HEAD_TUBE#7", "url": "a.png", "x": 1, "y": 2 }
                ]
            }
        }
    }"##;
    let s = store();
    SavedConfiguration::from_json(json).unwrap().apply(&s).unwrap();

    let layer = s.layer(&head(), &LayerId::new("HEAD_TUBE#7")).unwrap();
    assert_eq!(layer.scale, LayerScale::uniform(1.0));
    assert_eq!(layer.color, None);

    let fresh = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Url("b.png".into()), "b"))
        .unwrap();
    assert_eq!(fresh.as_str(), "HEAD_TUBE#8");
}

#[test]
fn colors_accept_hex_on_load_and_write_hex() {
    let json = r##"{
        "version": 1,
        "slots": {
            "FRAME": { "background_color": "#FF8000" }
        }
    }"##;
    let cfg = SavedConfiguration::from_json(json).unwrap();
    let bg = cfg.slots[&SlotName::new("FRAME")].background_color;
    assert_eq!(bg, Some(Rgb8::new(255, 128, 0)));
    assert!(cfg.to_json_pretty().unwrap().contains("\"#ff8000\""));
}

#[test]
fn malformed_input_is_a_configuration_error() {
    for bad in [
        "not json",
        r#"{ "version": 2, "slots": {} }"#,
        r#"{ "version": 1, "slots": { "FRAME": { "layers": [ { "id": "x" } ] } } }"#,
    ] {
        let err = SavedConfiguration::from_json(bad).unwrap_err();
        assert!(matches!(err, LiveryError::ConfigurationParse(_)), "{bad}: {err}");
    }
}

#[test]
fn invalid_configurations_leave_the_store_untouched() {
    let s = store();
    let id = s
        .add_layer(&head(), LayerDraft::new(LayerSource::Url("keep.png".into()), "keep"))
        .unwrap();
    let before = s.revision(&head()).unwrap();

    let json = r#"{
        "version": 1,
        "slots": {
            "HEAD_TUBE": {
                "layers": [ { "id": "a", "url": "a.png", "x": 0, "y": 0, "scale_x": 0 } ]
            }
        }
    }"#;
    let err = SavedConfiguration::from_json(json)
        .unwrap()
        .apply(&s)
        .unwrap_err();
    assert!(matches!(err, LiveryError::ConfigurationParse(_)));
    assert!(s.layer(&head(), &id).is_ok());
    assert_eq!(s.revision(&head()).unwrap(), before);

    let unknown = r#"{ "version": 1, "slots": { "WHEEL": {} } }"#;
    assert!(
        SavedConfiguration::from_json(unknown)
            .unwrap()
            .apply(&s)
            .is_err()
    );
}

#[test]
fn gradients_on_logo_slots_are_rejected() {
    let json = r##"{
        "version": 1,
        "slots": {
            "HEAD_TUBE": {
                "gradient": {
                    "color_stops": [
                        { "color": "#000000", "position": 0 },
                        { "color": "#ffffff", "position": 1 }
                    ]
                }
            }
        }
    }"##;
    let s = store();
    let err = SavedConfiguration::from_json(json)
        .unwrap()
        .apply(&s)
        .unwrap_err();
    assert!(matches!(err, LiveryError::ConfigurationParse(_)));
}
