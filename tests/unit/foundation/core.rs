use super::*;
use serde_json::json;

#[test]
fn canonical_size_for_wide_strip() {
    let size = CanvasSize::for_aspect(1024, 8.0).unwrap();
    assert_eq!(size, CanvasSize::new(1024, 128).unwrap());
    assert_eq!(size.rgba8_len(), 1024 * 128 * 4);
}

#[test]
fn canonical_size_rejects_bad_aspect() {
    assert!(CanvasSize::for_aspect(1024, 0.0).is_err());
    assert!(CanvasSize::for_aspect(1024, -1.0).is_err());
    assert!(CanvasSize::for_aspect(1024, f64::NAN).is_err());
    // Tall slots never collapse below one row.
    assert_eq!(CanvasSize::for_aspect(4, 100.0).unwrap().height, 1);
}

#[test]
fn rgb_hex_round_trip_and_alternate_forms() {
    let c: Rgb8 = serde_json::from_value(json!("#FF8000")).unwrap();
    assert_eq!(c, Rgb8::new(255, 128, 0));
    assert_eq!(serde_json::to_value(c).unwrap(), json!("#ff8000"));

    let c: Rgb8 = serde_json::from_value(json!({"r": 1, "g": 2, "b": 3})).unwrap();
    assert_eq!(c, Rgb8::new(1, 2, 3));
    let c: Rgb8 = serde_json::from_value(json!([4, 5, 6])).unwrap();
    assert_eq!(c, Rgb8::new(4, 5, 6));

    assert!(serde_json::from_value::<Rgb8>(json!("#fff")).is_err());
    assert!(serde_json::from_value::<Rgb8>(json!([1, 2])).is_err());
}

#[test]
fn bitmap_checks_length_and_reads_pixels() {
    assert!(Bitmap::from_premul(2, 2, vec![0; 15]).is_err());

    let bmp = Bitmap::from_straight(1, 2, vec![200, 100, 50, 128, 1, 2, 3, 255]).unwrap();
    assert_eq!(
        bmp.pixel(0, 0).unwrap(),
        [
            ((200u16 * 128 + 127) / 255) as u8,
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            128
        ]
    );
    assert_eq!(bmp.pixel(0, 1).unwrap(), [1, 2, 3, 255]);
    assert!(bmp.pixel(1, 0).is_none());
}

#[test]
fn straight_export_of_opaque_pixels_is_lossless() {
    let bmp = Bitmap::from_straight(1, 1, vec![9, 8, 7, 255]).unwrap();
    assert_eq!(bmp.to_straight_rgba(), vec![9, 8, 7, 255]);
}
