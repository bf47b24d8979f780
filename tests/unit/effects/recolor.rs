use std::sync::Arc;

use super::*;

fn logo() -> Bitmap {
    // opaque red, half-transparent green, fully transparent, faint blue edge
    Bitmap::from_straight(
        4,
        1,
        vec![
            255, 0, 0, 255, //
            0, 255, 0, 128, //
            0, 0, 0, 0, //
            0, 0, 255, 10,
        ],
    )
    .unwrap()
}

#[test]
fn flat_silhouette_fills_covered_pixels_opaque() {
    let target = Rgb8::new(10, 20, 30);
    let out = recolor(&logo(), target, RecolorMode::FlatSilhouette).unwrap();
    assert_eq!(out.pixel(0, 0).unwrap(), [10, 20, 30, 255]);
    assert_eq!(out.pixel(1, 0).unwrap(), [10, 20, 30, 255]);
    assert_eq!(out.pixel(2, 0).unwrap(), [0, 0, 0, 0]);
    assert_eq!(out.pixel(3, 0).unwrap(), [10, 20, 30, 255]);
}

#[test]
fn preserve_alpha_keeps_alpha_channel_exactly() {
    let src = logo();
    let target = Rgb8::new(200, 100, 50);
    let out = recolor(&src, target, RecolorMode::PreserveAlpha).unwrap();

    let alphas = |b: &Bitmap| b.rgba8_premul.chunks_exact(4).map(|p| p[3]).collect::<Vec<_>>();
    assert_eq!(alphas(&src), alphas(&out));

    let straight = out.to_straight_rgba();
    assert_eq!(&straight[0..4], &[200, 100, 50, 255]);
    // within rounding of premultiplied storage
    assert!((i32::from(straight[4]) - 200).abs() <= 2);
    assert_eq!(&straight[8..12], &[0, 0, 0, 0]);
}

#[test]
fn input_is_left_untouched() {
    let src = logo();
    let before = src.rgba8_premul.as_ref().clone();
    let _ = recolor(&src, Rgb8::new(1, 2, 3), RecolorMode::FlatSilhouette).unwrap();
    assert_eq!(src.rgba8_premul.as_ref(), &before);
}

#[test]
fn malformed_buffer_is_a_decode_error() {
    let bad = Bitmap {
        width: 3,
        height: 3,
        rgba8_premul: Arc::new(vec![0u8; 7]),
    };
    let err = recolor(&bad, Rgb8::new(0, 0, 0), RecolorMode::default()).unwrap_err();
    assert!(matches!(err, LiveryError::Decode(_)));
}
