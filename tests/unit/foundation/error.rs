use super::*;

#[test]
fn constructors_produce_expected_variants_and_messages() {
    assert_eq!(
        LiveryError::validation("bad scale").to_string(),
        "validation error: bad scale"
    );
    assert_eq!(
        LiveryError::decode("not a png").to_string(),
        "decode error: not a png"
    );
    assert_eq!(
        LiveryError::configuration("missing slots").to_string(),
        "configuration parse error: missing slots"
    );
    assert!(matches!(
        LiveryError::composite("oom"),
        LiveryError::Composite(_)
    ));
}

#[test]
fn only_decode_and_load_count_as_missing_image() {
    assert!(LiveryError::decode("x").is_missing_image());
    assert!(LiveryError::load("x").is_missing_image());
    assert!(!LiveryError::composite("x").is_missing_image());
    assert!(!LiveryError::validation("x").is_missing_image());
}

#[test]
fn anyhow_errors_are_wrapped_transparently() {
    let err: LiveryError = anyhow::anyhow!("disk on fire").into();
    assert_eq!(err.to_string(), "disk on fire");
}
