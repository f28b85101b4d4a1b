use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SpinloopError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        SpinloopError::capture("x")
            .to_string()
            .contains("capture error:")
    );
    assert!(
        SpinloopError::delivery("x")
            .to_string()
            .contains("delivery error:")
    );
    assert!(
        SpinloopError::launch("x")
            .to_string()
            .contains("launch error:")
    );
    assert!(
        SpinloopError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn timeout_names_condition_and_hint() {
    let err = SpinloopError::timeout("canvas ready", Duration::from_millis(1500));
    let msg = err.to_string();
    assert!(msg.contains("1500ms"));
    assert!(msg.contains("canvas ready"));
    assert!(err.is_timeout());

    let err = SpinloopError::timeout_with_hint(
        "delivery signal",
        Duration::from_secs(60),
        "try disabling throttling",
    );
    assert!(err.to_string().ends_with("(try disabling throttling)"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SpinloopError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert!(!err.is_timeout());
}
