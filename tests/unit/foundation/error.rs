use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        BlurError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        BlurError::backend("x")
            .to_string()
            .contains("backend error:")
    );
    assert!(
        BlurError::unavailable("gpu")
            .to_string()
            .contains("backend unavailable:")
    );
    assert_eq!(BlurError::Destroyed.to_string(), "controller destroyed");
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = BlurError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
