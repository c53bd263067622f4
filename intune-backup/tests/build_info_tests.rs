//! Build identification embedded by build.rs

#[test]
fn test_build_identification_is_embedded() {
    assert!(!env!("GIT_HASH").is_empty());
    assert!(matches!(env!("BUILD_PROFILE"), "debug" | "release" | "unknown"));

    let built_at = env!("BUILD_TIMESTAMP");
    assert_eq!(built_at.len(), "2025-01-01T00:00:00Z".len());
    assert!(built_at.ends_with('Z'));
    assert_eq!(&built_at[10..11], "T");
}
