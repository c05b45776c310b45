use std::path::Path;

use anvil_flash::efivars::EfiVariableStore;
use anvil_flash::FlashError;

const GUID: &str = "1b4e28ba-2fa1-11d2-883f-b9a761bde3fb";

fn store(root: &Path) -> EfiVariableStore {
    EfiVariableStore::with_root(GUID, root).unwrap()
}

#[test]
fn test_missing_subsystem_is_a_precondition_failure() {
    let err = EfiVariableStore::with_root(GUID, Path::new("/nonexistent/efivars")).unwrap_err();
    assert!(matches!(err, FlashError::Precondition(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_set_prefixes_the_attribute_word() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());

    let wrote = store.set("AssetSN", b"SN012345").await.unwrap();
    assert!(wrote);

    let raw = std::fs::read(dir.path().join(format!("AssetSN-{GUID}"))).unwrap();
    // Non-volatile | boot-service | runtime, little endian.
    assert_eq!(&raw[..4], &[0x07, 0x00, 0x00, 0x00]);
    assert_eq!(&raw[4..], b"SN012345");
}

#[tokio::test]
async fn test_get_strips_the_attribute_word() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.set("AssetSN", b"SN012345").await.unwrap();
    assert_eq!(store.get("AssetSN").await.unwrap(), b"SN012345");
}

#[tokio::test]
async fn test_rewriting_an_equal_value_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert!(store.set("AssetSN", b"SN012345").await.unwrap());
    assert!(!store.set("AssetSN", b"SN012345").await.unwrap());
}

#[tokio::test]
async fn test_changed_value_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert!(store.set("AssetSN", b"SN012345").await.unwrap());
    assert!(store.set("AssetSN", b"SN999999").await.unwrap());
    assert_eq!(store.get("AssetSN").await.unwrap(), b"SN999999");
}

#[tokio::test]
async fn test_missing_variable_maps_to_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = store(dir.path()).get("Nothing").await.unwrap_err();
    assert!(matches!(err, FlashError::NotFound(_)));
}

#[tokio::test]
async fn test_truncated_variable_is_a_verification_failure() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("Broken-{GUID}")), [0x07, 0x00]).unwrap();
    let err = store(dir.path()).get("Broken").await.unwrap_err();
    assert!(matches!(err, FlashError::Verification(_)));
}

#[tokio::test]
async fn test_name_and_value_bounds_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    assert!(store.set("", b"x").await.is_err());
    assert!(store.set(&"n".repeat(65), b"x").await.is_err());
    assert!(store.set("AssetSN", &[]).await.is_err());
    assert!(store.set("AssetSN", &vec![0u8; 1025]).await.is_err());
}
