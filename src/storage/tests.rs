use super::*;
use tempfile::TempDir;

fn store_with_bucket() -> (TempDir, LocalObjectStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = LocalObjectStore::new(temp_dir.path());
    store.create_bucket("docs").expect("bucket created");
    (temp_dir, store)
}

#[test]
fn put_then_get_returns_bytes() {
    let (_temp_dir, store) = store_with_bucket();

    store
        .put("docs", "raw/guide.zip", b"zip bytes")
        .expect("put succeeds");
    let bytes = store.get("docs", "raw/guide.zip").expect("get succeeds");

    assert_eq!(bytes, b"zip bytes");
}

#[test]
fn list_is_sorted_and_prefix_filtered() {
    let (_temp_dir, store) = store_with_bucket();
    for key in ["raw/b.zip", "raw/a.zip", "vector-db/index.vectors.json", "rawer.txt"] {
        store.put("docs", key, b"x").expect("put succeeds");
    }

    let raw = store.list("docs", "raw/").expect("list succeeds");
    assert_eq!(raw, vec!["raw/a.zip", "raw/b.zip"]);

    let plain_prefix = store.list("docs", "raw").expect("list succeeds");
    assert_eq!(plain_prefix, vec!["raw/a.zip", "raw/b.zip", "rawer.txt"]);

    let all = store.list("docs", "").expect("list succeeds");
    assert_eq!(all.len(), 4);
}

#[test]
fn empty_prefix_listing_is_empty() {
    let (_temp_dir, store) = store_with_bucket();
    let keys = store.list("docs", "raw").expect("list succeeds");
    assert!(keys.is_empty());
}

#[test]
fn missing_bucket_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = LocalObjectStore::new(temp_dir.path());

    let error = store.list("absent", "").expect_err("list should fail");
    assert!(matches!(
        error.downcast_ref::<StorageError>(),
        Some(StorageError::BucketNotFound(bucket)) if bucket == "absent"
    ));
}

#[test]
fn missing_key_is_reported() {
    let (_temp_dir, store) = store_with_bucket();

    let error = store.get("docs", "raw/none.zip").expect_err("get should fail");
    assert!(matches!(
        error.downcast_ref::<StorageError>(),
        Some(StorageError::KeyNotFound { key, .. }) if key == "raw/none.zip"
    ));
}

#[test]
fn unsafe_keys_are_rejected() {
    let (_temp_dir, store) = store_with_bucket();

    for key in ["", "/etc/passwd", "../escape", "raw//double", "raw/./x", "raw/"] {
        let error = store.put("docs", key, b"x").expect_err("put should fail");
        assert!(
            matches!(
                error.downcast_ref::<StorageError>(),
                Some(StorageError::InvalidKey(_))
            ),
            "key {key:?} should be rejected"
        );
    }
}

#[test]
fn invalid_bucket_names_are_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = LocalObjectStore::new(temp_dir.path());

    assert!(matches!(
        store.create_bucket("a/b"),
        Err(StorageError::InvalidBucket(_))
    ));
    assert!(matches!(
        store.create_bucket(".."),
        Err(StorageError::InvalidBucket(_))
    ));
}

#[test]
fn download_and_upload_file_round_trip() {
    let (temp_dir, store) = store_with_bucket();
    let local = temp_dir.path().join("scratch/nested/index.vectors.json");

    store
        .put("docs", "vector-db/index.vectors.json", b"{}")
        .expect("put succeeds");
    store
        .download("docs", "vector-db/index.vectors.json", &local)
        .expect("download succeeds");
    assert_eq!(fs::read(&local).expect("local file exists"), b"{}");

    store
        .upload_file("docs", "copy/index.vectors.json", &local)
        .expect("upload succeeds");
    assert_eq!(
        store
            .get("docs", "copy/index.vectors.json")
            .expect("get succeeds"),
        b"{}"
    );
}
