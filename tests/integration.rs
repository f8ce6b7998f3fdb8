//! Integration tests: full Orchestrator workflows crossing several
//! operations in sequence (create then lookup, rename then readdir, and
//! so on) rather than one operation at a time.
//!
//! Uses the in-memory `testutil` doubles (enabled via the `test-util`
//! feature, see Cargo.toml) instead of a real object store, so these run
//! with no network or disk I/O.

use std::sync::atomic::Ordering;
use std::time::Duration;

use s3fs_core::entry::EntryKind;
use s3fs_core::testutil::{new_test_vfs_with_doubles, FakeObjectMeta, ROOT};

#[tokio::test]
async fn create_then_lookup_returns_attributes_just_set() {
    // `file_create` sets `is_modified = true`, so the per-child HEAD rule in
    // `lookup_inner` fires on this very next lookup even though nothing was
    // ever PUT to the backend yet. The HEAD fails, but a failed HEAD on an
    // already-known child is not treated as tombstone-worthy (only the
    // absent-child path tombstones on 404), so the reply still comes back
    // from the cached Entry's attributes. Asserting only the outcome here
    // (see DESIGN.md's Open Question decisions for the full reasoning).
    let (vfs, _doubles) = new_test_vfs_with_doubles();

    let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
    vfs.file_release(created.fh).await.unwrap();

    let reply = vfs.lookup(ROOT, "a.txt").await.unwrap();
    assert_eq!(reply.ino, created.entry.ino);
    assert_eq!(reply.attr.size, created.entry.attr.size);
}

#[tokio::test]
async fn remove_then_lookup_within_ttl_stays_negative_without_network() {
    let (vfs, doubles) = new_test_vfs_with_doubles();

    let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
    vfs.file_release(created.fh).await.unwrap();
    doubles.object_store.insert_object("a.txt", FakeObjectMeta::default());

    vfs.file_remove(created.entry.ino).await.unwrap();
    assert_eq!(doubles.object_store.delete_calls.load(Ordering::SeqCst), 1);

    let head_calls_before = doubles.object_store.head_calls.load(Ordering::SeqCst);
    let err = vfs.lookup(ROOT, "a.txt").await.unwrap_err();
    assert!(matches!(err, s3fs_core::VfsError::NotFound(_)));
    assert_eq!(doubles.object_store.head_calls.load(Ordering::SeqCst), head_calls_before);
}

#[tokio::test]
async fn readdir_refresh_then_lookup_of_returned_name_stays_local() {
    let (vfs, doubles) = new_test_vfs_with_doubles();
    doubles.object_store.insert_object("a.txt", FakeObjectMeta { size: 3, ..Default::default() });
    doubles.object_store.insert_object("sub/nested.txt", FakeObjectMeta { size: 0, ..Default::default() });

    let fh = vfs.opendir(ROOT).unwrap();
    vfs.fill_dir_buf(fh, 4096, 0).await.unwrap();
    vfs.releasedir(fh).unwrap();

    let head_calls_before = doubles.object_store.head_calls.load(Ordering::SeqCst);
    let list_calls_before = doubles.object_store.list_calls.load(Ordering::SeqCst);

    let a = vfs.lookup(ROOT, "a.txt").await.unwrap();
    assert_eq!(a.attr.size, 3);
    let sub = vfs.lookup(ROOT, "sub").await.unwrap();
    assert_eq!(sub.attr.kind, fuser::FileType::Directory);

    assert_eq!(doubles.object_store.head_calls.load(Ordering::SeqCst), head_calls_before);
    assert_eq!(doubles.object_store.list_calls.load(Ordering::SeqCst), list_calls_before);
}

#[tokio::test]
async fn full_file_lifecycle_create_write_release_read_remove() {
    let (vfs, _doubles) = new_test_vfs_with_doubles();

    let created = vfs.file_create(ROOT, "notes.txt", 0o644).await.unwrap();
    vfs.file_write(created.fh, b"hello, world", 0).await.unwrap();
    vfs.file_release(created.fh).await.unwrap();

    let attr = vfs.getattr(created.entry.ino).await.unwrap();
    assert_eq!(attr.attr.size, 12);

    let fh = vfs.file_open(created.entry.ino).await.unwrap();
    let read = vfs.file_read(fh, 5, 7).await.unwrap();
    assert_eq!(read, b"world");
    vfs.file_release(fh).await.unwrap();

    vfs.file_remove(created.entry.ino).await.unwrap();
    let err = vfs.lookup(ROOT, "notes.txt").await.unwrap_err();
    assert!(matches!(err, s3fs_core::VfsError::NotFound(_)));
}

#[tokio::test]
async fn rename_then_readdir_reflects_new_name_in_destination() {
    let (vfs, doubles) = new_test_vfs_with_doubles();
    let dir = vfs
        .tree()
        .add_entry(ROOT, "archive", 0o755, EntryKind::Directory, 0, std::time::SystemTime::now())
        .unwrap();
    let created = vfs.file_create(ROOT, "report.csv", 0o644).await.unwrap();
    vfs.file_release(created.fh).await.unwrap();
    doubles.object_store.insert_object("report.csv", FakeObjectMeta { size: 10, ..Default::default() });

    vfs.rename(ROOT, "report.csv", dir, "report-2024.csv").await.unwrap();

    let fh = vfs.opendir(dir).unwrap();
    let reply = vfs.fill_dir_buf(fh, 4096, 0).await.unwrap();
    let names: Vec<_> = s3fs_core::dirbuf::decode_simple_dirbuf(&reply.buffer);
    assert!(names.iter().any(|e| e.name == "report-2024.csv"));

    let err = vfs.lookup(ROOT, "report.csv").await.unwrap_err();
    assert!(matches!(err, s3fs_core::VfsError::NotFound(_)));
}

#[tokio::test]
async fn symlink_create_readlink_then_remove() {
    let (vfs, _doubles) = new_test_vfs_with_doubles();

    let reply = vfs.create_symlink(ROOT, "current", "/releases/42").await.unwrap();
    assert_eq!(reply.attr.kind, fuser::FileType::Symlink);

    let target = vfs.readlink(reply.ino).await.unwrap();
    assert_eq!(target, "/releases/42");

    vfs.file_remove(reply.ino).await.unwrap();
    let err = vfs.lookup(ROOT, "current").await.unwrap_err();
    assert!(matches!(err, s3fs_core::VfsError::NotFound(_)));
}

#[tokio::test]
async fn getxattr_reflects_create_symlink_then_head_refresh_after_ttl() {
    let (vfs, doubles) = new_test_vfs_with_doubles();
    let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
    vfs.file_release(created.fh).await.unwrap();
    doubles.object_store.insert_object(
        "a.txt",
        FakeObjectMeta {
            size: 3,
            content_type: Some("text/csv".to_string()),
            mode: None,
        },
    );

    vfs.tree().with_entry_mut(created.entry.ino, |e| {
        e.xattr_time = std::time::SystemTime::now() - Duration::from_secs(3600);
    });

    let content_type = vfs.getxattr(created.entry.ino, "user.content_type").await.unwrap();
    assert_eq!(content_type, "text/csv");

    // second call within the freshly-bumped xattr_time window stays local
    let head_calls_before = doubles.object_store.head_calls.load(Ordering::SeqCst);
    vfs.getxattr(created.entry.ino, "user.etag").await.unwrap();
    assert_eq!(doubles.object_store.head_calls.load(Ordering::SeqCst), head_calls_before);
}

#[tokio::test]
async fn dir_remove_tombstones_and_lookup_goes_negative() {
    let (vfs, _doubles) = new_test_vfs_with_doubles();
    vfs.tree()
        .add_entry(ROOT, "empty", 0o755, EntryKind::Directory, 0, std::time::SystemTime::now())
        .unwrap();

    vfs.dir_remove(ROOT, "empty").unwrap();

    let err = vfs.lookup(ROOT, "empty").await.unwrap_err();
    assert!(matches!(err, s3fs_core::VfsError::NotFound(_)));
}

#[tokio::test]
async fn dir_create_then_lookup_returns_attributes_without_network() {
    let (vfs, doubles) = new_test_vfs_with_doubles();

    // Prime root's dir cache first, as a prior `readdir` would in practice —
    // an entirely unlisted directory (`dir_cache_size == 0`) is expired by
    // definition (spec §4.5.2 step 2) and a `lookup` against it must drive a
    // listing refresh before trusting local state.
    vfs.tree().with_entry_mut(ROOT, |e| {
        let dir = e.dir.as_mut().unwrap();
        dir.dir_cache = Some(vec![0]);
        dir.dir_cache_size = 1;
    });

    let created = vfs.dir_create(ROOT, "projects", 0o755).await.unwrap();
    assert_eq!(created.attr.kind, fuser::FileType::Directory);

    let reply = vfs.lookup(ROOT, "projects").await.unwrap();
    assert_eq!(reply.ino, created.ino);
    assert_eq!(doubles.object_store.head_calls.load(Ordering::SeqCst), 0);
    assert_eq!(doubles.object_store.list_calls.load(Ordering::SeqCst), 0);
}
