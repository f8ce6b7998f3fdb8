//! In-memory test doubles for [`ObjectStore`], [`FileIo`], and [`CacheMng`].
//!
//! Grounded on the `#[async_trait]` port style of
//! `lnxdrive-core/src/ports/cloud_provider.rs`; these are deliberately the
//! simplest possible implementations of each trait so the Orchestrator's
//! unit tests and this crate's `tests/` integration tests can exercise
//! every state machine without real network or disk I/O. **Not** part of
//! the production surface — no production code in this crate references
//! this module. Compiled under `#[cfg(test)]` for in-crate unit tests, and
//! additionally under the `test-util` feature (see Cargo.toml) so the
//! `tests/` integration binaries, which only see the crate's public API,
//! can reach it too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::config::{ConfigBuilder, VfsConfig};
use crate::entry::EntryKind;
use crate::inode::Ino;
use crate::orchestrator::Vfs;
use crate::ports::{CacheMng, FileHandle, FileIo, HeadResponse, ObjectStore, PutResponse};
use crate::reconciler::ListingRow;

/// Convenience re-export so tests can write `ROOT` instead of `Ino::ROOT`.
pub const ROOT: Ino = Ino::ROOT;

/// Metadata for one object in a [`FakeObjectStore`].
#[derive(Clone, Debug, Default)]
pub struct FakeObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
    pub mode: Option<u32>,
}

/// In-memory object store keyed by `fullpath`. Supports injecting a
/// one-shot failure on the next `head`/`list_directory` call, and counts
/// calls so tests can assert single-flight behaviour (spec invariant 5).
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, FakeObjectMeta>>,
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_next_head: AtomicBool,
    pub fail_next_list: AtomicBool,
    pub head_calls: AtomicU64,
    pub list_calls: AtomicU64,
    pub put_calls: AtomicU64,
    pub delete_calls: AtomicU64,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, fullpath: &str, meta: FakeObjectMeta) {
        self.objects.lock().unwrap().insert(fullpath.to_string(), meta);
    }

    pub fn insert_body(&self, fullpath: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(fullpath.to_string(), body);
    }

    pub fn remove_object(&self, fullpath: &str) {
        self.objects.lock().unwrap().remove(fullpath);
    }

    pub fn contains(&self, fullpath: &str) -> bool {
        self.objects.lock().unwrap().contains_key(fullpath)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn head(&self, fullpath: &str) -> anyhow::Result<HeadResponse> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_head.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated HEAD failure for {fullpath}");
        }
        let objects = self.objects.lock().unwrap();
        let meta = objects
            .get(fullpath)
            .ok_or_else(|| anyhow::anyhow!("404 not found: {fullpath}"))?;

        let mut headers = HashMap::new();
        headers.insert("Content-Length".to_string(), meta.size.to_string());
        if let Some(ct) = &meta.content_type {
            headers.insert("Content-Type".to_string(), ct.clone());
        }
        if let Some(mode) = meta.mode {
            headers.insert("x-amz-meta-mode".to_string(), mode.to_string());
        }
        headers.insert("ETag".to_string(), format!("\"{}\"", fullpath.len()));
        Ok(HeadResponse { headers })
    }

    async fn list_directory(&self, fullpath: &str) -> anyhow::Result<Vec<ListingRow>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated listing failure for {fullpath}");
        }

        let prefix = if fullpath.is_empty() {
            String::new()
        } else {
            format!("{fullpath}/")
        };

        let objects = self.objects.lock().unwrap();
        let mut seen_dirs = std::collections::HashSet::new();
        let mut rows = Vec::new();

        for (key, meta) in objects.iter() {
            let Some(rest) = key.strip_prefix(prefix.as_str()) else { continue };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                None => rows.push(ListingRow {
                    basename: rest.to_string(),
                    kind: EntryKind::File,
                    size: meta.size,
                    mtime: SystemTime::now(),
                }),
                Some(idx) => {
                    let dirname = &rest[..idx];
                    if seen_dirs.insert(dirname.to_string()) {
                        rows.push(ListingRow {
                            basename: dirname.to_string(),
                            kind: EntryKind::Directory,
                            size: 0,
                            mtime: SystemTime::now(),
                        });
                    }
                }
            }
        }
        Ok(rows)
    }

    async fn put_empty(&self, fullpath: &str) -> anyhow::Result<PutResponse> {
        self.put_with_headers(fullpath, Vec::new(), Vec::new()).await
    }

    async fn put_with_headers(
        &self,
        fullpath: &str,
        body: Vec<u8>,
        _headers: Vec<(String, String)>,
    ) -> anyhow::Result<PutResponse> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let size = body.len() as u64;
        self.bodies.lock().unwrap().insert(fullpath.to_string(), body);
        self.objects.lock().unwrap().insert(
            fullpath.to_string(),
            FakeObjectMeta {
                size,
                ..Default::default()
            },
        );
        Ok(PutResponse::default())
    }

    async fn delete(&self, fullpath: &str) -> anyhow::Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(fullpath);
        self.bodies.lock().unwrap().remove(fullpath);
        Ok(())
    }

    async fn get(&self, fullpath: &str) -> anyhow::Result<Vec<u8>> {
        self.bodies
            .lock()
            .unwrap()
            .get(fullpath)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 not found: {fullpath}"))
    }
}

/// In-memory [`FileIo`]: buffers file content per-inode for
/// `read_buffer`/`write_buffer`, and per-path for `simple_upload`/
/// `simple_download` (symlinks never go through a `FileHandle`).
#[derive(Default)]
pub struct FakeFileIo {
    files: Arc<Mutex<HashMap<u64, Vec<u8>>>>,
    uploads: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFileIo {
    pub fn new() -> Self {
        Self::default()
    }
}

struct FakeFileHandle {
    ino: Ino,
    files: Arc<Mutex<HashMap<u64, Vec<u8>>>>,
}

#[async_trait]
impl FileHandle for FakeFileHandle {
    async fn read_buffer(&self, size: u32, offset: i64) -> anyhow::Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        let buf = files.get(&self.ino.get()).cloned().unwrap_or_default();
        let offset = offset.max(0) as usize;
        if offset >= buf.len() {
            return Ok(Vec::new());
        }
        let end = (offset + size as usize).min(buf.len());
        Ok(buf[offset..end].to_vec())
    }

    async fn write_buffer(&self, data: &[u8], offset: i64) -> anyhow::Result<u32> {
        let mut files = self.files.lock().unwrap();
        let buf = files.entry(self.ino.get()).or_default();
        let offset = offset.max(0) as usize;
        if buf.len() < offset + data.len() {
            buf.resize(offset + data.len(), 0);
        }
        buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(data.len() as u32)
    }

    async fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl FileIo for FakeFileIo {
    async fn create(&self, _fullpath: &str, ino: Ino, is_new: bool) -> anyhow::Result<Arc<dyn FileHandle>> {
        if is_new {
            self.files.lock().unwrap().insert(ino.get(), Vec::new());
        } else {
            self.files.lock().unwrap().entry(ino.get()).or_default();
        }
        Ok(Arc::new(FakeFileHandle {
            ino,
            files: Arc::clone(&self.files),
        }))
    }

    async fn simple_upload(&self, fullpath: &str, body: Vec<u8>) -> anyhow::Result<()> {
        self.uploads.lock().unwrap().insert(fullpath.to_string(), body);
        Ok(())
    }

    async fn simple_download(&self, fullpath: &str) -> anyhow::Result<Vec<u8>> {
        self.uploads
            .lock()
            .unwrap()
            .get(fullpath)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no uploaded body for {fullpath}"))
    }
}

/// In-memory [`CacheMng`]: returns `0` (disabled) unless a length has been
/// explicitly set via [`FakeCacheMng::set_length`].
#[derive(Default)]
pub struct FakeCacheMng {
    lengths: Mutex<HashMap<u64, u64>>,
    pub remove_calls: AtomicU64,
}

impl FakeCacheMng {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_length(&self, ino: Ino, len: u64) {
        self.lengths.lock().unwrap().insert(ino.get(), len);
    }
}

#[async_trait]
impl CacheMng for FakeCacheMng {
    async fn get_file_length(&self, ino: Ino) -> u64 {
        *self.lengths.lock().unwrap().get(&ino.get()).unwrap_or(&0)
    }

    async fn remove_file(&self, ino: Ino) {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.lengths.lock().unwrap().remove(&ino.get());
    }
}

/// Bundle of the concrete test doubles backing a [`Vfs`] built by
/// [`new_test_vfs_with_doubles`], so tests can seed objects / flip failure
/// flags / assert call counts without downcasting trait objects.
pub struct TestDoubles {
    pub object_store: Arc<FakeObjectStore>,
    pub file_io: Arc<FakeFileIo>,
    pub cache_mng: Arc<FakeCacheMng>,
}

pub fn test_config() -> VfsConfig {
    ConfigBuilder::new()
        .bucket_name("test-bucket")
        .dir_cache_max_time(10)
        .file_cache_max_time(10)
        .build()
}

pub fn new_test_vfs_with_doubles() -> (Vfs, TestDoubles) {
    let object_store = Arc::new(FakeObjectStore::new());
    let file_io = Arc::new(FakeFileIo::new());
    let cache_mng = Arc::new(FakeCacheMng::new());

    let vfs = Vfs::new(
        test_config(),
        object_store.clone() as Arc<dyn ObjectStore>,
        file_io.clone() as Arc<dyn FileIo>,
        cache_mng.clone() as Arc<dyn CacheMng>,
    );

    (
        vfs,
        TestDoubles {
            object_store,
            file_io,
            cache_mng,
        },
    )
}

pub fn new_test_vfs() -> Vfs {
    new_test_vfs_with_doubles().0
}
