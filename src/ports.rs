//! Downward collaborator ports.
//!
//! These traits describe what this core requires of its environment: an
//! HTTP-backed object store, a per-file I/O engine, and a local content
//! cache. The Orchestrator (`Vfs`) is generic only over these traits — it
//! never depends on a concrete HTTP stack — mirroring the port-trait style
//! of `lnxdrive-core/src/ports/cloud_provider.rs` (`ICloudProvider`).
//!
//! These ports are `#[async_trait]` methods: on a runtime with first-class
//! async/await (tokio), each Orchestrator operation is a single linear
//! `async fn` rather than a callback chain threaded through a heap-allocated
//! op-context.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::inode::Ino;
use crate::reconciler::ListingRow;

/// Raw response to a HEAD request against one object key, headers intact.
/// Interpretation into Entry fields happens in `headers.rs`, not here —
/// header values are decoded at use, not at ingest.
#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub headers: HashMap<String, String>,
}

/// Result of a PUT (create/overwrite/copy) request.
#[derive(Debug, Clone, Default)]
pub struct PutResponse {
    pub headers: HashMap<String, String>,
}

/// The HTTP client pool + directory listing fetcher + object CRUD,
/// collapsed into one port trait. A production implementation keeps a
/// pool of keep-alive connections internally; this trait's callers never
/// see individual client acquisition: callers acquire a client for one
/// request sequence then release it, without the pool itself ever becoming
/// API surface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `HEAD` against `fullpath` (no leading slash; this trait adds it).
    async fn head(&self, fullpath: &str) -> anyhow::Result<HeadResponse>;

    /// Lists the immediate children of the "directory" at `fullpath`
    /// (empty string for the bucket root).
    async fn list_directory(&self, fullpath: &str) -> anyhow::Result<Vec<ListingRow>>;

    /// `PUT` with an empty body, used to create zero-byte file markers.
    async fn put_empty(&self, fullpath: &str) -> anyhow::Result<PutResponse>;

    /// `PUT` `fullpath` with `headers` added to the request (used by
    /// rename's copy phase for `x-amz-copy-source` / `x-amz-storage-class`,
    /// and by `simple_upload`'s body-bearing variant).
    async fn put_with_headers(
        &self,
        fullpath: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> anyhow::Result<PutResponse>;

    /// `DELETE` against `fullpath`.
    async fn delete(&self, fullpath: &str) -> anyhow::Result<()>;

    /// `GET` the full body of `fullpath` (used by `readlink`'s
    /// `simple_download` and by plain file reads when no local cache hit
    /// is available).
    async fn get(&self, fullpath: &str) -> anyhow::Result<Vec<u8>>;
}

/// An open file's I/O engine: multipart upload, streaming read, buffering.
/// One instance is created per `open`/`create` and released on `release`.
#[async_trait]
pub trait FileHandle: Send + Sync {
    async fn read_buffer(&self, size: u32, offset: i64) -> anyhow::Result<Vec<u8>>;

    /// Writes `data` at `offset`; returns the number of bytes accepted.
    async fn write_buffer(&self, data: &[u8], offset: i64) -> anyhow::Result<u32>;

    /// Flushes any pending (multipart) upload. Called by `release`; takes
    /// `&self` rather than consuming ownership so a handle can be held as
    /// an `Arc` and cloned out of the open-file table before an await
    /// rather than holding the table's lock across one.
    async fn release(&self) -> anyhow::Result<()>;
}

/// Factory for [`FileHandle`]s plus the two simple whole-object operations
/// symlinks use.
#[async_trait]
pub trait FileIo: Send + Sync {
    /// `is_new` selects "new-object" mode (as `create` uses) vs.
    /// "read-existing" mode (as `open` uses). Returned as an `Arc` so the
    /// Orchestrator can clone it out of the per-open-file table before an
    /// `.await` rather than holding the table locked across one.
    async fn create(
        &self,
        fullpath: &str,
        ino: Ino,
        is_new: bool,
    ) -> anyhow::Result<std::sync::Arc<dyn FileHandle>>;

    /// Uploads `body` as the entire object content in one request.
    async fn simple_upload(&self, fullpath: &str, body: Vec<u8>) -> anyhow::Result<()>;

    /// Downloads the entire object content.
    async fn simple_download(&self, fullpath: &str) -> anyhow::Result<Vec<u8>>;
}

/// The on-disk block cache manager, keyed by inode.
#[async_trait]
pub trait CacheMng: Send + Sync {
    /// Authoritative local length for `ino`, or `0` if disabled/absent —
    /// callers fall back to `offset + count` inference in that case.
    async fn get_file_length(&self, ino: Ino) -> u64;

    async fn remove_file(&self, ino: Ino);
}
