//! Operation orchestrator: state machines for every upward operation,
//! bridging synchronous FUSE callbacks to asynchronous HTTP round-trips.
//!
//! Grounded on `lnxdrive-fuse/src/filesystem.rs`'s `impl Filesystem for
//! LnxDriveFs` control flow (resolve inode → check state → act → reply),
//! restructured for a runtime with first-class async/await (tokio), so each
//! operation is one linear `async fn` returning `Result<_, VfsError>` rather
//! than a callback chain threaded through a heap-allocated op-context. The
//! `Result` return *is* the exactly-one-reply guarantee every operation
//! needs — every `?` early return and every `Ok` is the operation's single
//! reply.
//!
//! A thin adapter translating `fuser::Filesystem` trait callbacks into
//! calls against `Vfs`'s methods is an out-of-scope FUSE kernel adapter; it
//! is not built here.

mod attr;
mod create;
mod io;
mod lookup;
mod readdir;
mod remove;
mod rename;
mod symlink;
mod xattr;

pub use attr::{SetAttrRequest, TimeOrNow};
pub use create::CreateReply;
pub use readdir::ReaddirReply;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::config::VfsConfig;
use crate::entry::Entry;
use crate::error::VfsError;
use crate::inode::Ino;
use crate::ports::{CacheMng, FileHandle, FileIo, ObjectStore};
use crate::tree::Tree;

/// Reply payload shared by `lookup`, `getattr`, `create`, and `symlink`:
/// an Entry's current attributes plus its inode, enough for a `ReplyEntry`
/// / `ReplyAttr` in the adapter layer.
#[derive(Debug, Clone)]
pub struct EntryReply {
    pub ino: Ino,
    pub attr: fuser::FileAttr,
}

/// Point-in-time counters returned by `get_stats`.
#[derive(Debug, Clone, Copy)]
pub struct VfsStats {
    pub inode_count: usize,
    pub current_write_ops: u64,
}

/// Per-open-directory state: once a listing snapshot has been copied in,
/// every subsequent paginated `readdir` on the same handle reuses it
/// rather than risking a second, inconsistent listing.
pub(crate) struct OpenDirState {
    pub(crate) ino: Ino,
    pub(crate) snapshot: Option<Vec<u8>>,
}

/// Per-open-file state: the live `FileHandle` plus the inode it belongs to,
/// so `release` can re-resolve the Entry before mutating it. Held as an
/// `Arc` so read/write/release can clone it out of the table and drop the
/// table's lock before awaiting — never hold a reference across a
/// suspension point.
pub(crate) struct OpenFileState {
    pub(crate) ino: Ino,
    pub(crate) handle: Arc<dyn FileHandle>,
}

/// The filesystem core: owns the Tree, the downward collaborator ports,
/// and per-open-handle bookkeeping. One instance is constructed at mount
/// time and is the single root application handle — there is no other
/// global state.
pub struct Vfs {
    pub(crate) tree: Arc<Tree>,
    object_store: Arc<dyn ObjectStore>,
    file_io: Arc<dyn FileIo>,
    cache_mng: Arc<dyn CacheMng>,
    config: VfsConfig,
    open_dirs: DashMap<u64, OpenDirState>,
    open_files: DashMap<u64, OpenFileState>,
    next_fh: AtomicU64,
    uid: u32,
    gid: u32,
}

impl Vfs {
    pub fn new(
        config: VfsConfig,
        object_store: Arc<dyn ObjectStore>,
        file_io: Arc<dyn FileIo>,
        cache_mng: Arc<dyn CacheMng>,
    ) -> Self {
        let tree = Arc::new(Tree::new(
            config.filesystem.resolved_file_mode(),
            config.filesystem.resolved_dir_mode(),
        ));
        // Safety: getuid/getgid are pure reads of the calling process's
        // credentials and never fail, mirroring lnxdrive-fuse's
        // `InodeEntry::to_file_attr` (`libc::getuid()`/`libc::getgid()`).
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        tracing::info!(bucket = %config.s3.bucket_name, "filesystem core constructed");
        Vfs {
            tree,
            object_store,
            file_io,
            cache_mng,
            config,
            open_dirs: DashMap::new(),
            open_files: DashMap::new(),
            next_fh: AtomicU64::new(1),
            uid,
            gid,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Exposes the underlying [`Tree`] for fixture setup — e.g. integration
    /// tests seeding a tree shape `file_create`/`dir_create` alone can't
    /// reach (pre-existing nested directories with specific `age`s, etc).
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolves `ino` to a cloned Entry or a `NotFound` error. Every
    /// continuation re-resolves through this rather than holding a
    /// reference across a suspension point.
    fn resolve(&self, ino: Ino) -> Result<Entry, VfsError> {
        self.tree
            .get_clone(ino)
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))
    }

    fn entry_reply(&self, entry: &Entry) -> EntryReply {
        EntryReply {
            ino: entry.ino,
            attr: entry.to_attr(self.uid, self.gid),
        }
    }

    /// `get_stats`: point-in-time counters for the FUSE adapter's `statfs`
    /// handler.
    pub fn get_stats(&self) -> VfsStats {
        VfsStats {
            inode_count: self.tree.inode_count(),
            current_write_ops: self.tree.current_write_ops(),
        }
    }

    pub fn get_inode_count(&self) -> usize {
        self.tree.inode_count()
    }

    /// `set_entry_exist`: directly asserts that an object with
    /// the given attributes exists under `parent`, without a network round
    /// trip. Used to seed entries known out-of-band (e.g. a just-completed
    /// upload whose response already carries final metadata), folding
    /// through the same reconciler `update_entry` path a listing row would
    /// — so it respects the same age/tombstone-clearing semantics rather
    /// than a separate ad hoc code path.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn set_entry_exist(
        &self,
        parent_ino: Ino,
        basename: &str,
        kind: crate::entry::EntryKind,
        size: u64,
        mtime: SystemTime,
    ) -> Result<EntryReply, VfsError> {
        let ino = crate::reconciler::update_entry(
            &self.tree,
            parent_ino,
            &crate::reconciler::ListingRow {
                basename: basename.to_string(),
                kind,
                size,
                mtime,
            },
        )?;
        self.tree.with_entry_mut(parent_ino, |e| e.invalidate_dir_cache());
        let entry = self.resolve(ino)?;
        Ok(self.entry_reply(&entry))
    }
}
