//! `getattr` / `setattr` — metadata read and local-only metadata writes.
//!
//! Both are local, synchronous (no network) state reads/mutations, grounded
//! on `lnxdrive-fuse/src/filesystem.rs`'s
//! `getattr`/`setattr` (which, in the teacher, similarly never reaches the
//! network — remote metadata changes flow back through delta sync, not
//! through `setattr`).

use std::time::SystemTime;

use crate::error::VfsError;
use crate::inode::Ino;

use super::{EntryReply, Vfs};

/// Mirrors `fuser::TimeOrNow` without depending on a live FUSE request
/// object: "now" or a specific timestamp.
#[derive(Debug, Clone, Copy)]
pub enum TimeOrNow {
    Now,
    Specific(SystemTime),
}

impl TimeOrNow {
    fn resolve(self) -> SystemTime {
        match self {
            TimeOrNow::Now => SystemTime::now(),
            TimeOrNow::Specific(t) => t,
        }
    }
}

/// Fields a `setattr` call may change; `None` leaves the field untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttrRequest {
    pub mode: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<TimeOrNow>,
    pub mtime: Option<TimeOrNow>,
}

impl Vfs {
    /// `getattr`: resolves `ino` and returns its current attributes.
    /// Always local — no backend round trip (the teacher's `getattr`
    /// behaves identically for the same reason: attributes are refreshed
    /// by `lookup`/`readdir`, not by `getattr` itself).
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get()))]
    pub async fn getattr(&self, ino: Ino) -> Result<EntryReply, VfsError> {
        let entry = self.resolve(ino)?;
        Ok(self.entry_reply(&entry))
    }

    /// `setattr`: applies local-only metadata changes. A `size` change on a
    /// File is a truncate: it marks the entry modified (via
    /// `entry_modified`, which invalidates the parent's listing cache) but
    /// does not itself touch backend bytes — that is `FileIO`'s
    /// responsibility once the write path following the truncate actually
    /// runs.
    #[tracing::instrument(level = "debug", skip(self, req), fields(ino = ino.get()))]
    pub async fn setattr(&self, ino: Ino, req: SetAttrRequest) -> Result<EntryReply, VfsError> {
        let mut touched_size = false;
        self.tree
            .with_entry_mut(ino, |e| {
                if let Some(mode) = req.mode {
                    let type_bits = e.mode & 0o170000;
                    e.mode = (mode & 0o7777) | type_bits;
                }
                if let Some(size) = req.size {
                    if e.is_file() && size != e.size {
                        e.size = size;
                        e.is_modified = true;
                        touched_size = true;
                    }
                }
                if let Some(atime) = req.atime {
                    e.access_time = atime.resolve();
                }
                if let Some(mtime) = req.mtime {
                    e.updated_time = mtime.resolve();
                }
            })
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))?;

        if touched_size {
            self.tree.entry_modified(ino);
        }

        let entry = self.resolve(ino)?;
        Ok(self.entry_reply(&entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_test_vfs, ROOT};

    #[tokio::test]
    async fn getattr_returns_current_entry() {
        let vfs = new_test_vfs();
        let reply = vfs.getattr(ROOT).await.unwrap();
        assert_eq!(reply.ino, ROOT);
    }

    #[tokio::test]
    async fn getattr_unknown_inode_fails() {
        let vfs = new_test_vfs();
        let err = vfs.getattr(Ino::new(9999)).await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn setattr_truncate_marks_modified_and_invalidates_parent_cache() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        vfs.tree
            .with_entry_mut(ROOT, |e| {
                let dir = e.dir.as_mut().unwrap();
                dir.dir_cache = Some(vec![1]);
                dir.dir_cache_size = 1;
            });

        let reply = vfs
            .setattr(
                created.entry.ino,
                SetAttrRequest {
                    size: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.attr.size, 10);

        let (cache, _) = vfs
            .tree
            .with_entry(ROOT, |e| {
                let dir = e.dir.as_ref().unwrap();
                (dir.dir_cache.clone(), dir.dir_cache_size)
            })
            .unwrap();
        assert!(cache.is_none());
    }
}
