//! `create` / `open` / `release` — file handle lifecycle — plus
//! `dir_create`, the synchronous mkdir counterpart to `dir_remove`.

use std::time::SystemTime;

use crate::entry::{EntryKind, S_IFDIR, S_IFREG};
use crate::error::VfsError;
use crate::inode::Ino;

use super::{EntryReply, OpenFileState, Vfs};

/// Reply to `create`: the new Entry's attributes plus the file handle the
/// adapter should hand back to the kernel for subsequent read/write/release.
#[derive(Debug, Clone)]
pub struct CreateReply {
    pub entry: EntryReply,
    pub fh: u64,
}

impl Vfs {
    /// `create(parent_ino, name, mode)`: reuses an existing same-name File
    /// (clearing its tombstone) or allocates a new one, marks it modified,
    /// and opens a "new-object" FileIO handle for it.
    #[tracing::instrument(level = "debug", skip(self), fields(parent = parent_ino.get(), name))]
    pub async fn file_create(&self, parent_ino: Ino, name: &str, mode: u32) -> Result<CreateReply, VfsError> {
        let parent_is_dir = self
            .tree
            .with_entry(parent_ino, |e| e.is_directory())
            .ok_or_else(|| VfsError::NotFound(format!("inode {parent_ino}")))?;
        if !parent_is_dir {
            return Err(VfsError::NotADirectory(format!("inode {parent_ino}")));
        }

        let now = SystemTime::now();
        let full_mode = (mode & 0o7777) | S_IFREG;

        let ino = if let Some(existing_ino) = self.tree.lookup_child(parent_ino, name) {
            let is_file = self.tree.with_entry(existing_ino, |e| e.is_file()).unwrap_or(false);
            if !is_file {
                return Err(VfsError::TypeMismatch(name.to_string()));
            }
            let parent_age = self.tree.with_entry(parent_ino, |e| e.age).unwrap_or(0);
            self.tree.with_entry_mut(existing_ino, |e| {
                e.removed = false;
                e.access_time = now;
                e.age = parent_age;
            });
            self.tree.with_entry_mut(parent_ino, |e| e.invalidate_dir_cache());
            existing_ino
        } else {
            self.tree.add_entry(parent_ino, name, full_mode, EntryKind::File, 0, now)?
        };

        self.tree.with_entry_mut(ino, |e| e.is_modified = true);

        let fullpath = self
            .tree
            .with_entry(ino, |e| e.fullpath.clone())
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))?;
        let handle = self.file_io.create(&fullpath, ino, true).await?;
        let fh = self.alloc_fh();
        self.open_files.insert(fh, OpenFileState { ino, handle });

        let entry = self.resolve(ino)?;
        Ok(CreateReply {
            entry: self.entry_reply(&entry),
            fh,
        })
    }

    /// `open(ino)`: opens a "read-existing" FileIO handle for an already
    /// existing File, returning the file handle the adapter threads through
    /// subsequent `read`/`write`/`release` calls.
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get()))]
    pub async fn file_open(&self, ino: Ino) -> Result<u64, VfsError> {
        let entry = self.resolve(ino)?;
        if !entry.is_file() {
            return Err(VfsError::IsADirectory(format!("inode {ino}")));
        }

        let handle = self.file_io.create(&entry.fullpath, ino, false).await?;
        let fh = self.alloc_fh();
        self.open_files.insert(fh, OpenFileState { ino, handle });
        Ok(fh)
    }

    /// `release(fh)`: disposes the FileIO handle, flushing any pending
    /// upload.
    #[tracing::instrument(level = "debug", skip(self), fields(fh))]
    pub async fn file_release(&self, fh: u64) -> Result<(), VfsError> {
        let (_, state) = self
            .open_files
            .remove(&fh)
            .ok_or_else(|| VfsError::NotFound(format!("file handle {fh}")))?;
        state.handle.release().await?;
        Ok(())
    }

    /// `dir_create(parent_ino, name, mode)`: allocates a Directory Entry
    /// synchronously, with no backend round-trip — S3 directories are
    /// virtual, materialised only implicitly by the objects eventually
    /// created beneath them, same as `dir_remove`'s tombstone-only path.
    #[tracing::instrument(level = "debug", skip(self), fields(parent = parent_ino.get(), name))]
    pub async fn dir_create(&self, parent_ino: Ino, name: &str, mode: u32) -> Result<EntryReply, VfsError> {
        let parent_is_dir = self
            .tree
            .with_entry(parent_ino, |e| e.is_directory())
            .ok_or_else(|| VfsError::NotFound(format!("inode {parent_ino}")))?;
        if !parent_is_dir {
            return Err(VfsError::NotADirectory(format!("inode {parent_ino}")));
        }

        let now = SystemTime::now();
        let full_mode = (mode & 0o7777) | S_IFDIR;

        let ino = if let Some(existing_ino) = self.tree.lookup_child(parent_ino, name) {
            let is_dir = self.tree.with_entry(existing_ino, |e| e.is_directory()).unwrap_or(false);
            if !is_dir {
                return Err(VfsError::TypeMismatch(name.to_string()));
            }
            let parent_age = self.tree.with_entry(parent_ino, |e| e.age).unwrap_or(0);
            self.tree.with_entry_mut(existing_ino, |e| {
                e.removed = false;
                e.access_time = now;
                e.age = parent_age;
            });
            self.tree.with_entry_mut(parent_ino, |e| e.invalidate_dir_cache());
            existing_ino
        } else {
            self.tree.add_entry(parent_ino, name, full_mode, EntryKind::Directory, 0, now)?
        };

        let entry = self.resolve(ino)?;
        Ok(self.entry_reply(&entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_test_vfs, ROOT};

    #[tokio::test]
    async fn create_allocates_entry_and_handle() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        assert_eq!(created.entry.attr.size, 0);
        assert!(vfs.tree.with_entry(created.entry.ino, |e| e.is_modified).unwrap());
        vfs.file_release(created.fh).await.unwrap();
    }

    #[tokio::test]
    async fn create_on_existing_tombstone_clears_removed() {
        let vfs = new_test_vfs();
        let first = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        vfs.file_release(first.fh).await.unwrap();
        vfs.tree.with_entry_mut(first.entry.ino, |e| e.removed = true);

        let second = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        assert_eq!(second.entry.ino, first.entry.ino);
        assert!(!vfs.tree.with_entry(second.entry.ino, |e| e.removed).unwrap());
        vfs.file_release(second.fh).await.unwrap();
    }

    #[tokio::test]
    async fn create_rejects_missing_parent() {
        let vfs = new_test_vfs();
        let err = vfs.file_create(Ino::new(9999), "a.txt", 0o644).await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn open_rejects_directory() {
        let vfs = new_test_vfs();
        let err = vfs.file_open(ROOT).await.unwrap_err();
        assert!(matches!(err, VfsError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn dir_create_allocates_directory_entry_without_network() {
        let (vfs, doubles) = crate::testutil::new_test_vfs_with_doubles();
        let reply = vfs.dir_create(ROOT, "sub", 0o755).await.unwrap();
        assert_eq!(reply.attr.kind, fuser::FileType::Directory);
        assert_eq!(doubles.object_store.put_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dir_create_on_existing_tombstoned_dir_clears_removed() {
        let vfs = new_test_vfs();
        let first = vfs.dir_create(ROOT, "sub", 0o755).await.unwrap();
        vfs.tree.with_entry_mut(first.ino, |e| e.removed = true);

        let second = vfs.dir_create(ROOT, "sub", 0o755).await.unwrap();
        assert_eq!(second.ino, first.ino);
        assert!(!vfs.tree.with_entry(second.ino, |e| e.removed).unwrap());
    }

    #[tokio::test]
    async fn dir_create_rejects_type_mismatch_with_existing_file() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "x", 0o644).await.unwrap();
        vfs.file_release(created.fh).await.unwrap();
        let err = vfs.dir_create(ROOT, "x", 0o755).await.unwrap_err();
        assert!(matches!(err, VfsError::TypeMismatch(_)));
    }
}
