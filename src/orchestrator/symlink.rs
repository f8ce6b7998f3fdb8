//! `symlink` / `readlink`.
//!
//! Symlinks are Files whose content is the target path string and whose
//! `mode` carries the link-mode bit (`entry::S_IFLNK`) — there is no
//! separate Entry variant.

use std::time::SystemTime;

use crate::entry::EntryKind;
use crate::error::VfsError;
use crate::inode::Ino;

use super::{EntryReply, Vfs};

impl Vfs {
    /// `create_symlink(parent_ino, name, target)`: creates/updates the
    /// Entry exactly as `create` does, marks it a symlink, then uploads
    /// `target`'s bytes as the whole object body.
    #[tracing::instrument(level = "debug", skip(self, target), fields(parent = parent_ino.get(), name))]
    pub async fn create_symlink(&self, parent_ino: Ino, name: &str, target: &str) -> Result<EntryReply, VfsError> {
        let parent_is_dir = self
            .tree
            .with_entry(parent_ino, |e| e.is_directory())
            .ok_or_else(|| VfsError::NotFound(format!("inode {parent_ino}")))?;
        if !parent_is_dir {
            return Err(VfsError::NotADirectory(format!("inode {parent_ino}")));
        }

        let now = SystemTime::now();
        let size = target.len() as u64;

        let ino = if let Some(existing_ino) = self.tree.lookup_child(parent_ino, name) {
            let parent_age = self.tree.with_entry(parent_ino, |e| e.age).unwrap_or(0);
            self.tree.with_entry_mut(existing_ino, |e| {
                e.removed = false;
                e.access_time = now;
                e.age = parent_age;
                e.mark_symlink();
            });
            self.tree.with_entry_mut(parent_ino, |e| e.invalidate_dir_cache());
            existing_ino
        } else {
            let ino = self.tree.add_entry(parent_ino, name, self.tree.fmode, EntryKind::File, size, now)?;
            self.tree.with_entry_mut(ino, |e| e.mark_symlink());
            ino
        };

        self.tree.with_entry_mut(ino, |e| {
            e.is_modified = true;
            e.size = size;
        });

        let fullpath = self
            .tree
            .with_entry(ino, |e| e.fullpath.clone())
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))?;
        self.file_io.simple_upload(&fullpath, target.as_bytes().to_vec()).await?;

        let entry = self.resolve(ino)?;
        Ok(self.entry_reply(&entry))
    }

    /// `readlink(ino)`: downloads the whole object body and returns it as
    /// the link target.
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get()))]
    pub async fn readlink(&self, ino: Ino) -> Result<String, VfsError> {
        let entry = self.resolve(ino)?;
        if !entry.is_symlink() {
            return Err(VfsError::InvalidArgument(format!("inode {ino} is not a symlink")));
        }
        let bytes = self.file_io.simple_download(&entry.fullpath).await?;
        String::from_utf8(bytes).map_err(|err| VfsError::Io(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_test_vfs, ROOT};

    #[tokio::test]
    async fn create_then_readlink_round_trips_target() {
        let vfs = new_test_vfs();
        let reply = vfs.create_symlink(ROOT, "link", "/target/path").await.unwrap();
        assert_eq!(reply.attr.kind, fuser::FileType::Symlink);

        let target = vfs.readlink(reply.ino).await.unwrap();
        assert_eq!(target, "/target/path");
    }

    #[tokio::test]
    async fn readlink_on_regular_file_fails() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        let err = vfs.readlink(created.entry.ino).await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidArgument(_)));
    }
}
