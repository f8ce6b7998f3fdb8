//! `remove` / `unlink` / `rmdir`.

use crate::error::VfsError;
use crate::inode::Ino;

use super::Vfs;

impl Vfs {
    /// `file_remove(ino)`: drops cached bytes, issues the backend DELETE,
    /// and only tombstones the Entry once that DELETE succeeds — on
    /// failure the Entry is left exactly as it was.
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get()))]
    pub async fn file_remove(&self, ino: Ino) -> Result<(), VfsError> {
        let entry = self.resolve(ino)?;
        if !entry.is_file() {
            return Err(VfsError::IsADirectory(format!("inode {ino}")));
        }

        self.cache_mng.remove_file(ino).await;
        self.object_store.delete(&entry.fullpath).await?;

        self.tree.with_entry_mut(ino, |e| {
            e.removed = true;
            e.age = 0;
        });
        self.tree.with_entry_mut(entry.parent_ino, |e| e.invalidate_dir_cache());
        Ok(())
    }

    /// `unlink(parent_ino, name)`: resolves to an inode, delegates to
    /// `file_remove`.
    #[tracing::instrument(level = "debug", skip(self), fields(parent = parent_ino.get(), name))]
    pub async fn unlink(&self, parent_ino: Ino, name: &str) -> Result<(), VfsError> {
        let ino = self
            .tree
            .lookup_child(parent_ino, name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        self.file_remove(ino).await
    }

    /// `dir_remove(parent_ino, name)`: synchronous, no network — a
    /// Directory is "empty" iff every child is itself tombstoned
    /// (`removed == true`), not iff `children` is literally drained. S3
    /// directories are virtual, so no backend DELETE is issued.
    #[tracing::instrument(level = "debug", skip(self), fields(parent = parent_ino.get(), name))]
    pub fn dir_remove(&self, parent_ino: Ino, name: &str) -> Result<(), VfsError> {
        let ino = self
            .tree
            .lookup_child(parent_ino, name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;

        let is_dir = self
            .tree
            .with_entry(ino, |e| e.is_directory())
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))?;
        if !is_dir {
            return Err(VfsError::NotADirectory(format!("inode {ino}")));
        }

        let child_inos: Vec<Ino> = self
            .tree
            .with_entry(ino, |e| e.dir.as_ref().expect("checked above").children.values().copied().collect())
            .unwrap_or_default();

        let all_removed = child_inos
            .iter()
            .all(|&child| self.tree.with_entry(child, |e| e.removed).unwrap_or(true));
        if !all_removed {
            return Err(VfsError::NotEmpty(format!("inode {ino}")));
        }

        self.tree.with_entry_mut(ino, |e| {
            e.removed = true;
            e.age = 0;
        });
        self.tree.with_entry_mut(parent_ino, |e| e.invalidate_dir_cache());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_test_vfs, ROOT};

    #[tokio::test]
    async fn file_remove_tombstones_on_backend_success() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        vfs.file_release(created.fh).await.unwrap();

        vfs.file_remove(created.entry.ino).await.unwrap();
        assert!(vfs.tree.with_entry(created.entry.ino, |e| e.removed).unwrap());
        assert_eq!(vfs.tree.with_entry(created.entry.ino, |e| e.age).unwrap(), 0);
    }

    #[tokio::test]
    async fn file_remove_rejects_directory() {
        let vfs = new_test_vfs();
        let err = vfs.file_remove(ROOT).await.unwrap_err();
        assert!(matches!(err, VfsError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn dir_remove_rejects_non_empty_directory() {
        let vfs = new_test_vfs();
        let dir = vfs
            .tree
            .add_entry(ROOT, "sub", 0o755, crate::entry::EntryKind::Directory, 0, std::time::SystemTime::now())
            .unwrap();
        vfs.tree
            .add_entry(dir, "child.txt", 0o644, crate::entry::EntryKind::File, 0, std::time::SystemTime::now())
            .unwrap();

        let err = vfs.dir_remove(ROOT, "sub").unwrap_err();
        assert!(matches!(err, VfsError::NotEmpty(_)));
    }

    #[tokio::test]
    async fn dir_remove_succeeds_when_every_child_is_tombstoned() {
        let vfs = new_test_vfs();
        let dir = vfs
            .tree
            .add_entry(ROOT, "sub", 0o755, crate::entry::EntryKind::Directory, 0, std::time::SystemTime::now())
            .unwrap();
        let child = vfs
            .tree
            .add_entry(dir, "child.txt", 0o644, crate::entry::EntryKind::File, 0, std::time::SystemTime::now())
            .unwrap();
        vfs.tree.with_entry_mut(child, |e| e.removed = true);

        vfs.dir_remove(ROOT, "sub").unwrap();
        assert!(vfs.tree.with_entry(dir, |e| e.removed).unwrap());
    }
}
