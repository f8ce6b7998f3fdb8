//! `rename` — two-phase copy+delete.

use std::time::SystemTime;

use crate::config::RENAME_SIZE_LIMIT;
use crate::entry::EntryKind;
use crate::error::VfsError;
use crate::inode::Ino;
use crate::reconciler::{update_entry, ListingRow};

use super::Vfs;

impl Vfs {
    /// `rename(old_parent, old_name, new_parent, new_name)`: copies the
    /// source object to the destination key, then deletes the source, as
    /// two independent HTTP round-trips. A phase-1 success followed by a
    /// phase-2 failure leaves the copied destination object orphaned — not
    /// cleaned up here, matching the literal source behaviour (DESIGN.md).
    #[tracing::instrument(level = "debug", skip(self), fields(old_parent = old_parent.get(), old_name, new_parent = new_parent.get(), new_name))]
    pub async fn rename(
        &self,
        old_parent: Ino,
        old_name: &str,
        new_parent: Ino,
        new_name: &str,
    ) -> Result<(), VfsError> {
        let old_ino = self
            .tree
            .lookup_child(old_parent, old_name)
            .ok_or_else(|| VfsError::NotFound(old_name.to_string()))?;
        let source = self.resolve(old_ino)?;
        if !source.is_file() {
            return Err(VfsError::Unsupported("rename of a directory".to_string()));
        }
        if source.size >= RENAME_SIZE_LIMIT {
            return Err(VfsError::RenameTooLarge {
                size: source.size,
                limit: RENAME_SIZE_LIMIT,
            });
        }

        let new_parent_entry = self.resolve(new_parent)?;
        if !new_parent_entry.is_directory() {
            return Err(VfsError::NotADirectory(format!("inode {new_parent}")));
        }

        let dest_fullpath = if new_parent_entry.fullpath.is_empty() {
            new_name.to_string()
        } else {
            format!("{}/{}", new_parent_entry.fullpath, new_name)
        };

        let copy_source = if self.config.s3.key_prefix.is_empty() {
            format!("{}/{}", self.config.s3.bucket_name, source.fullpath)
        } else {
            format!("{}{}{}", self.config.s3.bucket_name, self.config.s3.key_prefix, source.fullpath)
        };

        self.object_store
            .put_with_headers(
                &dest_fullpath,
                Vec::new(),
                vec![
                    ("x-amz-copy-source".to_string(), copy_source),
                    ("x-amz-storage-class".to_string(), self.config.s3.storage_type.clone()),
                ],
            )
            .await?;

        let dest_ino = update_entry(
            &self.tree,
            new_parent,
            &ListingRow {
                basename: new_name.to_string(),
                kind: EntryKind::File,
                size: source.size,
                mtime: SystemTime::now(),
            },
        )?;
        self.tree.with_entry_mut(dest_ino, |e| {
            e.removed = false;
            e.access_time = SystemTime::now();
        });
        self.tree.with_entry_mut(new_parent, |e| e.invalidate_dir_cache());

        self.object_store.delete(&source.fullpath).await?;

        self.tree.with_entry_mut(old_ino, |e| e.removed = true);
        self.tree.with_entry_mut(old_parent, |e| e.invalidate_dir_cache());
        Ok(())
    }
}
