//! `lookup` (spec §4.5.2): resolve a name within a directory.

use std::time::{Duration, SystemTime};

use crate::entry::EntryKind;
use crate::error::VfsError;
use crate::headers::{apply_head_response, find_header};
use crate::inode::Ino;
use crate::reconciler::{start_update, stop_update, update_entry, ListingRow};

use super::{EntryReply, Vfs};

impl Vfs {
    /// `lookup(parent_ino, name)`.
    #[tracing::instrument(level = "debug", skip(self), fields(parent = parent_ino.get(), name))]
    pub async fn lookup(&self, parent_ino: Ino, name: &str) -> Result<EntryReply, VfsError> {
        self.lookup_inner(parent_ino, name, false).await
    }

    /// `already_refreshed` bounds the single recursion a dir-cache-expired
    /// refresh is allowed to trigger, so a backend that never produces a
    /// fresh listing cannot drive this into an infinite loop.
    async fn lookup_inner(&self, parent_ino: Ino, name: &str, already_refreshed: bool) -> Result<EntryReply, VfsError> {
        let parent = self.resolve(parent_ino)?;
        if !parent.is_directory() {
            return Err(VfsError::NotADirectory(format!("inode {parent_ino}")));
        }

        if !already_refreshed && self.dir_cache_expired(parent_ino) {
            self.refresh_directory(parent_ino, &parent.fullpath).await?;
            return Box::pin(self.lookup_inner(parent_ino, name, true)).await;
        }

        let max_age = Duration::from_secs(self.config.filesystem.dir_cache_max_time);
        let max_negative_age = Duration::from_secs(self.config.filesystem.file_cache_max_time);
        let now = SystemTime::now();

        if let Some(child_ino) = self.tree.lookup_child(parent_ino, name) {
            let snapshot = self
                .tree
                .with_entry(child_ino, |e| {
                    (e.removed, e.access_time, e.is_modified, e.is_updating, e.is_file(), e.updated_time, e.size)
                })
                .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
            let (removed, access_time, is_modified, is_updating, is_file, updated_time, size) = snapshot;

            if removed {
                let still_negative = now.duration_since(access_time).map(|e| e < max_negative_age).unwrap_or(true);
                if still_negative {
                    return Err(VfsError::NotFound(name.to_string()));
                }
            }

            self.tree.with_entry_mut(child_ino, |e| e.access_time = now);

            let needs_head = is_file
                && !is_updating
                && (is_modified
                    || (now.duration_since(updated_time).map(|e| e >= max_age).unwrap_or(false)
                        && ((self.config.s3.check_empty_files && size == 0) || self.config.s3.force_head_requests_on_lookup)));

            if needs_head {
                let fullpath = self
                    .tree
                    .with_entry(child_ino, |e| e.fullpath.clone())
                    .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
                self.tree.with_entry_mut(child_ino, |e| e.is_updating = true);
                let head_result = self.object_store.head(&fullpath).await;
                self.tree.with_entry_mut(child_ino, |e| e.is_updating = false);
                if let Ok(resp) = head_result {
                    let now = SystemTime::now();
                    self.tree.with_entry_mut(child_ino, |e| {
                        apply_head_response(e, &resp, now);
                        e.is_modified = false;
                    });
                }
            }

            let entry = self.resolve(child_ino)?;
            Ok(self.entry_reply(&entry))
        } else {
            let fullpath = if parent.fullpath.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", parent.fullpath, name)
            };

            match self.object_store.head(&fullpath).await {
                Err(err) if err.to_string().contains("404") => {
                    let ino = self
                        .tree
                        .add_entry(parent_ino, name, self.tree.fmode, EntryKind::File, 0, now)?;
                    self.tree.with_entry_mut(ino, |e| e.removed = true);
                    Err(VfsError::NotFound(name.to_string()))
                }
                Err(err) => Err(VfsError::from(err)),
                Ok(resp) => {
                    let size = find_header(&resp.headers, "Content-Length")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    let ino = update_entry(
                        &self.tree,
                        parent_ino,
                        &ListingRow {
                            basename: name.to_string(),
                            kind: EntryKind::File,
                            size,
                            mtime: now,
                        },
                    )?;
                    self.tree.with_entry_mut(ino, |e| apply_head_response(e, &resp, now));
                    let entry = self.resolve(ino)?;
                    Ok(self.entry_reply(&entry))
                }
            }
        }
    }

    /// Whether `ino`'s directory needs a fresh listing before a `lookup`
    /// proceeds. A directory that has never been listed (`dir_cache_size
    /// == 0`, e.g. just after mount) is expired by definition regardless
    /// of `dir_cache_created`'s TTL. Otherwise keyed on `dir_cache_created`'s
    /// TTL, not on whether the serialised `dir_cache` buffer `fill_dir_buf`
    /// builds is currently populated — a local mutation (`create`, `write`,
    /// ...) clears that buffer via `invalidate_dir_cache` without touching
    /// `dir_cache_created`, so `create` immediately followed by `lookup`
    /// never forces a listing round-trip it doesn't need.
    fn dir_cache_expired(&self, ino: Ino) -> bool {
        let max_age = Duration::from_secs(self.config.filesystem.dir_cache_max_time);
        let now = SystemTime::now();
        self.tree
            .with_entry(ino, |e| {
                let Some(dir) = e.dir.as_ref() else { return true };
                if dir.dir_cache_size == 0 {
                    return true;
                }
                now.duration_since(dir.dir_cache_created).map(|elapsed| elapsed > max_age).unwrap_or(true)
            })
            .unwrap_or(true)
    }

    /// Drives one full directory-listing refresh, the same sequence
    /// `fill_dir_buf` runs on a cache miss, without assembling a buffer —
    /// `lookup` only needs the Tree updated, not a serialised reply.
    async fn refresh_directory(&self, ino: Ino, fullpath: &str) -> Result<(), VfsError> {
        self.tree.with_entry_mut(ino, |e| {
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_updating = true;
            }
        });

        let result: Result<(), VfsError> = async {
            start_update(&self.tree, ino)?;
            let rows = self.object_store.list_directory(fullpath).await.map_err(VfsError::from)?;
            for row in &rows {
                update_entry(&self.tree, ino, row)?;
            }
            stop_update(&self.tree, ino, self.config.filesystem.dir_cache_max_time)
        }
        .await;

        self.tree.with_entry_mut(ino, |e| {
            e.is_modified = false;
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_updating = false;
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_test_vfs_with_doubles, FakeObjectMeta, ROOT};

    #[tokio::test]
    async fn lookup_refreshes_expired_dir_cache_then_resolves_child() {
        let (vfs, doubles) = new_test_vfs_with_doubles();
        doubles.object_store.insert_object("a.txt", FakeObjectMeta { size: 3, ..Default::default() });

        let reply = vfs.lookup(ROOT, "a.txt").await.unwrap();
        assert_eq!(reply.attr.size, 3);
        assert_eq!(doubles.object_store.list_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lookup_on_absent_child_issues_head_and_creates_tombstone_on_404() {
        let (vfs, doubles) = new_test_vfs_with_doubles();
        vfs.tree.with_entry_mut(ROOT, |e| {
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_size = 1;
                dir.dir_cache = Some(vec![0]);
            }
        });

        let err = vfs.lookup(ROOT, "missing.txt").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert_eq!(doubles.object_store.head_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let tombstoned = vfs.tree.lookup_child(ROOT, "missing.txt").unwrap();
        assert!(vfs.tree.with_entry(tombstoned, |e| e.removed).unwrap());
    }

    #[tokio::test]
    async fn lookup_on_absent_child_populates_entry_on_head_success() {
        let (vfs, doubles) = new_test_vfs_with_doubles();
        vfs.tree.with_entry_mut(ROOT, |e| {
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_size = 1;
                dir.dir_cache = Some(vec![0]);
            }
        });
        doubles.object_store.insert_object("new.txt", FakeObjectMeta { size: 7, ..Default::default() });

        let reply = vfs.lookup(ROOT, "new.txt").await.unwrap();
        assert_eq!(reply.attr.size, 7);
    }

    #[tokio::test]
    async fn repeated_lookup_of_tombstone_within_ttl_stays_negative() {
        let (vfs, doubles) = new_test_vfs_with_doubles();
        vfs.tree.with_entry_mut(ROOT, |e| {
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_size = 1;
                dir.dir_cache = Some(vec![0]);
            }
        });

        assert!(vfs.lookup(ROOT, "missing.txt").await.is_err());
        let first_head_calls = doubles.object_store.head_calls.load(std::sync::atomic::Ordering::SeqCst);
        assert!(vfs.lookup(ROOT, "missing.txt").await.is_err());
        assert_eq!(
            doubles.object_store.head_calls.load(std::sync::atomic::Ordering::SeqCst),
            first_head_calls,
            "a tombstone within the negative-cache TTL must not re-issue a HEAD"
        );
    }

    #[tokio::test]
    async fn lookup_rejects_non_directory_parent() {
        let (vfs, _doubles) = new_test_vfs_with_doubles();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        let err = vfs.lookup(created.entry.ino, "x").await.unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory(_)));
    }
}
