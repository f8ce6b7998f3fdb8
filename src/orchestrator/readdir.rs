//! `opendir` / `releasedir` / `fill_dir_buf` (readdir).

use std::time::{Duration, SystemTime};

use crate::dirbuf::{assemble, SimpleDirBuf};
use crate::error::VfsError;
use crate::inode::Ino;
use crate::reconciler::{start_update, stop_update, update_entry};

use super::{OpenDirState, Vfs};

/// Reply to `fill_dir_buf`: the assembled opaque buffer. The adapter hands
/// its bytes straight to the kernel; this core never interprets them.
#[derive(Debug, Clone)]
pub struct ReaddirReply {
    pub buffer: Vec<u8>,
}

impl Vfs {
    /// `opendir(ino)`: validates `ino` is a Directory and allocates a
    /// per-open handle for paginated `readdir` calls.
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get()))]
    pub fn opendir(&self, ino: Ino) -> Result<u64, VfsError> {
        let is_dir = self
            .tree
            .with_entry(ino, |e| e.is_directory())
            .ok_or_else(|| VfsError::NotFound(format!("inode {ino}")))?;
        if !is_dir {
            return Err(VfsError::NotADirectory(format!("inode {ino}")));
        }
        let fh = self.alloc_fh();
        self.open_dirs.insert(fh, OpenDirState { ino, snapshot: None });
        Ok(fh)
    }

    /// `releasedir(fh)`.
    pub fn releasedir(&self, fh: u64) -> Result<(), VfsError> {
        self.open_dirs
            .remove(&fh)
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound(format!("dir handle {fh}")))
    }

    /// `fill_dir_buf(fh, size, off)`: resolves, in order — pagination reuse,
    /// per-open snapshot reuse, fresh-tree-cache fast path, in-flight-refresh
    /// reuse, or a full listing refresh.
    #[tracing::instrument(level = "debug", skip(self), fields(fh, size = _size, off))]
    pub async fn fill_dir_buf(&self, fh: u64, _size: u32, off: i64) -> Result<ReaddirReply, VfsError> {
        let (ino, snapshot) = {
            let state = self
                .open_dirs
                .get(&fh)
                .ok_or_else(|| VfsError::NotFound(format!("dir handle {fh}")))?;
            (state.ino, state.snapshot.clone())
        };

        if off > 0 {
            return snapshot.map(|buffer| ReaddirReply { buffer }).ok_or_else(|| {
                VfsError::InvalidArgument("readdir offset requested without an existing snapshot".to_string())
            });
        }

        if let Some(buffer) = snapshot {
            return Ok(ReaddirReply { buffer });
        }

        let entry = self.resolve(ino)?;
        if !entry.is_directory() {
            return Err(VfsError::NotADirectory(format!("inode {ino}")));
        }

        let max_age = Duration::from_secs(self.config.filesystem.dir_cache_max_time);
        let now = SystemTime::now();
        let fresh_cache = self
            .tree
            .with_entry(ino, |e| {
                let dir = e.dir.as_ref()?;
                if dir.dir_cache_size == 0 || e.is_modified {
                    return None;
                }
                let age_ok = now
                    .duration_since(dir.dir_cache_created)
                    .map(|elapsed| elapsed <= max_age)
                    .unwrap_or(false);
                if age_ok {
                    dir.dir_cache.clone()
                } else {
                    None
                }
            })
            .flatten();

        if let Some(buffer) = fresh_cache {
            self.store_snapshot(fh, &buffer);
            return Ok(ReaddirReply { buffer });
        }

        let already_updating = self
            .tree
            .with_entry(ino, |e| e.dir.as_ref().map(|d| d.dir_cache_updating).unwrap_or(false))
            .unwrap_or(false);
        if already_updating {
            // A refresh for this Directory is already in flight. Rather than
            // await it, reuse whatever the local tree holds right now.
            let mut sink = SimpleDirBuf::new();
            assemble(&self.tree, ino, &mut sink)?;
            let buffer = sink.into_bytes();
            self.store_snapshot(fh, &buffer);
            return Ok(ReaddirReply { buffer });
        }

        self.tree.with_entry_mut(ino, |e| {
            if let Some(dir) = &mut e.dir {
                dir.dir_cache_updating = true;
            }
        });

        let refresh_result: Result<(), VfsError> = async {
            start_update(&self.tree, ino)?;
            let rows = self
                .object_store
                .list_directory(&entry.fullpath)
                .await
                .map_err(VfsError::from)?;
            for row in &rows {
                update_entry(&self.tree, ino, row)?;
            }
            stop_update(&self.tree, ino, self.config.filesystem.dir_cache_max_time)
        }
        .await;

        match refresh_result {
            Ok(()) => {
                let mut sink = SimpleDirBuf::new();
                assemble(&self.tree, ino, &mut sink)?;
                let buffer = sink.into_bytes();
                self.tree.with_entry_mut(ino, |e| {
                    e.is_modified = false;
                    if let Some(dir) = &mut e.dir {
                        dir.dir_cache = Some(buffer.clone());
                        dir.dir_cache_size = buffer.len();
                        dir.dir_cache_created = SystemTime::now();
                        dir.dir_cache_updating = false;
                    }
                });
                self.store_snapshot(fh, &buffer);
                Ok(ReaddirReply { buffer })
            }
            Err(err) => {
                // Failure leaves the existing (stale) cache untouched; only
                // the in-flight flag is cleared.
                self.tree.with_entry_mut(ino, |e| {
                    if let Some(dir) = &mut e.dir {
                        dir.dir_cache_updating = false;
                    }
                });
                Err(err)
            }
        }
    }

    fn store_snapshot(&self, fh: u64, buffer: &[u8]) {
        if let Some(mut state) = self.open_dirs.get_mut(&fh) {
            state.snapshot = Some(buffer.to_vec());
        }
    }
}
