//! The Tree: parent/child composition of Entries, inode allocation, and the
//! single mutex serialising all mutable access (C2 + C3).
//!
//! The teacher's `InodeTable` is a lock-free flat `DashMap` because
//! `lnxdrive-fuse` never needs cross-field invariants spanning parent and
//! child in the same critical section. Here, `add_entry` must atomically
//! check-then-insert into both the flat index and the parent's children map,
//! and `stop_update` must atomically scan-and-evict — so this generalises to
//! one `parking_lot::Mutex` guarding the whole tree, per the explicit
//! multi-threaded-substrate requirement. Callers must never hold the lock
//! across an `.await`; every public method here is synchronous and returns
//! owned data or runs a short closure under the lock.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::entry::{Entry, EntryKind};
use crate::error::VfsError;
use crate::inode::Ino;

struct TreeInner {
    entries: HashMap<u64, Entry>,
    max_ino: u64,
    current_write_ops: u64,
}

/// Owns every Entry reachable from root, plus the inode allocator.
pub struct Tree {
    inner: parking_lot::Mutex<TreeInner>,
    /// Default mode for newly created files (already type-bit-combined).
    pub fmode: u32,
    /// Default mode for newly created directories (already type-bit-combined).
    pub dmode: u32,
}

impl Tree {
    pub fn new(fmode: u32, dmode: u32) -> Self {
        let now = SystemTime::now();
        let root = Entry::root(dmode & 0o7777, now);
        let mut entries = HashMap::new();
        entries.insert(Ino::ROOT.get(), root);
        Tree {
            inner: parking_lot::Mutex::new(TreeInner {
                entries,
                max_ino: Ino::ROOT.get() + 1,
                current_write_ops: 0,
            }),
            fmode,
            dmode,
        }
    }

    /// Runs `f` against the Entry at `ino` under the lock, returning `None`
    /// if the inode is unknown. Never hold the returned value across an await.
    pub fn with_entry<R>(&self, ino: Ino, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let inner = self.inner.lock();
        inner.entries.get(&ino.get()).map(f)
    }

    /// Mutable counterpart of [`Tree::with_entry`].
    pub fn with_entry_mut<R>(&self, ino: Ino, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.entries.get_mut(&ino.get()).map(f)
    }

    /// Clones the Entry at `ino`. Used by continuations that must resolve
    /// the inode again after a suspension point rather than holding a
    /// reference across it.
    pub fn get_clone(&self, ino: Ino) -> Option<Entry> {
        let inner = self.inner.lock();
        inner.entries.get(&ino.get()).cloned()
    }

    pub fn contains(&self, ino: Ino) -> bool {
        let inner = self.inner.lock();
        inner.entries.contains_key(&ino.get())
    }

    /// Resolves a child by name within a directory.
    pub fn lookup_child(&self, parent_ino: Ino, name: &str) -> Option<Ino> {
        let inner = self.inner.lock();
        let parent = inner.entries.get(&parent_ino.get())?;
        let dir = parent.dir.as_ref()?;
        dir.children.get(name).copied()
    }

    /// Returns the current number of Entries in the index (for `get_stats`/`get_inode_count`).
    pub fn inode_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn increment_write_ops(&self) {
        self.inner.lock().current_write_ops += 1;
    }

    pub fn decrement_write_ops(&self) {
        let mut inner = self.inner.lock();
        inner.current_write_ops = inner.current_write_ops.saturating_sub(1);
    }

    pub fn current_write_ops(&self) -> u64 {
        self.inner.lock().current_write_ops
    }

    /// Resolves the parent, rejects a type-mismatched collision, invalidates
    /// the parent's listing cache twice (once before
    /// composing the path, defensively again after insertion), allocates a
    /// fresh inode, and inserts into both the flat index and the parent's
    /// children map.
    pub fn add_entry(
        &self,
        parent_ino: Ino,
        basename: &str,
        mode: u32,
        kind: EntryKind,
        size: u64,
        ctime: SystemTime,
    ) -> Result<Ino, VfsError> {
        let mut inner = self.inner.lock();

        let parent_age = {
            let parent = inner
                .entries
                .get(&parent_ino.get())
                .ok_or_else(|| VfsError::NotFound(format!("parent inode {parent_ino}")))?;
            if parent.dir.is_none() {
                return Err(VfsError::NotADirectory(format!("inode {parent_ino}")));
            }
            if let Some(existing_ino) = parent.dir.as_ref().unwrap().children.get(basename) {
                let existing = &inner.entries[&existing_ino.get()];
                if existing.kind != kind {
                    return Err(VfsError::TypeMismatch(basename.to_string()));
                }
            }
            parent.age
        };

        // invalidate parent's listing cache (step 3)
        if let Some(parent) = inner.entries.get_mut(&parent_ino.get()) {
            parent.invalidate_dir_cache();
        }

        let fullpath = {
            let parent = &inner.entries[&parent_ino.get()];
            if parent.fullpath.is_empty() {
                basename.to_string()
            } else {
                format!("{}/{}", parent.fullpath, basename)
            }
        };

        let ino = Ino::new(inner.max_ino);
        inner.max_ino += 1;

        let now = SystemTime::now();
        let entry = Entry::new(
            ino, parent_ino, basename.to_string(), fullpath, kind, mode, size, ctime, parent_age,
            now,
        );
        inner.entries.insert(ino.get(), entry);

        if let Some(parent) = inner.entries.get_mut(&parent_ino.get()) {
            parent
                .dir
                .as_mut()
                .expect("checked above")
                .children
                .insert(basename.to_string(), ino);
            // defensive re-invalidation (step 8)
            parent.invalidate_dir_cache();
        }

        Ok(ino)
    }

    /// Drops the Entry's own dir cache (if it is a Directory) or recurses
    /// to its parent.
    pub fn entry_modified(&self, ino: Ino) {
        let mut inner = self.inner.lock();
        let mut current = ino;
        loop {
            let Some(entry) = inner.entries.get_mut(&current.get()) else {
                return;
            };
            if entry.dir.is_some() {
                entry.invalidate_dir_cache();
                return;
            }
            let parent = entry.parent_ino;
            if parent == current {
                return;
            }
            current = parent;
        }
    }

    /// Detaches an Entry from the index and its parent's children map,
    /// returning the removed Entry. Used by the reconciler's file-only
    /// eviction pass. Not used by `dir_remove`, which only tombstones per
    /// the literal source semantics (see DESIGN.md).
    pub fn evict_entry(&self, ino: Ino) -> Option<Entry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&ino.get())?;
        if let Some(parent) = inner.entries.get_mut(&entry.parent_ino.get()) {
            if let Some(dir) = &mut parent.dir {
                dir.children.remove(&entry.basename);
            }
        }
        Some(entry)
    }
}
