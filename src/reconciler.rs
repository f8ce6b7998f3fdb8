//! Age-based reconciliation between a fresh directory listing and the tree.
//!
//! A fresh directory listing is treated as the truth for that moment; we
//! never trust an incremental diff from the backend.

use std::time::SystemTime;

use crate::entry::EntryKind;
use crate::error::VfsError;
use crate::inode::Ino;
use crate::tree::Tree;

/// One row of a directory listing as returned by the backend.
#[derive(Debug, Clone)]
pub struct ListingRow {
    pub basename: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: SystemTime,
}

/// `start_update(D)`: bumps `D.age`. New and refreshed entries inherit the
/// new age during this round; anything left at the old age is a stale
/// candidate for `stop_update`.
pub fn start_update(tree: &Tree, dir: Ino) -> Result<u64, VfsError> {
    tree.with_entry_mut(dir, |e| {
        e.age += 1;
        e.age
    })
    .ok_or_else(|| VfsError::NotFound(format!("inode {dir}")))
}

/// Processes one listing row: refreshes an existing child's age/size and
/// clears its tombstone, or allocates a new Entry at the directory's current age.
pub fn update_entry(tree: &Tree, dir: Ino, row: &ListingRow) -> Result<Ino, VfsError> {
    let dir_age = tree
        .with_entry(dir, |e| e.age)
        .ok_or_else(|| VfsError::NotFound(format!("inode {dir}")))?;

    if let Some(child_ino) = tree.lookup_child(dir, &row.basename) {
        tree.with_entry_mut(child_ino, |e| {
            e.age = dir_age;
            e.size = row.size;
            e.removed = false;
        });
        Ok(child_ino)
    } else {
        let mode = match row.kind {
            EntryKind::Directory => tree.dmode,
            EntryKind::File => tree.fmode,
        };
        tree.add_entry(dir, &row.basename, mode, row.kind, row.size, row.mtime)
    }
}

/// `stop_update(D)`: evicts every child that is stale (not refreshed this
/// round), unmodified, untouched recently, and a File — directories are
/// never evicted by this pass; only `dir_remove` removes them, per the
/// open-question note in the source this was distilled from.
pub fn stop_update(tree: &Tree, dir: Ino, dir_cache_max_time_secs: u64) -> Result<(), VfsError> {
    let dir_age = tree
        .with_entry(dir, |e| e.age)
        .ok_or_else(|| VfsError::NotFound(format!("inode {dir}")))?;

    let candidates: Vec<Ino> = tree
        .with_entry(dir, |e| {
            e.dir
                .as_ref()
                .expect("stop_update target must be a directory")
                .children
                .values()
                .copied()
                .collect::<Vec<_>>()
        })
        .ok_or_else(|| VfsError::NotFound(format!("inode {dir}")))?;

    let now = SystemTime::now();
    let max_age = std::time::Duration::from_secs(dir_cache_max_time_secs);

    for child_ino in candidates {
        let evict = tree
            .with_entry(child_ino, |c| {
                c.age < dir_age
                    && !c.is_modified
                    && now
                        .duration_since(c.access_time)
                        .map(|elapsed| elapsed >= max_age)
                        .unwrap_or(false)
                    && c.is_file()
            })
            .unwrap_or(false);

        if evict {
            tree.evict_entry(child_ino);
        }
    }

    Ok(())
}
