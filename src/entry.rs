//! The Entry type: one filesystem object (file or directory).
//!
//! Mirrors the teacher's `InodeEntry`, generalised per the data model: a
//! Directory owns its children directly (`DirState::children`) rather than
//! being reconstructed by a flat scan over the index, and carries the
//! listing-cache fields the reconciler and directory buffer assembler need.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::inode::Ino;

/// Unix file-type bits, pre-combined into `Entry::mode`.
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;
const S_IFMT: u32 = 0o170000;

/// Whether an Entry is a file or a directory.
///
/// Symlinks are represented as `File` with the `S_IFLNK` bit set in `mode`,
/// per the data model — there is no separate `Symlink` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_fuser(self) -> fuser::FileType {
        match self {
            EntryKind::File => fuser::FileType::RegularFile,
            EntryKind::Directory => fuser::FileType::Directory,
        }
    }
}

/// Extended attributes mirrored from backend response headers.
#[derive(Debug, Clone, Default)]
pub struct Xattrs {
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
}

/// Directory-only state: children, and the serialised listing-cache buffer.
#[derive(Debug, Clone, Default)]
pub struct DirState {
    /// `basename -> ino`, case-sensitive, unique keys.
    pub children: HashMap<String, Ino>,
    /// Opaque serialised buffer handed back to the FUSE adapter.
    pub dir_cache: Option<Vec<u8>>,
    pub dir_cache_size: usize,
    pub dir_cache_created: SystemTime,
    /// True while a listing refresh is in flight for this directory.
    pub dir_cache_updating: bool,
}

impl DirState {
    fn new(now: SystemTime) -> Self {
        Self {
            children: HashMap::new(),
            dir_cache: None,
            dir_cache_size: 0,
            dir_cache_created: now,
            dir_cache_updating: false,
        }
    }
}

/// One object in the namespace: a file or a directory.
#[derive(Debug, Clone)]
pub struct Entry {
    pub ino: Ino,
    /// 0 (well, `Ino::ROOT`'s own parent is itself) only for root; otherwise another Entry's ino.
    pub parent_ino: Ino,
    pub basename: String,
    /// Path relative to the bucket root, no leading slash; empty for root.
    pub fullpath: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub ctime: SystemTime,
    /// Generation counter; see the reconciler.
    pub age: u64,
    /// Tombstone flag: kept briefly to serve negative lookups.
    pub removed: bool,
    /// Local modifications not yet acknowledged by the backend.
    pub is_modified: bool,
    /// An HTTP refresh for this Entry is in flight.
    pub is_updating: bool,
    pub access_time: SystemTime,
    pub updated_time: SystemTime,
    pub xattr_time: SystemTime,
    /// `Some` iff `kind == Directory`.
    pub dir: Option<DirState>,
    pub xattrs: Xattrs,
}

impl Entry {
    /// Constructs the root Entry.
    pub fn root(mode: u32, now: SystemTime) -> Self {
        Entry {
            ino: Ino::ROOT,
            parent_ino: Ino::ROOT,
            basename: String::new(),
            fullpath: String::new(),
            kind: EntryKind::Directory,
            mode: mode | S_IFDIR,
            size: 0,
            ctime: now,
            age: 0,
            removed: false,
            is_modified: false,
            is_updating: false,
            access_time: now,
            updated_time: now,
            xattr_time: now,
            dir: Some(DirState::new(now)),
            xattrs: Xattrs::default(),
        }
    }

    /// Constructs a new non-root Entry. `age` should be set to the parent's
    /// current age by the caller (new entries are born fresh).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ino: Ino,
        parent_ino: Ino,
        basename: String,
        fullpath: String,
        kind: EntryKind,
        mode: u32,
        size: u64,
        ctime: SystemTime,
        age: u64,
        now: SystemTime,
    ) -> Self {
        let dir = match kind {
            EntryKind::Directory => Some(DirState::new(now)),
            EntryKind::File => None,
        };
        Entry {
            ino,
            parent_ino,
            basename,
            fullpath,
            kind,
            mode,
            size,
            ctime,
            age,
            removed: false,
            is_modified: false,
            is_updating: false,
            access_time: now,
            updated_time: now,
            xattr_time: now,
            dir,
            xattrs: Xattrs::default(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    /// Whether the link-mode bit is set — symlinks are Files with this bit.
    pub fn is_symlink(&self) -> bool {
        self.is_file() && (self.mode & S_IFMT) == S_IFLNK
    }

    /// Promotes a File entry to a symlink by setting the link-mode bit.
    pub fn mark_symlink(&mut self) {
        self.mode = (self.mode & !S_IFMT) | S_IFLNK;
    }

    /// Promotes this Entry in place to a Directory, creating `children` if
    /// absent and dropping any stale dir cache. Used when a HEAD response
    /// reveals a zero-byte object is actually a directory marker.
    pub fn promote_to_directory(&mut self, now: SystemTime) {
        if self.dir.is_none() {
            self.dir = Some(DirState::new(now));
        } else if let Some(dir) = &mut self.dir {
            dir.dir_cache = None;
            dir.dir_cache_size = 0;
        }
        self.kind = EntryKind::Directory;
        self.mode = (self.mode & !S_IFMT) | S_IFDIR;
    }

    /// Drops the directory-listing cache (does not reset `dir_cache_created`,
    /// which rate-limits refreshes).
    pub fn invalidate_dir_cache(&mut self) {
        if let Some(dir) = &mut self.dir {
            dir.dir_cache = None;
            dir.dir_cache_size = 0;
        }
    }

    /// Converts this Entry to a `fuser::FileAttr` for `getattr`/`lookup` replies.
    pub fn to_attr(&self, uid: u32, gid: u32) -> fuser::FileAttr {
        fuser::FileAttr {
            ino: self.ino.get(),
            size: self.size,
            blocks: self.size.div_ceil(512),
            atime: self.access_time,
            mtime: self.updated_time,
            ctime: self.ctime,
            crtime: self.ctime,
            kind: if self.is_symlink() {
                fuser::FileType::Symlink
            } else {
                self.kind.as_fuser()
            },
            perm: (self.mode & 0o7777) as u16,
            nlink: 1,
            uid,
            gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_reserved_inode_and_empty_path() {
        let root = Entry::root(0o755, SystemTime::now());
        assert_eq!(root.ino, Ino::ROOT);
        assert_eq!(root.fullpath, "");
        assert!(root.is_directory());
        assert!(root.dir.is_some());
    }

    #[test]
    fn symlink_mark_and_detect_roundtrip() {
        let mut e = Entry::new(
            Ino::new(2),
            Ino::ROOT,
            "link".into(),
            "link".into(),
            EntryKind::File,
            0o644 | S_IFREG,
            4,
            SystemTime::now(),
            0,
            SystemTime::now(),
        );
        assert!(!e.is_symlink());
        e.mark_symlink();
        assert!(e.is_symlink());
        assert!(e.is_file());
    }

    #[test]
    fn promote_to_directory_creates_children_map() {
        let mut e = Entry::new(
            Ino::new(2),
            Ino::ROOT,
            "marker".into(),
            "marker".into(),
            EntryKind::File,
            0o644 | S_IFREG,
            0,
            SystemTime::now(),
            0,
            SystemTime::now(),
        );
        e.promote_to_directory(SystemTime::now());
        assert!(e.is_directory());
        assert!(e.dir.as_ref().unwrap().children.is_empty());
    }
}
