//! Directory buffer assembler.
//!
//! Serialises a Directory's surviving children into the opaque byte buffer
//! the FUSE adapter hands back to the kernel for `readdir`. This layer
//! never interprets the buffer's bytes once built — only byte length and
//! pointer matter to the caller — it only decides which entries go in and
//! in what order, via the `DirBufSink` trait the (out-of-scope) FUSE
//! adapter implements.
//!
//! Grounded on `lnxdrive-fuse/src/filesystem.rs::readdir`'s `.` / `..` /
//! children append loop, generalised from a direct `fuser::ReplyDirectory`
//! call into an owned, swappable sink so this crate doesn't depend on a
//! live kernel request to build a cache entry.

use crate::error::VfsError;
use crate::inode::Ino;
use crate::tree::Tree;

/// One row the assembler hands to a sink: `(name, ino, size)`, the same
/// shape as a kernel `add_dirbuf(req, buf, name, ino, size)` call minus the
/// request handle, which belongs to the FUSE adapter, not this core.
pub trait DirBufSink {
    /// Appends one entry. Returns `false` if the sink is full and no more
    /// entries should be added (mirrors `fuser::ReplyDirectory::add`'s
    /// boolean return, inverted to a "still has room" sense is avoided
    /// here — sinks that never fill, like the in-memory default, always
    /// return `true`).
    fn add_dirbuf(&mut self, name: &str, ino: u64, size: u64) -> bool;
}

/// Default in-memory sink: a simple length-prefixed record stream. Never
/// reports full — it has no kernel-imposed page-size ceiling. Used as the
/// default `dir_cache` representation and in tests.
#[derive(Debug, Clone, Default)]
pub struct SimpleDirBuf {
    bytes: Vec<u8>,
    pub entry_count: usize,
}

impl SimpleDirBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl DirBufSink for SimpleDirBuf {
    fn add_dirbuf(&mut self, name: &str, ino: u64, size: u64) -> bool {
        self.bytes.extend_from_slice(&ino.to_le_bytes());
        self.bytes.extend_from_slice(&size.to_le_bytes());
        let name_bytes = name.as_bytes();
        self.bytes
            .extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(name_bytes);
        self.entry_count += 1;
        true
    }
}

/// One decoded record from a [`SimpleDirBuf`]'s byte stream, for tests that
/// need to assert on buffer contents without re-deriving the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDirEntry {
    pub name: String,
    pub ino: u64,
    pub size: u64,
}

/// Decodes a [`SimpleDirBuf`]'s byte stream back into records. Exists only
/// to make the buffer's opacity testable from outside without leaking the
/// encoding into production code paths.
pub fn decode_simple_dirbuf(bytes: &[u8]) -> Vec<DecodedDirEntry> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 20 <= bytes.len() {
        let ino = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        let size = u64::from_le_bytes(bytes[pos + 8..pos + 16].try_into().unwrap());
        let name_len = u32::from_le_bytes(bytes[pos + 16..pos + 20].try_into().unwrap()) as usize;
        pos += 20;
        if pos + name_len > bytes.len() {
            break;
        }
        let name = String::from_utf8_lossy(&bytes[pos..pos + name_len]).into_owned();
        pos += name_len;
        out.push(DecodedDirEntry { name, ino, size });
    }
    out
}

/// Serialises `dir`'s surviving children into `sink`: synthetic `.` and
/// `..` first (both pointing at `dir` itself — the adapter tolerates this
/// for the immediate-parent case), then every
/// child with `age >= dir.age` and `removed == false`, in unspecified
/// order. Returns the finished bytes for storage in `dir_cache` when
/// `sink` is a [`SimpleDirBuf`]; callers using a different sink type
/// should ignore the return value and read the sink's own output instead.
pub fn assemble(tree: &Tree, dir: Ino, sink: &mut SimpleDirBuf) -> Result<(), VfsError> {
    sink.add_dirbuf(".", dir.get(), 0);
    sink.add_dirbuf("..", dir.get(), 0);

    let (dir_age, children) = tree
        .with_entry(dir, |e| {
            let dir_state = e.dir.as_ref().expect("assemble target must be a directory");
            (e.age, dir_state.children.clone())
        })
        .ok_or_else(|| VfsError::NotFound(format!("inode {dir}")))?;

    for (name, child_ino) in children {
        let survives = tree
            .with_entry(child_ino, |c| {
                if c.age < dir_age || c.removed {
                    None
                } else {
                    Some(c.size)
                }
            })
            .flatten();
        if let Some(size) = survives {
            sink.add_dirbuf(&name, child_ino.get(), size);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
    use crate::entry::EntryKind;
    use std::time::SystemTime;

    fn new_tree() -> Tree {
        Tree::new(DEFAULT_FILE_MODE, DEFAULT_DIR_MODE)
    }

    #[test]
    fn assembles_dot_dotdot_then_survivors() {
        let tree = new_tree();
        let a = tree
            .add_entry(Ino::ROOT, "a.txt", DEFAULT_FILE_MODE, EntryKind::File, 3, SystemTime::now())
            .unwrap();
        let mut sink = SimpleDirBuf::new();
        assemble(&tree, Ino::ROOT, &mut sink).unwrap();
        let decoded = decode_simple_dirbuf(&sink.into_bytes());
        assert_eq!(decoded[0].name, ".");
        assert_eq!(decoded[0].ino, Ino::ROOT.get());
        assert_eq!(decoded[1].name, "..");
        assert_eq!(decoded[1].ino, Ino::ROOT.get());
        assert_eq!(decoded[2].name, "a.txt");
        assert_eq!(decoded[2].ino, a.get());
        assert_eq!(decoded[2].size, 3);
    }

    #[test]
    fn skips_removed_and_stale_children() {
        let tree = new_tree();
        let stale = tree
            .add_entry(Ino::ROOT, "stale.txt", DEFAULT_FILE_MODE, EntryKind::File, 0, SystemTime::now())
            .unwrap();
        let removed = tree
            .add_entry(Ino::ROOT, "gone.txt", DEFAULT_FILE_MODE, EntryKind::File, 0, SystemTime::now())
            .unwrap();
        tree.with_entry_mut(Ino::ROOT, |e| e.age += 1);
        tree.with_entry_mut(removed, |e| e.removed = true);
        // stale's age is now behind root's bumped age
        let _ = stale;

        let mut sink = SimpleDirBuf::new();
        assemble(&tree, Ino::ROOT, &mut sink).unwrap();
        let decoded = decode_simple_dirbuf(&sink.into_bytes());
        let names: Vec<_> = decoded.iter().map(|d| d.name.as_str()).collect();
        assert!(!names.contains(&"stale.txt"));
        assert!(!names.contains(&"gone.txt"));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tree = new_tree();
        let mut sink = SimpleDirBuf::new();
        let err = assemble(&tree, Ino::new(999), &mut sink).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }
}
