//! `read` / `write` on an open file handle.

use std::time::SystemTime;

use crate::error::VfsError;

use super::Vfs;

impl Vfs {
    /// `read(fh, size, off)`: delegates straight to the open handle's
    /// `read_buffer`. The handle is cloned out of the open-file table
    /// before the await so the table is never locked across a suspension.
    #[tracing::instrument(level = "debug", skip(self), fields(fh, size, offset))]
    pub async fn file_read(&self, fh: u64, size: u32, offset: i64) -> Result<Vec<u8>, VfsError> {
        let handle = self
            .open_files
            .get(&fh)
            .map(|state| state.handle.clone())
            .ok_or_else(|| VfsError::NotFound(format!("file handle {fh}")))?;
        Ok(handle.read_buffer(size, offset).await?)
    }

    /// `write(fh, buf, off)`: stamps `updated_time`, delegates to
    /// `write_buffer`, then resolves the new size from `CacheMng` (falling
    /// back to `offset + count` when the cache reports disabled/absent).
    #[tracing::instrument(level = "debug", skip(self, data), fields(fh, offset, len = data.len()))]
    pub async fn file_write(&self, fh: u64, data: &[u8], offset: i64) -> Result<u32, VfsError> {
        let (ino, handle) = self
            .open_files
            .get(&fh)
            .map(|state| (state.ino, state.handle.clone()))
            .ok_or_else(|| VfsError::NotFound(format!("file handle {fh}")))?;

        self.tree.with_entry_mut(ino, |e| e.updated_time = SystemTime::now());

        let written = handle.write_buffer(data, offset).await?;

        let authoritative = self.cache_mng.get_file_length(ino).await;
        let new_size = if authoritative > 0 {
            authoritative
        } else {
            offset.max(0) as u64 + written as u64
        };
        self.tree.with_entry_mut(ino, |e| e.size = new_size);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{new_test_vfs, new_test_vfs_with_doubles, ROOT};

    #[tokio::test]
    async fn write_then_size_infers_from_offset_and_count_when_cache_disabled() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();

        let written = vfs.file_write(created.fh, b"hello", 0).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(vfs.tree.with_entry(created.entry.ino, |e| e.size).unwrap(), 5);

        let written = vfs.file_write(created.fh, b"!", 5).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(vfs.tree.with_entry(created.entry.ino, |e| e.size).unwrap(), 6);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_fake_handle() {
        let vfs = new_test_vfs();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        vfs.file_write(created.fh, b"hello world", 0).await.unwrap();
        let read = vfs.file_read(created.fh, 5, 6).await.unwrap();
        assert_eq!(read, b"world");
    }

    #[tokio::test]
    async fn write_prefers_authoritative_cache_length_over_inference() {
        let (vfs, doubles) = new_test_vfs_with_doubles();
        let created = vfs.file_create(ROOT, "a.txt", 0o644).await.unwrap();
        doubles.cache_mng.set_length(created.entry.ino, 999);

        vfs.file_write(created.fh, b"hi", 0).await.unwrap();
        assert_eq!(vfs.tree.with_entry(created.entry.ino, |e| e.size).unwrap(), 999);
    }

    #[tokio::test]
    async fn read_unknown_handle_fails() {
        let vfs = new_test_vfs();
        let err = vfs.file_read(9999, 10, 0).await.unwrap_err();
        assert!(matches!(err, crate::error::VfsError::NotFound(_)));
    }
}
