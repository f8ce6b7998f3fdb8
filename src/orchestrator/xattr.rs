//! `getxattr` (spec §4.5.8).

use std::time::{Duration, SystemTime};

use crate::error::VfsError;
use crate::headers::apply_head_response;
use crate::inode::Ino;

use super::Vfs;

impl Vfs {
    /// `getxattr(ino, name)`: maps a handful of `user.*` names onto cached
    /// header-derived fields, refreshing via HEAD once `xattr_time` has
    /// aged past `dir_cache_max_time`. Directories never expose xattrs.
    #[tracing::instrument(level = "debug", skip(self), fields(ino = ino.get(), name))]
    pub async fn getxattr(&self, ino: Ino, name: &str) -> Result<String, VfsError> {
        let entry = self.resolve(ino)?;
        if entry.is_directory() {
            return Err(VfsError::XattrOnDirectory);
        }
        if !matches!(name, "user.version" | "user.etag" | "user.md5" | "user.content_type") {
            return Err(VfsError::Unsupported(format!("xattr {name}")));
        }

        let max_age = Duration::from_secs(self.config.filesystem.dir_cache_max_time);
        let stale = SystemTime::now()
            .duration_since(entry.xattr_time)
            .map(|elapsed| elapsed >= max_age)
            .unwrap_or(false);

        let entry = if stale {
            let resp = self.object_store.head(&entry.fullpath).await?;
            let now = SystemTime::now();
            self.tree.with_entry_mut(ino, |e| apply_head_response(e, &resp, now));
            self.resolve(ino)?
        } else {
            entry
        };

        let value = match name {
            "user.version" => entry.xattrs.version_id.clone(),
            "user.etag" | "user.md5" => entry.xattrs.etag.clone(),
            "user.content_type" => entry.xattrs.content_type.clone(),
            _ => unreachable!("checked above"),
        };
        value.ok_or_else(|| VfsError::XattrNotFound(name.to_string()))
    }
}
