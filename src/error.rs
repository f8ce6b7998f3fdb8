//! Error types for the filesystem core.
//!
//! Defines `VfsError` and its conversion to libc errno values, mirroring
//! the failure-kind taxonomy in spec §7 (Structural / Backend / Resource /
//! Policy).

use thiserror::Error;

/// Errors that can occur while servicing a filesystem operation.
#[derive(Error, Debug)]
pub enum VfsError {
    // -- Structural --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("already exists with a different type: {0}")]
    TypeMismatch(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    // -- Backend --
    #[error("object store request failed: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(String),

    // -- Resource --
    #[error("allocation failed: {0}")]
    Resource(String),

    // -- Policy --
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("file too large for rename (size {size}, limit {limit})")]
    RenameTooLarge { size: u64, limit: u64 },

    #[error("extended attribute not found: {0}")]
    XattrNotFound(String),

    #[error("extended attributes are not supported on directories")]
    XattrOnDirectory,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("name too long: {0}")]
    NameTooLong(String),
}

impl From<VfsError> for libc::c_int {
    fn from(err: VfsError) -> libc::c_int {
        match err {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::IsADirectory(_) => libc::EISDIR,
            VfsError::TypeMismatch(_) => libc::EEXIST,
            VfsError::NotEmpty(_) => libc::ENOTEMPTY,
            VfsError::Backend(_) => libc::EIO,
            VfsError::Io(_) => libc::EIO,
            VfsError::Resource(_) => libc::ENOMEM,
            VfsError::Unsupported(_) => libc::ENOTSUP,
            VfsError::RenameTooLarge { .. } => libc::EFBIG,
            VfsError::XattrNotFound(_) => libc::ENODATA,
            VfsError::XattrOnDirectory => libc::ENOTSUP,
            VfsError::InvalidArgument(_) => libc::EINVAL,
            VfsError::NameTooLong(_) => libc::ENAMETOOLONG,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        VfsError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for VfsError {
    fn from(err: anyhow::Error) -> Self {
        VfsError::Backend(err.to_string())
    }
}
