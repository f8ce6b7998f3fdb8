//! `s3fs-core`: the directory-tree and entry-cache subsystem for a
//! FUSE-mounted, S3-compatible filesystem.
//!
//! This crate owns the in-memory, inode-indexed representation of the
//! remote namespace (`tree`, `entry`, `inode`), its population and
//! invalidation policy (`reconciler`), the state machines bridging
//! synchronous filesystem calls to asynchronous object-store round-trips
//! (`orchestrator`), and the directory-listing buffer format handed back to
//! callers (`dirbuf`). The FUSE kernel adapter, the HTTP transport pool's
//! retry/connection-reuse policy, and SigV4 request signing are external
//! collaborators (see `ports`) and are not built here.

pub mod config;
pub mod dirbuf;
pub mod entry;
pub mod error;
pub mod headers;
pub mod inode;
pub mod object_store;
pub mod orchestrator;
pub mod ports;
pub mod reconciler;
pub mod tree;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::VfsConfig;
pub use entry::{Entry, EntryKind};
pub use error::VfsError;
pub use inode::Ino;
pub use object_store::ObjectStoreClient;
pub use orchestrator::{CreateReply, EntryReply, ReaddirReply, SetAttrRequest, TimeOrNow, Vfs, VfsStats};
pub use ports::{CacheMng, FileHandle, FileIo, HeadResponse, ObjectStore, PutResponse};
