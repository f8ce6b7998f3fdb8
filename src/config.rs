//! Configuration for the filesystem core.
//!
//! Provides typed configuration structs for the two sections spec §6
//! names as recognised keys (`filesystem.*`, `s3.*`), with loading,
//! validation, defaults, and a builder, in the style of
//! `lnxdrive-core::config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// libc's `S_IFREG`, pre-combined into the default file mode.
const S_IFREG: u32 = 0o100000;
/// libc's `S_IFDIR`, pre-combined into the default directory mode.
const S_IFDIR: u32 = 0o040000;

/// Default file mode (`0644` regular file) used when `file_mode` is unset (`-1`).
pub const DEFAULT_FILE_MODE: u32 = 0o0644 | S_IFREG;
/// Default directory mode (`0755` directory) used when `dir_mode` is unset (`-1`).
pub const DEFAULT_DIR_MODE: u32 = 0o0755 | S_IFDIR;

/// Single-PUT copy limit enforced by `rename` (5 GiB).
pub const RENAME_SIZE_LIMIT: u64 = 5 * 1024 * 1024 * 1024;

/// Top-level configuration for the filesystem core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VfsConfig {
    pub filesystem: FilesystemConfig,
    pub s3: S3Config,
}

/// `filesystem.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Default mode for newly created files. `-1` means "use the built-in default".
    pub file_mode: i64,
    /// Default mode for newly created directories. `-1` means "use the built-in default".
    pub dir_mode: i64,
    /// Directory-listing and xattr TTL, in seconds.
    pub dir_cache_max_time: u64,
    /// Negative-lookup (tombstone) TTL, in seconds.
    pub file_cache_max_time: u64,
}

/// `s3.*` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    /// Optional key prefix prepended to every object key.
    pub key_prefix: String,
    /// Storage class header value sent on `rename`'s copy phase.
    pub storage_type: String,
    /// Issue a HEAD on lookup for zero-byte objects (directory-marker detection).
    pub check_empty_files: bool,
    /// Always issue a HEAD on lookup, regardless of cache state.
    pub force_head_requests_on_lookup: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            file_mode: -1,
            dir_mode: -1,
            dir_cache_max_time: 10,
            file_cache_max_time: 10,
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            key_prefix: String::new(),
            storage_type: "STANDARD".to_string(),
            check_empty_files: true,
            force_head_requests_on_lookup: false,
        }
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            filesystem: FilesystemConfig::default(),
            s3: S3Config::default(),
        }
    }
}

impl FilesystemConfig {
    /// Resolves `file_mode`, substituting the built-in default when unset (`-1`).
    pub fn resolved_file_mode(&self) -> u32 {
        if self.file_mode < 0 {
            DEFAULT_FILE_MODE
        } else {
            (self.file_mode as u32 & 0o7777) | S_IFREG
        }
    }

    /// Resolves `dir_mode`, substituting the built-in default when unset (`-1`).
    pub fn resolved_dir_mode(&self) -> u32 {
        if self.dir_mode < 0 {
            DEFAULT_DIR_MODE
        } else {
            (self.dir_mode as u32 & 0o7777) | S_IFDIR
        }
    }
}

impl VfsConfig {
    /// Loads configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VfsConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Tries to load from `path`; falls back to [`VfsConfig::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("s3fs")
            .join("config.yaml")
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"s3.bucket_name"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl VfsConfig {
    /// Validates the configuration and returns all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.s3.bucket_name.is_empty() {
            errors.push(ValidationError {
                field: "s3.bucket_name".into(),
                message: "must not be empty".into(),
            });
        }

        if !self.s3.key_prefix.is_empty()
            && (self.s3.key_prefix.starts_with('/') || self.s3.key_prefix.ends_with('/'))
        {
            errors.push(ValidationError {
                field: "s3.key_prefix".into(),
                message: "must not start or end with '/'".into(),
            });
        }

        if self.filesystem.dir_cache_max_time == 0 {
            errors.push(ValidationError {
                field: "filesystem.dir_cache_max_time".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

/// Builder for constructing a [`VfsConfig`] programmatically.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: VfsConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: VfsConfig::default(),
        }
    }

    pub fn bucket_name(mut self, name: impl Into<String>) -> Self {
        self.config.s3.bucket_name = name.into();
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.s3.key_prefix = prefix.into();
        self
    }

    pub fn storage_type(mut self, storage_type: impl Into<String>) -> Self {
        self.config.s3.storage_type = storage_type.into();
        self
    }

    pub fn check_empty_files(mut self, check: bool) -> Self {
        self.config.s3.check_empty_files = check;
        self
    }

    pub fn force_head_requests_on_lookup(mut self, force: bool) -> Self {
        self.config.s3.force_head_requests_on_lookup = force;
        self
    }

    pub fn file_mode(mut self, mode: i64) -> Self {
        self.config.filesystem.file_mode = mode;
        self
    }

    pub fn dir_mode(mut self, mode: i64) -> Self {
        self.config.filesystem.dir_mode = mode;
        self
    }

    pub fn dir_cache_max_time(mut self, secs: u64) -> Self {
        self.config.filesystem.dir_cache_max_time = secs;
        self
    }

    pub fn file_cache_max_time(mut self, secs: u64) -> Self {
        self.config.filesystem.file_cache_max_time = secs;
        self
    }

    pub fn build(self) -> VfsConfig {
        self.config
    }

    /// Builds and validates in one step.
    pub fn build_validated(self) -> Result<VfsConfig, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}
