//! Archive source contract.
//!
//! The engine does not decode archives itself; it consumes an ordered
//! sequence of [`ArchiveRecord`]s produced by an external codec, each
//! carrying the entry's metadata plus a read capability for its payload.

use crate::error::DecodeError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Byte-level progress callback: `(current, total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Read capability for one file entry's payload.
///
/// Implementations decompress (and integrity-check) the entry, reporting
/// byte progress along the way. `read` may be called more than once: a
/// retry pass re-reads entries whose upload failed.
#[async_trait]
pub trait EntryReader: Send + Sync {
    async fn read(&self, progress: ProgressFn) -> Result<Vec<u8>, DecodeError>;
}

/// One raw record from the archive listing.
///
/// `path` is slash-delimited; directory records may carry a trailing slash
/// (the tree builder strips it). `reader` is `None` for directories.
#[derive(Clone)]
pub struct ArchiveRecord {
    pub path: String,
    pub is_directory: bool,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub reader: Option<Arc<dyn EntryReader>>,
}

impl ArchiveRecord {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            compressed_size: 0,
            uncompressed_size: 0,
            reader: None,
        }
    }

    pub fn file(
        path: impl Into<String>,
        compressed_size: u64,
        uncompressed_size: u64,
        reader: Arc<dyn EntryReader>,
    ) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            compressed_size,
            uncompressed_size,
            reader: Some(reader),
        }
    }
}

impl fmt::Debug for ArchiveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRecord")
            .field("path", &self.path)
            .field("is_directory", &self.is_directory)
            .field("compressed_size", &self.compressed_size)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

/// Derive the synthetic root folder name from the archive filename by
/// trimming the final extension (`photos.zip` -> `photos`).
pub fn root_name_from_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => stem.to_string(),
        _ => filename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_single_extension() {
        assert_eq!(root_name_from_filename("photos.zip"), "photos");
        assert_eq!(root_name_from_filename("a.b.tar"), "a.b");
    }

    #[test]
    fn leaves_extensionless_names_alone() {
        assert_eq!(root_name_from_filename("archive"), "archive");
        assert_eq!(root_name_from_filename(".hidden"), ".hidden");
    }
}
