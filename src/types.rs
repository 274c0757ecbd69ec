//! Core data types shared across the scan pipeline: documents, parse jobs, and metadata.

use std::path::PathBuf;

use crate::mime::MimeId;

/// 16-byte path hash: MD5 of the path bytes after the scan root has been stripped by offset.
pub type PathHash = [u8; 16];

/// Reserved and free-form metadata keys attached to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaKey {
    /// Hex path-hash of the archive this document was extracted from.
    Parent,
    /// Hex SHA-1 of the bytes read from the file.
    Checksum,
    /// Parser-specific key; out of scope for this core but preserved for round-tripping.
    Custom(String),
}

/// A metadata value, typed so serialization can pick the right JSON representation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Number(i64),
    Hash(PathHash),
}

/// One ordered key/value entry in a document's `meta_list`.
#[derive(Debug, Clone)]
pub struct MetaEntry {
    pub key: MetaKey,
    pub value: MetaValue,
}

impl MetaEntry {
    pub fn parent(hash: PathHash) -> Self {
        MetaEntry {
            key: MetaKey::Parent,
            value: MetaValue::Hash(hash),
        }
    }

    pub fn checksum(hex_sha1: String) -> Self {
        MetaEntry {
            key: MetaKey::Checksum,
            value: MetaValue::Text(hex_sha1),
        }
    }
}

/// The unit emitted per file or archive entry.
#[derive(Debug, Clone)]
pub struct Document {
    pub path_hash: PathHash,
    pub filepath: PathBuf,
    /// Byte offset into `filepath` of the last path separator.
    pub base_offset: usize,
    /// Byte offset into `filepath` of the extension dot, or `filepath`'s length if none.
    pub ext_offset: usize,
    pub mime_id: MimeId,
    pub size_bytes: u64,
    pub mtime_seconds: i64,
    pub meta_list: Vec<MetaEntry>,
    pub has_parent: bool,
}

impl Document {
    pub fn new(
        path_hash: PathHash,
        filepath: PathBuf,
        base_offset: usize,
        ext_offset: usize,
        size_bytes: u64,
        mtime_seconds: i64,
    ) -> Self {
        Document {
            path_hash,
            filepath,
            base_offset,
            ext_offset,
            mime_id: 0,
            size_bytes,
            mtime_seconds,
            meta_list: Vec::new(),
            has_parent: false,
        }
    }

    /// The extension (without the dot), empty if `filepath` has none.
    pub fn extension(&self) -> &str {
        let path_str = self.filepath.to_str().unwrap_or_default();
        if self.ext_offset >= path_str.len() {
            return "";
        }
        &path_str[self.ext_offset + 1..]
    }
}

/// Unit of work submitted to the parse pool: one job = one (virtual) file.
pub struct ParseJob {
    pub virtual_file: Box<dyn crate::vfile::VirtualFile>,
    pub filepath: PathBuf,
    pub base_offset: usize,
    pub ext_offset: usize,
    pub size_bytes: u64,
    pub mtime_seconds: i64,
    /// Non-null iff this job was produced by archive-recursion from another job.
    pub parent_path_hash: Option<PathHash>,
}

impl std::fmt::Debug for ParseJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseJob")
            .field("filepath", &self.filepath)
            .field("size_bytes", &self.size_bytes)
            .field("parent_path_hash", &self.parent_path_hash)
            .finish()
    }
}
