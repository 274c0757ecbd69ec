//! Document writer and index reader: the NDJSON+zstd serialization layer.
//!
//! The writer pool holds a single compressed NDJSON sink; `DocumentWriter::append` is called
//! from parse-job threads but only ever reaches one worker (the writer pool has exactly one),
//! so the internal mutex here is uncontended in practice and exists only so the type is `Sync`.
//! The reader side opens any file named `_index*` and yields rows back, used both by the
//! `index` sub-command (out of scope) and by incremental copy (§4.F).

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::{CARRIED_FORWARD_SHARD, SHARD_EXTENSION, SHARD_PREFIX, SHARD_ZSTD_LEVEL};
use crate::mime::MimeTable;
use crate::types::{Document, MetaKey, MetaValue};

/// The on-disk shape of one document line. Parser-specific fields are out of scope for this
/// core; `extra` round-trips anything a (future, external) parser attached so incremental
/// copy never has to understand it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub path: String,
    pub extension: String,
    pub size: u64,
    pub mtime: i64,
    pub mime: String,
    pub has_parent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_parent: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentRecord {
    pub fn from_document(doc: &Document, mime_table: &MimeTable) -> DocumentRecord {
        let mut checksum = None;
        let mut meta_parent = None;
        for entry in &doc.meta_list {
            match (&entry.key, &entry.value) {
                (MetaKey::Checksum, MetaValue::Text(hex)) => checksum = Some(hex.clone()),
                (MetaKey::Parent, MetaValue::Hash(hash)) => meta_parent = Some(hex::encode(hash)),
                _ => {}
            }
        }
        DocumentRecord {
            id: hex::encode(doc.path_hash),
            path: doc.filepath.to_string_lossy().into_owned(),
            extension: doc.extension().to_string(),
            size: doc.size_bytes,
            mtime: doc.mtime_seconds,
            mime: mime_table.mime_text(doc.mime_id).to_string(),
            has_parent: doc.has_parent,
            checksum,
            meta_parent,
            extra: serde_json::Map::new(),
        }
    }
}

/// Tiny hex helper so this module doesn't need a dependency beyond what the store already uses.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

struct WriterState {
    encoder: zstd::Encoder<'static, File>,
    path: PathBuf,
    lines_written: usize,
}

/// Single compressed NDJSON sink. One instance per index directory; shard rotation is not
/// performed (a single shard is acceptable per the on-disk layout contract).
pub struct DocumentWriter {
    inner: Mutex<WriterState>,
}

impl DocumentWriter {
    /// Creates shard `_index_000.ndjson.zst` inside `index_dir`.
    pub fn create(index_dir: &Path) -> Result<DocumentWriter> {
        fs::create_dir_all(index_dir)
            .with_context(|| format!("creating index directory {}", index_dir.display()))?;
        let path = index_dir.join(format!("{SHARD_PREFIX}000.{SHARD_EXTENSION}"));
        let file = File::create(&path)
            .with_context(|| format!("creating document shard {}", path.display()))?;
        let encoder = zstd::Encoder::new(file, SHARD_ZSTD_LEVEL)
            .context("initializing zstd encoder for document shard")?;
        Ok(DocumentWriter {
            inner: Mutex::new(WriterState {
                encoder,
                path,
                lines_written: 0,
            }),
        })
    }

    /// Serializes `record` as one JSON line and appends it to the current shard.
    pub fn append(&self, record: &DocumentRecord) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        serde_json::to_writer(&mut state.encoder, record)?;
        state.encoder.write_all(b"\n")?;
        state.lines_written += 1;
        Ok(())
    }

    /// Appends a raw, already-serialized line (used by incremental copy to carry rows forward
    /// byte-for-byte instead of re-encoding them through [`DocumentRecord`]).
    pub fn append_raw_line(&self, line: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.encoder.write_all(line.as_bytes())?;
        state.encoder.write_all(b"\n")?;
        state.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.inner.lock().unwrap().lines_written
    }

    /// Flushes and finalizes the zstd frame. Consumes the writer since a finished shard cannot
    /// be appended to again.
    pub fn finish(self) -> Result<PathBuf> {
        let state = self.inner.into_inner().unwrap();
        let path = state.path.clone();
        state.encoder.finish()?.sync_all()?;
        Ok(path)
    }
}

/// Lists every document shard (`_index_*`) in an index directory, in a stable order.
pub fn list_shard_files(index_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(index_dir)
        .with_context(|| format!("listing index directory {}", index_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(SHARD_PREFIX) {
            shards.push(entry.path());
        }
    }
    shards.sort();
    Ok(shards)
}

/// Decompresses and splits one shard into its raw NDJSON lines.
pub fn read_shard_lines(shard_path: &Path) -> Result<Vec<String>> {
    let file = File::open(shard_path)
        .with_context(|| format!("opening document shard {}", shard_path.display()))?;
    let decoder = zstd::Decoder::new(file)
        .with_context(|| format!("decoding document shard {}", shard_path.display()))?;
    let mut lines = Vec::new();
    for line in BufReader::new(decoder).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Parses one raw NDJSON line into a [`DocumentRecord`].
pub fn parse_row(line: &str) -> Result<DocumentRecord> {
    serde_json::from_str(line).with_context(|| "parsing document row".to_string())
}

/// Decodes `id`'s hex string into a 16-byte path hash.
pub fn decode_path_hash(id: &str) -> Result<[u8; 16]> {
    if id.len() != 32 {
        bail!("document id {id} is not 32 hex characters");
    }
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&id[i * 2..i * 2 + 2], 16)
            .with_context(|| format!("decoding document id {id}"))?;
    }
    Ok(out)
}

/// Reads every row of every shard in `index_dir`, in shard order.
pub fn read_all_rows(index_dir: &Path) -> Result<Vec<DocumentRecord>> {
    let mut rows = Vec::new();
    for shard in list_shard_files(index_dir)? {
        if shard.file_name().and_then(|n| n.to_str()) == Some(CARRIED_FORWARD_SHARD) {
            // carried-forward rows are read by the same path; no special casing needed here
        }
        for line in read_shard_lines(&shard)? {
            rows.push(parse_row(&line)?);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DocumentWriter::create(dir.path()).unwrap();
        let record = DocumentRecord {
            id: "0".repeat(32),
            path: "/a/b.txt".to_string(),
            extension: "txt".to_string(),
            size: 3,
            mtime: 100,
            mime: "text/plain".to_string(),
            has_parent: false,
            checksum: None,
            meta_parent: None,
            extra: serde_json::Map::new(),
        };
        writer.append(&record).unwrap();
        writer.finish().unwrap();

        let rows = read_all_rows(dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "/a/b.txt");
        assert_eq!(rows[0].mtime, 100);
    }

    #[test]
    fn raw_lines_are_preserved_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DocumentWriter::create(dir.path()).unwrap();
        let raw = r#"{"_id":"11111111111111111111111111111111","path":"/x","extension":"","size":0,"mtime":5,"mime":"inode/x-empty","has_parent":false}"#;
        writer.append_raw_line(raw).unwrap();
        writer.finish().unwrap();

        let shard = &list_shard_files(dir.path()).unwrap()[0];
        let lines = read_shard_lines(shard).unwrap();
        assert_eq!(lines[0], raw);
    }

    #[test]
    fn decode_path_hash_roundtrips() {
        let id = "00112233445566778899aabbccddeeff";
        // 32 hex chars expected; trim to 32
        let id = &id[..32];
        let hash = decode_path_hash(id).unwrap();
        assert_eq!(hash.len(), 16);
    }
}
