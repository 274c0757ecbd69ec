//! Incremental scan tables: the "original" mtime map used to short-circuit re-parsing, and
//! the "copy marks" set used to decide which rows get carried forward after the walk.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;

use crate::config::CARRIED_FORWARD_SHARD;
use crate::serialize::{self, DocumentRecord};
use crate::types::PathHash;

/// Loaded once from a predecessor index directory, then consulted read-only for the rest of
/// the scan. `path_hash -> mtime` as recorded in the predecessor's rows.
pub struct OriginalTable {
    mtimes: HashMap<PathHash, i64>,
    rows: HashMap<PathHash, String>,
}

impl OriginalTable {
    /// Reads every document shard under `predecessor_dir` and indexes each row by its decoded
    /// path hash. Rows that fail to parse are skipped rather than aborting the whole load,
    /// since a corrupt predecessor row should only cost that one file its fast-path.
    pub fn load(predecessor_dir: &Path) -> Result<OriginalTable> {
        let mut mtimes = HashMap::new();
        let mut rows = HashMap::new();
        for shard in serialize::list_shard_files(predecessor_dir)? {
            for line in serialize::read_shard_lines(&shard)? {
                let record = match serialize::parse_row(&line) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let hash = match serialize::decode_path_hash(&record.id) {
                    Ok(h) => h,
                    Err(_) => continue,
                };
                mtimes.insert(hash, record.mtime);
                rows.insert(hash, line);
            }
        }
        Ok(OriginalTable { mtimes, rows })
    }

    pub fn empty() -> OriginalTable {
        OriginalTable {
            mtimes: HashMap::new(),
            rows: HashMap::new(),
        }
    }

    /// True iff the predecessor recorded this exact path hash with this exact mtime, meaning
    /// the dispatcher can skip parsing and the row can be carried forward verbatim.
    pub fn matches(&self, path_hash: &PathHash, mtime_seconds: i64) -> bool {
        self.mtimes.get(path_hash) == Some(&mtime_seconds)
    }

    pub fn raw_row(&self, path_hash: &PathHash) -> Option<&str> {
        self.rows.get(path_hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mtimes.is_empty()
    }
}

/// Marks set by the dispatcher as it decides, file by file, whether a row is being carried
/// forward unchanged. Consulted after the walk completes to drive the carry-forward copy.
#[derive(Default)]
pub struct CopyMarks {
    marked: Mutex<HashSet<PathHash>>,
}

impl CopyMarks {
    pub fn new() -> CopyMarks {
        CopyMarks::default()
    }

    pub fn mark(&self, path_hash: PathHash) {
        self.marked.lock().unwrap().insert(path_hash);
    }

    pub fn is_marked(&self, path_hash: &PathHash) -> bool {
        self.marked.lock().unwrap().contains(path_hash)
    }

    pub fn len(&self) -> usize {
        self.marked.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.lock().unwrap().is_empty()
    }

    /// Every path hash marked for carry-forward so far.
    pub fn marked_hashes(&self) -> Vec<PathHash> {
        self.marked.lock().unwrap().iter().copied().collect()
    }
}

/// Writes every marked row from `original` into a single carried-forward shard inside
/// `new_index_dir`, named so it is never mistaken for a freshly-written shard.
///
/// Returns the number of rows carried forward.
pub fn carry_forward_rows(
    original: &OriginalTable,
    marks: &CopyMarks,
    new_index_dir: &Path,
) -> Result<usize> {
    std::fs::create_dir_all(new_index_dir)?;
    let path = new_index_dir.join(CARRIED_FORWARD_SHARD);
    let file = std::fs::File::create(&path)?;
    let mut encoder = zstd::Encoder::new(file, crate::config::SHARD_ZSTD_LEVEL)?;
    use std::io::Write;

    let mut carried = 0;
    for hash in marks.marked_hashes() {
        if let Some(line) = original.raw_row(&hash) {
            encoder.write_all(line.as_bytes())?;
            encoder.write_all(b"\n")?;
            carried += 1;
        }
    }
    encoder.finish()?;
    Ok(carried)
}

/// Parses the carried-forward shard back into records, mainly useful for tests and for any
/// tool that wants to inspect what got reused without decoding the whole new index.
pub fn read_carried_forward(new_index_dir: &Path) -> Result<Vec<DocumentRecord>> {
    let path = new_index_dir.join(CARRIED_FORWARD_SHARD);
    if !path.exists() {
        return Ok(Vec::new());
    }
    serialize::read_shard_lines(&path)?
        .iter()
        .map(|line| serialize::parse_row(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{DocumentRecord, DocumentWriter};

    fn record(id: &str, mtime: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            path: format!("/a/{id}"),
            extension: String::new(),
            size: 1,
            mtime,
            mime: "text/plain".to_string(),
            has_parent: false,
            checksum: None,
            meta_parent: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn original_table_matches_only_exact_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DocumentWriter::create(dir.path()).unwrap();
        let id = "11111111111111111111111111111111"[..32].to_string();
        writer.append(&record(&id, 100)).unwrap();
        writer.finish().unwrap();

        let table = OriginalTable::load(dir.path()).unwrap();
        let hash = serialize::decode_path_hash(&id).unwrap();
        assert!(table.matches(&hash, 100));
        assert!(!table.matches(&hash, 101));
    }

    #[test]
    fn carry_forward_writes_only_marked_rows() {
        let old_dir = tempfile::tempdir().unwrap();
        let writer = DocumentWriter::create(old_dir.path()).unwrap();
        let id_a = "a".repeat(32);
        let id_b = "b".repeat(32);
        writer.append(&record(&id_a, 1)).unwrap();
        writer.append(&record(&id_b, 2)).unwrap();
        writer.finish().unwrap();

        let table = OriginalTable::load(old_dir.path()).unwrap();
        let marks = CopyMarks::new();
        marks.mark(serialize::decode_path_hash(&id_a).unwrap());

        let new_dir = tempfile::tempdir().unwrap();
        let carried = carry_forward_rows(&table, &marks, new_dir.path()).unwrap();
        assert_eq!(carried, 1);

        let rows = read_carried_forward(new_dir.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id_a);
    }

    #[test]
    fn empty_original_table_matches_nothing() {
        let table = OriginalTable::empty();
        assert!(!table.matches(&[0u8; 16], 0));
        assert!(table.is_empty());
    }
}
