//! Content-addressed blob store: a fixed 16-byte-keyed map over an append-only file.
//!
//! Record layout, modeled on an append-only event log with CRC-protected records:
//! `key(16) | len(u32 LE) | payload(len bytes) | crc32(4 LE)`. The in-memory index is
//! rebuilt by scanning the file once at open; a key's most recent record wins, so
//! overwriting a key is just another append. Reads go through a fresh `memmap2` mapping
//! of the backing file; writes serialize through a `Mutex<File>` so concurrent writers with
//! distinct keys never interleave a single record.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use memmap2::Mmap;

use crate::types::PathHash;

const MAGIC: [u8; 4] = *b"S2ST";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 8;

struct Index {
    file: Mutex<File>,
    offsets: Mutex<HashMap<PathHash, (u64, u32)>>,
}

/// A single named, persistent key/value blob store.
pub struct Store {
    path: PathBuf,
    index: Index,
}

impl Store {
    /// Creates a fresh store at `path`. `_size_hint` documents the expected payload volume
    /// for callers (`thumbs`/`meta`/`tags` each pass a different hint); the file itself grows
    /// on demand, matching the append-only design.
    pub fn create(path: &Path, _size_hint: u64) -> Result<Store> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("creating store file {}", path.display()))?;
        write_header(&mut file)?;
        Ok(Store {
            path: path.to_path_buf(),
            index: Index {
                file: Mutex::new(file),
                offsets: Mutex::new(HashMap::new()),
            },
        })
    }

    /// Opens an existing store, rebuilding its in-memory index by scanning the file.
    pub fn open(path: &Path) -> Result<Store> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening store file {}", path.display()))?;
        let offsets = scan_index(&mut file)?;
        Ok(Store {
            path: path.to_path_buf(),
            index: Index {
                file: Mutex::new(file),
                offsets: Mutex::new(offsets),
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes from multiple threads with distinct keys are safe; same-key last-write-wins.
    pub fn write(&self, key: PathHash, buf: &[u8]) -> Result<()> {
        let mut file = self.index.file.lock().unwrap();
        let offset = file.seek(SeekFrom::End(0))?;
        let mut record = Vec::with_capacity(16 + 4 + buf.len() + 4);
        record.extend_from_slice(&key);
        record.extend_from_slice(&(buf.len() as u32).to_le_bytes());
        record.extend_from_slice(buf);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&record[..16 + 4 + buf.len()]);
        record.extend_from_slice(&hasher.finalize().to_le_bytes());
        file.write_all(&record)?;
        file.sync_data()?;
        drop(file);
        self.index
            .offsets
            .lock()
            .unwrap()
            .insert(key, (offset, buf.len() as u32));
        Ok(())
    }

    /// Reads the most recent value written for `key`, if any.
    pub fn read(&self, key: &PathHash) -> Result<Option<Vec<u8>>> {
        let loc = self.index.offsets.lock().unwrap().get(key).copied();
        let Some((offset, len)) = loc else {
            return Ok(None);
        };
        let file = self.index.file.lock().unwrap();
        let mmap = unsafe { Mmap::map(&*file)? };
        let payload_start = (offset + 16 + 4) as usize;
        let payload_end = payload_start + len as usize;
        if payload_end > mmap.len() {
            bail!("store {} corrupt: record for key exceeds file length", self.path.display());
        }
        Ok(Some(mmap[payload_start..payload_end].to_vec()))
    }

    pub fn contains(&self, key: &PathHash) -> bool {
        self.index.offsets.lock().unwrap().contains_key(key)
    }

    /// Returns every key currently present, each mapped to its most recent value.
    pub fn read_all(&self) -> Result<HashMap<PathHash, Vec<u8>>> {
        let keys: Vec<PathHash> = self.index.offsets.lock().unwrap().keys().copied().collect();
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.read(&key)? {
                out.insert(key, v);
            }
        }
        Ok(out)
    }

    /// Copies a single key's current value from `self` into `dst`, if present.
    pub fn copy_key(&self, key: &PathHash, dst: &Store) -> Result<bool> {
        match self.read(key)? {
            Some(buf) => {
                dst.write(*key, &buf)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copies every key from `self` into `dst` wholesale (used for the `tags` store, which is
    /// carried forward verbatim across incremental scans).
    pub fn copy_all(&self, dst: &Store) -> Result<usize> {
        let all = self.read_all()?;
        let n = all.len();
        for (key, buf) in all {
            dst.write(key, &buf)?;
        }
        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.index.offsets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes the backing file. Stores are closed by dropping them; this just forces a sync
    /// so callers (the coordinator, at drain) can observe completion deterministically.
    pub fn close(&self) -> Result<()> {
        self.index.file.lock().unwrap().sync_all()?;
        Ok(())
    }
}

fn write_header(file: &mut File) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&MAGIC)?;
    file.write_all(&VERSION.to_le_bytes())?;
    file.write_all(&0u16.to_le_bytes())?;
    file.flush()?;
    Ok(())
}

fn scan_index(file: &mut File) -> Result<HashMap<PathHash, (u64, u32)>> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_LEN as usize];
    if file.read_exact(&mut header).is_err() {
        // Empty or truncated file: treat as a fresh store rather than failing the whole scan.
        write_header(file)?;
        return Ok(HashMap::new());
    }
    if header[0..4] != MAGIC {
        bail!("store file has bad magic, refusing to open");
    }

    let mut offsets = HashMap::new();
    let mut pos = HEADER_LEN;
    loop {
        file.seek(SeekFrom::Start(pos))?;
        let mut key = [0u8; 16];
        if file.read_exact(&mut key).is_err() {
            break;
        }
        let mut len_buf = [0u8; 4];
        if file.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf);
        let mut payload = vec![0u8; len as usize];
        if file.read_exact(&mut payload).is_err() {
            break;
        }
        let mut crc_buf = [0u8; 4];
        if file.read_exact(&mut crc_buf).is_err() {
            break;
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&key);
        hasher.update(&len_buf);
        hasher.update(&payload);
        if hasher.finalize() != u32::from_le_bytes(crc_buf) {
            // Corrupt tail: stop here, matching the append-only log's recovery policy.
            break;
        }
        offsets.insert(key, (pos, len));
        pos += 16 + 4 + len as u64 + 4;
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumbs");
        let store = Store::create(&path, 1024).unwrap();
        let key = [1u8; 16];
        store.write(key, b"thumbnail bytes").unwrap();
        assert_eq!(store.read(&key).unwrap().unwrap(), b"thumbnail bytes");
    }

    #[test]
    fn same_key_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        let store = Store::create(&path, 1024).unwrap();
        let key = [2u8; 16];
        store.write(key, b"v1").unwrap();
        store.write(key, b"v2").unwrap();
        assert_eq!(store.read(&key).unwrap().unwrap(), b"v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reopen_rebuilds_index_from_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags");
        {
            let store = Store::create(&path, 1024).unwrap();
            store.write([3u8; 16], b"a").unwrap();
            store.write([4u8; 16], b"b").unwrap();
            store.close().unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.read(&[3u8; 16]).unwrap().unwrap(), b"a");
    }

    #[test]
    fn copy_all_propagates_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src_tags");
        let dst_path = dir.path().join("dst_tags");
        let src = Store::create(&src_path, 1024).unwrap();
        src.write([5u8; 16], b"tagged").unwrap();
        let dst = Store::create(&dst_path, 1024).unwrap();
        let n = src.copy_all(&dst).unwrap();
        assert_eq!(n, 1);
        assert_eq!(dst.read(&[5u8; 16]).unwrap().unwrap(), b"tagged");
    }
}
