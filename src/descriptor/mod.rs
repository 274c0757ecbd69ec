//! Index descriptor: the small JSON file that identifies an index directory and gates
//! readers on format version.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::config::{DESCRIPTOR_FILENAME, DESCRIPTOR_TYPE};

/// This build's descriptor format string. A descriptor whose `version` doesn't match this
/// exact string is refused outright rather than guessed at; there is no migration path.
pub const DESCRIPTOR_VERSION: &str = "sist2.descriptor.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// 16-byte MD5 of the raw timestamp, hex-encoded; doubles as a stable index id.
    pub id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    pub name: String,
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_url: Option<String>,
}

impl Descriptor {
    /// Builds a fresh descriptor for a scan starting now, rooted at `root`.
    pub fn new(name: String, root: String, rewrite_url: Option<String>, timestamp: i64) -> Descriptor {
        let id = md5::compute(timestamp.to_le_bytes());
        Descriptor {
            id: format!("{id:x}"),
            version: DESCRIPTOR_VERSION.to_string(),
            kind: DESCRIPTOR_TYPE.to_string(),
            timestamp,
            name,
            root,
            rewrite_url,
        }
    }

    pub fn now(name: String, root: String, rewrite_url: Option<String>) -> Descriptor {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Descriptor::new(name, root, rewrite_url, timestamp)
    }

    /// Writes the descriptor exactly once: a scan that crashes partway through can retry, but
    /// a finished index directory's descriptor is never rewritten by a later run.
    pub fn write(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir)
            .with_context(|| format!("creating index directory {}", index_dir.display()))?;
        let final_path = index_dir.join(DESCRIPTOR_FILENAME);
        let tmp_path = index_dir.join(format!("{DESCRIPTOR_FILENAME}.tmp"));
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("finalizing {}", final_path.display()))?;
        Ok(())
    }

    /// Reads and validates a descriptor, failing fatally on any version mismatch.
    pub fn read(index_dir: &Path) -> Result<Descriptor> {
        let path = index_dir.join(DESCRIPTOR_FILENAME);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let descriptor: Descriptor = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        if descriptor.version != DESCRIPTOR_VERSION {
            bail!(
                "index at {} was written by an incompatible version ({}), expected {}",
                index_dir.display(),
                descriptor.version,
                DESCRIPTOR_VERSION
            );
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = Descriptor::new(
            "myindex".to_string(),
            "/data".to_string(),
            None,
            1_700_000_000,
        );
        descriptor.write(dir.path()).unwrap();
        let read = Descriptor::read(dir.path()).unwrap();
        assert_eq!(read.id, descriptor.id);
        assert_eq!(read.name, "myindex");
        assert_eq!(read.kind, "ndjson");
    }

    #[test]
    fn id_is_deterministic_for_same_timestamp() {
        let a = Descriptor::new("a".into(), "/r".into(), None, 42);
        let b = Descriptor::new("b".into(), "/r2".into(), None, 42);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn mismatched_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = serde_json::json!({
            "id": "deadbeef",
            "version": "some-other-version",
            "type": "ndjson",
            "timestamp": 0,
            "name": "x",
            "root": "/",
        });
        fs::write(dir.path().join(DESCRIPTOR_FILENAME), bad.to_string()).unwrap();
        assert!(Descriptor::read(dir.path()).is_err());
    }
}
