//! Virtual file: a uniform read/rewind/close abstraction over filesystem files and
//! archive-entry readers, with an optional streaming SHA-1 checksum.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::config::MAGIC_BUF_SIZE;

/// Capability interface implemented by both the filesystem case and the archive-entry case.
/// `is_fs_file` exists only so callers can route read-error messages with the right context
/// (plain I/O error vs. archive-library error).
pub trait VirtualFile: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Read up to `buf.len()` bytes, guaranteeing the stream can still be rewound to the
    /// start via [`VirtualFile::reset`] as long as no plain [`VirtualFile::read`] has happened.
    fn read_rewindable(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Returns the cursor to the start if the source supports it (always true here, since
    /// priming happens through the same buffered adapter for both sources).
    fn reset(&mut self) -> bool;
    /// Idempotent. Finalizes the checksum iff any byte was read.
    fn close(&mut self);
    fn size(&self) -> u64;
    fn mtime_seconds(&self) -> i64;
    fn is_fs_file(&self) -> bool;
    fn has_checksum(&self) -> bool;
    /// Hex SHA-1, valid only after [`VirtualFile::close`] when [`VirtualFile::has_checksum`].
    fn checksum_hex(&self) -> Option<String>;
}

/// Shared read/rewind/checksum state, generic over the underlying byte source.
struct Buffered<R> {
    inner: Option<R>,
    is_fs_file: bool,
    size: u64,
    mtime_seconds: i64,
    calculate_checksum: bool,
    hasher: Sha1,
    has_checksum: bool,
    closed: bool,
    digest: Option<[u8; 20]>,
    // rewind buffer: primed lazily on first read_rewindable call
    buf: Vec<u8>,
    buf_pos: usize,
    buf_exhausted: bool,
}

impl<R: Read> Buffered<R> {
    fn new(inner: R, is_fs_file: bool, size: u64, mtime_seconds: i64, calculate_checksum: bool) -> Self {
        Buffered {
            inner: Some(inner),
            is_fs_file,
            size,
            mtime_seconds,
            calculate_checksum,
            hasher: Sha1::new(),
            has_checksum: false,
            closed: false,
            digest: None,
            buf: Vec::new(),
            buf_pos: 0,
            buf_exhausted: false,
        }
    }

    fn prime(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() || self.buf_exhausted {
            return Ok(());
        }
        let mut tmp = vec![0u8; MAGIC_BUF_SIZE];
        let mut filled = 0;
        if let Some(inner) = self.inner.as_mut() {
            loop {
                if filled == tmp.len() {
                    break;
                }
                match inner.read(&mut tmp[filled..])? {
                    0 => break,
                    n => filled += n,
                }
            }
        }
        tmp.truncate(filled);
        if self.calculate_checksum && !tmp.is_empty() {
            self.hasher.update(&tmp);
            self.has_checksum = true;
        }
        self.buf = tmp;
        self.buf_pos = 0;
        Ok(())
    }

    fn read_rewindable(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.prime()?;
        let avail = &self.buf[self.buf_pos..];
        let n = avail.len().min(out.len());
        out[..n].copy_from_slice(&avail[..n]);
        self.buf_pos += n;
        Ok(n)
    }

    fn reset(&mut self) -> bool {
        if self.buf_exhausted {
            return false;
        }
        self.buf_pos = 0;
        true
    }

    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.buf_exhausted {
            if self.buf_pos < self.buf.len() {
                let avail = &self.buf[self.buf_pos..];
                let n = avail.len().min(out.len());
                out[..n].copy_from_slice(&avail[..n]);
                self.buf_pos += n;
                if self.buf_pos >= self.buf.len() {
                    self.buf_exhausted = true;
                }
                return Ok(n);
            }
            self.buf_exhausted = true;
        }
        let n = match self.inner.as_mut() {
            Some(inner) => inner.read(out)?,
            None => 0,
        };
        if n > 0 && self.calculate_checksum {
            self.hasher.update(&out[..n]);
            self.has_checksum = true;
        }
        Ok(n)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.has_checksum {
            let digest = std::mem::take(&mut self.hasher).finalize();
            let mut out = [0u8; 20];
            out.copy_from_slice(&digest);
            self.digest = Some(out);
        }
        self.inner = None;
    }

    fn checksum_hex(&self) -> Option<String> {
        self.digest.map(|d| {
            let mut s = String::with_capacity(40);
            for b in d {
                s.push_str(&format!("{b:02x}"));
            }
            s
        })
    }
}

/// A [`VirtualFile`] backed by a real filesystem path. The descriptor is opened lazily on
/// first read, matching the teacher's lazy-open pattern for metadata vs. content access.
pub struct FsFile {
    path: PathBuf,
    buffered: Buffered<File>,
    opened: bool,
}

impl FsFile {
    pub fn open(path: &Path, size: u64, mtime_seconds: i64, calculate_checksum: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(FsFile {
            path: path.to_path_buf(),
            buffered: Buffered::new(file, true, size, mtime_seconds, calculate_checksum),
            opened: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VirtualFile for FsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffered.read(buf)
    }

    fn read_rewindable(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffered.read_rewindable(buf)
    }

    fn reset(&mut self) -> bool {
        self.buffered.reset()
    }

    fn close(&mut self) {
        self.buffered.close();
    }

    fn size(&self) -> u64 {
        self.buffered.size
    }

    fn mtime_seconds(&self) -> i64 {
        self.buffered.mtime_seconds
    }

    fn is_fs_file(&self) -> bool {
        self.opened && self.buffered.is_fs_file
    }

    fn has_checksum(&self) -> bool {
        self.buffered.has_checksum
    }

    fn checksum_hex(&self) -> Option<String> {
        self.buffered.checksum_hex()
    }
}

/// A [`VirtualFile`] backed by an archive-entry reader. Carries the archive path for
/// error-message context, per §4.C's "distinguishing flag" requirement.
pub struct ArchiveEntryFile {
    archive_path: PathBuf,
    buffered: Buffered<Box<dyn Read + Send>>,
}

impl ArchiveEntryFile {
    pub fn new(
        archive_path: PathBuf,
        reader: Box<dyn Read + Send>,
        size: u64,
        mtime_seconds: i64,
        calculate_checksum: bool,
    ) -> Self {
        ArchiveEntryFile {
            archive_path,
            buffered: Buffered::new(reader, false, size, mtime_seconds, calculate_checksum),
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }
}

impl VirtualFile for ArchiveEntryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffered.read(buf)
    }

    fn read_rewindable(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffered.read_rewindable(buf)
    }

    fn reset(&mut self) -> bool {
        self.buffered.reset()
    }

    fn close(&mut self) {
        self.buffered.close();
    }

    fn size(&self) -> u64 {
        self.buffered.size
    }

    fn mtime_seconds(&self) -> i64 {
        self.buffered.mtime_seconds
    }

    fn is_fs_file(&self) -> bool {
        false
    }

    fn has_checksum(&self) -> bool {
        self.buffered.has_checksum
    }

    fn checksum_hex(&self) -> Option<String> {
        self.buffered.checksum_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_rewindable_then_reset_replays_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello world").unwrap();

        let mut f = FsFile::open(&path, 11, 0, false).unwrap();
        let mut buf = [0u8; 5];
        let n = f.read_rewindable(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");

        assert!(f.reset());
        let mut buf2 = [0u8; 11];
        let n2 = f.read_rewindable(&mut buf2).unwrap();
        assert_eq!(&buf2[..n2], b"hello world");
    }

    #[test]
    fn checksum_is_finalized_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"abc").unwrap();

        let mut f = FsFile::open(&path, 3, 0, true).unwrap();
        let mut buf = [0u8; 3];
        f.read(&mut buf).unwrap();
        assert!(!f.has_checksum() || f.checksum_hex().is_none());
        f.close();
        assert!(f.has_checksum());
        let hex = f.checksum_hex().unwrap();
        assert_eq!(hex, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn no_checksum_requested_means_none_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"abc").unwrap();

        let mut f = FsFile::open(&path, 3, 0, false).unwrap();
        let mut buf = [0u8; 3];
        f.read(&mut buf).unwrap();
        f.close();
        assert!(!f.has_checksum());
        assert!(f.checksum_hex().is_none());
    }
}
