//! Directory walker and list-file reader: produces [`WalkEntry`] values ready to become
//! parse jobs, honoring a depth limit, an exclusion regex, and "follow files, not directory
//! symlinks" policy.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use regex::Regex;

/// One file found by the walker or read from a list file, with offsets cached so the
/// dispatcher never has to re-scan the path string.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub base_offset: usize,
    pub ext_offset: usize,
    pub size: u64,
    pub mtime_seconds: i64,
}

/// Computes `base_offset` (last separator) and `ext_offset` (last dot in the final
/// component, or end-of-string if none), matching the offset convention used to derive
/// `path_hash` and the extension lookup.
pub fn compute_offsets(path: &Path) -> (usize, usize) {
    let s = path.to_string_lossy();
    let bytes = s.as_bytes();
    let base_offset = bytes
        .iter()
        .rposition(|&b| b == b'/' || b == b'\\')
        .map(|i| i + 1)
        .unwrap_or(0);
    let ext_offset = bytes[base_offset..]
        .iter()
        .rposition(|&b| b == b'.')
        .map(|i| base_offset + i)
        .unwrap_or(bytes.len());
    (base_offset, ext_offset)
}

fn build_entry(path: PathBuf) -> io::Result<WalkEntry> {
    // Resolves file symlinks (follow), while directory symlinks are never descended into
    // because the walker itself does not recurse through them.
    let meta = fs::metadata(&path)?;
    let (base_offset, ext_offset) = compute_offsets(&path);
    let mtime_seconds = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(WalkEntry {
        path,
        base_offset,
        ext_offset,
        size: meta.len(),
        mtime_seconds,
    })
}

/// Outcome of visiting one walker entry: either a candidate path or a traversal error.
enum WalkOutcome {
    Ok(PathBuf),
    Err { msg: String, path: Option<PathBuf> },
}

fn to_outcome_walkdir(r: Result<walkdir::DirEntry, walkdir::Error>) -> WalkOutcome {
    match r {
        Ok(entry) => WalkOutcome::Ok(entry.into_path()),
        Err(err) => WalkOutcome::Err {
            msg: err.to_string(),
            path: err.path().map(PathBuf::from),
        },
    }
}

fn to_outcome_jwalk(r: Result<jwalk::DirEntry<((), ())>, jwalk::Error>) -> WalkOutcome {
    match r {
        Ok(entry) => WalkOutcome::Ok(entry.path()),
        Err(err) => WalkOutcome::Err {
            msg: err.to_string(),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// Configuration for one walk, immutable once the walk starts.
pub struct WalkConfig {
    pub root: PathBuf,
    /// `None` = unlimited (`-1`); `Some(0)` = root only.
    pub depth: Option<usize>,
    pub exclude: Option<Regex>,
    pub use_parallel: bool,
}

fn is_excluded(path: &Path, exclude: &Option<Regex>) -> bool {
    match exclude {
        Some(re) => re.is_match(&path.to_string_lossy()),
        None => false,
    }
}

fn should_visit(entry: &walkdir::DirEntry) -> bool {
    // Never descend into a symlinked directory; do follow symlinked files (handled by
    // build_entry's fs::metadata call, which resolves the link).
    if entry.depth() == 0 {
        return true;
    }
    if entry.path_is_symlink() {
        match fs::metadata(entry.path()) {
            Ok(meta) => !meta.is_dir(),
            Err(_) => false,
        }
    } else {
        true
    }
}

fn walkdir_iter(cfg: &WalkConfig) -> Box<dyn Iterator<Item = WalkOutcome> + Send> {
    let mut walker = walkdir::WalkDir::new(&cfg.root).follow_links(false);
    if let Some(depth) = cfg.depth {
        // walkdir counts the root itself as depth 0, but our depth convention counts the
        // root's direct children as depth 0, so shift by one.
        walker = walker.max_depth(depth + 1);
    }
    Box::new(
        walker
            .into_iter()
            .filter_entry(should_visit)
            .map(to_outcome_walkdir),
    )
}

fn jwalk_iter(cfg: &WalkConfig) -> Box<dyn Iterator<Item = WalkOutcome> + Send> {
    use jwalk::Parallelism;
    let mut walker = jwalk::WalkDir::new(&cfg.root)
        .follow_links(false)
        .parallelism(Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_secs(60),
        });
    if let Some(depth) = cfg.depth {
        // Same root-is-depth-0 shift as `walkdir_iter`.
        walker = walker.max_depth(depth + 1);
    }
    Box::new(walker.into_iter().map(to_outcome_jwalk))
}

/// Aggregate counters for one walk, shared with the coordinator for the final log line.
#[derive(Default)]
pub struct WalkStats {
    pub visited: usize,
    pub excluded: usize,
    pub errors: Vec<String>,
}

/// Runs the walk on the current thread, sending each accepted file to `tx`. Returns when the
/// walk completes or `tx`'s receiver is gone.
pub fn run_walk(cfg: &WalkConfig, tx: Sender<WalkEntry>) -> WalkStats {
    let iter: Box<dyn Iterator<Item = WalkOutcome> + Send> = if cfg.use_parallel {
        jwalk_iter(cfg)
    } else {
        walkdir_iter(cfg)
    };

    let mut stats = WalkStats::default();
    for outcome in iter {
        match outcome {
            WalkOutcome::Ok(path) => {
                if !path.is_file() {
                    continue;
                }
                if is_excluded(&path, &cfg.exclude) {
                    stats.excluded += 1;
                    continue;
                }
                match build_entry(path.clone()) {
                    Ok(entry) => {
                        stats.visited += 1;
                        if tx.send(entry).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("failed to stat {}: {e}", path.display());
                        stats.errors.push(format!("{}: {e}", path.display()));
                    }
                }
            }
            WalkOutcome::Err { msg, path } => {
                log::warn!("walk error: {msg}");
                stats.errors.push(match path {
                    Some(p) => format!("{}: {msg}", p.display()),
                    None => msg,
                });
            }
        }
    }
    stats
}

/// Spawns the walk on a dedicated thread, matching the pipeline's "walk thread feeds a bounded
/// channel" shape.
pub fn spawn_walk_thread(cfg: WalkConfig, tx: Sender<WalkEntry>) -> JoinHandle<WalkStats> {
    thread::spawn(move || run_walk(&cfg, tx))
}

/// Reads newline-delimited paths from `path_or_dash` (`-` selects stdin), canonicalizing each
/// before stat'ing it.
pub fn iterate_file_list(path_or_dash: &str, tx: Sender<WalkEntry>) -> Result<WalkStats> {
    let lines: Box<dyn Iterator<Item = io::Result<String>>> = if path_or_dash == "-" {
        Box::new(io::stdin().lock().lines())
    } else {
        let file = fs::File::open(path_or_dash)
            .with_context(|| format!("opening list file {path_or_dash}"))?;
        Box::new(io::BufReader::new(file).lines())
    };

    let stats = Mutex::new(WalkStats::default());
    for line in lines {
        let line = line.context("reading list file line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let path = match fs::canonicalize(line) {
            Ok(p) => p,
            Err(e) => {
                stats.lock().unwrap().errors.push(format!("{line}: {e}"));
                continue;
            }
        };
        match build_entry(path.clone()) {
            Ok(entry) => {
                stats.lock().unwrap().visited += 1;
                if tx.send(entry).is_err() {
                    break;
                }
            }
            Err(e) => stats.lock().unwrap().errors.push(format!("{}: {e}", path.display())),
        }
    }
    Ok(stats.into_inner().unwrap())
}
