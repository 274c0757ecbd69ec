//! Command-line surface: `clap`-derive root parser, matching the teacher's flattened
//! `CommonArgs` convention. Only `scan` is wired to a working coordinator; the remaining
//! sub-commands parse their flags so `--help` stays faithful but return a not-implemented error.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;

use crate::config::{
    DEFAULT_CONTENT_SIZE, DEFAULT_MEM_BUFFER_MIB, DEFAULT_OUTPUT_DIR, DEFAULT_QUALITY,
    DEFAULT_THUMBNAIL_SIZE, DEFAULT_TREEMAP_THRESHOLD,
};
use crate::context::ArchiveMode as CoreArchiveMode;

#[derive(Parser, Debug)]
#[command(name = "filedex", version, about = "File-system indexer core")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Increase log verbosity; repeat for more (`-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory tree (or a job list) and produce an index directory.
    Scan(ScanArgs),
    /// Bulk-upload a previously produced index to a search backend. Not part of this build.
    Index(PassthroughArgs),
    /// Serve a web UI over one or more indices. Not part of this build.
    Web(PassthroughArgs),
    /// Run a user script against an index. Not part of this build.
    ExecScript(PassthroughArgs),
}

/// Minimal stand-in for the sub-commands this crate does not implement, kept only so their
/// names and help text appear on the CLI surface.
#[derive(clap::Args, Debug)]
pub struct PassthroughArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    Skip,
    List,
    Shallow,
    Recurse,
}

impl From<ArchiveMode> for CoreArchiveMode {
    fn from(mode: ArchiveMode) -> CoreArchiveMode {
        match mode {
            ArchiveMode::Skip => CoreArchiveMode::Skip,
            ArchiveMode::List => CoreArchiveMode::List,
            ArchiveMode::Shallow => CoreArchiveMode::Shallow,
            ArchiveMode::Recurse => CoreArchiveMode::Recurse,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Root directory to scan.
    pub path: PathBuf,

    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    pub quality: f32,
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
    pub size: u32,
    #[arg(long = "content-size", default_value_t = DEFAULT_CONTENT_SIZE)]
    pub content_size: usize,
    /// Recursion depth; `-1` means unlimited.
    #[arg(long, default_value_t = -1)]
    pub depth: i64,

    #[arg(long, value_enum, default_value_t = ArchiveMode::Recurse)]
    pub archive: ArchiveMode,
    #[arg(long = "archive-passphrase")]
    pub archive_passphrase: Option<String>,

    #[arg(long = "ocr-lang")]
    pub ocr_lang: Option<String>,
    #[arg(long = "ocr-images", default_value_t = false)]
    pub ocr_images: bool,
    #[arg(long = "ocr-ebooks", default_value_t = false)]
    pub ocr_ebooks: bool,

    #[arg(long)]
    pub exclude: Option<String>,
    #[arg(long, default_value_t = false)]
    pub fast: bool,

    #[arg(long = "treemap-threshold", default_value_t = DEFAULT_TREEMAP_THRESHOLD)]
    pub treemap_threshold: f64,
    #[arg(long = "mem-buffer", default_value_t = DEFAULT_MEM_BUFFER_MIB)]
    pub mem_buffer: u64,
    #[arg(long = "read-subtitles", default_value_t = false)]
    pub read_subtitles: bool,
    #[arg(long = "fast-epub", default_value_t = false)]
    pub fast_epub: bool,

    #[arg(long, default_value_t = false)]
    pub checksums: bool,
    #[arg(long = "list-file")]
    pub list_file: Option<String>,
    #[arg(long)]
    pub incremental: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long = "rewrite-url")]
    pub rewrite_url: Option<String>,
}

/// The immutable, validated configuration the coordinator runs from. Built once by
/// [`build_scan_run`] so no later stage re-parses CLI flags.
pub struct ScanRun {
    pub root: PathBuf,
    pub threads: usize,
    pub depth: Option<usize>,
    pub exclude: Option<Regex>,
    pub fast: bool,
    pub checksums: bool,
    pub list_file: Option<String>,
    pub incremental: Option<PathBuf>,
    pub output: PathBuf,
    pub name: String,
    pub rewrite_url: Option<String>,
    pub archive_mode: CoreArchiveMode,
    pub archive_passphrase: Option<String>,
    pub quality: f32,
    pub thumbnail_size: u32,
    pub content_size: usize,
    pub mem_buffer_mib: u64,
}

/// Parses and validates a `ScanArgs` into a [`ScanRun`]. Fatal on an invalid `--exclude`
/// pattern, matching §6/§7's "config errors are fatal" policy.
pub fn build_scan_run(args: ScanArgs) -> Result<ScanRun> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    let exclude = match args.exclude {
        Some(pattern) => Some(
            Regex::new(&pattern)
                .map_err(|e| anyhow::anyhow!("invalid --exclude pattern {pattern:?}: {e}"))?,
        ),
        None => None,
    };
    let depth = if args.depth < 0 {
        None
    } else {
        Some(args.depth as usize)
    };
    let name = args
        .name
        .unwrap_or_else(|| args.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "index".to_string()));

    Ok(ScanRun {
        root: args.path,
        threads: args.threads,
        depth,
        exclude,
        fast: args.fast,
        checksums: args.checksums,
        list_file: args.list_file,
        incremental: args.incremental,
        output: args.output,
        name,
        rewrite_url: args.rewrite_url,
        archive_mode: args.archive.into(),
        archive_passphrase: args.archive_passphrase,
        quality: args.quality,
        thumbnail_size: args.size,
        content_size: args.content_size,
        mem_buffer_mib: args.mem_buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_depth_means_unlimited() {
        let args = ScanArgs {
            path: PathBuf::from("."),
            threads: 1,
            quality: DEFAULT_QUALITY,
            size: DEFAULT_THUMBNAIL_SIZE,
            content_size: DEFAULT_CONTENT_SIZE,
            depth: -1,
            archive: ArchiveMode::Recurse,
            archive_passphrase: None,
            ocr_lang: None,
            ocr_images: false,
            ocr_ebooks: false,
            exclude: None,
            fast: false,
            treemap_threshold: DEFAULT_TREEMAP_THRESHOLD,
            mem_buffer: DEFAULT_MEM_BUFFER_MIB,
            read_subtitles: false,
            fast_epub: false,
            checksums: false,
            list_file: None,
            incremental: None,
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            name: None,
            rewrite_url: None,
        };
        let run = build_scan_run(args).unwrap();
        assert_eq!(run.depth, None);
    }

    #[test]
    fn invalid_exclude_pattern_is_fatal_not_panicking() {
        let args = ScanArgs {
            path: PathBuf::from("."),
            threads: 1,
            quality: DEFAULT_QUALITY,
            size: DEFAULT_THUMBNAIL_SIZE,
            content_size: DEFAULT_CONTENT_SIZE,
            depth: -1,
            archive: ArchiveMode::Recurse,
            archive_passphrase: None,
            ocr_lang: None,
            ocr_images: false,
            ocr_ebooks: false,
            exclude: Some("(unclosed".to_string()),
            fast: false,
            treemap_threshold: DEFAULT_TREEMAP_THRESHOLD,
            mem_buffer: DEFAULT_MEM_BUFFER_MIB,
            read_subtitles: false,
            fast_epub: false,
            checksums: false,
            list_file: None,
            incremental: None,
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            name: None,
            rewrite_url: None,
        };
        assert!(build_scan_run(args).is_err());
    }
}
