//! Scan coordinator: wires the store, walker, thread pools and dispatcher together for one
//! `scan` invocation, following the run sequence the original's `sist2_scan` executes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;

use crate::cli::ScanRun;
use crate::config::{
    JOB_CHANNEL_CAP, META_STORE_SIZE_HINT, THUMBS_STORE_SIZE_HINT, WRITER_CHANNEL_CAP,
};
use crate::context::{ArchiveCtx, EbookCtx, MediaCtx, OoxmlCtx, ParserContexts, TextCtx};
use crate::descriptor::Descriptor;
use crate::dispatch::{self, DispatchContext, Stats};
use crate::incremental::{CopyMarks, OriginalTable};
use crate::mime::{MimeTable, sniff_bytes};
use crate::pool::ThreadPool;
use crate::serialize::DocumentRecord;
use crate::store::Store;
use crate::types::ParseJob;
use crate::vfile::FsFile;
use crate::walk::{WalkConfig, WalkStats};

/// Final counters reported once a scan completes, matching §7's "always log three counters".
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub visited: usize,
    pub parsed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub excluded: usize,
    pub carried_forward: usize,
}

fn parser_contexts_from(run: &ScanRun) -> ParserContexts {
    ParserContexts {
        archive: ArchiveCtx {
            mode: run.archive_mode,
            passphrase: run.archive_passphrase.clone(),
            exclude: None,
            max_recursion_depth: 4,
        },
        media: MediaCtx {
            thumbnail_quality: run.quality,
            thumbnail_size: run.thumbnail_size,
            mem_buffer_mib: run.mem_buffer_mib,
        },
        ebook: EbookCtx {
            content_size: run.content_size,
            extract_cover: true,
        },
        ooxml: OoxmlCtx {
            content_size: run.content_size,
        },
        text: TextCtx {
            content_size: run.content_size,
        },
        root: run.root.clone(),
        ..ParserContexts::new(run.root.clone())
    }
}

fn open_predecessor(incremental: &Option<PathBuf>) -> Result<(OriginalTable, Option<PathBuf>)> {
    match incremental {
        None => Ok((OriginalTable::empty(), None)),
        Some(dir) => {
            Descriptor::read(dir).with_context(|| {
                format!("reading descriptor of incremental predecessor {}", dir.display())
            })?;
            let table = OriginalTable::load(dir)
                .with_context(|| format!("loading incremental tables from {}", dir.display()))?;
            Ok((table, Some(dir.clone())))
        }
    }
}

/// Runs one full scan: canonicalizes the root, sets up the output index directory, runs the
/// walk through the dispatcher, and performs incremental carry-forward if requested.
pub fn run(scan_run: &ScanRun) -> Result<ScanSummary> {
    let root = std::fs::canonicalize(&scan_run.root)
        .with_context(|| format!("canonicalizing scan root {}", scan_run.root.display()))?;

    std::fs::create_dir_all(&scan_run.output)
        .with_context(|| format!("creating output directory {}", scan_run.output.display()))?;
    let descriptor = Descriptor::now(
        scan_run.name.clone(),
        root.to_string_lossy().into_owned(),
        scan_run.rewrite_url.clone(),
    );
    descriptor.write(&scan_run.output)?;

    let (original, predecessor_dir) = open_predecessor(&scan_run.incremental)?;

    let thumbs = Store::create(&scan_run.output.join("thumbs"), THUMBS_STORE_SIZE_HINT)?;
    let meta = Store::create(&scan_run.output.join("meta"), META_STORE_SIZE_HINT)?;
    let tags = Store::create(&scan_run.output.join("tags"), crate::config::TAGS_STORE_SIZE_HINT)?;

    let contexts = Arc::new(parser_contexts_from(scan_run));
    let original = Arc::new(original);
    let copy_marks = Arc::new(CopyMarks::new());
    let stats = Arc::new(Stats::new());
    let writer = Arc::new(crate::serialize::DocumentWriter::create(&scan_run.output)?);

    let root_strip_len = root.to_string_lossy().len();
    let fast_mode = scan_run.fast;
    let calculate_checksum = scan_run.checksums;

    let writer_pool: ThreadPool<DocumentRecord> = {
        let writer = Arc::clone(&writer);
        ThreadPool::start(
            1,
            WRITER_CHANNEL_CAP,
            move |record: DocumentRecord| {
                if let Err(e) = writer.append(&record) {
                    log::error!("failed to write document {}: {e}", record.id);
                }
            },
            |record: &DocumentRecord| record.path.clone(),
            None::<fn()>,
        )
    };
    let writer_pool = Arc::new(writer_pool);

    let parse_pool: ThreadPool<ParseJob> = {
        let contexts = Arc::clone(&contexts);
        let original = Arc::clone(&original);
        let copy_marks = Arc::clone(&copy_marks);
        let stats = Arc::clone(&stats);
        let writer_pool = Arc::clone(&writer_pool);
        ThreadPool::start(
            scan_run.threads,
            JOB_CHANNEL_CAP,
            move |job: ParseJob| {
                let sniff = |buf: &[u8]| -> Option<&'static str> { sniff_bytes(buf) };
                let writer_pool = Arc::clone(&writer_pool);
                let emit = move |record: DocumentRecord| writer_pool.submit(record);
                let dispatch_ctx = DispatchContext {
                    mime_table: MimeTable::global(),
                    contexts: &contexts,
                    original: &original,
                    copy_marks: &copy_marks,
                    stats: &stats,
                    root_strip_len,
                    fast_mode,
                    calculate_checksum,
                    sniff: &sniff,
                    emit: &emit,
                };
                dispatch::dispatch(&dispatch_ctx, job);
            },
            |job: &ParseJob| job.filepath.display().to_string(),
            None::<fn()>,
        )
    };

    crate::logging::install_crash_handlers(parse_pool.debug_registry(), writer_pool.debug_registry());

    log::info!("scanning {}", root.display());
    let walk_stats = run_walk_and_submit(scan_run, &root, &parse_pool, calculate_checksum)?;

    parse_pool.destroy();
    log::info!("parse pool drained");
    match Arc::try_unwrap(writer_pool) {
        Ok(pool) => pool.destroy(),
        Err(_) => log::warn!("writer pool had outstanding references at drain"),
    }
    match Arc::try_unwrap(writer) {
        Ok(writer) => writer.finish().map(drop)?,
        Err(_) => log::warn!("document writer had outstanding references at close"),
    }
    log::info!("writer pool drained");

    let mut carried_forward = 0;
    if let Some(predecessor_dir) = predecessor_dir {
        carried_forward = crate::incremental::carry_forward_rows(&original, &copy_marks, &scan_run.output)?;
        let old_thumbs = Store::open(&predecessor_dir.join("thumbs"))?;
        for hash in copy_marks.marked_hashes() {
            old_thumbs.copy_key(&hash, &thumbs)?;
        }
        let old_tags = Store::open(&predecessor_dir.join("tags"))?;
        old_tags.copy_all(&tags)?;
    }

    thumbs.close()?;
    meta.close()?;
    tags.close()?;

    let counters = stats.snapshot();
    log::info!(
        "scan complete: {} visited, {} parsed, {} skipped, {} failed, {} excluded, {} carried forward",
        walk_stats.visited, counters.parsed, counters.skipped, counters.failed, walk_stats.excluded, carried_forward
    );

    Ok(ScanSummary {
        visited: walk_stats.visited,
        parsed: counters.parsed,
        skipped: counters.skipped,
        failed: counters.failed,
        excluded: walk_stats.excluded,
        carried_forward,
    })
}

fn run_walk_and_submit(
    scan_run: &ScanRun,
    root: &Path,
    parse_pool: &ThreadPool<ParseJob>,
    calculate_checksum: bool,
) -> Result<WalkStats> {
    let (tx, rx) = bounded(JOB_CHANNEL_CAP.min(4096));
    let handle = if let Some(list_file) = &scan_run.list_file {
        let list_file = list_file.clone();
        std::thread::spawn(move || crate::walk::iterate_file_list(&list_file, tx))
    } else {
        let cfg = WalkConfig {
            root: root.to_path_buf(),
            depth: scan_run.depth,
            exclude: scan_run.exclude.clone(),
            use_parallel: scan_run.threads > 1,
        };
        std::thread::spawn(move || Ok(crate::walk::run_walk(&cfg, tx)))
    };

    for entry in rx.iter() {
        let vfile = match FsFile::open(&entry.path, entry.size, entry.mtime_seconds, calculate_checksum) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("failed to open {}: {e}", entry.path.display());
                continue;
            }
        };
        parse_pool.submit(ParseJob {
            virtual_file: Box::new(vfile),
            filepath: entry.path,
            base_offset: entry.base_offset,
            ext_offset: entry.ext_offset,
            size_bytes: entry.size,
            mtime_seconds: entry.mtime_seconds,
            parent_path_hash: None,
        });
    }

    handle.join().expect("walk thread panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ArchiveMode, ScanArgs, build_scan_run};
    use std::fs;
    use std::io::Write as _;

    fn run_scan(root: &Path, output: &Path) -> ScanSummary {
        let args = ScanArgs {
            path: root.to_path_buf(),
            threads: 1,
            quality: 3.0,
            size: 500,
            content_size: 32_768,
            depth: -1,
            archive: ArchiveMode::Skip,
            archive_passphrase: None,
            ocr_lang: None,
            ocr_images: false,
            ocr_ebooks: false,
            exclude: None,
            fast: false,
            treemap_threshold: 0.0005,
            mem_buffer: 2000,
            read_subtitles: false,
            fast_epub: false,
            checksums: false,
            list_file: None,
            incremental: None,
            output: output.to_path_buf(),
            name: None,
            rewrite_url: None,
        };
        let run = build_scan_run(args).unwrap();
        run_with(&run)
    }

    fn run_with(run: &ScanRun) -> ScanSummary {
        super::run(run).unwrap()
    }

    #[test]
    fn empty_file_is_emitted_with_empty_mime() {
        let root = tempfile::tempdir().unwrap();
        fs::File::create(root.path().join("a.bin")).unwrap();
        let output = tempfile::tempdir().unwrap();
        let summary = run_scan(root.path(), output.path());
        assert_eq!(summary.visited, 1);
        assert_eq!(summary.parsed, 1);

        let rows = crate::serialize::read_all_rows(output.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mime, "inode/x-empty");
    }

    #[test]
    fn known_extension_is_resolved_without_sniffing() {
        let root = tempfile::tempdir().unwrap();
        fs::File::create(root.path().join("note.txt")).unwrap().write_all(b"hello").unwrap();
        let output = tempfile::tempdir().unwrap();
        let summary = run_scan(root.path(), output.path());
        assert_eq!(summary.parsed, 1);
        let rows = crate::serialize::read_all_rows(output.path()).unwrap();
        assert_eq!(rows[0].mime, "text/plain");
    }

    #[test]
    fn descriptor_is_always_written() {
        let root = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        run_scan(root.path(), output.path());
        assert!(output.path().join(crate::config::DESCRIPTOR_FILENAME).exists());
    }
}
