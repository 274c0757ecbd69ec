//! Parse dispatcher: the heart of the pipeline. Turns one job into zero or one emitted
//! document, deciding along the way whether to skip it (incremental match), what it is
//! (mime resolution), and which parser family it belongs to (first-match dispatch table).

use std::sync::Mutex;

use anyhow::Result;

use crate::config::{MAGIC_BUF_SIZE, MIN_IMAGE_SIZE, MIN_VIDEO_SIZE};
use crate::context::ParserContexts;
use crate::incremental::{CopyMarks, OriginalTable};
use crate::mime::{MIME_EMPTY, MIME_SIST2_SIDECAR, MimeCategory, MimeTable};
use crate::serialize::DocumentRecord;
use crate::types::{Document, MetaEntry, ParseJob, PathHash};
use crate::vfile::VirtualFile;

/// Counters updated under a single mutex, matching the dispatcher's "counter updates take a
/// dedicated mutex" rule — cheap since increments are rare relative to parse work.
#[derive(Default, Debug, Clone, Copy)]
pub struct DispatchCounters {
    pub parsed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub archive_entries: u64,
}

#[derive(Default)]
pub struct Stats {
    counters: Mutex<DispatchCounters>,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }

    pub fn snapshot(&self) -> DispatchCounters {
        *self.counters.lock().unwrap()
    }

    fn bump(&self, f: impl FnOnce(&mut DispatchCounters)) {
        f(&mut self.counters.lock().unwrap());
    }
}

/// Which parser family a document was routed to. The variants other than `None`/`Skipped`
/// name a family rather than a concrete parser, since this core ships no parser bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    None,
    Raw,
    Media,
    Ebook,
    Markup,
    Text,
    Font,
    Archive,
    Ooxml,
    Comic,
    Mobi,
    Sidecar,
    MsDoc,
    Json,
    Ndjson,
}

fn filename_passes_archive_filter(_filepath: &std::path::Path) -> bool {
    // No filter configured in this core; archive-filter mimes (e.g. gzip) are always eligible,
    // matching a scan run with no exclusion pattern configured on the archive context.
    true
}

/// Picks the first matching route for a resolved mime id, mirroring the dispatch table's
/// first-match-wins ordering exactly.
pub fn route_for(
    mime_table: &MimeTable,
    mime_id: u32,
    size_bytes: u64,
    filepath: &std::path::Path,
    contexts: &ParserContexts,
) -> Route {
    if !mime_table.should_parse(mime_id) {
        return Route::None;
    }
    if mime_table.is_raw(mime_id) {
        return Route::Raw;
    }
    let major = mime_table.major(mime_id);
    if (major == MimeCategory::Video && size_bytes >= MIN_VIDEO_SIZE)
        || (major == MimeCategory::Image && size_bytes >= MIN_IMAGE_SIZE)
        || major == MimeCategory::Audio
    {
        return Route::Media;
    }
    if mime_table.is_pdf(mime_id) {
        return Route::Ebook;
    }
    if major == MimeCategory::Text && contexts.text.content_size > 0 {
        if mime_table.is_markup(mime_id) {
            return Route::Markup;
        }
        return Route::Text;
    }
    if mime_table.is_font(mime_id) {
        return Route::Font;
    }
    if contexts.archive.mode != crate::context::ArchiveMode::Skip
        && (mime_table.is_archive(mime_id)
            || (mime_table.is_archive_filter(mime_id) && filename_passes_archive_filter(filepath)))
    {
        return Route::Archive;
    }
    if mime_table.is_doc(mime_id) && (contexts.ooxml.content_size > 0 || contexts.media.thumbnail_size > 0) {
        return Route::Ooxml;
    }
    if mime_table.is_cbr(mime_id) || mime_table.is_cbz(mime_id) {
        return Route::Comic;
    }
    if mime_table.is_mobi(mime_id) {
        return Route::Mobi;
    }
    if mime_id == MIME_SIST2_SIDECAR {
        return Route::Sidecar;
    }
    if mime_table.is_msdoc(mime_id) {
        return Route::MsDoc;
    }
    if mime_table.is_json(mime_id) {
        return Route::Json;
    }
    if mime_table.is_ndjson(mime_id) {
        return Route::Ndjson;
    }
    Route::None
}

fn compute_path_hash(filepath: &std::path::Path, root_strip_len: usize) -> PathHash {
    let s = filepath.to_string_lossy();
    let bytes = s.as_bytes();
    let offset = root_strip_len.min(bytes.len());
    *md5::compute(&bytes[offset..])
}

/// Everything the dispatcher needs that outlives a single job, shared read-only (or
/// internally synchronized) across every parse-pool worker.
pub struct DispatchContext<'a> {
    pub mime_table: &'static MimeTable,
    pub contexts: &'a ParserContexts,
    pub original: &'a OriginalTable,
    pub copy_marks: &'a CopyMarks,
    pub stats: &'a Stats,
    pub root_strip_len: usize,
    pub fast_mode: bool,
    pub calculate_checksum: bool,
    pub sniff: &'a dyn Fn(&[u8]) -> Option<&'static str>,
    pub emit: &'a dyn Fn(DocumentRecord),
}

/// Runs one job through the full dispatch sequence. Returns the route taken, or `None` if the
/// job was skipped (incremental match) or failed mime sniffing.
pub fn dispatch(ctx: &DispatchContext, mut job: ParseJob) -> Route {
    let path_hash = compute_path_hash(&job.filepath, ctx.root_strip_len);
    let mut doc = Document::new(
        path_hash,
        job.filepath.clone(),
        job.base_offset,
        job.ext_offset,
        job.size_bytes,
        job.mtime_seconds,
    );

    if ctx.original.matches(&path_hash, job.mtime_seconds) {
        ctx.copy_marks.mark(path_hash);
        ctx.stats.bump(|c| c.skipped += 1);
        return Route::None;
    }

    if doc.size_bytes == 0 {
        doc.mime_id = MIME_EMPTY;
    } else {
        let ext = doc.extension();
        // A dot immediately after the separator (`.json`, `.gitignore`) is not an extension:
        // ext_offset must point strictly past base_offset for the lookup to apply.
        doc.mime_id = if !ext.is_empty() && doc.ext_offset > doc.base_offset {
            ctx.mime_table.by_extension(ext).unwrap_or(MIME_EMPTY)
        } else {
            MIME_EMPTY
        };
        if doc.mime_id == MIME_EMPTY && !ctx.fast_mode {
            let mut buf = vec![0u8; MAGIC_BUF_SIZE];
            match job.virtual_file.read_rewindable(&mut buf) {
                Ok(n) => {
                    if let Some(sniffed) = (ctx.sniff)(&buf[..n]) {
                        doc.mime_id = ctx.mime_table.by_string(sniffed).unwrap_or(MIME_EMPTY);
                    }
                    job.virtual_file.reset();
                }
                Err(e) => {
                    log::warn!("content sniff failed for {}: {e}", job.filepath.display());
                    ctx.stats.bump(|c| c.failed += 1);
                    job.virtual_file.close();
                    return Route::None;
                }
            }
        }
    }

    let route = route_for(
        ctx.mime_table,
        doc.mime_id,
        doc.size_bytes,
        &doc.filepath,
        ctx.contexts,
    );

    if route == Route::Sidecar {
        job.virtual_file.close();
        return Route::Sidecar;
    }

    if let Some(parent_hash) = job.parent_path_hash {
        doc.meta_list.push(MetaEntry::parent(parent_hash));
        doc.has_parent = true;
        ctx.stats.bump(|c| c.archive_entries += 1);
    }

    job.virtual_file.close();
    if job.virtual_file.has_checksum() {
        if let Some(hex) = job.virtual_file.checksum_hex() {
            doc.meta_list.push(MetaEntry::checksum(hex));
        }
    }

    ctx.stats.bump(|c| c.parsed += 1);
    let record = DocumentRecord::from_document(&doc, ctx.mime_table);
    (ctx.emit)(record);
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfile::FsFile;
    use std::io::Write as _;

    fn contexts() -> ParserContexts {
        ParserContexts::new(std::path::PathBuf::from("/"))
    }

    #[test]
    fn zero_byte_file_gets_empty_mime_and_no_parse_route() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::File::create(&path).unwrap();
        let vfile = FsFile::open(&path, 0, 0, false).unwrap();
        let job = ParseJob {
            virtual_file: Box::new(vfile),
            filepath: path.clone(),
            base_offset: 0,
            ext_offset: path.to_string_lossy().len(),
            size_bytes: 0,
            mtime_seconds: 0,
            parent_path_hash: None,
        };
        let stats = Stats::new();
        let original = OriginalTable::empty();
        let marks = CopyMarks::new();
        let emitted = Mutex::new(Vec::new());
        let sniff = |_: &[u8]| -> Option<&'static str> { None };
        let emit = |r: DocumentRecord| emitted.lock().unwrap().push(r);
        let ctx_structs = contexts();
        let dispatch_ctx = DispatchContext {
            mime_table: MimeTable::global(),
            contexts: &ctx_structs,
            original: &original,
            copy_marks: &marks,
            stats: &stats,
            root_strip_len: 0,
            fast_mode: false,
            calculate_checksum: false,
            sniff: &sniff,
            emit: &emit,
        };
        let route = dispatch(&dispatch_ctx, job);
        assert_eq!(route, Route::None);
        assert_eq!(emitted.lock().unwrap().len(), 1);
        assert_eq!(emitted.lock().unwrap()[0].mime, "inode/x-empty");
    }

    #[test]
    fn known_extension_routes_to_text_without_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();
        let vfile = FsFile::open(&path, 2, 0, false).unwrap();
        let (base, ext) = crate::walk::compute_offsets(&path);
        let job = ParseJob {
            virtual_file: Box::new(vfile),
            filepath: path.clone(),
            base_offset: base,
            ext_offset: ext,
            size_bytes: 2,
            mtime_seconds: 0,
            parent_path_hash: None,
        };
        let stats = Stats::new();
        let original = OriginalTable::empty();
        let marks = CopyMarks::new();
        let emitted = Mutex::new(Vec::new());
        let sniff = |_: &[u8]| -> Option<&'static str> { panic!("should not sniff") };
        let emit = |r: DocumentRecord| emitted.lock().unwrap().push(r);
        let ctx_structs = contexts();
        let dispatch_ctx = DispatchContext {
            mime_table: MimeTable::global(),
            contexts: &ctx_structs,
            original: &original,
            copy_marks: &marks,
            stats: &stats,
            root_strip_len: 0,
            fast_mode: false,
            calculate_checksum: false,
            sniff: &sniff,
            emit: &emit,
        };
        let route = dispatch(&dispatch_ctx, job);
        assert_eq!(route, Route::Text);
    }

    #[test]
    fn incremental_match_marks_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unchanged.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();
        let vfile = FsFile::open(&path, 2, 42, false).unwrap();
        let path_hash = compute_path_hash(&path, 0);

        let old_dir = tempfile::tempdir().unwrap();
        let writer = crate::serialize::DocumentWriter::create(old_dir.path()).unwrap();
        writer
            .append(&DocumentRecord {
                id: hex_encode(&path_hash),
                path: path.to_string_lossy().into_owned(),
                extension: "txt".into(),
                size: 2,
                mtime: 42,
                mime: "text/plain".into(),
                has_parent: false,
                checksum: None,
                meta_parent: None,
                extra: serde_json::Map::new(),
            })
            .unwrap();
        writer.finish().unwrap();
        let original = OriginalTable::load(old_dir.path()).unwrap();

        let job = ParseJob {
            virtual_file: Box::new(vfile),
            filepath: path.clone(),
            base_offset: 0,
            ext_offset: path.to_string_lossy().len(),
            size_bytes: 2,
            mtime_seconds: 42,
            parent_path_hash: None,
        };
        let stats = Stats::new();
        let marks = CopyMarks::new();
        let emitted = Mutex::new(Vec::new());
        let sniff = |_: &[u8]| -> Option<&'static str> { None };
        let emit = |r: DocumentRecord| emitted.lock().unwrap().push(r);
        let ctx_structs = contexts();
        let dispatch_ctx = DispatchContext {
            mime_table: MimeTable::global(),
            contexts: &ctx_structs,
            original: &original,
            copy_marks: &marks,
            stats: &stats,
            root_strip_len: 0,
            fast_mode: false,
            calculate_checksum: false,
            sniff: &sniff,
            emit: &emit,
        };
        let route = dispatch(&dispatch_ctx, job);
        assert_eq!(route, Route::None);
        assert!(emitted.lock().unwrap().is_empty());
        assert!(marks.is_marked(&path_hash));
        assert_eq!(stats.snapshot().skipped, 1);
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
