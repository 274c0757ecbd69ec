//! Parser context registry: the per-type configuration blocks handed to external parsers.
//!
//! Building the actual content parsers (ebook, archive, media, OOXML, ...) is out of scope for
//! this core; what belongs here is the registry that would hold their configuration and the
//! stub signature a parser plugs into. `ParserContexts` is built once per scan and shared
//! (read-only) across every parse-pool worker.

use std::path::PathBuf;

use anyhow::Result;
use regex::Regex;

use crate::types::Document;
use crate::vfile::VirtualFile;

/// How deep archive recursion is allowed to go. `Skip` disables archive dispatch outright,
/// matching the dispatch table's `archive mode != skip` guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    Skip,
    List,
    Shallow,
    #[default]
    Recurse,
}

/// Tuning knobs for archive extraction (zip/tar/rar/7z).
#[derive(Debug, Clone, Default)]
pub struct ArchiveCtx {
    pub mode: ArchiveMode,
    pub passphrase: Option<String>,
    pub exclude: Option<Regex>,
    pub max_recursion_depth: u32,
}

/// Tuning knobs for comic-book archives (cbr/cbz): effectively an `ArchiveCtx` restricted to
/// image entries plus a cover-page policy.
#[derive(Debug, Clone)]
pub struct ComicCtx {
    pub archive: ArchiveCtx,
    pub cover_page_index: usize,
}

impl Default for ComicCtx {
    fn default() -> Self {
        ComicCtx {
            archive: ArchiveCtx::default(),
            cover_page_index: 0,
        }
    }
}

/// Tuning knobs for ebook parsers (epub/mobi).
#[derive(Debug, Clone)]
pub struct EbookCtx {
    pub content_size: usize,
    pub extract_cover: bool,
}

impl Default for EbookCtx {
    fn default() -> Self {
        EbookCtx {
            content_size: crate::config::DEFAULT_CONTENT_SIZE,
            extract_cover: true,
        }
    }
}

/// Tuning knobs for font parsing (ttf/otf/woff).
#[derive(Debug, Clone, Default)]
pub struct FontCtx {
    pub render_glyph_preview: bool,
}

/// Tuning knobs shared by audio/video/image parsing.
#[derive(Debug, Clone)]
pub struct MediaCtx {
    pub thumbnail_quality: f32,
    pub thumbnail_size: u32,
    pub mem_buffer_mib: u64,
}

impl Default for MediaCtx {
    fn default() -> Self {
        MediaCtx {
            thumbnail_quality: crate::config::DEFAULT_QUALITY,
            thumbnail_size: crate::config::DEFAULT_THUMBNAIL_SIZE,
            mem_buffer_mib: crate::config::DEFAULT_MEM_BUFFER_MIB,
        }
    }
}

/// Tuning knobs for Office Open XML documents (docx/xlsx/pptx).
#[derive(Debug, Clone)]
pub struct OoxmlCtx {
    pub content_size: usize,
}

impl Default for OoxmlCtx {
    fn default() -> Self {
        OoxmlCtx {
            content_size: crate::config::DEFAULT_CONTENT_SIZE,
        }
    }
}

/// Tuning knobs for legacy MS binary documents (doc/xls/ppt).
#[derive(Debug, Clone)]
pub struct MsDocCtx {
    pub content_size: usize,
}

impl Default for MsDocCtx {
    fn default() -> Self {
        MsDocCtx {
            content_size: crate::config::DEFAULT_CONTENT_SIZE,
        }
    }
}

/// Tuning knobs for plain-text and markup extraction.
#[derive(Debug, Clone)]
pub struct TextCtx {
    pub content_size: usize,
}

impl Default for TextCtx {
    fn default() -> Self {
        TextCtx {
            content_size: crate::config::DEFAULT_CONTENT_SIZE,
        }
    }
}

/// Tuning knobs for RAW camera image parsing.
#[derive(Debug, Clone, Default)]
pub struct RawCtx {
    pub extract_embedded_preview: bool,
}

/// Tuning knobs for WordPerfect documents.
#[derive(Debug, Clone)]
pub struct WpdCtx {
    pub content_size: usize,
}

impl Default for WpdCtx {
    fn default() -> Self {
        WpdCtx {
            content_size: crate::config::DEFAULT_CONTENT_SIZE,
        }
    }
}

/// All per-type parser configuration, built once from `ScanArgs` and shared read-only across
/// the parse pool. Fields are public structs rather than trait objects because a context block
/// is pure configuration, never behavior.
#[derive(Debug, Clone, Default)]
pub struct ParserContexts {
    pub archive: ArchiveCtx,
    pub comic: ComicCtx,
    pub ebook: EbookCtx,
    pub font: FontCtx,
    pub media: MediaCtx,
    pub ooxml: OoxmlCtx,
    pub msdoc: MsDocCtx,
    pub text: TextCtx,
    pub raw: RawCtx,
    pub wpd: WpdCtx,
    pub root: PathBuf,
}

impl ParserContexts {
    pub fn new(root: PathBuf) -> ParserContexts {
        ParserContexts {
            root,
            ..ParserContexts::default()
        }
    }
}

/// The signature an external content parser plugs into: reads from `vfile`, writes extracted
/// fields into `doc`. No parser implements this in this build; routing to this signature is
/// what `crate::dispatch` exercises.
pub type ParseFn<C> = fn(ctx: &C, vfile: &mut dyn VirtualFile, doc: &mut Document) -> Result<()>;

/// Placeholder used wherever the dispatch table would otherwise call a real parser; always
/// succeeds without touching `doc`, so a document without a wired parser still gets indexed
/// with just its filesystem-derived fields.
pub fn noop_parse<C>(_ctx: &C, _vfile: &mut dyn VirtualFile, _doc: &mut Document) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let ctx = ParserContexts::new(PathBuf::from("/data"));
        assert_eq!(ctx.media.thumbnail_size, crate::config::DEFAULT_THUMBNAIL_SIZE);
        assert_eq!(ctx.ebook.content_size, crate::config::DEFAULT_CONTENT_SIZE);
    }
}
