//! Media-type table: interns MIME strings and extensions to small integer ids and exposes
//! the closed-form predicates the dispatcher (`crate::dispatch`) decides on.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A small integer whose high bits encode the major category and whose low bits identify
/// the specific type within that category.
pub type MimeId = u32;

const CATEGORY_SHIFT: u32 = 20;
const CATEGORY_MASK: u32 = 0xFFF << CATEGORY_SHIFT;

/// Major category, packed into the high bits of a [`MimeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MimeCategory {
    Empty = 0,
    Video = 1,
    Image = 2,
    Audio = 3,
    Text = 4,
    Document = 5,
    Archive = 6,
    Font = 7,
    Raw = 8,
    Book = 9,
    Sidecar = 10,
    Other = 11,
}

impl MimeCategory {
    fn from_bits(bits: u32) -> MimeCategory {
        match bits {
            0 => MimeCategory::Empty,
            1 => MimeCategory::Video,
            2 => MimeCategory::Image,
            3 => MimeCategory::Audio,
            4 => MimeCategory::Text,
            5 => MimeCategory::Document,
            6 => MimeCategory::Archive,
            7 => MimeCategory::Font,
            8 => MimeCategory::Raw,
            9 => MimeCategory::Book,
            10 => MimeCategory::Sidecar,
            _ => MimeCategory::Other,
        }
    }
}

/// Flags that don't reduce to a major-category check alone; mirrors the `IS_*` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeFlags {
    pub is_raw: bool,
    pub is_pdf: bool,
    pub is_mobi: bool,
    pub is_doc: bool,
    pub is_msdoc: bool,
    pub is_archive: bool,
    pub is_archive_filter: bool,
    pub is_markup: bool,
    pub is_font: bool,
    pub is_sidecar: bool,
    pub is_cbr: bool,
    pub is_cbz: bool,
    pub is_json: bool,
    pub is_ndjson: bool,
    /// Whether this mime should ever be handed to a parser at all.
    pub should_parse: bool,
}

struct MimeEntry {
    id: MimeId,
    string: &'static str,
    flags: MimeFlags,
}

/// `MIME_EMPTY`: assigned to zero-byte files.
pub const MIME_EMPTY: MimeId = (MimeCategory::Empty as u32) << CATEGORY_SHIFT;
/// `MIME_SIST2_SIDECAR`: reserved mime for this tool's own per-document sidecar files.
pub const MIME_SIST2_SIDECAR: MimeId = ((MimeCategory::Sidecar as u32) << CATEGORY_SHIFT) | 1;

/// The two maps built once at process start: `string -> mime_id` and `extension -> mime_id`.
pub struct MimeTable {
    entries: HashMap<MimeId, MimeEntry>,
    by_string: HashMap<&'static str, MimeId>,
    by_ext: HashMap<&'static str, MimeId>,
}

macro_rules! entry {
    ($id:expr, $string:expr, $($flag:ident : $val:expr),* $(,)?) => {{
        let mut flags = MimeFlags { should_parse: true, ..MimeFlags::default() };
        $(flags.$flag = $val;)*
        MimeEntry { id: $id, string: $string, flags }
    }};
}

fn cat(c: MimeCategory, seq: u32) -> MimeId {
    ((c as u32) << CATEGORY_SHIFT) | seq
}

impl MimeTable {
    fn build() -> MimeTable {
        let mut entries = HashMap::new();
        let mut by_string = HashMap::new();
        let mut by_ext: HashMap<&'static str, MimeId> = HashMap::new();

        let empty = entry!(MIME_EMPTY, "inode/x-empty", should_parse: false);
        entries.insert(empty.id, empty);

        let sidecar = entry!(MIME_SIST2_SIDECAR, "application/x-sist2-sidecar", is_sidecar: true);
        entries.insert(sidecar.id, sidecar);

        macro_rules! add {
            ($id:expr, $string:expr, $exts:expr, { $($flag:ident : $val:expr),* $(,)? }) => {{
                let e = entry!($id, $string, $($flag : $val),*);
                by_string.insert(e.string, e.id);
                for ext in $exts {
                    by_ext.insert(*ext, e.id);
                }
                entries.insert(e.id, e);
            }};
        }

        add!(cat(MimeCategory::Video, 1), "video/mp4", &["mp4", "m4v"], {});
        add!(cat(MimeCategory::Video, 2), "video/x-matroska", &["mkv"], {});
        add!(cat(MimeCategory::Video, 3), "video/webm", &["webm"], {});

        add!(cat(MimeCategory::Image, 1), "image/jpeg", &["jpg", "jpeg"], {});
        add!(cat(MimeCategory::Image, 2), "image/png", &["png"], {});
        add!(cat(MimeCategory::Image, 3), "image/gif", &["gif"], {});
        add!(cat(MimeCategory::Image, 4), "image/webp", &["webp"], {});

        add!(cat(MimeCategory::Audio, 1), "audio/mpeg", &["mp3"], {});
        add!(cat(MimeCategory::Audio, 2), "audio/flac", &["flac"], {});
        add!(cat(MimeCategory::Audio, 3), "audio/ogg", &["ogg"], {});

        add!(cat(MimeCategory::Text, 1), "text/plain", &["txt", "log"], {});
        add!(cat(MimeCategory::Text, 2), "text/markdown", &["md", "markdown"], { is_markup: true });
        add!(cat(MimeCategory::Text, 3), "text/html", &["html", "htm"], { is_markup: true });
        add!(cat(MimeCategory::Text, 4), "application/json", &["json"], { is_json: true });
        add!(cat(MimeCategory::Text, 5), "application/x-ndjson", &["ndjson"], { is_ndjson: true });

        add!(cat(MimeCategory::Book, 1), "application/pdf", &["pdf"], { is_pdf: true });
        add!(cat(MimeCategory::Book, 2), "application/epub+zip", &["epub"], {});
        add!(cat(MimeCategory::Book, 3), "application/x-mobipocket-ebook", &["mobi", "azw"], { is_mobi: true });

        add!(cat(MimeCategory::Font, 1), "font/ttf", &["ttf"], { is_font: true });
        add!(cat(MimeCategory::Font, 2), "font/otf", &["otf"], { is_font: true });
        add!(cat(MimeCategory::Font, 3), "font/woff", &["woff", "woff2"], { is_font: true });

        add!(cat(MimeCategory::Raw, 1), "image/x-canon-cr2", &["cr2"], { is_raw: true });
        add!(cat(MimeCategory::Raw, 2), "image/x-nikon-nef", &["nef"], { is_raw: true });
        add!(cat(MimeCategory::Raw, 3), "image/x-adobe-dng", &["dng"], { is_raw: true });

        add!(cat(MimeCategory::Archive, 1), "application/zip", &["zip"], { is_archive: true });
        add!(cat(MimeCategory::Archive, 2), "application/x-tar", &["tar"], { is_archive: true });
        add!(cat(MimeCategory::Archive, 3), "application/x-rar-compressed", &["rar"], { is_archive: true });
        add!(cat(MimeCategory::Archive, 4), "application/x-7z-compressed", &["7z"], { is_archive: true });
        add!(cat(MimeCategory::Archive, 5), "application/gzip", &["gz"], { is_archive_filter: true });
        add!(cat(MimeCategory::Archive, 6), "application/x-cbr", &["cbr"], { is_cbr: true });
        add!(cat(MimeCategory::Archive, 7), "application/x-cbz", &["cbz"], { is_cbz: true });

        add!(cat(MimeCategory::Document, 1), "application/vnd.openxmlformats-officedocument.wordprocessingml.document", &["docx"], { is_doc: true });
        add!(cat(MimeCategory::Document, 2), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", &["xlsx"], { is_doc: true });
        add!(cat(MimeCategory::Document, 3), "application/vnd.openxmlformats-officedocument.presentationml.presentation", &["pptx"], { is_doc: true });
        add!(cat(MimeCategory::Document, 4), "application/msword", &["doc"], { is_msdoc: true });
        add!(cat(MimeCategory::Document, 5), "application/vnd.ms-excel", &["xls"], { is_msdoc: true });
        add!(cat(MimeCategory::Document, 6), "application/vnd.ms-powerpoint", &["ppt"], { is_msdoc: true });
        add!(cat(MimeCategory::Document, 7), "application/vnd.wordperfect", &["wpd"], {});

        MimeTable {
            entries,
            by_string,
            by_ext,
        }
    }

    pub fn global() -> &'static MimeTable {
        static TABLE: OnceLock<MimeTable> = OnceLock::new();
        TABLE.get_or_init(MimeTable::build)
    }

    pub fn by_extension(&self, ext: &str) -> Option<MimeId> {
        self.by_ext.get(ext.to_ascii_lowercase().as_str()).copied()
    }

    pub fn by_string(&self, s: &str) -> Option<MimeId> {
        self.by_string.get(s).copied()
    }

    pub fn mime_text(&self, id: MimeId) -> &'static str {
        self.entries.get(&id).map(|e| e.string).unwrap_or("application/octet-stream")
    }

    fn flags(&self, id: MimeId) -> MimeFlags {
        self.entries.get(&id).map(|e| e.flags).unwrap_or_default()
    }

    pub fn major(&self, id: MimeId) -> MimeCategory {
        MimeCategory::from_bits((id & CATEGORY_MASK) >> CATEGORY_SHIFT)
    }

    pub fn should_parse(&self, id: MimeId) -> bool {
        self.flags(id).should_parse
    }

    pub fn is_raw(&self, id: MimeId) -> bool {
        self.flags(id).is_raw
    }

    pub fn is_pdf(&self, id: MimeId) -> bool {
        self.flags(id).is_pdf
    }

    pub fn is_mobi(&self, id: MimeId) -> bool {
        self.flags(id).is_mobi
    }

    pub fn is_doc(&self, id: MimeId) -> bool {
        self.flags(id).is_doc
    }

    pub fn is_msdoc(&self, id: MimeId) -> bool {
        self.flags(id).is_msdoc
    }

    pub fn is_archive(&self, id: MimeId) -> bool {
        self.flags(id).is_archive
    }

    pub fn is_archive_filter(&self, id: MimeId) -> bool {
        self.flags(id).is_archive_filter
    }

    pub fn is_markup(&self, id: MimeId) -> bool {
        self.flags(id).is_markup
    }

    pub fn is_font(&self, id: MimeId) -> bool {
        self.flags(id).is_font
    }

    pub fn is_cbr(&self, id: MimeId) -> bool {
        self.flags(id).is_cbr
    }

    pub fn is_cbz(&self, id: MimeId) -> bool {
        self.flags(id).is_cbz
    }

    pub fn is_json(&self, id: MimeId) -> bool {
        self.flags(id).is_json
    }

    pub fn is_ndjson(&self, id: MimeId) -> bool {
        self.flags(id).is_ndjson
    }
}

/// Closed-form magic-byte sniffer over the first bytes of a file, used when the extension
/// table misses. Returns one of this table's own mime strings, never an arbitrary one, so a
/// sniff hit always round-trips through [`MimeTable::by_string`].
pub fn sniff_bytes(buf: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"RIFF", "image/webp"),
        (b"PK\x03\x04", "application/zip"),
        (b"PK\x05\x06", "application/zip"),
        (b"Rar!\x1a\x07", "application/x-rar-compressed"),
        (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
        (b"\x1f\x8b", "application/gzip"),
        (b"{\\rtf1", "text/plain"),
        (b"OggS", "audio/ogg"),
        (b"fLaC", "audio/flac"),
    ];
    SIGNATURES
        .iter()
        .find(|(sig, _)| buf.starts_with(sig))
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mime_does_not_parse() {
        let table = MimeTable::global();
        assert!(!table.should_parse(MIME_EMPTY));
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let table = MimeTable::global();
        let lower = table.by_extension("jpg").unwrap();
        let upper = table.by_extension("JPG").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(table.major(lower), MimeCategory::Image);
    }

    #[test]
    fn pdf_flag_is_set_and_category_is_book() {
        let table = MimeTable::global();
        let id = table.by_extension("pdf").unwrap();
        assert!(table.is_pdf(id));
        assert_eq!(table.major(id) as u32, MimeCategory::Book as u32);
    }

    #[test]
    fn sidecar_is_reserved() {
        let table = MimeTable::global();
        assert_eq!(table.major(MIME_SIST2_SIDECAR) as u32, MimeCategory::Sidecar as u32);
    }

    #[test]
    fn archive_and_archive_filter_are_distinct() {
        let table = MimeTable::global();
        let zip = table.by_extension("zip").unwrap();
        let gz = table.by_extension("gz").unwrap();
        assert!(table.is_archive(zip));
        assert!(!table.is_archive_filter(zip));
        assert!(table.is_archive_filter(gz));
        assert!(!table.is_archive(gz));
    }

    #[test]
    fn sniff_recognizes_pdf_magic_bytes() {
        let mime = sniff_bytes(b"%PDF-1.4\nrest of file").unwrap();
        assert_eq!(mime, "application/pdf");
        let table = MimeTable::global();
        let id = table.by_string(mime).unwrap();
        assert!(table.is_pdf(id));
    }

    #[test]
    fn sniff_returns_none_for_unrecognized_bytes() {
        assert_eq!(sniff_bytes(b"just some text"), None);
    }
}
