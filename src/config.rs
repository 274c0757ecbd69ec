//! Tuning constants and fixed thresholds used across the scan pipeline.

/// Bytes buffered for content sniffing and for `VirtualFile::read_rewindable`.
pub const MAGIC_BUF_SIZE: usize = 4096;

/// Minimum size for a video file to be routed to the media parser.
pub const MIN_VIDEO_SIZE: u64 = 1024 * 64;
/// Minimum size for an image file to be routed to the media parser.
pub const MIN_IMAGE_SIZE: u64 = 512;

/// Bound on the walk → parse-job channel and the parse-job → writer channel.
/// Small relative to the teacher's disk-probed defaults: this core has no
/// disk-type detection, so a single conservative default covers SSD/HDD/network alike.
pub const JOB_CHANNEL_CAP: usize = 65_536;

/// Bound on the writer pool's submit queue.
pub const WRITER_CHANNEL_CAP: usize = 8_192;

/// Size hint (bytes) passed to `Store::create` for the thumbnail store.
pub const THUMBS_STORE_SIZE_HINT: u64 = 64 * 1024 * 1024;
/// Size hint for the per-document metadata sidecar store.
pub const META_STORE_SIZE_HINT: u64 = 16 * 1024 * 1024;
/// Size hint for the tags store.
pub const TAGS_STORE_SIZE_HINT: u64 = 4 * 1024 * 1024;

/// Name of the descriptor file inside an index directory.
pub const DESCRIPTOR_FILENAME: &str = "descriptor.json";
/// Fixed `descriptor.type` value; this design supports no other encoding.
pub const DESCRIPTOR_TYPE: &str = "ndjson";

/// Prefix shared by every document shard file.
pub const SHARD_PREFIX: &str = "_index_";
/// Extension applied to every NDJSON shard (zstd-compressed, newline-delimited JSON).
pub const SHARD_EXTENSION: &str = "ndjson.zst";
/// Name of the carried-forward shard written by the incremental-copy phase.
pub const CARRIED_FORWARD_SHARD: &str = "_index_original.ndjson.zst";

/// zstd compression level used for document shards.
pub const SHARD_ZSTD_LEVEL: i32 = 9;

/// Default thumbnail quality (JPEG-like quality factor), matching the CLI default.
pub const DEFAULT_QUALITY: f32 = 3.0;
/// Default thumbnail size (px), matching the CLI default.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 500;
/// Default content-size cutoff (bytes) for text/ooxml extraction, matching the CLI default.
pub const DEFAULT_CONTENT_SIZE: usize = 32_768;
/// Default treemap threshold, matching the CLI default (stats generation is out of scope; kept
/// only so `ScanArgs` round-trips every documented flag).
pub const DEFAULT_TREEMAP_THRESHOLD: f64 = 0.0005;
/// Default in-memory buffer budget for media parsing, in MiB, matching the CLI default.
pub const DEFAULT_MEM_BUFFER_MIB: u64 = 2000;

/// Default output directory name when `--output` is not given.
pub const DEFAULT_OUTPUT_DIR: &str = "index.sist2";
