//! filedex: directory scanner and content-addressed indexer core.
//!
//! Walks a tree (or a caller-supplied path list), classifies each file by MIME type, dispatches
//! it to a type-specific extractor, and emits a compressed NDJSON document stream plus a
//! content-addressed blob store. Supports incremental re-scans that reuse artifacts from a
//! prior index when a file's modification time is unchanged.

pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod descriptor;
pub mod dispatch;
pub mod incremental;
pub mod logging;
pub mod mime;
pub mod pool;
pub mod serialize;
pub mod store;
pub mod types;
pub mod vfile;
pub mod walk;

pub use coordinator::{ScanSummary, run};
