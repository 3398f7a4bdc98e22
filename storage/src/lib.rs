//! Result sinks for benchmark artifacts
//!
//! This crate provides the filesystem implementation of the `ResultSink`
//! trait. A run writes into one timestamped directory:
//!
//! ```text
//! <results root>/<UTC YYYYMMDD-HHMMSS>/
//!     manifest.json
//!     <server>/rollup.json
//!     <server>/records-<class>-c<capacity>.ndjson
//! ```
//!
//! Every file is written to `<name>.tmp`, synced, then renamed into place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod local;

pub use local::{LocalResultSink, MANIFEST_FILE, ROLLUP_FILE};
