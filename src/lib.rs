//! # coverprofile
//!
//! A Rust library for parsing Go coverage profiles (the text files written by
//! `go test -coverprofile`) and turning them into a browsable HTML report.
//!
//! The library is split into a few stages:
//!
//! - [`profile`]: parses the `mode:` header and every coverage record.
//! - [`aggregate`]: folds the contiguous records of each source file into a
//!   [`ModuleSummary`] and pools the totals into a [`Report`].
//! - [`ranges`]: merged line ranges used to classify source lines.
//! - [`pool`]: a fixed-size worker pool that renders per-file pages.
//! - [`render`]: the HTML renderer and static assets.
//! - [`report`]: ties the stages together behind [`generate`].
//!
//! ## Example Usage
//!
//! ```no_run
//! use coverprofile::ReportConfig;
//!
//! // Parse and aggregate only
//! let profile = coverprofile::from_file("coverage.out").unwrap();
//! let report = coverprofile::aggregate(&profile).unwrap();
//! println!("{}: {}%", report.mode, report.totals.percentage);
//!
//! // Full HTML report
//! let config = ReportConfig::builder()
//!     .output_dir("htmlcov")
//!     .jobs(8)
//!     .build()
//!     .unwrap();
//! let outcome = coverprofile::generate("coverage.out", &config).unwrap();
//! assert!(outcome.is_clean());
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub mod aggregate;
pub mod gomod;
pub mod pool;
pub mod profile;
pub mod ranges;
pub mod render;
pub mod report;
pub mod source;

pub use aggregate::{
    aggregate, aggregate_with, flatten_filename, format_percentage, percentage, Aggregator,
    ModuleSummary, Report, StatementCounts,
};
pub use pool::{PoolReport, RenderFailure, RenderPool};
pub use profile::{parse_header, parse_record, CoverageBlock, Profile};
pub use ranges::{LineKind, LineRange, RangeIndex};
pub use render::{FileRenderer, HtmlRenderer, RenderJob};
pub use report::{generate, write_report, Outcome, ReportConfig, ReportConfigBuilder};

/// A specialized `Result` type for coverprofile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents errors that can occur while reading a profile or writing a report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The first line of the profile is not a `mode: <name>` header.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    /// A coverage record does not match the profile grammar.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    /// Records of one module are split by records of another module.
    #[error("Records for module '{0}' are not contiguous")]
    NonContiguousModule(String),
    /// The `go.mod` file is missing or has no module directive.
    #[error("go.mod error: {0}")]
    GoMod(String),
    /// A source file could not be read for annotation.
    #[error("Cannot read source {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The report configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The render pool no longer accepts work.
    #[error("Render pool is closed")]
    PoolClosed,
    /// A renderer panicked while producing a page.
    #[error("Render worker panicked: {0}")]
    WorkerPanic(String),
}

impl Error {
    /// Prefixes a record error with the 1-based profile line it came from.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            Error::MalformedRecord(msg) => Error::MalformedRecord(format!("line {line}: {msg}")),
            other => other,
        }
    }
}

/// Constants used throughout the library.
pub mod consts {
    pub const HEADER_PREFIX: &str = "mode: ";
    pub const UNREACHED_FLAG: &str = "0";
    pub const GO_MOD_FILE: &str = "go.mod";
    pub const INDEX_FILE: &str = "index.html";
    pub const HTML_EXTENSION: &str = ".html";
    pub const DEFAULT_OUTPUT_DIR: &str = "htmlcov";
    pub const DEFAULT_JOBS: usize = 4;
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M %:z";
}

/// Parses a coverage profile from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Profile> {
    from_reader(File::open(path)?)
}

/// Parses a coverage profile from any reader.
///
/// The whole profile is read and validated before it is returned, so a
/// malformed record anywhere in the input fails the call.
pub fn from_reader<R: Read>(reader: R) -> Result<Profile> {
    profile::read_profile(reader)
}
