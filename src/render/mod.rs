//! Report rendering.
//!
//! [`FileRenderer`] is the seam the render pool works against: one call per
//! finalized module. [`HtmlRenderer`] is the implementation used for real
//! reports; it also renders the index page, which is written once on the
//! calling thread.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::aggregate::{ModuleSummary, Report};
use crate::{consts, source, Result};

mod assets;
mod html;

pub use assets::{write_static_assets, STATIC_ASSETS};
pub use html::progress_class;

/// One per-file render request.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub summary: Arc<ModuleSummary>,
    /// Where the page is written.
    pub output: PathBuf,
    /// Package prefix stripped from the module identifier to find the source.
    pub package: Arc<str>,
}

/// Produces the page for one module.
pub trait FileRenderer: Send + Sync {
    fn render_file(&self, job: &RenderJob) -> Result<()>;
}

/// Renders annotated HTML pages for modules and the report index.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    source_root: PathBuf,
    created_at: String,
}

impl HtmlRenderer {
    /// Creates a renderer reading sources under `source_root` and stamping
    /// every page with `created_at`.
    pub fn new<Tz>(source_root: impl Into<PathBuf>, created_at: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            source_root: source_root.into(),
            created_at: created_at.format(consts::TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// The formatted creation timestamp shown on every page.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Writes `index.html` into `output_dir` and returns its path.
    pub fn render_index(&self, report: &Report, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(consts::INDEX_FILE);
        fs::write(&path, html::index_page(report, &self.created_at))?;
        debug!(path = %path.display(), modules = report.modules.len(), "wrote index");
        Ok(path)
    }
}

impl FileRenderer for HtmlRenderer {
    fn render_file(&self, job: &RenderJob) -> Result<()> {
        let path =
            source::resolve_source_path(&self.source_root, &job.summary.display_file, &job.package);
        let lines = source::read_lines(&path)?;
        let page = html::file_page(&job.summary, &lines, &self.created_at);
        fs::write(&job.output, page)?;
        debug!(
            module = %job.summary.display_file,
            output = %job.output.display(),
            lines = lines.len(),
            "wrote file page"
        );
        Ok(())
    }
}
