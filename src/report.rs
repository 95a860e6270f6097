//! End-to-end report generation.
//!
//! The profile is parsed and validated in full before anything is written,
//! so a malformed profile never leaves a partial report behind. Rendering
//! then overlaps with aggregation: each module is dispatched to the render
//! pool as soon as its group is finalized.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::aggregate::{aggregate_with, Report};
use crate::pool::{PoolReport, RenderPool};
use crate::profile::Profile;
use crate::render::{write_static_assets, FileRenderer, HtmlRenderer, RenderJob};
use crate::{consts, gomod, Error, Result};

/// Settings for [`generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Number of render workers.
    pub jobs: usize,
    /// Package prefix of module identifiers. Read from `go.mod` when unset.
    pub package: Option<String>,
    /// Directory sources are resolved against. Defaults to the directory
    /// holding the profile.
    pub source_root: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(consts::DEFAULT_OUTPUT_DIR),
            jobs: consts::DEFAULT_JOBS,
            package: None,
            source_root: None,
        }
    }
}

impl ReportConfig {
    /// Creates a new `ReportConfigBuilder` starting from the defaults.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Checks that the settings can produce a report.
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(Error::InvalidConfig("jobs must be at least 1".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "output directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A builder for creating `ReportConfig` instances.
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs;
        self
    }

    /// Overrides the package prefix instead of reading `go.mod`.
    pub fn package(mut self, package: &str) -> Self {
        self.config.package = Some(package.to_string());
        self
    }

    pub fn source_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.source_root = Some(root.into());
        self
    }

    /// Consumes the builder and returns the final `ReportConfig`.
    ///
    /// # Errors
    /// Returns an `InvalidConfig` error if the settings are unusable.
    pub fn build(self) -> Result<ReportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// What a report run produced.
#[derive(Debug)]
pub struct Outcome {
    pub report: Report,
    pub pool: PoolReport,
    /// Path of the written `index.html`.
    pub index: PathBuf,
}

impl Outcome {
    /// True when every per-file page was written.
    pub fn is_clean(&self) -> bool {
        self.pool.is_clean()
    }
}

/// Parses the profile at `profile_path` and writes an HTML report.
///
/// Per-file render failures do not fail the call; they are listed in
/// [`Outcome::pool`].
pub fn generate<P: AsRef<Path>>(profile_path: P, config: &ReportConfig) -> Result<Outcome> {
    config.validate()?;
    let profile_path = profile_path.as_ref();
    let profile = crate::from_file(profile_path)?;
    info!(
        profile = %profile_path.display(),
        mode = %profile.mode,
        blocks = profile.blocks.len(),
        "read coverage profile"
    );

    let base = profile_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let package = match &config.package {
        Some(package) => package.clone(),
        None => gomod::read_module_path(base)?,
    };
    let source_root = config
        .source_root
        .clone()
        .unwrap_or_else(|| base.to_path_buf());
    info!(package = %package, source_root = %source_root.display(), "resolved sources");

    let renderer = HtmlRenderer::new(source_root, Local::now());
    write_report(&profile, &package, config, renderer)
}

/// Writes the report for an already parsed profile.
pub fn write_report(
    profile: &Profile,
    package: &str,
    config: &ReportConfig,
    renderer: HtmlRenderer,
) -> Result<Outcome> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    let renderer = Arc::new(renderer);
    let file_renderer: Arc<dyn FileRenderer> = renderer.clone();
    let mut pool = RenderPool::spawn(config.jobs, file_renderer)?;

    let package: Arc<str> = Arc::from(package);
    let output_dir = config.output_dir.as_path();
    let aggregated = aggregate_with(profile, |summary| {
        pool.dispatch(RenderJob {
            summary: Arc::clone(summary),
            output: output_dir.join(&summary.html_link),
            package: Arc::clone(&package),
        })
    });
    let report = match aggregated {
        Ok(report) => report,
        Err(e) => return Err(abort(pool, e)),
    };

    let index = match renderer.render_index(&report, output_dir) {
        Ok(index) => index,
        Err(e) => return Err(abort(pool, e)),
    };
    if let Err(e) = write_static_assets(output_dir) {
        return Err(abort(pool, e));
    }

    let pool = pool.join();
    for failure in &pool.failures {
        warn!(
            module = %failure.module,
            error = %failure.error,
            "page not written"
        );
    }
    info!(
        index = %index.display(),
        modules = report.modules.len(),
        percentage = report.totals.percentage,
        failed = pool.failures.len(),
        "report written"
    );

    Ok(Outcome {
        report,
        pool,
        index,
    })
}

/// Stops the pool after a fatal error and passes the error through.
fn abort(pool: RenderPool, error: Error) -> Error {
    pool.cancel();
    let drained = pool.join();
    warn!(
        dispatched = drained.dispatched,
        rendered = drained.rendered,
        error = %error,
        "report aborted"
    );
    error
}
