//! Source file lookup for annotated pages.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Maps a module identifier to a file under `source_root`.
///
/// The package prefix is stripped when present, along with the leading `/`
/// that follows it, so `example.com/app/pkg/a.go` with package
/// `example.com/app` resolves to `<source_root>/pkg/a.go`. Identifiers
/// outside the package (including `example.com/application/...`) are
/// joined as they are.
pub fn resolve_source_path(source_root: &Path, module: &str, package: &str) -> PathBuf {
    let relative = module
        .strip_prefix(package)
        .filter(|rest| !package.is_empty() && rest.starts_with('/'))
        .unwrap_or(module);
    source_root.join(relative.trim_start_matches('/'))
}

/// Reads a source file as lines. Invalid UTF-8 is replaced rather than
/// rejected.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|source| Error::Source {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_owned)
        .collect())
}
