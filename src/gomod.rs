//! Module path lookup from `go.mod`.

use std::fs;
use std::path::Path;

use crate::{consts, Error, Result};

/// Reads the module path declared by the `go.mod` in `dir`.
pub fn read_module_path<P: AsRef<Path>>(dir: P) -> Result<String> {
    let path = dir.as_ref().join(consts::GO_MOD_FILE);
    let content = fs::read_to_string(&path)
        .map_err(|e| Error::GoMod(format!("cannot read {}: {e}", path.display())))?;
    parse_module_path(&content)
        .ok_or_else(|| Error::GoMod(format!("no module directive in {}", path.display())))
}

/// Extracts the path from the `module` directive of a `go.mod` file.
pub fn parse_module_path(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or_default().trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with([' ', '\t', '"', '`']) {
            return None;
        }
        let path = rest.trim().trim_matches(['"', '`']);
        (!path.is_empty()).then(|| path.to_string())
    })
}
