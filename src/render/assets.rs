use std::fs;
use std::path::Path;

use tracing::debug;

use crate::Result;

pub(crate) const STYLE_FILE: &str = "style.css";
pub(crate) const SCRIPT_FILE: &str = "coverage_html.js";

const STYLE_CSS: &str = include_str!("assets/style.css");
const COVERAGE_JS: &str = include_str!("assets/coverage_html.js");

/// Files written once per report, next to `index.html`.
pub const STATIC_ASSETS: [(&str, &str); 3] = [
    (STYLE_FILE, STYLE_CSS),
    (SCRIPT_FILE, COVERAGE_JS),
    // keeps generated reports out of version control
    (".gitignore", "*\n"),
];

/// Writes the stylesheet, script and `.gitignore` into `output_dir`.
pub fn write_static_assets(output_dir: &Path) -> Result<()> {
    for (name, content) in STATIC_ASSETS {
        fs::write(output_dir.join(name), content)?;
    }
    debug!(dir = %output_dir.display(), files = STATIC_ASSETS.len(), "wrote static assets");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_static_assets() {
        let dir = tempfile::tempdir().unwrap();
        write_static_assets(dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "*\n"
        );
        assert!(fs::read_to_string(dir.path().join(STYLE_FILE))
            .unwrap()
            .contains(".show_mis"));
        assert!(fs::read_to_string(dir.path().join(SCRIPT_FILE))
            .unwrap()
            .contains("toggle-missed"));
    }
}
