use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Overwrite the failure manifest with one filename per line.
pub fn write_manifest(path: &Path, filenames: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let mut body = filenames.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("writing manifest {:?}", path))
}

pub fn read_manifest(path: &Path) -> Result<Vec<String>> {
    let body = fs::read_to_string(path).with_context(|| format!("reading manifest {:?}", path))?;
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}
