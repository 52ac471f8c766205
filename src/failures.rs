use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::source::{self, FileIndex};

/// Minimum normalized Levenshtein similarity for a fallback filename match.
pub const FUZZY_CUTOFF: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    Exact(PathBuf),
    Fuzzy { matched: String, path: PathBuf },
    Missing,
}

impl Located {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Located::Exact(path) | Located::Fuzzy { path, .. } => Some(path.as_path()),
            Located::Missing => None,
        }
    }
}

#[derive(Debug)]
pub struct FailedFiling {
    pub entry: String,
    pub located: Located,
    pub company: Option<String>,
    pub copied: Option<PathBuf>,
}

/// Map manifest entries back to files under `root`, read their conformed
/// company names and, with `copy_to`, copy each located file there.
pub fn review(root: &Path, entries: &[String], copy_to: Option<&Path>) -> Result<Vec<FailedFiling>> {
    let index = FileIndex::build(root);
    debug!(files = index.len(), "indexed input dir");
    if let Some(dir) = copy_to {
        fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;
    }

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let located = locate(root, &index, entry);
        let company = located.path().and_then(source::conformed_name);
        let copied = match (copy_to, located.path()) {
            (Some(dir), Some(path)) => {
                let dest = dir.join(copy_name(entry));
                fs::copy(path, &dest).with_context(|| format!("copying {:?} to {:?}", path, dest))?;
                Some(dest)
            }
            _ => None,
        };
        out.push(FailedFiling {
            entry: entry.clone(),
            located,
            company,
            copied,
        });
    }
    Ok(out)
}

fn locate(root: &Path, index: &FileIndex, entry: &str) -> Located {
    let direct = root.join(entry);
    if direct.is_file() {
        return Located::Exact(direct);
    }
    let basename = entry.rsplit('/').next().unwrap_or(entry);
    if let Some(path) = index.exact(basename) {
        return Located::Exact(path.to_path_buf());
    }
    match index.closest(basename, FUZZY_CUTOFF) {
        Some((matched, path)) => Located::Fuzzy {
            matched: matched.to_string(),
            path: path.to_path_buf(),
        },
        None => Located::Missing,
    }
}

/// Flat name inside the copy folder; folder separators become `__` so two
/// `10k.txt` from different companies do not collide.
fn copy_name(entry: &str) -> String {
    entry.replace('/', "__")
}
