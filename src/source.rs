use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use regex::Regex;
use tracing::debug;

use crate::loader::{decode_lossy, Document, DocumentFormat};

static CONFORMED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)COMPANY CONFORMED NAME:[ \t]*([^\r\n]+)").unwrap());
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());

/// EDGAR headers sit well inside the first few KB.
const HEADER_BYTES: u64 = 5000;

/// Every supported document under `root`, sorted by path. Unknown
/// extensions are skipped without a warning.
pub fn discover(root: &Path) -> Result<Vec<Document>> {
    if !root.is_dir() {
        anyhow::bail!("input directory {:?} does not exist", root);
    }

    let mut docs = Vec::new();
    for entry in WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build()
    {
        let entry = entry.with_context(|| format!("walking {:?}", root))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(mut doc) = Document::under_root(root, entry.path()) else {
            continue;
        };
        if doc.format != DocumentFormat::Pdf {
            doc.company = conformed_name(&doc.path);
        }
        docs.push(doc);
    }

    debug!(root = %root.display(), documents = docs.len(), "discovered");
    Ok(docs)
}

/// `COMPANY CONFORMED NAME` from a filing header, if present and readable.
pub fn conformed_name(path: &Path) -> Option<String> {
    let mut head = Vec::new();
    File::open(path)
        .ok()?
        .take(HEADER_BYTES)
        .read_to_end(&mut head)
        .ok()?;
    conformed_name_in(&decode_lossy(&head))
}

pub fn conformed_name_in(header: &str) -> Option<String> {
    CONFORMED_NAME_RE
        .captures(header)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Lowercase and keep only `[a-z0-9 ]`, for comparing company names.
pub fn normalize_company(name: &str) -> String {
    NON_ALNUM_RE.replace_all(&name.to_lowercase(), "").into_owned()
}

/// Every file under a root, by basename, for locating filings after the
/// fact. Built once per lookup batch.
pub struct FileIndex {
    files: Vec<(String, PathBuf)>,
}

impl FileIndex {
    pub fn build(root: &Path) -> Self {
        let files = WalkBuilder::new(root)
            .standard_filters(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.into_path()))
            .collect();
        FileIndex { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// First file (in path order) with exactly this basename.
    pub fn exact(&self, filename: &str) -> Option<&Path> {
        self.files
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, path)| path.as_path())
    }

    /// Most similar basename scoring at least `cutoff` (0..=1, normalized
    /// Levenshtein). Ties keep the earliest path.
    pub fn closest(&self, filename: &str, cutoff: f64) -> Option<(&str, &Path)> {
        self.files
            .iter()
            .map(|(name, path)| (strsim::normalized_levenshtein(filename, name), name, path))
            .filter(|(score, _, _)| *score >= cutoff)
            .fold(None, |best: Option<(f64, &String, &PathBuf)>, cur| match best {
                Some(b) if b.0 >= cur.0 => Some(b),
                _ => Some(cur),
            })
            .map(|(_, name, path)| (name.as_str(), path.as_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_conformed_name() {
        let header = "ACCESSION NUMBER: 0000034088-24-000018\n\
                      COMPANY DATA:\n\
                      \tCOMPANY CONFORMED NAME:\t\t\tEXXON MOBIL CORP\n\
                      \tCENTRAL INDEX KEY:\t\t\t0000034088\n";
        assert_eq!(conformed_name_in(header).as_deref(), Some("EXXON MOBIL CORP"));
        assert_eq!(conformed_name_in("no header here"), None);
    }

    #[test]
    fn fixture_header() {
        let name = conformed_name(Path::new("tests/fixtures/acme_10k.txt"));
        assert_eq!(name.as_deref(), Some("ACME FINANCIAL HOLDINGS INC"));
        assert_eq!(conformed_name(Path::new("tests/fixtures/missing.txt")), None);
    }

    #[test]
    fn company_normalization() {
        assert_eq!(normalize_company("PepsiCo, Inc."), "pepsico inc");
        assert!(normalize_company("EXXON MOBIL CORP").contains(&normalize_company("Exxon Mobil")));
    }

    #[test]
    fn discovery_skips_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Chevron");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("b.txt"), "COMPANY CONFORMED NAME: CHEVRON CORP\nbody").unwrap();
        fs::write(dir.path().join("a.htm"), "<p>hello</p>").unwrap();
        fs::write(dir.path().join("notes.md"), "skip me").unwrap();
        fs::write(dir.path().join("archive.zip"), [0u8; 4]).unwrap();

        let docs = discover(dir.path()).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        // "Chevron" sorts before "a.htm" byte-wise
        assert_eq!(names, vec!["b.txt", "a.htm"]);
        assert_eq!(docs.len(), 2);
        let chevron = docs.iter().find(|d| d.filename == "b.txt").unwrap();
        assert_eq!(chevron.company.as_deref(), Some("CHEVRON CORP"));
        let html = docs.iter().find(|d| d.filename == "a.htm").unwrap();
        assert_eq!(html.company, None);
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        assert!(discover(Path::new("no/such/dir")).is_err());
    }

    #[test]
    fn index_finds_nested_and_similar_names() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x").join("y");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("0000034088-24-000018.txt"), "t").unwrap();
        fs::write(dir.path().join("notes.md"), "n").unwrap();

        let index = FileIndex::build(dir.path());
        assert_eq!(index.len(), 2);
        let target = nested.join("0000034088-24-000018.txt");
        assert_eq!(index.exact("0000034088-24-000018.txt"), Some(target.as_path()));
        assert_eq!(index.exact("other.txt"), None);

        let (name, path) = index.closest("0000034088-24-00018.txt", 0.6).unwrap();
        assert_eq!(name, "0000034088-24-000018.txt");
        assert_eq!(path, target.as_path());
        assert!(index.closest("annual_report_walmart.pdf", 0.6).is_none());
    }
}
