use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::error::LoadError;
use crate::text::NormalizedText;

/// Elements whose text never belongs to the filing narrative.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "ix:header"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Html,
    Text,
}

impl DocumentFormat {
    /// Format by file extension; `None` for anything the pipeline skips.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "htm" | "html" => Some(DocumentFormat::Html),
            "txt" => Some(DocumentFormat::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Html => "html",
            DocumentFormat::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    /// Unique key in the dataset: the path relative to the input root with
    /// `/` separators, or the bare filename outside a walk.
    pub id: String,
    pub path: PathBuf,
    pub filename: String,
    pub format: DocumentFormat,
    pub company: Option<String>,
}

impl Document {
    pub fn from_path(path: &Path) -> Option<Self> {
        let format = DocumentFormat::from_path(path)?;
        let filename = path.file_name()?.to_string_lossy().into_owned();
        Some(Document {
            id: filename.clone(),
            path: path.to_path_buf(),
            filename,
            format,
            company: None,
        })
    }

    /// Same as `from_path`, with the id taken relative to `root`.
    pub fn under_root(root: &Path, path: &Path) -> Option<Self> {
        let mut doc = Document::from_path(path)?;
        if let Ok(rel) = path.strip_prefix(root) {
            doc.id = relative_id(rel);
        }
        Some(doc)
    }
}

pub fn relative_id(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read a document and reduce it to normalized text.
pub fn load(doc: &Document) -> Result<NormalizedText, LoadError> {
    let raw = match doc.format {
        DocumentFormat::Pdf => pdf_text(&doc.path)?,
        DocumentFormat::Html => html_text(&read_lossy(&doc.path)?),
        DocumentFormat::Text => read_lossy(&doc.path)?,
    };
    let text = NormalizedText::from_raw(&raw);
    debug!(file = %doc.filename, chars = text.char_len(), "loaded");
    Ok(text)
}

/// Load any supported path directly, inferring the format.
pub fn load_path(path: &Path) -> Result<NormalizedText, LoadError> {
    let doc = Document::from_path(path).ok_or_else(|| LoadError::Unsupported(path.to_path_buf()))?;
    load(&doc)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Invalid UTF-8 sequences are dropped rather than failing the document.
fn read_lossy(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    Ok(decode_lossy(&bytes))
}

pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace(char::REPLACEMENT_CHARACTER, "")
}

fn pdf_text(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    if !bytes.starts_with(b"%PDF") {
        return Err(LoadError::Pdf {
            path: path.to_path_buf(),
            reason: "missing %PDF header".to_string(),
        });
    }

    // pdf-extract panics on some malformed cross-reference tables
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    }));

    match extracted {
        Ok(Ok(text)) => Ok(join_pages(&text)),
        Ok(Err(e)) => Err(LoadError::Pdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Err(_) => Err(LoadError::Pdf {
            path: path.to_path_buf(),
            reason: "extractor panicked".to_string(),
        }),
    }
}

/// Pages arrive separated by form feeds, in document order.
fn join_pages(text: &str) -> String {
    text.split('\x0C').collect::<Vec<_>>().join("\n")
}

/// Flatten HTML to text, dropping script/style/hidden metadata blocks.
pub fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    collect_text(document.root_element(), &mut parts);
    parts.join(" ")
}

fn collect_text(element: ElementRef, parts: &mut Vec<String>) {
    let el = element.value();
    if SKIPPED_ELEMENTS.contains(&el.name()) || is_hidden(el) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, parts);
                }
            }
            _ => {}
        }
    }
}

fn is_hidden(el: &Element) -> bool {
    el.attr("style")
        .map(|s| s.replace(' ', "").to_ascii_lowercase().contains("display:none"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionExtractor;
    use std::io::Write;

    #[test]
    fn format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/B.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_path(Path::new("x.htm")), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_path(Path::new("x.html")), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_path(Path::new("x.txt")), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_path(Path::new("x.docx")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn html_drops_scripts_and_hidden_blocks() {
        let html = r#"<html><head><title>10-K</title><style>p { color: red }</style></head>
            <body><div style="display: none"><ix:header>dei:EntityName</ix:header></div>
            <p>ITEM&nbsp;1.</p><p>Business</p><script>var x = 1;</script>
            <noscript>enable js</noscript></body></html>"#;
        let text = NormalizedText::from_raw(&html_text(html));
        assert_eq!(text.as_str(), "10-K ITEM 1. Business");
    }

    #[test]
    fn text_decoding_drops_invalid_bytes() {
        let bytes = b"ITEM 1\xff\xfe. BUSINESS";
        assert_eq!(decode_lossy(bytes), "ITEM 1. BUSINESS");
    }

    #[test]
    fn loads_text_fixture() {
        let doc = Document::from_path(Path::new("tests/fixtures/acme_10k.txt")).unwrap();
        let text = load(&doc).unwrap();
        assert!(text.as_str().starts_with("UNITED STATES SECURITIES AND EXCHANGE COMMISSION"));
        assert!(!text.as_str().contains('\n'));
    }

    #[test]
    fn loads_multi_page_pdf_in_page_order() {
        let doc = Document::from_path(Path::new("tests/fixtures/northwind_10k.pdf")).unwrap();
        assert_eq!(doc.format, DocumentFormat::Pdf);
        let text = load(&doc).unwrap();
        let text_str = text.as_str();
        assert!(!text_str.contains('\x0C'));

        let first = text_str.find("Northwind").unwrap();
        let second = text_str.find("fintech partners").unwrap();
        assert!(first < second);

        let section = SectionExtractor::default().extract_text(&text).unwrap();
        assert!(section.contains("digital wallet"));
        assert!(section.contains("fintech"));
        assert!(!section.contains("Interest rates"));
    }

    #[test]
    fn corrupt_pdf_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"%PDF-1.4\nthis is not really a pdf").unwrap();

        let err = load_path(&path).unwrap_err();
        assert!(matches!(err, LoadError::Pdf { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_path(Path::new("tests/fixtures/does_not_exist.txt")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = load_path(Path::new("notes.docx")).unwrap_err();
        assert!(matches!(err, LoadError::Unsupported(_)));
    }
}
