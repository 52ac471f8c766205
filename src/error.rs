use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a source document into normalized text.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed for {}: {reason}", path.display())]
    Pdf { path: PathBuf, reason: String },
    #[error("unsupported document format: {}", .0.display())]
    Unsupported(PathBuf),
}

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("cannot read lexicon {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lexicon has no terms")]
    Empty,
    #[error("lexicon contains a blank term")]
    EmptyTerm,
    #[error("term {term:?} has more than {max} tokens")]
    TermTooLong { term: String, max: usize },
}

/// Failure talking to the external chunk rater. Never fatal to a run;
/// the driver records a null score instead.
#[derive(Debug, Error)]
pub enum RaterError {
    #[error("no API key configured (set FILING_RATER__API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rater returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("response is not a score in [0, 1]: {0:?}")]
    Unparseable(String),
}

impl RaterError {
    /// 429 and 5xx are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            RaterError::Http(e) => e.is_timeout() || e.is_connect(),
            RaterError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let limited = RaterError::Status {
            status: 429,
            body: String::new(),
        };
        let server = RaterError::Status {
            status: 503,
            body: String::new(),
        };
        let bad_request = RaterError::Status {
            status: 400,
            body: "bad".into(),
        };
        assert!(limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!RaterError::Unparseable("n/a".into()).is_retryable());
        assert!(!RaterError::MissingApiKey.is_retryable());
    }

    #[test]
    fn load_error_names_the_file() {
        let err = LoadError::Pdf {
            path: PathBuf::from("filings/acme.pdf"),
            reason: "bad xref".into(),
        };
        assert!(err.to_string().contains("acme.pdf"));
    }
}
