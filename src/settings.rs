use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::scoring::ScoringPolicy;

const DEFAULT_CONFIG_FILE: &str = "filing_scorer";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub failure_manifest: Option<PathBuf>,
    /// 0 = one worker per CPU.
    pub workers: usize,
    pub batch_size: usize,
    pub chunking: ChunkingSettings,
    pub section: SectionSettings,
    pub scoring: ScoringSettings,
    pub rater: RaterSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingSettings {
    pub max_sentences: usize,
    pub max_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionSettings {
    pub min_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    pub sentence_scale: f64,
    pub document_rescale: f64,
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RaterSettings {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Settings {
    /// Defaults, then `filing_scorer.toml` (or `explicit`), then `FILING_*`
    /// environment variables with `__` between nested keys.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("input_dir", "filings")?
            .set_default("output_dir", "output")?
            .set_default("workers", 0)?
            .set_default("batch_size", 500)?
            .set_default("chunking.max_sentences", 5)?
            .set_default("chunking.max_chars", 2000)?
            .set_default("section.min_chars", 200)?
            .set_default("scoring.sentence_scale", 50.0)?
            .set_default("scoring.document_rescale", 2.0)?
            .set_default("rater.endpoint", DEFAULT_ENDPOINT)?
            .set_default("rater.model", "gpt-4o-mini")?
            .set_default("rater.max_retries", 3)?
            .set_default("rater.backoff_ms", 2000)?
            .set_default("rater.timeout_secs", 30)?
            .set_default("rater.max_tokens", 5)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("FILING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("loading configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunking.max_sentences >= 1, "chunking.max_sentences must be at least 1");
        ensure!(self.chunking.max_chars >= 1, "chunking.max_chars must be at least 1");
        ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        ensure!(
            self.scoring.sentence_scale > 0.0 && self.scoring.sentence_scale.is_finite(),
            "scoring.sentence_scale must be a positive number"
        );
        ensure!(
            self.scoring.document_rescale > 0.0 && self.scoring.document_rescale.is_finite(),
            "scoring.document_rescale must be a positive number"
        );
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.output_dir.join("dataset.sqlite"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.failure_manifest
            .clone()
            .unwrap_or_else(|| self.output_dir.join("failed_item1.txt"))
    }

    /// Where `failures` copies the filings it could locate.
    pub fn failed_copy_dir(&self) -> PathBuf {
        self.output_dir.join("failed_filings")
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            sentence_scale: self.scoring.sentence_scale,
            document_rescale: self.scoring.document_rescale,
        }
    }
}
