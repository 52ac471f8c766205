use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::chunker::{Chunk, Chunker};
use crate::db::{self, ChunkRow};
use crate::error::LoadError;
use crate::lexicon::Lexicon;
use crate::loader::{self, Document};
use crate::manifest;
use crate::metrics::{self, RunTracker};
use crate::rater::{rate_or_none, ChunkRater};
use crate::scoring::LexiconScorer;
use crate::section::SectionExtractor;
use crate::settings::Settings;
use crate::text::NormalizedText;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Document-scope lexicon score of the chunk text (0..=100 by default).
    pub lexicon_score: f64,
}

/// What happened to one document. Only `Extracted` carries chunks; every
/// other variant ends up in the failure manifest.
#[derive(Debug)]
pub enum DocumentOutcome {
    Extracted {
        doc: Document,
        section_chars: usize,
        chunks: Vec<ScoredChunk>,
        score: f64,
    },
    LoadFailed {
        doc: Document,
        error: LoadError,
    },
    ExtractionMiss {
        doc: Document,
    },
    ChunkingEmpty {
        doc: Document,
    },
}

impl DocumentOutcome {
    pub fn document(&self) -> &Document {
        match self {
            DocumentOutcome::Extracted { doc, .. }
            | DocumentOutcome::LoadFailed { doc, .. }
            | DocumentOutcome::ExtractionMiss { doc }
            | DocumentOutcome::ChunkingEmpty { doc } => doc,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            DocumentOutcome::Extracted { .. } => "extracted",
            DocumentOutcome::LoadFailed { .. } => "load_error",
            DocumentOutcome::ExtractionMiss { .. } => "no_section",
            DocumentOutcome::ChunkingEmpty { .. } => "no_chunks",
        }
    }

    pub fn error(&self) -> Option<String> {
        match self {
            DocumentOutcome::LoadFailed { error, .. } => Some(error.to_string()),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, DocumentOutcome::Extracted { .. })
    }
}

/// Stateless per-document stages. Shared read-only across workers.
pub struct Pipeline<'a> {
    extractor: SectionExtractor,
    chunker: Chunker,
    scorer: LexiconScorer<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(extractor: SectionExtractor, chunker: Chunker, scorer: LexiconScorer<'a>) -> Self {
        Pipeline {
            extractor,
            chunker,
            scorer,
        }
    }

    pub fn from_settings(settings: &Settings, lexicon: &'a Lexicon) -> Self {
        Pipeline::new(
            SectionExtractor::new(settings.section.min_chars),
            Chunker::new(settings.chunking.max_sentences, settings.chunking.max_chars),
            LexiconScorer::new(lexicon, settings.scoring_policy()),
        )
    }

    pub fn process(&self, doc: &Document) -> DocumentOutcome {
        match loader::load(doc) {
            Ok(text) => self.process_text(doc, &text),
            Err(error) => DocumentOutcome::LoadFailed {
                doc: doc.clone(),
                error,
            },
        }
    }

    /// Section, chunk and score already-loaded text.
    pub fn process_text(&self, doc: &Document, text: &NormalizedText) -> DocumentOutcome {
        let Some(section) = self.extractor.extract(text) else {
            return DocumentOutcome::ExtractionMiss { doc: doc.clone() };
        };
        let section_text = section.slice(text.as_str());

        let chunks: Vec<ScoredChunk> = self
            .chunker
            .chunk(section_text)
            .into_iter()
            .map(|chunk| ScoredChunk {
                lexicon_score: self.scorer.score_document(&chunk.text).score,
                chunk,
            })
            .collect();
        if chunks.is_empty() {
            return DocumentOutcome::ChunkingEmpty { doc: doc.clone() };
        }
        debug!(
            file = %doc.id,
            section_chars = section.chars,
            chunks = chunks.len(),
            sentences = chunks.iter().map(|c| c.chunk.sentences).sum::<usize>(),
            "section chunked"
        );

        DocumentOutcome::Extracted {
            doc: doc.clone(),
            section_chars: section.chars,
            score: self.scorer.score_document(section_text).score,
            chunks,
        }
    }
}

#[cfg(feature = "rayon")]
struct Executor(rayon::ThreadPool);

#[cfg(feature = "rayon")]
impl Executor {
    fn new(workers: usize) -> Result<Self> {
        Ok(Executor(
            rayon::ThreadPoolBuilder::new().num_threads(workers).build()?,
        ))
    }

    fn run(&self, pipeline: &Pipeline, docs: &[Document]) -> Vec<DocumentOutcome> {
        self.0
            .install(|| docs.par_iter().map(|d| pipeline.process(d)).collect())
    }
}

#[cfg(not(feature = "rayon"))]
struct Executor;

#[cfg(not(feature = "rayon"))]
impl Executor {
    fn new(_workers: usize) -> Result<Self> {
        Ok(Executor)
    }

    fn run(&self, pipeline: &Pipeline, docs: &[Document]) -> Vec<DocumentOutcome> {
        docs.iter().map(|d| pipeline.process(d)).collect()
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Process `docs` in slices of `batch_size` on `workers` threads. Results
/// are written by the calling thread only. Returns the ids of failed
/// documents in input order.
pub fn run_batch(
    conn: &Connection,
    pipeline: &Pipeline,
    docs: &[Document],
    workers: usize,
    batch_size: usize,
    tracker: &mut RunTracker,
) -> Result<Vec<String>> {
    let executor = Executor::new(workers)?;
    let pb = progress_bar(docs.len());
    let mut failures = Vec::new();

    for slice in docs.chunks(batch_size.max(1)) {
        let outcomes = executor.run(pipeline, slice);

        let tx = conn.unchecked_transaction()?;
        for outcome in &outcomes {
            tracker.record(outcome);
            match outcome {
                DocumentOutcome::LoadFailed { doc, error } => {
                    warn!(file = %doc.id, "{}", error);
                }
                DocumentOutcome::ExtractionMiss { doc } => {
                    warn!(file = %doc.id, "no Item 1 section found");
                }
                DocumentOutcome::ChunkingEmpty { doc } => {
                    warn!(file = %doc.id, "section produced no chunks");
                }
                DocumentOutcome::Extracted { .. } => {}
            }
            if outcome.is_failure() {
                failures.push(outcome.document().id.clone());
            }
            db::save_outcome(&tx, outcome)?;
        }
        tx.commit()?;
        pb.inc(slice.len() as u64);
    }

    pb.finish_and_clear();
    info!(
        run = tracker.run_id(),
        extracted = tracker.extracted,
        failed = failures.len(),
        "batch complete"
    );
    Ok(failures)
}

/// One `extract` run over `docs`: score into the dataset, record the run and
/// overwrite the failure manifest. With no documents nothing is opened, but
/// the manifest is still emptied so `failures` never reports a stale list.
pub fn run_extract(settings: &Settings, lexicon: &Lexicon, docs: &[Document]) -> Result<Option<RunTracker>> {
    let manifest_path = settings.manifest_path();
    if docs.is_empty() {
        manifest::write_manifest(&manifest_path, &[])?;
        return Ok(None);
    }

    let conn = db::connect(&settings.database_path())?;
    db::init_schema(&conn)?;
    let pipeline = Pipeline::from_settings(settings, lexicon);
    let mut tracker = RunTracker::new(metrics::new_run_id());
    let failures = run_batch(
        &conn,
        &pipeline,
        docs,
        settings.workers,
        settings.batch_size,
        &mut tracker,
    )?;

    manifest::write_manifest(&manifest_path, &failures)?;
    tracker.persist(&conn)?;
    Ok(Some(tracker))
}

#[derive(Debug, Default, PartialEq)]
pub struct RateSummary {
    pub attempted: usize,
    pub rated: usize,
    pub unavailable: usize,
}

/// Ask `rater` for each chunk and store the result; failures are stored as
/// null scores and never abort the run.
pub fn rate_chunks(conn: &Connection, rater: &dyn ChunkRater, rows: &[ChunkRow]) -> Result<RateSummary> {
    let pb = progress_bar(rows.len());
    let mut summary = RateSummary::default();

    for row in rows {
        let score = rate_or_none(rater, &row.text);
        debug!(
            file = %row.doc_id,
            chunk = row.chunk_index,
            lexicon = row.lexicon_score,
            previous = ?row.llm_score,
            llm = ?score,
            "rated"
        );
        db::set_llm_score(conn, &row.doc_id, row.chunk_index, score)?;
        summary.attempted += 1;
        match score {
            Some(_) => summary.rated += 1,
            None => summary.unavailable += 1,
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(summary)
}
