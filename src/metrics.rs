use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db;
use crate::pipeline::DocumentOutcome;

/// Per-run counters, printed at the end of `extract` and kept in `runs`.
pub struct RunTracker {
    run_id: String,
    started_at: DateTime<Utc>,
    pub files_scanned: usize,
    pub extracted: usize,
    pub load_errors: usize,
    pub no_section: usize,
    pub no_chunks: usize,
    pub chunks: usize,
}

impl RunTracker {
    pub fn new(run_id: String) -> Self {
        RunTracker {
            run_id,
            started_at: Utc::now(),
            files_scanned: 0,
            extracted: 0,
            load_errors: 0,
            no_section: 0,
            no_chunks: 0,
            chunks: 0,
        }
    }

    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.files_scanned += 1;
        match outcome {
            DocumentOutcome::Extracted { chunks, .. } => {
                self.extracted += 1;
                self.chunks += chunks.len();
            }
            DocumentOutcome::LoadFailed { .. } => self.load_errors += 1,
            DocumentOutcome::ExtractionMiss { .. } => self.no_section += 1,
            DocumentOutcome::ChunkingEmpty { .. } => self.no_chunks += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.load_errors + self.no_section + self.no_chunks
    }

    pub fn persist(&self, conn: &Connection) -> Result<()> {
        let started_at = self.started_at.to_rfc3339();
        db::insert_run(
            conn,
            &db::RunRow {
                run_id: &self.run_id,
                files_scanned: self.files_scanned,
                extracted: self.extracted,
                failed: self.failed(),
                chunks: self.chunks,
                started_at: &started_at,
            },
        )
    }

    pub fn print(&self) {
        println!(
            "Files scanned: {} | Item 1 found: {}",
            self.files_scanned, self.extracted
        );
        println!(
            "  chunks: {} | load errors: {} | no section: {} | no chunks: {}",
            self.chunks, self.load_errors, self.no_section, self.no_chunks
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}
