use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::pipeline::DocumentOutcome;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            doc_id        TEXT PRIMARY KEY,
            filename      TEXT NOT NULL,
            path          TEXT NOT NULL,
            format        TEXT NOT NULL,
            company       TEXT,
            status        TEXT NOT NULL CHECK(status IN ('extracted','load_error','no_section','no_chunks')),
            error         TEXT,
            section_chars INTEGER,
            chunk_count   INTEGER NOT NULL DEFAULT 0,
            lexicon_score REAL,
            processed_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
        CREATE INDEX IF NOT EXISTS idx_documents_filename ON documents(filename);

        CREATE TABLE IF NOT EXISTS chunks (
            doc_id        TEXT NOT NULL REFERENCES documents(doc_id) ON DELETE CASCADE,
            chunk_index   INTEGER NOT NULL,
            text          TEXT NOT NULL,
            lexicon_score REAL NOT NULL,
            llm_score     REAL,
            PRIMARY KEY (doc_id, chunk_index)
        );

        CREATE TABLE IF NOT EXISTS runs (
            run_id        TEXT PRIMARY KEY,
            files_scanned INTEGER NOT NULL,
            extracted     INTEGER NOT NULL,
            failed        INTEGER NOT NULL,
            chunks        INTEGER NOT NULL,
            started_at    TEXT NOT NULL,
            finished_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

/// Persist one document and replace any chunks from an earlier run.
/// Documents are keyed by `Document::id`, so same-named filings in
/// different company folders are kept apart.
pub fn save_outcome(conn: &Connection, outcome: &DocumentOutcome) -> Result<()> {
    let doc = outcome.document();
    let (section_chars, chunk_count, score) = match outcome {
        DocumentOutcome::Extracted {
            section_chars,
            chunks,
            score,
            ..
        } => (Some(*section_chars as i64), chunks.len() as i64, Some(*score)),
        _ => (None, 0, None),
    };

    conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc.id])?;
    conn.execute(
        "INSERT OR REPLACE INTO documents
            (doc_id, filename, path, format, company, status, error, section_chars, chunk_count, lexicon_score, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
        params![
            doc.id,
            doc.filename,
            doc.path.to_string_lossy(),
            doc.format.as_str(),
            doc.company,
            outcome.status(),
            outcome.error(),
            section_chars,
            chunk_count,
            score,
        ],
    )?;

    if let DocumentOutcome::Extracted { chunks, .. } = outcome {
        let mut stmt = conn.prepare(
            "INSERT INTO chunks (doc_id, chunk_index, text, lexicon_score) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for c in chunks {
            stmt.execute(params![doc.id, c.chunk.index as i64, c.chunk.text, c.lexicon_score])?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRow {
    pub doc_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub lexicon_score: f64,
    pub llm_score: Option<f64>,
}

#[cfg(test)]
pub fn fetch_chunks(conn: &Connection, doc_id: &str) -> Result<Vec<ChunkRow>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, chunk_index, text, lexicon_score, llm_score
         FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index",
    )?;
    let rows = stmt
        .query_map(params![doc_id], chunk_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Chunks awaiting an external rating (or every chunk with `all`).
pub fn fetch_rating_queue(conn: &Connection, all: bool, limit: Option<usize>) -> Result<Vec<ChunkRow>> {
    let limit = limit.map(|n| n as i64).unwrap_or(-1);
    let sql = if all {
        "SELECT doc_id, chunk_index, text, lexicon_score, llm_score
         FROM chunks ORDER BY doc_id, chunk_index LIMIT ?1"
    } else {
        "SELECT doc_id, chunk_index, text, lexicon_score, llm_score
         FROM chunks WHERE llm_score IS NULL ORDER BY doc_id, chunk_index LIMIT ?1"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![limit], chunk_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn chunk_row(row: &rusqlite::Row) -> rusqlite::Result<ChunkRow> {
    Ok(ChunkRow {
        doc_id: row.get(0)?,
        chunk_index: row.get(1)?,
        text: row.get(2)?,
        lexicon_score: row.get(3)?,
        llm_score: row.get(4)?,
    })
}

pub fn set_llm_score(conn: &Connection, doc_id: &str, chunk_index: i64, score: Option<f64>) -> Result<()> {
    conn.execute(
        "UPDATE chunks SET llm_score = ?3 WHERE doc_id = ?1 AND chunk_index = ?2",
        params![doc_id, chunk_index, score],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn document_status(conn: &Connection, doc_id: &str) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT status FROM documents WHERE doc_id = ?1",
            params![doc_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub struct RunRow<'a> {
    pub run_id: &'a str,
    pub files_scanned: usize,
    pub extracted: usize,
    pub failed: usize,
    pub chunks: usize,
    pub started_at: &'a str,
}

pub fn insert_run(conn: &Connection, run: &RunRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO runs (run_id, files_scanned, extracted, failed, chunks, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id,
            run.files_scanned as i64,
            run.extracted as i64,
            run.failed as i64,
            run.chunks as i64,
            run.started_at,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct Stats {
    pub documents: i64,
    pub extracted: i64,
    pub failed: i64,
    pub chunks: i64,
    pub rated: i64,
    pub mean_score: Option<f64>,
    pub runs: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let (documents, extracted, mean_score): (i64, i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'extracted'), 0),
                AVG(lexicon_score)
         FROM documents",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    let (chunks, rated): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(llm_score) FROM chunks",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    Ok(Stats {
        documents,
        extracted,
        failed: documents - extracted,
        chunks,
        rated,
        mean_score,
        runs,
    })
}
