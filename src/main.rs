mod chunker;
mod db;
mod error;
mod failures;
mod lexicon;
mod loader;
mod manifest;
mod metrics;
mod pipeline;
mod rater;
mod scoring;
mod section;
mod settings;
mod source;
mod text;
mod utils;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::failures::Located;
use crate::lexicon::Lexicon;
use crate::rater::ChatCompletionsRater;
use crate::scoring::LexiconScorer;
use crate::settings::Settings;
use crate::utils::{format_duration, truncate};

#[derive(Parser)]
#[command(
    name = "filing_scorer",
    about = "Item 1 extraction and digital-finance scoring for annual reports"
)]
struct Cli {
    /// Settings file (default: ./filing_scorer.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract Item 1, chunk it and lexicon-score every filing under the input dir
    Extract {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Max documents to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Score one whole document and list the sentences that hit the lexicon
    Score { file: PathBuf },
    /// Ask the external rater for chunks that have no rating yet
    Rate {
        /// Max chunks to rate (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Re-rate chunks that already have a score
        #[arg(long)]
        all: bool,
    },
    /// Show which company each failed filing belongs to and copy the files aside
    Failures {
        /// Copy folder (default: <output_dir>/failed_filings)
        #[arg(long)]
        copy_to: Option<PathBuf>,
        /// Only report, do not copy
        #[arg(long)]
        no_copy: bool,
    },
    /// Show dataset statistics
    Stats,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_lexicon(settings: &Settings) -> anyhow::Result<Lexicon> {
    match &settings.scoring.lexicon_path {
        Some(path) => {
            let lexicon = Lexicon::from_file(path)?;
            info!(path = %path.display(), terms = lexicon.len(), "custom lexicon");
            Ok(lexicon)
        }
        None => Ok(Lexicon::builtin()),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Extract {
            input,
            output,
            limit,
        } => {
            if let Some(input) = input {
                settings.input_dir = input;
            }
            if let Some(output) = output {
                settings.output_dir = output;
            }

            let mut docs = source::discover(&settings.input_dir)?;
            if let Some(n) = limit {
                docs.truncate(n);
            }
            let lexicon = load_lexicon(&settings)?;
            if !docs.is_empty() {
                println!("Processing {} documents...", docs.len());
            }
            match pipeline::run_extract(&settings, &lexicon, &docs)? {
                Some(tracker) => {
                    tracker.print();
                    println!(
                        "Dataset: {:?} | failures: {:?}",
                        settings.database_path(),
                        settings.manifest_path()
                    );
                }
                None => println!("No PDF, HTML or text files under {:?}.", settings.input_dir),
            }
            Ok(())
        }
        Commands::Score { file } => {
            let lexicon = load_lexicon(&settings)?;
            let scorer = LexiconScorer::new(&lexicon, settings.scoring_policy());
            let text = loader::load_path(&file)?;
            if text.is_empty() {
                println!("No text could be read from {:?}.", file);
                return Ok(());
            }
            println!("{}\n", text.sample(200));
            let report = scorer.score_document(text.as_str());

            println!("Document score: {:.2}", report.score);
            let mut hits = 0;
            for s in report.hits() {
                println!("{:>6.2} | {}", s.score, truncate(&s.sentence, 160));
                hits += 1;
            }
            println!("\n{} of {} sentences matched", hits, report.sentences.len());
            Ok(())
        }
        Commands::Rate { limit, all } => {
            let conn = db::connect(&settings.database_path())?;
            db::init_schema(&conn)?;
            let rows = db::fetch_rating_queue(&conn, all, limit)?;
            if rows.is_empty() {
                println!("No chunks to rate. Run 'extract' first.");
                return Ok(());
            }

            let rater = ChatCompletionsRater::from_settings(&settings.rater)?;
            println!("Rating {} chunks with {}...", rows.len(), settings.rater.model);
            let summary = pipeline::rate_chunks(&conn, &rater, &rows)?;
            println!(
                "Done: {} attempted ({} rated, {} unavailable).",
                summary.attempted, summary.rated, summary.unavailable
            );
            Ok(())
        }
        Commands::Failures { copy_to, no_copy } => {
            let manifest_path = settings.manifest_path();
            let names = manifest::read_manifest(&manifest_path)
                .with_context(|| "run 'extract' first to produce a failure manifest")?;
            if names.is_empty() {
                println!("No failures recorded.");
                return Ok(());
            }

            let copy_dir = (!no_copy).then(|| copy_to.unwrap_or_else(|| settings.failed_copy_dir()));
            let found = failures::review(&settings.input_dir, &names, copy_dir.as_deref())?;

            let mut companies = HashSet::new();
            let mut copied = 0;
            for f in &found {
                match &f.located {
                    Located::Missing => {
                        println!("[!] Could not locate {}", f.entry);
                        continue;
                    }
                    Located::Fuzzy { matched, .. } => {
                        println!("[~] Fuzzy matched {} -> {}", f.entry, matched)
                    }
                    Located::Exact(_) => {}
                }
                if f.copied.is_some() {
                    copied += 1;
                }
                match &f.company {
                    Some(c) => {
                        companies.insert(source::normalize_company(c));
                        println!("{} -> {}", f.entry, c);
                    }
                    None => println!("{} -> UNKNOWN", f.entry),
                }
            }
            println!(
                "\n{} failed documents across {} companies",
                names.len(),
                companies.len()
            );
            if let Some(dir) = &copy_dir {
                println!("Copied {} files to {:?}", copied, dir);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database_path())?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Documents: {}", s.documents);
            println!("Extracted: {}", s.extracted);
            println!("Failed:    {}", s.failed);
            println!("Chunks:    {}", s.chunks);
            println!("Rated:     {}", s.rated);
            match s.mean_score {
                Some(mean) => println!("Mean score: {:.2}", mean),
                None => println!("Mean score: -"),
            }
            println!("Runs:      {}", s.runs);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}
