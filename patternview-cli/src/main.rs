//! patternview command-line interface.
//!
//! Scans diffraction pattern files, lists them in sequence order and
//! reads frames through the same open/close session the viewer uses.
#![allow(clippy::uninlined_format_args)]

use clap::{Args, Parser, Subcommand};
use log::debug;
use patternview_core::{FrameStatistics, PatternKind, TileLayout};
use patternview_io::{PatternEntry, ReaderConfig, Session, DEFAULT_DATASET};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    PatternIo(#[from] patternview_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] patternview_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Diffraction pattern browser.
#[derive(Parser)]
#[command(name = "patternview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Frame dataset path inside NeXus files
    #[arg(long, global = true, default_value = DEFAULT_DATASET)]
    dataset: String,

    /// JSON file describing the tiled detector layout
    #[arg(long, global = true)]
    layout: Option<PathBuf>,
}

/// Arguments shared by every subcommand.
#[derive(Args)]
struct ScanArgs {
    /// Directory, file, or glob expression to scan
    expr: String,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List patterns in display order
    List {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Open every pattern once and report its frames
    Info {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Activate keys in order and print frame statistics
    Show {
        #[command(flatten)]
        scan: ScanArgs,

        /// Pattern or frame keys to activate
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Serialize)]
struct ListRow {
    key: String,
    kind: &'static str,
    sequence: String,
    paths: Vec<PathBuf>,
}

#[derive(Serialize)]
struct InfoRow {
    key: String,
    kind: &'static str,
    frames: Option<usize>,
    children: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ShowRow {
    key: String,
    name: String,
    stats: FrameStatistics,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let layout = match &cli.layout {
        Some(path) => TileLayout::from_file(path)?,
        None => TileLayout::default(),
    };
    let mut session = Session::with_config(ReaderConfig {
        dataset: cli.dataset,
        layout,
    });

    let scan = match &cli.command {
        Commands::List { scan } | Commands::Info { scan } | Commands::Show { scan, .. } => scan,
    };
    match session.scan(&scan.expr) {
        Ok(entries) => debug!("{} patterns in {}", entries.len(), scan.expr),
        Err(patternview_io::Error::NoFilesFound { pattern }) => {
            println!("no files found: {}", pattern);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    match &cli.command {
        Commands::List { scan } => list(&session, scan.json),
        Commands::Info { scan } => info(&mut session, scan.json),
        Commands::Show { scan, keys } => show(&mut session, keys, scan.json),
    }
}

fn paths_of(entry: &PatternEntry) -> Vec<PathBuf> {
    match entry.kind() {
        PatternKind::Single { path } | PatternKind::Stack { path } => vec![path.clone()],
        PatternKind::Tiled { panels, .. } => panels.to_vec(),
    }
}

fn list(session: &Session, json: bool) -> Result<()> {
    let rows: Vec<ListRow> = session
        .entries()
        .iter()
        .map(|entry| ListRow {
            key: entry.display_key().to_string(),
            kind: entry.kind().label(),
            sequence: entry.sequence_key().to_string(),
            paths: paths_of(entry),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        println!("{:<40} {:<6} {}", row.key, row.kind, row.sequence);
    }
    println!("{} patterns", rows.len());
    Ok(())
}

fn info(session: &mut Session, json: bool) -> Result<()> {
    let keys: Vec<String> = session
        .entries()
        .iter()
        .map(|e| e.display_key().to_string())
        .collect();

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        // A broken pattern is reported and skipped.
        let error = session.activate(&key).err().map(|e| e.to_string());
        let entry = session.entry(&key);
        rows.push(InfoRow {
            kind: entry.map_or("?", |e| e.kind().label()),
            frames: entry.and_then(PatternEntry::frame_count),
            children: entry.and_then(PatternEntry::children).map_or(0, <[String]>::len),
            key,
            error,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:<40} | {:<6} | {:>8} | {:>8}",
        "Pattern", "Kind", "Frames", "Children"
    );
    println!("{:-<72}", "");
    for row in &rows {
        match &row.error {
            Some(e) => println!("{:<40} | {:<6} | error: {}", row.key, row.kind, e),
            None => println!(
                "{:<40} | {:<6} | {:>8} | {:>8}",
                row.key,
                row.kind,
                row.frames.map_or_else(|| "-".to_string(), |n| n.to_string()),
                row.children
            ),
        }
    }
    Ok(())
}

fn show(session: &mut Session, keys: &[String], json: bool) -> Result<()> {
    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let shown = session.activate(key)?;
        rows.push(ShowRow {
            key: key.clone(),
            name: shown.name,
            stats: FrameStatistics::from_view(shown.pixels),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let s = &row.stats;
        println!("{}", row.name);
        println!("  Shape: {} x {}", s.rows, s.cols);
        println!("  Range: {} - {}", s.min, s.max);
        println!("  Mean: {:.3}  Sum: {:.0}", s.mean, s.sum);
        println!("  Zero pixels: {}", s.zero_pixels);
    }
    if let Some(active) = session.active_key() {
        debug!("active pattern: {}", active);
    }
    Ok(())
}
