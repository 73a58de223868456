//! Bulk-load and scroll benchmark for the windowed seek engine.
//!
//! Loads a synthetic table into an ephemeral store, then pages through it the
//! way a redraw loop would and reports throughput and resident-set growth.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusqlite::{params, Connection};
use serde::Serialize;
use tablecraft::backend::{Backend, Flow, MemoryMode, ViewSpec};
use tablecraft::config::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TABLE: &str = "t";
const PROGRESS_STEP: u64 = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "seek-bench",
    version,
    about = "Bulk-load a synthetic table and scroll it with keyset windows"
)]
struct Cli {
    #[arg(
        long,
        default_value_t = 200_000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Rows to load"
    )]
    rows: u64,

    #[arg(
        long,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Window size (defaults to the configured page size)"
    )]
    page: Option<u64>,

    #[arg(long, value_enum, help = "Cache tuning override")]
    mode: Option<ModeArg>,

    #[arg(long, value_name = "FILE", env = "TABLECRAFT_CONFIG", help = "Engine config file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Report format"
    )]
    format: OutputFormat,

    #[arg(long, value_name = "FILE", help = "Save the loaded store to FILE")]
    save_as: Option<PathBuf>,

    #[arg(long, default_value_t = 7, help = "Seed for generated scores")]
    seed: u64,

    #[arg(long, help = "Hide the load progress bar")]
    no_progress: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ModeArg {
    Auto,
    LowRam,
    Normal,
}

impl From<ModeArg> for MemoryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => MemoryMode::Auto,
            ModeArg::LowRam => MemoryMode::LowRam,
            ModeArg::Normal => MemoryMode::Normal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct BenchReport {
    rows: u64,
    page: usize,
    mode: &'static str,
    rows_scrolled: u64,
    windows: u64,
    seconds: f64,
    rows_per_sec: f64,
    rss_start_kb: Option<i64>,
    rss_end_kb: Option<i64>,
    rss_delta_kb: Option<i64>,
    seek_before_delivered: usize,
    saved_to: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.clone())?;
    let page = match cli.page {
        Some(page) => usize::try_from(page)?,
        None => config.page_size,
    };
    let mut opts = config.backend().clone();
    if let Some(mode) = cli.mode {
        opts.mode = mode.into();
    }

    let mut backend = Backend::open(None, &opts)?;
    backend.ensure_table(TABLE, "val INTEGER, name TEXT, score REAL")?;

    let progress = if cli.no_progress || cli.format == OutputFormat::Json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(cli.rows);
        bar.set_style(
            ProgressStyle::with_template("loading {bar:40} {pos}/{len} rows ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };
    let load_start = Instant::now();
    bulk_load(backend.raw_connection()?, cli.rows, cli.seed, &progress)?;
    info!(
        rows = cli.rows,
        duration_ms = load_start.elapsed().as_secs_f64() * 1_000.0,
        "bench.load.completed"
    );

    let key = opts.key_name.clone();
    backend.ensure_stable_key(TABLE, &key)?;
    backend.set_view(ViewSpec::new(TABLE).sort("val ASC"), Some(&key))?;
    let key_index = backend
        .view_columns()?
        .iter()
        .position(|col| *col == key)
        .ok_or("view lacks the key column")?;

    let rss_start = rss_kb();
    let start = Instant::now();
    let mut last_key = 0i64;
    let mut scrolled = 0u64;
    let mut windows = 0u64;
    let got = backend.seek_first(page, |row| {
        if let Some(key) = row.get_i64(key_index) {
            last_key = key;
        }
        Flow::Continue
    })?;
    scrolled += got as u64;
    windows += 1;
    while scrolled < cli.rows {
        let got = backend.seek_after(last_key, page, |row| {
            if let Some(key) = row.get_i64(key_index) {
                last_key = key;
            }
            Flow::Continue
        })?;
        if got == 0 {
            break;
        }
        scrolled += got as u64;
        windows += 1;
    }
    let elapsed = start.elapsed();
    let rss_end = rss_kb();

    let seek_before_delivered = backend.seek_before(last_key, page, |_| Flow::Continue)?;

    if let Some(dest) = cli.save_as.as_ref() {
        backend.save_as(dest)?;
    }
    let mode = backend.memory_mode().as_str();
    backend.close()?;

    let seconds = elapsed.as_secs_f64();
    let report = BenchReport {
        rows: cli.rows,
        page,
        mode,
        rows_scrolled: scrolled,
        windows,
        seconds,
        rows_per_sec: if seconds > 0.0 {
            scrolled as f64 / seconds
        } else {
            0.0
        },
        rss_start_kb: rss_start,
        rss_end_kb: rss_end,
        rss_delta_kb: rss_start.zip(rss_end).map(|(a, b)| b - a),
        seek_before_delivered,
        saved_to: cli.save_as.clone(),
    };
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}

fn bulk_load(
    conn: &mut Connection,
    rows: u64,
    seed: u64,
    progress: &ProgressBar,
) -> rusqlite::Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {TABLE}(val, name, score) VALUES (?1, ?2, ?3)"
        ))?;
        for i in 1..=rows {
            let score: f64 = rng.gen_range(0.0..100.0);
            stmt.execute(params![i as i64, format!("row{i}"), score])?;
            if i % PROGRESS_STEP == 0 {
                progress.set_position(i);
            }
        }
    }
    tx.commit()?;
    progress.finish_and_clear();
    Ok(())
}

fn print_text(report: &BenchReport) {
    let kb = |value: Option<i64>| value.map_or("-".to_string(), |v| v.to_string());
    println!(
        "Rows: {}, Page: {}, Mode: {}, Time: {:.3}s, Throughput: {:.1} rows/s",
        report.rows_scrolled, report.page, report.mode, report.seconds, report.rows_per_sec
    );
    println!(
        "RSS start: {} KB, RSS end: {} KB, Delta: {} KB",
        kb(report.rss_start_kb),
        kb(report.rss_end_kb),
        kb(report.rss_delta_kb)
    );
    println!("seek_before delivered: {}", report.seek_before_delivered);
    if let Some(path) = report.saved_to.as_ref() {
        println!("Saved to {}", path.display());
    }
}

/// Resident set size in KiB, where the platform exposes it.
fn rss_kb() -> Option<i64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
