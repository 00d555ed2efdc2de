//! Command-line parsing for the AirGradient decay analyzer.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::AlignMode;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "aq", version, about = "Indoor air-quality decay curve analyzer (AirGradient-based)")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit and rescale every configured decay window, then align them for overlay.
    Analyze(AnalyzeArgs),
    /// Fit one arbitrary time range per species and print the time constants.
    Fit(FitArgs),
    /// Poll the current reading and print calibrated CO2.
    Live(LiveArgs),
}

/// Where data comes from and how CO2 is calibrated.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// AirGradient location id.
    #[arg(long = "location", env = "AIRGRADIENT_LOCATION_ID")]
    pub location_id: String,

    /// CO2 calibration slope.
    #[arg(long, default_value_t = 1.0)]
    pub slope: f64,

    /// CO2 calibration intercept.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub intercept: f64,

    /// HTTP timeout per request (seconds).
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum HTTP attempts per request (1 disables retries).
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Use the deterministic synthetic source instead of the AirGradient API.
    #[arg(long)]
    pub synthetic: bool,

    /// Seed for the synthetic source.
    #[arg(long, default_value_t = 42)]
    pub synthetic_seed: u64,
}

/// Optimizer starting point.
#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    /// Initial amplitude `a`.
    #[arg(long, default_value_t = 500.0, allow_negative_numbers = true)]
    pub seed_a: f64,

    /// Initial rate `b` (1/hours).
    #[arg(long, default_value_t = -0.5, allow_negative_numbers = true)]
    pub seed_b: f64,

    /// Initial plateau `c`.
    #[arg(long, default_value_t = 400.0, allow_negative_numbers = true)]
    pub seed_c: f64,

    /// Estimate a starting point from each series instead of the fixed seed.
    #[arg(long, conflicts_with_all = ["seed_a", "seed_b", "seed_c"])]
    pub auto_seed: bool,

    /// Maximum optimizer iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,
}

/// Options for the batch analysis.
#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub seed: SeedArgs,

    /// JSON file listing the decay windows.
    #[arg(long, value_name = "JSON")]
    pub windows: PathBuf,

    /// Species to fit.
    #[arg(long, value_delimiter = ',', default_value = "rco2,tvoc")]
    pub species: Vec<String>,

    /// How events are cut to a common length.
    #[arg(long, value_enum, default_value_t = AlignMode::Samples)]
    pub align: AlignMode,

    /// Render an ASCII overlay of the rescaled curves.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export aligned series to CSV.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Export aligned series, fits and failures to JSON.
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

/// Options for a single-range fit.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub seed: SeedArgs,

    /// Range start (RFC 3339, or local `YYYY-MM-DD HH:MM[:SS]`).
    #[arg(long)]
    pub from: String,

    /// Range end (RFC 3339, or local `YYYY-MM-DD HH:MM[:SS]`).
    #[arg(long)]
    pub to: String,

    /// Species to fit.
    #[arg(long, value_delimiter = ',', default_value = "rco2,tvoc,pm10")]
    pub species: Vec<String>,

    /// Render observed vs fitted curve per species.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for live polling.
#[derive(Debug, Parser, Clone)]
pub struct LiveArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Seconds between polls.
    #[arg(long, default_value_t = 60)]
    pub interval_secs: u64,

    /// Stop after this many readings (runs until interrupted otherwise).
    #[arg(long)]
    pub count: Option<u64>,
}
