//! CLI argument parsing using clap derive API
//!
//! Flags override values loaded from `imagetest.toml` and the environment.
//! This module is purely declarative apart from the small value parsers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Default configuration file, loaded only if present.
pub const DEFAULT_CONFIG_PATH: &str = "imagetest.toml";

/// imagetest -- run integration test suites against VM images.
///
/// Every registered suite is combined with every image into one workflow,
/// executed by the external workflow engine with bounded parallelism.
#[derive(Parser, Debug)]
#[command(name = "imagetest", version, about, long_about = None)]
pub struct Cli {
    /// Path to the imagetest.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project that runs the workflows.
    #[arg(long)]
    pub project: Option<String>,

    /// Zones assigned round-robin to workflows (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub zone: Vec<String>,

    /// Projects that host test VMs, assigned round-robin (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub test_projects: Vec<String>,

    /// Images to test: short names or full image paths (comma separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub images: Vec<String>,

    /// Only run suites whose name matches this regex.
    #[arg(long)]
    pub filter: Option<String>,

    /// Skip suites whose name matches this regex.
    #[arg(long)]
    pub exclude: Option<String>,

    /// Test names the guest runner should skip (regex, passed to every VM).
    #[arg(long)]
    pub exclude_discrete_tests: Option<String>,

    /// Maximum number of workflows running at once.
    #[arg(long)]
    pub parallel_count: Option<usize>,

    /// Delay between successive workflow launches (e.g. 60s, 2m, 500ms).
    #[arg(long, value_parser = parse_duration)]
    pub parallel_stagger: Option<Duration>,

    /// Per-step timeout enforced by the engine (e.g. 45m).
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Path of the JUnit XML report.
    #[arg(long)]
    pub out_path: Option<PathBuf>,

    /// Print the workflow documents instead of running them.
    #[arg(long, conflicts_with = "validate")]
    pub print: bool,

    /// Build and validate every workflow without running them.
    #[arg(long)]
    pub validate: bool,

    /// Exit non-zero when any suite reports failures or errors.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub set_exit_status: Option<bool>,

    /// Mirror run artifacts to this local directory.
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Parse a duration such as `500ms`, `60s`, `2m` or `1h`. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(3600)),
        other => return Err(format!("unknown duration unit '{other}' in '{raw}'")),
    };
    Ok(duration)
}
