use crate::error::PtxError;
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Parser)]
#[command(name = "ptx")]
#[command(author, version, about = "Query heterogeneous logs as typed events with a SQL-like language")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Report per-file parse/drop counts to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query over log files or stdin
    Query(QueryArgs),

    /// Case-insensitive regex scan over raw lines and field values
    Find(FindArgs),

    /// Project events down to the named fields
    Extract(ExtractArgs),

    /// List registered parser formats
    Formats,

    /// List source collaborator keys
    Sources,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Query string, e.g. 'status >= 500 group by ip count sort by count desc'
    pub query: String,

    /// Log files to read (glob patterns supported); stdin when omitted
    pub files: Vec<PathBuf>,

    /// Keep events newer than this (e.g. 90s, 15m, 6h, 2d)
    #[arg(long)]
    pub since: Option<String>,

    /// Keep events older than this
    #[arg(long)]
    pub until: Option<String>,

    /// Force a parser instead of detecting (see `ptx formats`)
    #[arg(long)]
    pub format: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub output: Option<OutputFormat>,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Per-event transform, e.g. 'latency_ms = latency * 1000'
    #[arg(long)]
    pub eval: Option<String>,
}

#[derive(Args)]
pub struct FindArgs {
    /// Pattern to look for (case-insensitive regex)
    pub pattern: String,

    /// Log files to read; stdin when omitted
    pub files: Vec<PathBuf>,

    /// Force a parser instead of detecting
    #[arg(long)]
    pub format: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub output: Option<OutputFormat>,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Comma-separated field names to keep
    #[arg(long, required = true)]
    pub fields: String,

    /// Log files to read; stdin when omitted
    pub files: Vec<PathBuf>,

    /// Force a parser instead of detecting
    #[arg(long)]
    pub format: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub output: Option<OutputFormat>,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One aligned line per result
    Table,
    /// One JSON object per line
    Json,
    /// CSV with a header row
    Csv,
    /// YAML sequence
    Yaml,
    /// Multi-line colored blocks
    Pretty,
    /// Bar chart over grouped rows
    Chart,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Pretty => "pretty",
            OutputFormat::Chart => "chart",
        };
        write!(f, "{}", name)
    }
}

fn duration_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*([smhd])?$").expect("duration regex"))
}

/// Parse `--since`/`--until` durations: `<int>[s|m|h|d]`, bare integer
/// meaning seconds, with a humantime fallback for spellings like
/// "2 hours".
pub fn parse_duration_secs(input: &str) -> Result<i64, PtxError> {
    let trimmed = input.trim();
    if let Some(caps) = duration_shape().captures(trimmed) {
        let amount: i64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| PtxError::MissingArgument {
                argument: input.to_string(),
                message: "duration out of range".to_string(),
            })?;
        let unit = match caps.get(2).map(|m| m.as_str()) {
            Some("m") => 60,
            Some("h") => 3600,
            Some("d") => 86400,
            _ => 1,
        };
        return Ok(amount.saturating_mul(unit));
    }
    humantime::parse_duration(trimmed)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| PtxError::MissingArgument {
            argument: input.to_string(),
            message: "expected a duration like 90s, 15m, 6h, or 2d".to_string(),
        })
}
