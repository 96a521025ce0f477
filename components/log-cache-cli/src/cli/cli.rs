use crate::helpers::load_config::Config;
use crate::meta::meta::Scope;
use crate::parser::models::{EnvelopeType, Nanos};
use crate::runtime;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "log-cache",
    long_about = "log-cache reads envelopes (logs, counters, gauges, timers and events) held in Log Cache and prints them as text, optionally following a source as new envelopes arrive.",
    about = "Query and tail Log Cache",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        log-cache tail my-app-guid
        log-cache tail --follow --envelope-type log my-app-guid
        log-cache meta --scope applications --noise
        log-cache validate --config ./log-cache.toml"
)]
pub struct Cli {
    /// TOML configuration file, layered between defaults and LOG_CACHE_* variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Diagnostics filter written to stderr, e.g. `debug` or `log_cache_cli=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Output envelopes for a source
    Tail(TailArgs),

    /// Show what Log Cache holds for each source
    Meta(MetaArgs),

    /// Load the configuration and print it with secrets masked
    Validate,
}

#[derive(Debug, Args, Clone, PartialEq, Eq)]
pub struct TailArgs {
    /// Application GUID or platform component name
    pub source_id: String,

    /// Keep polling for new envelopes until interrupted
    #[arg(short, long)]
    pub follow: bool,

    /// Omit the "Retrieving logs for ..." header
    #[arg(long)]
    pub no_headers: bool,

    /// Per-request timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Number of most recent envelopes fetched by the first request
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub lines: Option<u32>,

    /// Start of the first window in nanoseconds since the epoch
    #[arg(long, allow_negative_numbers = true)]
    pub start_time: Option<Nanos>,

    /// Only request these envelope types (repeatable)
    #[arg(long = "envelope-type", value_enum)]
    pub envelope_types: Vec<EnvelopeType>,

    /// Delay between polls in follow mode, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: Option<u64>,

    /// Stop following after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Args, Clone, PartialEq, Eq)]
pub struct MetaArgs {
    #[arg(long, value_enum, default_value_t = Scope::All, ignore_case = true)]
    pub scope: Scope,

    /// Add a Rate column with the envelopes emitted over the last minute
    #[arg(long)]
    pub noise: bool,

    /// Add a Source ID column
    #[arg(long)]
    pub guid: bool,

    /// Omit the banner and the column header row
    #[arg(long)]
    pub no_headers: bool,

    /// Per-request timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,
}

/// Entry function for CLI
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Tail(args) => runtime::runtime::run_tail(config, args).await?,
        Commands::Meta(args) => runtime::runtime::run_meta(config, args).await?,
        Commands::Validate => validate_config(config)?,
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Print the resolved configuration as TOML, token masked
fn validate_config(path: Option<&Path>) -> Result<()> {
    let cfg = Config::load(path)?;
    let rendered = toml::to_string_pretty(&cfg.redacted()).context("Failed to render configuration")?;

    println!("Configuration valid:\n\n{rendered}");
    Ok(())
}
