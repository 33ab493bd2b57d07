//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dagpipe - declarative push pipelines over streams of values
#[derive(Parser, Debug)]
#[command(
    name = "dagpipe",
    author,
    version,
    about = "Run declarative push pipelines",
    long_about = "Builds a pipeline of sources, filters, windows, fans and sinks from a \n\
                  TOML or JSON description, pushes values through it and prints the \n\
                  result captured by the terminal sink."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DAGPIPE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose", env = "DAGPIPE_QUIET")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DAGPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline and print its result
    Run(RunArgs),

    /// Validate a pipeline file without running it
    Validate(ValidateArgs),

    /// Display the stages of a pipeline file
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to pipeline file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "pipeline.toml",
        env = "DAGPIPE_CONFIG"
    )]
    pub config: PathBuf,

    /// Input file with one element per line ("-" for stdin); used when the
    /// pipeline has no source
    #[arg(short, long, env = "DAGPIPE_INPUT")]
    pub input: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long, env = "DAGPIPE_JSON")]
    pub json: bool,

    /// Prometheus metrics port (disabled when absent or 0)
    #[arg(long, env = "DAGPIPE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Feed the input this many times into one frozen sink
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..),
        env = "DAGPIPE_REPEAT"
    )]
    pub repeat: u32,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to pipeline file to validate
    #[arg(
        short,
        long,
        default_value = "pipeline.toml",
        env = "DAGPIPE_CONFIG"
    )]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long, env = "DAGPIPE_JSON")]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to pipeline file
    #[arg(
        short,
        long,
        default_value = "pipeline.toml",
        env = "DAGPIPE_CONFIG"
    )]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long, env = "DAGPIPE_JSON")]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
