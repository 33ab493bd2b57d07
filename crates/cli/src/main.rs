//! # dagpipe CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 管道配置加载与验证
//! - 以文件、标准输入或蓝图数据源驱动管道
//! - 运行摘要与 Prometheus 指标

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging (and metrics for `run`) based on CLI options
    init_observability(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "dagpipe starting");

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize tracing and the optional Prometheus exporter
fn init_observability(cli: &Cli) -> Result<()> {
    let metrics_port = match &cli.command {
        Commands::Run(args) => args.metrics_port,
        _ => None,
    };
    let config = ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_log_format(cli.log_format.into())
        .with_metrics_port(metrics_port);
    observability::init_with_config(config)
}
