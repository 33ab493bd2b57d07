//! `run` command implementation.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{PipeResult, PipelineBlueprint, RunOutcome, RunReport, Value};
use observability::RunMetricsAggregator;
use operators::Pipe;
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::error::{self, CliError};

/// Execute the `run` command
pub fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading pipeline");

    let blueprint = super::load_blueprint(&args.config)?;
    config_loader::validate_runnable(&blueprint)
        .with_context(|| format!("Pipeline '{}' cannot run", blueprint.name))?;

    info!(
        pipeline = %blueprint.name,
        stages = blueprint.stages.len(),
        repeat = args.repeat,
        "Pipeline loaded"
    );

    let sink = operators::build_pipe(&blueprint).context("Failed to build pipeline")?;
    let source = resolve_source(&blueprint, args)?;

    let mut aggregator = RunMetricsAggregator::new();
    let (result, report) = if args.repeat > 1 {
        run_frozen(&blueprint.name, source, sink, args.repeat)?
    } else {
        source
            .run_reported(sink, &blueprint.name)
            .context("Failed to connect pipeline")?
    };
    aggregator.update(&report);
    info!(summary = %aggregator.summary(), "Run finished");

    let value = result.map_err(|e| CliError::pipeline_execution(e.to_string()))?;
    println!("{}", render(&value, args.json)?);
    Ok(())
}

/// The blueprint's own source, else the lines of `--input`
fn resolve_source(blueprint: &PipelineBlueprint, args: &RunArgs) -> Result<Pipe> {
    if let Some(spec) = &blueprint.source {
        if args.input.is_some() {
            debug!("Pipeline defines a source; --input ignored");
        }
        return operators::build_source(spec).context("Failed to build source");
    }
    let path = args
        .input
        .as_deref()
        .ok_or_else(|| CliError::missing_input(&blueprint.name))?;
    let values = read_input(path)?;
    info!(elements = values.len(), input = %path.display(), "Input loaded");
    Ok(operators::source(values))
}

/// Read one element per non-empty line; `-` reads stdin
fn read_input(path: &Path) -> error::Result<Vec<Value>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_element)
        .collect())
}

/// Int, else Float, else the raw string
fn parse_element(line: &str) -> Value {
    if let Ok(i) = line.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = line.parse::<f64>() {
        return Value::Float(f);
    }
    Value::from(line)
}

/// Feed `source` into one frozen copy of `sink` `repeat` times, then thaw
fn run_frozen(
    name: &str,
    source: Pipe,
    sink: Pipe,
    repeat: u32,
) -> Result<(PipeResult<Value>, RunReport)> {
    let started = Instant::now();
    let frozen = sink.freeze().context("Failed to freeze sink")?;
    let mut ticks = 0;
    for round in 0..repeat {
        ticks += frozen
            .feed(&source)
            .with_context(|| format!("Feed {} of {repeat} failed", round + 1))?;
    }
    let result = frozen.thaw();
    let report = RunReport {
        pipeline: name.to_string(),
        ticks,
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        outcome: RunOutcome::of(&result),
    };
    observability::record_run(&report);
    Ok((result, report))
}

fn render(value: &Value, json: bool) -> Result<String> {
    if json {
        serde_json::to_string(value).context("Failed to serialize result")
    } else {
        Ok(value.to_string())
    }
}
