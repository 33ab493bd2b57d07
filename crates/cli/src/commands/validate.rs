//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PipeCategory, PipelineBlueprint, StageSpec};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PipelineSummary>,
}

#[derive(Serialize)]
struct PipelineSummary {
    name: String,
    stage_count: usize,
    categories: Vec<PipeCategory>,
    fan_count: usize,
    has_source: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating pipeline");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Pipeline validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match super::load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(summarize(&blueprint)),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{e:#}")),
            warnings: None,
            summary: None,
        },
    }
}

fn summarize(blueprint: &PipelineBlueprint) -> PipelineSummary {
    let fan_count = super::flatten_stages(&blueprint.stages)
        .iter()
        .filter(|(_, s)| matches!(s, StageSpec::Fan { .. }))
        .count();
    PipelineSummary {
        name: blueprint.name.clone(),
        stage_count: blueprint.stages.len(),
        categories: blueprint.stages.iter().map(StageSpec::category).collect(),
        fan_count,
        has_source: blueprint.source.is_some(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.source.is_none() {
        warnings.push("No source configured - `run` will need --input".to_string());
    }

    if !blueprint.ends_in_sink() {
        warnings.push("Pipeline does not end in a sink - it can be composed but not run".to_string());
    }

    let traces = super::flatten_stages(&blueprint.stages)
        .iter()
        .filter(|(_, s)| matches!(s, StageSpec::Trace { .. }))
        .count();
    if traces > 0 {
        warnings.push(format!("{traces} trace stage(s) left in the pipeline"));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Pipeline is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            let categories: Vec<String> =
                summary.categories.iter().map(ToString::to_string).collect();
            println!("\n  Name: {}", summary.name);
            println!("  Stages: {}", summary.stage_count);
            println!("  Categories: {}", categories.join(" | "));
            println!("  Fans: {}", summary.fan_count);
            println!("  Source: {}", if summary.has_source { "yes" } else { "no" });
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Pipeline is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
