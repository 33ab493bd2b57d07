//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{PipeCategory, PipelineBlueprint, SourceSpec, StageSpec};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::info;

use crate::cli::InfoArgs;

/// Pipeline info for JSON output
#[derive(Serialize)]
struct PipelineInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    stages: Vec<StageInfo>,
}

#[derive(Serialize)]
struct StageInfo {
    op: &'static str,
    category: PipeCategory,
    #[serde(skip_serializing_if = "Map::is_empty")]
    params: Map<String, Json>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    branches: Vec<Vec<StageInfo>>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading pipeline info");

    let blueprint = super::load_blueprint(&args.config)?;
    let info = build_pipeline_info(&blueprint)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize pipeline info")?;
        println!("{}", json);
    } else {
        print_pipeline_info(&info);
    }

    Ok(())
}

fn describe_source(spec: &SourceSpec) -> String {
    match spec {
        SourceSpec::Values { values } => format!("values ({} elements)", values.len()),
        SourceSpec::Range { start, stop, step } => format!("range({start}, {stop}, {step})"),
    }
}

fn build_pipeline_info(blueprint: &PipelineBlueprint) -> Result<PipelineInfo> {
    Ok(PipelineInfo {
        name: blueprint.name.clone(),
        seed: blueprint.seed,
        source: blueprint.source.as_ref().map(describe_source),
        stages: build_stage_infos(&blueprint.stages)?,
    })
}

fn build_stage_infos(stages: &[StageSpec]) -> Result<Vec<StageInfo>> {
    stages.iter().map(build_stage_info).collect()
}

/// Parameters are the stage's serialized fields minus its `op` tag
fn build_stage_info(stage: &StageSpec) -> Result<StageInfo> {
    let branches = match stage {
        StageSpec::Fan { branches } => branches
            .iter()
            .map(|b| build_stage_infos(b))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    let mut params = match serde_json::to_value(stage).context("Failed to serialize stage")? {
        Json::Object(map) => map,
        _ => Map::new(),
    };
    params.remove("op");
    params.remove("branches");
    Ok(StageInfo {
        op: stage.op_name(),
        category: stage.category(),
        params,
        branches,
    })
}

fn format_params(params: &Map<String, Json>) -> String {
    if params.is_empty() {
        return String::new();
    }
    let inner: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(" {{{}}}", inner.join(", "))
}

fn print_stages(stages: &[StageInfo], indent: &str) {
    for (i, stage) in stages.iter().enumerate() {
        let is_last = i == stages.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_indent = format!("{indent}{}", if is_last { "   " } else { "│  " });

        println!(
            "{indent}{prefix} {} [{}]{}",
            stage.op,
            stage.category,
            format_params(&stage.params)
        );
        for (j, branch) in stage.branches.iter().enumerate() {
            println!("{child_indent}branch {j}:");
            print_stages(branch, &format!("{child_indent}  "));
        }
    }
}

fn print_pipeline_info(info: &PipelineInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                    dagpipe Pipeline                          ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Pipeline");
    println!("   ├─ Name: {}", info.name);
    match info.seed {
        Some(seed) => println!("   ├─ Seed: {}", seed),
        None => println!("   ├─ Seed: (random)"),
    }
    match &info.source {
        Some(source) => println!("   └─ Source: {}", source),
        None => println!("   └─ Source: (from --input)"),
    }

    println!("\n⚙️  Stages ({})", info.stages.len());
    print_stages(&info.stages, "   ");

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_info_params() {
        let bp: PipelineBlueprint = serde_json::from_str(
            r#"{
                "source": { "kind": "range", "stop": 4 },
                "stages": [
                    { "op": "window_quantile", "window": 5, "quantile": 0.25 },
                    { "op": "fan", "branches": [[{ "op": "count" }], [{ "op": "stddev" }]] }
                ]
            }"#,
        )
        .unwrap();
        let info = build_pipeline_info(&bp).unwrap();
        assert_eq!(info.source.as_deref(), Some("range(0, 4, 1)"));

        let quantile = &info.stages[0];
        assert_eq!(quantile.op, "window_quantile");
        assert_eq!(quantile.category, PipeCategory::Middle);
        assert_eq!(quantile.params.get("window"), Some(&Json::from(5)));
        let rendered = format_params(&quantile.params);
        assert!(rendered.contains("quantile=0.25"), "got: {rendered}");
        assert!(rendered.contains("window=5"), "got: {rendered}");

        let fan = &info.stages[1];
        assert!(fan.params.is_empty());
        assert_eq!(fan.branches.len(), 2);
        assert_eq!(fan.branches[1][0].params.get("ddof"), Some(&Json::from(1)));
    }
}
