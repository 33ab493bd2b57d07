//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, StageSpec};

use crate::error::CliError;

/// Load and validate a pipeline file, failing early when it is missing
fn load_blueprint(path: &Path) -> Result<PipelineBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load pipeline from {}", path.display()))
}

/// Every stage with its nesting depth, fan branches included, in order
fn flatten_stages(stages: &[StageSpec]) -> Vec<(usize, &StageSpec)> {
    fn walk<'a>(stages: &'a [StageSpec], depth: usize, out: &mut Vec<(usize, &'a StageSpec)>) {
        for stage in stages {
            out.push((depth, stage));
            if let StageSpec::Fan { branches } = stage {
                for branch in branches {
                    walk(branch, depth + 1, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(stages, 0, &mut out);
    out
}
