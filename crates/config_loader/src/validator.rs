//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个阶段
//! - range.step != 0
//! - 窗口长度 >= 1, quantile / alpha 位于 [0, 1], ddof / tail.n >= 0, 抽样大小 >= 1
//! - slice 至少给出一个边界, 边界非负, step >= 1
//! - fan 至少两个非空分支, 且分支类别一致
//! - sink 阶段只能位于序列末尾

use contracts::{branch_category, PipeCategory, PipeError, PipelineBlueprint, SourceSpec, StageSpec};

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), PipeError> {
    validate_has_stages(blueprint)?;
    validate_source(blueprint)?;
    for_each_sequence(&blueprint.stages, "stages", &mut |path: &str, stages: &[StageSpec]| {
        validate_stage_params(path, stages)?;
        validate_fans(path, stages)?;
        validate_sequencing(path, stages)
    })
}

/// `run` 额外要求管道以 sink 结尾
pub fn validate_runnable(blueprint: &PipelineBlueprint) -> Result<(), PipeError> {
    if blueprint.ends_in_sink() {
        return Ok(());
    }
    let idx = blueprint.stages.len().saturating_sub(1);
    Err(PipeError::config_validation(
        format!("stages[{idx}]"),
        "a runnable pipeline must end in a sink",
    ))
}

/// 依次访问顶层阶段序列及每个 fan 分支
fn for_each_sequence<F>(stages: &[StageSpec], path: &str, visit: &mut F) -> Result<(), PipeError>
where
    F: FnMut(&str, &[StageSpec]) -> Result<(), PipeError>,
{
    visit(path, stages)?;
    for (i, stage) in stages.iter().enumerate() {
        if let StageSpec::Fan { branches } = stage {
            for (j, branch) in branches.iter().enumerate() {
                for_each_sequence(branch, &format!("{path}[{i}].branches[{j}]"), visit)?;
            }
        }
    }
    Ok(())
}

/// 校验阶段数量
fn validate_has_stages(blueprint: &PipelineBlueprint) -> Result<(), PipeError> {
    if blueprint.stages.is_empty() {
        return Err(PipeError::config_validation(
            "stages",
            "at least one stage is required",
        ));
    }
    Ok(())
}

/// 校验数据源
fn validate_source(blueprint: &PipelineBlueprint) -> Result<(), PipeError> {
    if let Some(SourceSpec::Range { step: 0, .. }) = blueprint.source {
        return Err(PipeError::config_validation(
            "source.step",
            "range step must be non-zero",
        ));
    }
    Ok(())
}

fn check_unit_interval(field: String, name: &str, value: f64) -> Result<(), PipeError> {
    if (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(PipeError::config_validation(
        field,
        format!("{name} must be within [0, 1], got {value}"),
    ))
}

fn check_at_least(field: String, name: &str, value: i64, min: i64) -> Result<(), PipeError> {
    if value >= min {
        return Ok(());
    }
    Err(PipeError::config_validation(
        field,
        format!("{name} must be >= {min}, got {value}"),
    ))
}

/// 校验各阶段参数
fn validate_stage_params(path: &str, stages: &[StageSpec]) -> Result<(), PipeError> {
    for (i, stage) in stages.iter().enumerate() {
        let at = |field: &str| format!("{path}[{i}].{field}");
        match stage {
            StageSpec::WindowMean { window }
            | StageSpec::WindowMin { window }
            | StageSpec::WindowMax { window } => check_at_least(at("window"), "window", *window, 1)?,
            StageSpec::WindowQuantile { window, quantile } => {
                check_at_least(at("window"), "window", *window, 1)?;
                check_unit_interval(at("quantile"), "quantile", *quantile)?;
            }
            StageSpec::ExpMean { alpha } => check_unit_interval(at("alpha"), "alpha", *alpha)?,
            StageSpec::Stddev { ddof } => check_at_least(at("ddof"), "ddof", *ddof, 0)?,
            StageSpec::Tail { n } => check_at_least(at("n"), "n", *n, 0)?,
            StageSpec::SizeRandSample { size } => check_at_least(at("size"), "size", *size, 1)?,
            StageSpec::Slice { start, stop, step } => {
                if start.is_none() && stop.is_none() && step.is_none() {
                    return Err(PipeError::config_validation(
                        format!("{path}[{i}]"),
                        "slice needs at least one of start, stop, step",
                    ));
                }
                if let Some(start) = start {
                    check_at_least(at("start"), "start", *start, 0)?;
                }
                if let Some(stop) = stop {
                    check_at_least(at("stop"), "stop", *stop, 0)?;
                }
                if let Some(step) = step {
                    check_at_least(at("step"), "step", *step, 1)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// 校验 fan 分支
fn validate_fans(path: &str, stages: &[StageSpec]) -> Result<(), PipeError> {
    for (i, stage) in stages.iter().enumerate() {
        let StageSpec::Fan { branches } = stage else {
            continue;
        };
        let field = format!("{path}[{i}].branches");
        if branches.len() < 2 {
            return Err(PipeError::config_validation(
                field,
                format!("a fan needs at least 2 branches, got {}", branches.len()),
            ));
        }
        if let Some(j) = branches.iter().position(Vec::is_empty) {
            return Err(PipeError::config_validation(
                format!("{field}[{j}]"),
                "fan branch cannot be empty",
            ));
        }
        let first = branch_category(&branches[0]);
        for (j, branch) in branches.iter().enumerate().skip(1) {
            let category = branch_category(branch);
            if category != first {
                return Err(PipeError::config_validation(
                    format!("{field}[{j}]"),
                    format!("all fan branches must share a category: {first} vs {category}"),
                ));
            }
        }
    }
    Ok(())
}

/// 校验类别顺序: sink 之后不得再有阶段
fn validate_sequencing(path: &str, stages: &[StageSpec]) -> Result<(), PipeError> {
    let last = stages.len().saturating_sub(1);
    for (i, stage) in stages.iter().enumerate() {
        if i < last && stage.category() == PipeCategory::Sink {
            return Err(PipeError::config_validation(
                format!("{path}[{i}]"),
                format!(
                    "'{}' is a sink and must be the last stage",
                    stage.op_name()
                ),
            ));
        }
    }
    Ok(())
}
