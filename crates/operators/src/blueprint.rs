//! PipelineBlueprint -> Pipe
//!
//! 将声明式蓝图逐阶段实例化为可组合的 [`Pipe`]。

use contracts::{PipeError, PipeResult, PipelineBlueprint, SourceSpec, StageSpec};
use pipe_core::{split, Pipe};
use tracing::debug;

use crate::{filters, sinks, sources, windows};

/// 蓝图中的阶段序列 (不含数据源)
///
/// # Errors
/// 阶段参数非法或相邻阶段无法组合时返回 `InvalidParam`。
pub fn build_pipe(blueprint: &PipelineBlueprint) -> PipeResult<Pipe> {
    let pipe = build_stages(&blueprint.stages, blueprint.seed)?;
    debug!(
        pipeline = %blueprint.name,
        stages = blueprint.stages.len(),
        category = %pipe.category(),
        "pipe built from blueprint"
    );
    Ok(pipe)
}

/// 数据源配置 -> source pipe
pub fn build_source(spec: &SourceSpec) -> PipeResult<Pipe> {
    match spec {
        SourceSpec::Values { values } => Ok(sources::source(values.clone())),
        SourceSpec::Range { start, stop, step } => sources::range(*start, *stop, *step),
    }
}

/// 按顺序串联一组阶段
pub fn build_stages(stages: &[StageSpec], seed: Option<u64>) -> PipeResult<Pipe> {
    let mut built = stages.iter().map(|s| build_stage(s, seed));
    let first = built.next().ok_or_else(|| {
        PipeError::invalid_param("stages", "[]", "a pipeline needs at least one stage")
    })??;
    built.try_fold(first, |acc, next| acc.then(next?))
}

fn non_negative(param: &str, value: i64) -> PipeResult<u64> {
    u64::try_from(value)
        .map_err(|_| PipeError::invalid_param(param, value, "must not be negative"))
}

fn optional_bound(param: &str, value: Option<i64>) -> PipeResult<Option<u64>> {
    value.map(|v| non_negative(param, v)).transpose()
}

/// 单个阶段
pub fn build_stage(spec: &StageSpec, seed: Option<u64>) -> PipeResult<Pipe> {
    let pipe = match spec {
        // ===== 过滤器 =====
        StageSpec::Relay => filters::relay(),
        StageSpec::Enumerate { start } => filters::enumerate(*start),
        StageSpec::Skip { n } => filters::skip(*n),
        StageSpec::Slice { start, stop, step } => filters::slice(
            optional_bound("start", *start)?,
            optional_bound("stop", *stop)?,
            optional_bound("step", *step)?,
        )?,
        StageSpec::Tail { n } => filters::tail(non_negative("n", *n)? as usize),
        StageSpec::Prepend { value } => filters::prepend(value.clone()),
        StageSpec::Append { value } => filters::append(value.clone()),
        StageSpec::CumSum => filters::cum_sum(),
        StageSpec::CumMean => filters::cum_mean(),
        StageSpec::ExpMean { alpha } => filters::exp_mean(*alpha)?,
        StageSpec::FromValue { value, inclusive } => filters::from_(value.clone(), *inclusive),
        StageSpec::ToValue { value, inclusive } => filters::to(value.clone(), *inclusive),
        StageSpec::Cast { to } => filters::cast(to.clone()),
        StageSpec::SplitStr { delimiter } => filters::split_str(delimiter),
        StageSpec::Grep { pattern } => filters::grep(pattern),
        StageSpec::SelectInds { inds } => filters::select_inds(inds.clone()),
        StageSpec::Trace { enumerate } => filters::trace(*enumerate),

        // ===== 窗口 =====
        StageSpec::WindowMean { window } => windows::window_mean(*window)?,
        StageSpec::WindowMin { window } => windows::window_min(*window)?,
        StageSpec::WindowMax { window } => windows::window_max(*window)?,
        StageSpec::WindowQuantile { window, quantile } => {
            windows::window_quantile(*window, *quantile, seed)?
        }

        // ===== 汇聚 =====
        StageSpec::Sum => sinks::sum(),
        StageSpec::Count => sinks::count(),
        StageSpec::Nth { n } => sinks::nth(*n),
        StageSpec::ToList => sinks::to_list(),
        StageSpec::Mean => sinks::mean(),
        StageSpec::Stddev { ddof } => sinks::stddev(non_negative("ddof", *ddof)?),
        StageSpec::Min => sinks::min(),
        StageSpec::Max => sinks::max(),
        StageSpec::Constant { value } => sinks::constant(value.clone()),
        StageSpec::Last => sinks::last(),
        StageSpec::ToDict => sinks::to_dict(),
        StageSpec::SizeRandSample { size } => {
            sinks::size_rand_sample(non_negative("size", *size)? as usize, seed)?
        }

        // ===== 扇出 =====
        StageSpec::Fan { branches } => split(
            branches
                .iter()
                .map(|b| build_stages(b, seed))
                .collect::<PipeResult<Vec<_>>>()?,
        )?,
    };
    Ok(pipe)
}
