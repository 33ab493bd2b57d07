//! PipelineBlueprint - Config Loader 输出
//!
//! 以声明式方式描述一条管道：可选的数据源 + 有序的阶段列表（可嵌套扇出）。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// 管道类别
///
/// Source 没有上游，Sink 除结果提取外没有下游，Middle 两侧皆可组合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeCategory {
    Source,
    Middle,
    Sink,
    Frozen,
}

impl fmt::Display for PipeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Middle => "middle",
            Self::Sink => "sink",
            Self::Frozen => "frozen",
        };
        f.write_str(name)
    }
}

/// 完整的管道配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    /// 管道名称 (用于日志与指标标签)
    #[serde(default = "default_name")]
    pub name: String,

    /// 随机种子 (window_quantile 的 treap 优先级)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// 数据源 (可选；缺省时由 CLI 输入提供)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,

    /// 阶段列表
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

fn default_name() -> String {
    "pipeline".to_string()
}

impl PipelineBlueprint {
    /// 最后一个阶段的类别
    pub fn terminal_category(&self) -> Option<PipeCategory> {
        self.stages.last().map(StageSpec::category)
    }

    /// 是否以 sink 结尾
    pub fn ends_in_sink(&self) -> bool {
        self.terminal_category() == Some(PipeCategory::Sink)
    }
}

/// 数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// 固定序列回放
    Values { values: Vec<Value> },
    /// 整数区间 [start, stop)
    Range {
        #[serde(default)]
        start: i64,
        stop: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
}

fn default_step() -> i64 {
    1
}

/// 类型转换目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Int,
    Float,
    Str,
    Bool,
}

/// 单值转换或按元组字段转换
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CastSpec {
    One(CastType),
    Fields(Vec<CastType>),
}

/// 按下标选取：单个下标，或组成元组的一组下标 (负数从末尾数)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    One(i64),
    Many(Vec<i64>),
}

/// 阶段配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StageSpec {
    // ===== 过滤器 =====
    Relay,
    Enumerate {
        #[serde(default)]
        start: i64,
    },
    Skip {
        n: i64,
    },
    Slice {
        #[serde(default)]
        start: Option<i64>,
        #[serde(default)]
        stop: Option<i64>,
        #[serde(default)]
        step: Option<i64>,
    },
    Tail {
        n: i64,
    },
    Prepend {
        value: Value,
    },
    Append {
        value: Value,
    },
    CumSum,
    CumMean,
    ExpMean {
        alpha: f64,
    },
    FromValue {
        value: Value,
        #[serde(default = "default_true")]
        inclusive: bool,
    },
    ToValue {
        value: Value,
        #[serde(default = "default_true")]
        inclusive: bool,
    },
    Cast {
        to: CastSpec,
    },
    SplitStr {
        #[serde(default = "default_delimiter")]
        delimiter: String,
    },
    Grep {
        pattern: String,
    },
    SelectInds {
        inds: Selection,
    },
    Trace {
        #[serde(default = "default_true")]
        enumerate: bool,
    },

    // ===== 窗口 =====
    WindowMean {
        window: i64,
    },
    WindowMin {
        window: i64,
    },
    WindowMax {
        window: i64,
    },
    WindowQuantile {
        window: i64,
        #[serde(default = "default_quantile")]
        quantile: f64,
    },

    // ===== 汇聚 =====
    Sum,
    Count,
    Nth {
        n: i64,
    },
    ToList,
    Mean,
    Stddev {
        #[serde(default = "default_ddof")]
        ddof: i64,
    },
    Min,
    Max,
    Constant {
        value: Value,
    },
    Last,
    ToDict,
    SizeRandSample {
        size: i64,
    },

    // ===== 扇出 =====
    /// 并行分支，经 split/join 汇合为元组
    Fan { branches: Vec<Vec<StageSpec>> },
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quantile() -> f64 {
    0.5
}

fn default_ddof() -> i64 {
    1
}

impl StageSpec {
    /// 配置中的算子名 (与 `op` 字段一致)
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Enumerate { .. } => "enumerate",
            Self::Skip { .. } => "skip",
            Self::Slice { .. } => "slice",
            Self::Tail { .. } => "tail",
            Self::Prepend { .. } => "prepend",
            Self::Append { .. } => "append",
            Self::CumSum => "cum_sum",
            Self::CumMean => "cum_mean",
            Self::ExpMean { .. } => "exp_mean",
            Self::FromValue { .. } => "from_value",
            Self::ToValue { .. } => "to_value",
            Self::Cast { .. } => "cast",
            Self::SplitStr { .. } => "split_str",
            Self::Grep { .. } => "grep",
            Self::SelectInds { .. } => "select_inds",
            Self::Trace { .. } => "trace",
            Self::WindowMean { .. } => "window_mean",
            Self::WindowMin { .. } => "window_min",
            Self::WindowMax { .. } => "window_max",
            Self::WindowQuantile { .. } => "window_quantile",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Nth { .. } => "nth",
            Self::ToList => "to_list",
            Self::Mean => "mean",
            Self::Stddev { .. } => "stddev",
            Self::Min => "min",
            Self::Max => "max",
            Self::Constant { .. } => "constant",
            Self::Last => "last",
            Self::ToDict => "to_dict",
            Self::SizeRandSample { .. } => "size_rand_sample",
            Self::Fan { .. } => "fan",
        }
    }

    /// 阶段类别；扇出取第一个分支末尾阶段的类别
    pub fn category(&self) -> PipeCategory {
        match self {
            Self::Sum
            | Self::Count
            | Self::Nth { .. }
            | Self::ToList
            | Self::Mean
            | Self::Stddev { .. }
            | Self::Min
            | Self::Max
            | Self::Constant { .. }
            | Self::Last
            | Self::ToDict
            | Self::SizeRandSample { .. } => PipeCategory::Sink,
            Self::Fan { branches } => branches
                .first()
                .map(|b| branch_category(b.as_slice()))
                .unwrap_or(PipeCategory::Middle),
            _ => PipeCategory::Middle,
        }
    }
}

/// 一个分支 (阶段序列) 的类别
pub fn branch_category(stages: &[StageSpec]) -> PipeCategory {
    if stages.iter().any(|s| s.category() == PipeCategory::Sink) {
        PipeCategory::Sink
    } else {
        PipeCategory::Middle
    }
}
