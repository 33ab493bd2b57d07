//! 管道运行指标收集模块
//!
//! 基于 RunReport 收集和统计管道的运行指标。

use contracts::{RunOutcome, RunReport};
use metrics::{counter, gauge, histogram};

/// 从 RunReport 记录指标
///
/// 每次驱动一条 Source → Sink 管道结束后调用。
pub fn record_run(report: &RunReport) {
    counter!(
        "dagpipe_runs_total",
        "pipeline" => report.pipeline.clone(),
        "outcome" => report.outcome.as_str()
    )
    .increment(1);

    counter!("dagpipe_ticks_total", "pipeline" => report.pipeline.clone())
        .increment(report.ticks);

    histogram!("dagpipe_run_duration_ms", "pipeline" => report.pipeline.clone())
        .record(report.duration_ms);
}

/// 记录冻结 sink 的一次喂入
pub fn record_frozen_feed(name: &str) {
    counter!("dagpipe_frozen_feeds_total", "sink" => name.to_string()).increment(1);
}

/// 记录冻结 sink 解冻
pub fn record_thaw(name: &str, success: bool) {
    let status = if success { "success" } else { "no_result" };
    counter!(
        "dagpipe_thaws_total",
        "sink" => name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录 join 的最大分支积压
pub fn record_join_backlog(depth: usize) {
    gauge!("dagpipe_join_backlog").set(depth as f64);
}

/// 记录动态子管道挂载
pub fn record_sub_pipe_attached() {
    counter!("dagpipe_sub_pipes_attached_total").increment(1);
}

/// 运行指标聚合器
///
/// 在内存中聚合多次运行，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RunMetricsAggregator {
    /// 总运行数
    pub total_runs: u64,

    /// 成功产出结果的运行数
    pub completed: u64,

    /// 无结果的运行数
    pub no_result: u64,

    /// 失败的运行数
    pub failed: u64,

    /// 每次运行的 tick 数统计
    pub tick_stats: RunningStats,

    /// 运行耗时统计 (毫秒)
    pub duration_stats: RunningStats,
}

impl RunMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, report: &RunReport) {
        self.total_runs += 1;
        match report.outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::NoResult => self.no_result += 1,
            RunOutcome::Failed => self.failed += 1,
        }
        self.tick_stats.push(report.ticks as f64);
        self.duration_stats.push(report.duration_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> RunsSummary {
        RunsSummary {
            total_runs: self.total_runs,
            completed: self.completed,
            no_result: self.no_result,
            failed: self.failed,
            success_rate: if self.total_runs > 0 {
                self.completed as f64 / self.total_runs as f64 * 100.0
            } else {
                0.0
            },
            ticks: StatsSummary::from(&self.tick_stats),
            duration_ms: StatsSummary::from(&self.duration_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 运行摘要
#[derive(Debug, Clone, Default)]
pub struct RunsSummary {
    pub total_runs: u64,
    pub completed: u64,
    pub no_result: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub ticks: StatsSummary,
    pub duration_ms: StatsSummary,
}

impl std::fmt::Display for RunsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Run Summary ===")?;
        writeln!(
            f,
            "Runs: {} (completed {}, {:.2}%)",
            self.total_runs, self.completed, self.success_rate
        )?;
        writeln!(f, "No result: {}", self.no_result)?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Ticks per run: {}", self.ticks)?;
        writeln!(f, "Duration (ms): {}", self.duration_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome, ticks: u64, duration_ms: f64) -> RunReport {
        RunReport {
            pipeline: "test".to_string(),
            ticks,
            duration_ms,
            outcome,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RunMetricsAggregator::new();
        aggregator.update(&report(RunOutcome::Completed, 5, 1.5));
        aggregator.update(&report(RunOutcome::NoResult, 1, 0.5));
        aggregator.update(&report(RunOutcome::Failed, 2, 0.1));

        assert_eq!(aggregator.total_runs, 3);
        assert_eq!(aggregator.completed, 1);
        assert_eq!(aggregator.no_result, 1);
        assert_eq!(aggregator.failed, 1);
        assert_eq!(aggregator.tick_stats.count(), 3);

        aggregator.reset();
        assert_eq!(aggregator.total_runs, 0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RunMetricsAggregator::new();
        aggregator.update(&report(RunOutcome::Completed, 4, 2.0));
        aggregator.update(&report(RunOutcome::Completed, 6, 4.0));

        let output = aggregator.summary().to_string();
        assert!(output.contains("Runs: 2"), "got: {output}");
        assert!(output.contains("100.00%"), "got: {output}");
        assert!(output.contains("mean=5.000"), "got: {output}");
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_run(&report(RunOutcome::Completed, 1, 0.1));
        record_join_backlog(3);
        record_thaw("s", true);
    }
}
