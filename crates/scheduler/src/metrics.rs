// metrics.rs
// 指标聚合器：把所有 worker 的计时结果与协调器测得的墙钟区间合并为吞吐量、加速比、效率与负载不均衡等指标。
use crate::config::DeploymentMode;
use crate::error::{Error, Result};
use crate::types::{WallSpan, WorkerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

/// 单 worker 运行记录的墙钟时间，用于计算加速比与效率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub wall_time: Duration,
}

impl Baseline {
    pub fn new(wall_time: Duration) -> Self {
        Self { wall_time }
    }

    /// 只接受单 worker 的运行作为基准
    pub fn from_metrics(metrics: &RunMetrics) -> Result<Self> {
        if metrics.worker_count != 1 {
            return Err(Error::InvalidConfiguration(format!(
                "基准必须来自单 worker 运行，实际为 {} 个 worker",
                metrics.worker_count
            )));
        }
        Ok(Self::new(metrics.total_wall_time))
    }
}

/// 一次运行的派生指标，计算后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub mode: DeploymentMode,
    pub worker_count: usize,
    pub total_cells: usize,
    pub total_wall_time: Duration,
    /// 单元格/秒
    pub throughput: f64,
    pub min_execution_time: Duration,
    pub max_execution_time: Duration,
    pub mean_execution_time: Duration,
    pub mean_wait_time: Duration,
    pub mean_response_time: Duration,
    /// (max - min) / max
    pub imbalance: f64,
    /// (max - min) / mean
    pub imbalance_vs_mean: f64,
    /// mean_execution * worker_count / total_wall_time
    pub parallel_utilization: f64,
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
    /// 按 worker_id 排序
    pub workers: Vec<WorkerResult>,
}

/// 聚合的全部输入
#[derive(Debug, Clone)]
pub struct AggregationInput {
    pub run_id: Uuid,
    pub mode: DeploymentMode,
    pub results: Vec<WorkerResult>,
    pub wall: WallSpan,
    pub total_cells: usize,
    pub baseline: Option<Baseline>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// 纯函数：没有 IO，也不读取任何全局状态
    pub fn aggregate(&self, input: AggregationInput) -> Result<RunMetrics> {
        let AggregationInput {
            run_id,
            mode,
            mut results,
            wall,
            total_cells,
            baseline,
        } = input;

        if results.is_empty() {
            return Err(Error::InsufficientData(
                "没有任何已完成的 worker 结果可聚合".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(results.len());
        if let Some(dup) = results.iter().find(|r| !seen.insert(r.worker_id)) {
            return Err(Error::InsufficientData(format!(
                "worker {} 的结果重复出现",
                dup.worker_id
            )));
        }
        results.sort_by_key(|r| r.worker_id);

        let worker_count = results.len();
        let n = worker_count as u32;
        let total_wall_time = wall.duration();
        let wall_secs = total_wall_time.as_secs_f64();

        let executions = results.iter().map(|r| r.execution_duration);
        let min_execution_time = executions.clone().min().unwrap_or_default();
        let max_execution_time = executions.clone().max().unwrap_or_default();
        let mean_execution_time = executions.sum::<Duration>() / n;
        let mean_wait_time = results.iter().map(|r| r.wait_duration).sum::<Duration>() / n;
        let mean_response_time =
            results.iter().map(|r| r.response_duration).sum::<Duration>() / n;

        let spread = (max_execution_time - min_execution_time).as_secs_f64();
        let imbalance = ratio(spread, max_execution_time.as_secs_f64());
        let imbalance_vs_mean = ratio(spread, mean_execution_time.as_secs_f64());
        let throughput = ratio(total_cells as f64, wall_secs);
        let parallel_utilization =
            ratio(mean_execution_time.as_secs_f64() * worker_count as f64, wall_secs);

        let speedup = baseline.map(|b| ratio(b.wall_time.as_secs_f64(), wall_secs));
        let efficiency = speedup.map(|s| s / worker_count as f64);

        Ok(RunMetrics {
            run_id,
            mode,
            worker_count,
            total_cells,
            total_wall_time,
            throughput,
            min_execution_time,
            max_execution_time,
            mean_execution_time,
            mean_wait_time,
            mean_response_time,
            imbalance,
            imbalance_vs_mean,
            parallel_utilization,
            speedup,
            efficiency,
            workers: results,
        })
    }
}

// 分母为0时返回0，避免 NaN / inf
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
