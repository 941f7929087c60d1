// benchmark.rs
// 扩展性测试：对不同 worker 数量或部署方式依次运行协调器，并以单 worker 或单节点运行为基准计算加速比与效率。
use crate::config::{DeploymentMode, GridConfig};
use crate::error::{Error, Result};
use crate::kernel::EscapeKernel;
use crate::metrics::{Baseline, RunMetrics};
use crate::scheduler::ExecutionCoordinator;
use std::sync::Arc;
use tracing::info;

/// 一组运行的指标，第一项是基准运行
#[derive(Debug, Clone)]
pub struct ScalingReport {
    pub runs: Vec<RunMetrics>,
}

impl ScalingReport {
    pub fn baseline(&self) -> Option<&RunMetrics> {
        self.runs.first()
    }

    /// 基准之后的各次运行
    pub fn comparisons(&self) -> &[RunMetrics] {
        self.runs.get(1..).unwrap_or(&[])
    }
}

pub struct ScalingStudy;

impl ScalingStudy {
    /// 共享内存模式下的 worker 数量扫描。单 worker 运行总是最先执行并作为基准，
    /// 列表中重复出现的数量只运行一次。
    pub fn sweep<K: EscapeKernel + 'static>(
        config: &GridConfig,
        kernel: Arc<K>,
        worker_counts: &[usize],
    ) -> Result<ScalingReport> {
        let mut config = config.clone();
        config.mode = DeploymentMode::SharedMemory;

        let mut base = run_once(config.with_participants(1), Arc::clone(&kernel), None)?;
        let baseline = Baseline::from_metrics(&base)?;
        base.speedup = Some(1.0);
        base.efficiency = Some(1.0);

        let mut runs = vec![base];
        let mut seen = vec![1];
        for &count in worker_counts {
            if seen.contains(&count) {
                continue;
            }
            seen.push(count);
            let metrics = run_once(config.with_participants(count), Arc::clone(&kernel), Some(baseline))?;
            runs.push(metrics);
        }
        Ok(ScalingReport { runs })
    }

    /// 单节点多线程运行与不同节点数的分布式运行对比，分布式运行的加速比相对于单节点运行
    pub fn compare_deployments<K: EscapeKernel + 'static>(
        config: &GridConfig,
        kernel: Arc<K>,
        node_counts: &[usize],
    ) -> Result<ScalingReport> {
        if node_counts.is_empty() {
            return Err(Error::InvalidConfiguration("至少需要一个节点数".to_string()));
        }
        let mut reference_config = config.clone();
        reference_config.mode = DeploymentMode::SharedMemory;
        let mut reference = run_once(reference_config, Arc::clone(&kernel), None)?;
        let baseline = Baseline::new(reference.total_wall_time);
        reference.speedup = Some(1.0);
        reference.efficiency = Some(1.0 / reference.worker_count as f64);

        let mut runs = vec![reference];
        for &nodes in node_counts {
            let mut cluster_config = config.clone();
            cluster_config.mode = DeploymentMode::MessagePassing;
            cluster_config.node_count = nodes;
            runs.push(run_once(cluster_config, Arc::clone(&kernel), Some(baseline))?);
        }
        Ok(ScalingReport { runs })
    }
}

fn run_once<K: EscapeKernel + 'static>(
    config: GridConfig,
    kernel: Arc<K>,
    baseline: Option<Baseline>,
) -> Result<RunMetrics> {
    let mut coordinator = ExecutionCoordinator::from_config(config, kernel)?;
    if let Some(baseline) = baseline {
        coordinator = coordinator.with_baseline(baseline);
    }
    let outcome = coordinator.run()?;
    info!(
        run_id = %outcome.run_id,
        mode = ?outcome.metrics.mode,
        workers = outcome.metrics.worker_count,
        speedup = ?outcome.metrics.speedup,
        "扩展性测试完成一次运行"
    );
    Ok(outcome.metrics)
}
