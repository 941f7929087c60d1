use anyhow::Result;
use prettytable::{row, Table};
use scheduler::benchmark::ScalingStudy;
use scheduler::config::GridConfig;
use scheduler::kernel::Mandelbrot;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// 单节点多线程与模拟集群（每个节点一个线程，只通过屏障和 gather 通信）的对比
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GridConfig {
        width: 640,
        height: 480,
        max_iterations: 200,
        worker_count: 4,
        ..GridConfig::default()
    };
    let report = ScalingStudy::compare_deployments(&config, Arc::new(Mandelbrot), &[2, 4, 8])?;

    let mut table = Table::new();
    table.add_row(row!["配置", "节点/线程", "墙钟(ms)", "平均响应(ms)", "不均衡(相对均值)", "加速比", "效率"]);
    for (i, run) in report.runs.iter().enumerate() {
        let name = if i == 0 {
            "单节点".to_string()
        } else {
            format!("集群 {} 节点", run.worker_count)
        };
        table.add_row(row![
            name,
            run.worker_count,
            format!("{:.2}", run.total_wall_time.as_secs_f64() * 1000.0),
            format!("{:.2}", run.mean_response_time.as_secs_f64() * 1000.0),
            format!("{:.1}%", run.imbalance_vs_mean * 100.0),
            format!("{:.2}x", run.speedup.unwrap_or(1.0)),
            format!("{:.1}%", run.efficiency.unwrap_or(0.0) * 100.0)
        ]);
    }
    table.printstd();
    Ok(())
}
