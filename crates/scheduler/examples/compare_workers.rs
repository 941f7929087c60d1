use anyhow::Result;
use prettytable::{row, Table};
use scheduler::benchmark::ScalingStudy;
use scheduler::config::GridConfig;
use scheduler::kernel::Mandelbrot;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// 共享内存模式下比较不同线程数的扩展性
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = GridConfig {
        width: 800,
        height: 600,
        max_iterations: 256,
        ..GridConfig::default()
    };
    println!("=== 线程数扩展性：{}x{}，{} 次迭代 ===", config.width, config.height, config.max_iterations);

    let report = ScalingStudy::sweep(&config, Arc::new(Mandelbrot), &[2, 4, 8, 16])?;

    let mut table = Table::new();
    table.add_row(row!["线程", "墙钟(ms)", "最快(ms)", "最慢(ms)", "不均衡", "加速比", "效率"]);
    for run in &report.runs {
        table.add_row(row![
            run.worker_count,
            format!("{:.2}", run.total_wall_time.as_secs_f64() * 1000.0),
            format!("{:.2}", run.min_execution_time.as_secs_f64() * 1000.0),
            format!("{:.2}", run.max_execution_time.as_secs_f64() * 1000.0),
            format!("{:.1}%", run.imbalance * 100.0),
            format!("{:.2}x", run.speedup.unwrap_or(1.0)),
            format!("{:.1}%", run.efficiency.unwrap_or(1.0) * 100.0)
        ]);
    }
    table.printstd();

    // 静态按行划分时，集合中心附近的行最贵，中间的 worker 通常最慢
    if let Some(worst) = report.runs.iter().max_by(|a, b| a.imbalance.total_cmp(&b.imbalance)) {
        println!("\n不均衡最严重：{} 个线程，{:.1}%", worst.worker_count, worst.imbalance * 100.0);
    }
    Ok(())
}
