// main.rs
// 扩展性测试入口：mandelbrot-scheduling [config.json] [metrics.json]
mod report;

use anyhow::{Context, Result};
use scheduler::benchmark::ScalingStudy;
use scheduler::config::GridConfig;
use scheduler::kernel::Mandelbrot;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const WORKER_COUNTS: [usize; 4] = [1, 2, 4, 8];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => GridConfig::from_json_file(&path).with_context(|| format!("加载配置 {} 失败", path))?,
        None => GridConfig::default(),
    };
    let metrics_path = args.next();

    info!(
        width = config.width,
        height = config.height,
        max_iterations = config.max_iterations,
        "开始扩展性测试"
    );

    let mut counts: Vec<usize> = WORKER_COUNTS.to_vec();
    if !counts.contains(&config.worker_count) {
        counts.push(config.worker_count);
    }
    let report = ScalingStudy::sweep(&config, Arc::new(Mandelbrot), &counts)?;

    for run in &report.runs {
        println!("\n{} 个 worker (run {})", run.worker_count, run.run_id);
        report::worker_table(run).printstd();
    }
    println!("\n汇总");
    report::summary_table(&report.runs).printstd();

    if let Some(path) = metrics_path {
        let file = report::MetricsFile::new(config, report.runs);
        report::write_metrics_json(&path, &file)?;
        info!(path = %path, "指标已写出");
    }
    Ok(())
}
