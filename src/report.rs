// report.rs
// 把运行指标打印为表格，并可选地写出为 JSON 文件。
use anyhow::{Context, Result};
use prettytable::{row, Table};
use scheduler::config::GridConfig;
use scheduler::metrics::RunMetrics;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// 写出到磁盘的一次扩展性测试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsFile {
    pub study_id: Uuid,
    pub config: GridConfig,
    pub runs: Vec<RunMetrics>,
}

impl MetricsFile {
    pub fn new(config: GridConfig, runs: Vec<RunMetrics>) -> Self {
        Self {
            study_id: Uuid::new_v4(),
            config,
            runs,
        }
    }
}

fn millis(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64() * 1000.0)
}

fn optional(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{:.2}{}", v, suffix))
        .unwrap_or_else(|| "-".to_string())
}

/// 每个 worker 一行：负责的行、执行/等待/响应时间
pub fn worker_table(metrics: &RunMetrics) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Worker", "行区间", "单元格", "执行(ms)", "等待(ms)", "响应(ms)"]);
    for worker in &metrics.workers {
        table.add_row(row![
            worker.worker_id,
            format!("{}..{}", worker.start_row, worker.end_row),
            worker.cells,
            millis(worker.execution_duration),
            millis(worker.wait_duration),
            millis(worker.response_duration)
        ]);
    }
    table
}

/// 每次运行一行的汇总表
pub fn summary_table(runs: &[RunMetrics]) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        "模式",
        "Workers",
        "墙钟(ms)",
        "吞吐(单元格/s)",
        "不均衡",
        "利用率",
        "加速比",
        "效率"
    ]);
    for run in runs {
        table.add_row(row![
            format!("{:?}", run.mode),
            run.worker_count,
            millis(run.total_wall_time),
            format!("{:.0}", run.throughput),
            format!("{:.1}%", run.imbalance * 100.0),
            format!("{:.2}", run.parallel_utilization),
            optional(run.speedup, "x"),
            optional(run.efficiency.map(|e| e * 100.0), "%")
        ]);
    }
    table
}

pub fn write_metrics_json(path: impl AsRef<Path>, metrics: &MetricsFile) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("无法创建指标文件 {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), metrics)
        .with_context(|| format!("写入指标文件 {} 失败", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::benchmark::ScalingStudy;
    use scheduler::config::GridConfig;
    use scheduler::kernel::Mandelbrot;
    use std::sync::Arc;

    fn config() -> GridConfig {
        GridConfig {
            width: 16,
            height: 8,
            max_iterations: 20,
            ..GridConfig::default()
        }
    }

    fn runs() -> Vec<RunMetrics> {
        ScalingStudy::sweep(&config(), Arc::new(Mandelbrot), &[2]).unwrap().runs
    }

    #[test]
    fn test_tables_have_one_row_per_entry() {
        let runs = runs();
        assert_eq!(summary_table(&runs).len(), runs.len() + 1);
        assert_eq!(worker_table(&runs[1]).len(), 3);
    }

    #[test]
    fn test_metrics_json_written() {
        let file = MetricsFile::new(config(), runs());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        write_metrics_json(&path, &file).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: MetricsFile = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.study_id, file.study_id);
        assert_eq!(parsed.config, file.config);
        assert_eq!(parsed.runs.len(), 2);
        assert_eq!(parsed.runs[0].run_id, file.runs[0].run_id);
    }

    #[test]
    fn test_optional_formatting() {
        assert_eq!(optional(None, "x"), "-");
        assert_eq!(optional(Some(1.5), "x"), "1.50x");
    }
}
