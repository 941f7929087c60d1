// task_executor.rs
// 任务执行器：对一个分区的所有单元格调用核函数，写入该分区独占的行，并记录自身的开始/结束时间。
use crate::config::GridConfig;
use crate::data_preparator::DataPreparator;
use crate::error::{Error, Result};
use crate::kernel::EscapeKernel;
use crate::types::{Partition, WorkerResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct TaskExecutor<K> {
    kernel: Arc<K>,
    preparator: DataPreparator,
    max_iterations: u32,
}

impl<K> Clone for TaskExecutor<K> {
    fn clone(&self) -> Self {
        Self {
            kernel: Arc::clone(&self.kernel),
            preparator: self.preparator.clone(),
            max_iterations: self.max_iterations,
        }
    }
}

impl<K: EscapeKernel> TaskExecutor<K> {
    pub fn new(kernel: Arc<K>, config: &GridConfig) -> Self {
        Self {
            kernel,
            preparator: DataPreparator::new(config.width, config.height, config.viewport),
            max_iterations: config.max_iterations,
        }
    }

    pub fn width(&self) -> usize {
        self.preparator.width
    }

    /// 扫描 partition 的全部行，结果写入 `out`（长度必须为 行数 * width）。
    ///
    /// `epoch` 是本次运行的时间起点，`created_at` 是 worker 被创建的时刻，
    /// 两者用于计算时间戳与等待时间。核函数返回超出 max_iterations 的值视为 worker 失败。
    pub fn execute(
        &self,
        partition: &Partition,
        out: &mut [u32],
        epoch: Instant,
        created_at: Instant,
    ) -> Result<WorkerResult> {
        let started = Instant::now();
        let width = self.preparator.width;

        if out.len() != partition.cell_count(width) {
            return Err(Error::worker_failure(
                partition.worker_id,
                format!(
                    "输出区域大小 {} 与分区大小 {} 不一致",
                    out.len(),
                    partition.cell_count(width)
                ),
            ));
        }

        let reals = self.preparator.column_reals();
        let mut max_seen = 0u32;
        for (row, row_cells) in partition.rows().zip(out.chunks_mut(width)) {
            let im = self.preparator.imag(row);
            for (cell, &re) in row_cells.iter_mut().zip(reals.iter()) {
                let value = self.kernel.escape_time(re, im, self.max_iterations);
                max_seen = max_seen.max(value);
                *cell = value;
            }
        }

        let finished = Instant::now();

        if max_seen > self.max_iterations {
            return Err(Error::worker_failure(
                partition.worker_id,
                format!(
                    "核函数返回 {}，超过 max_iterations {}",
                    max_seen, self.max_iterations
                ),
            ));
        }

        let result = WorkerResult {
            worker_id: partition.worker_id,
            start_row: partition.start_row,
            end_row: partition.end_row,
            cells: out.len(),
            start_timestamp: started.duration_since(epoch),
            end_timestamp: finished.duration_since(epoch),
            execution_duration: finished.duration_since(started),
            wait_duration: started.duration_since(created_at),
            response_duration: finished.duration_since(created_at),
        };
        debug!(
            worker_id = result.worker_id,
            rows = partition.row_count(),
            execution_ms = result.execution_duration.as_secs_f64() * 1000.0,
            "worker 完成"
        );
        Ok(result)
    }

    /// 与 execute 相同，但把核函数的 panic 转换为 WorkerFailure
    pub fn execute_guarded(
        &self,
        partition: &Partition,
        out: &mut [u32],
        epoch: Instant,
        created_at: Instant,
    ) -> Result<WorkerResult> {
        match panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(partition, out, epoch, created_at)
        })) {
            Ok(result) => result,
            Err(payload) => Err(Error::worker_failure(
                partition.worker_id,
                format!("核函数 panic: {}", panic_message(payload.as_ref())),
            )),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Mandelbrot;

    fn small_config() -> GridConfig {
        GridConfig {
            width: 20,
            height: 10,
            max_iterations: 50,
            worker_count: 2,
            ..GridConfig::default()
        }
    }

    #[test]
    fn test_task_executor() {
        let config = small_config();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let partition = Partition {
            worker_id: 1,
            start_row: 5,
            end_row: 10,
        };
        let mut out = vec![u32::MAX; partition.cell_count(config.width)];
        let epoch = Instant::now();
        let result = executor.execute(&partition, &mut out, epoch, epoch).unwrap();

        assert_eq!(result.worker_id, 1);
        assert_eq!(result.cells, 100);
        assert!(out.iter().all(|&v| v <= 50));
        assert!(result.end_timestamp >= result.start_timestamp);
        assert_eq!(
            result.execution_duration,
            result.end_timestamp - result.start_timestamp
        );
        assert!(result.response_duration >= result.execution_duration);
    }

    #[test]
    fn test_values_match_direct_kernel_calls() {
        let config = small_config();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let prep = DataPreparator::new(config.width, config.height, config.viewport);
        let partition = Partition {
            worker_id: 0,
            start_row: 3,
            end_row: 4,
        };
        let mut out = vec![0; config.width];
        let now = Instant::now();
        executor.execute(&partition, &mut out, now, now).unwrap();
        for col in 0..config.width {
            let (x, y) = prep.point(3, col);
            assert_eq!(out[col], Mandelbrot.escape_time(x, y, 50));
        }
    }

    #[test]
    fn test_wrong_output_size_fails() {
        let config = small_config();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let partition = Partition {
            worker_id: 0,
            start_row: 0,
            end_row: 2,
        };
        let mut out = vec![0; 5];
        let now = Instant::now();
        assert!(matches!(
            executor.execute(&partition, &mut out, now, now),
            Err(Error::WorkerFailure { worker_id: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_range_kernel_value_fails() {
        let config = small_config();
        let bad = |_re: f64, _im: f64, max: u32| max + 1;
        let executor = TaskExecutor::new(Arc::new(bad), &config);
        let partition = Partition {
            worker_id: 3,
            start_row: 0,
            end_row: 1,
        };
        let mut out = vec![0; config.width];
        let now = Instant::now();
        assert!(matches!(
            executor.execute(&partition, &mut out, now, now),
            Err(Error::WorkerFailure { worker_id: 3, .. })
        ));
    }

    #[test]
    fn test_kernel_panic_becomes_worker_failure() {
        let config = small_config();
        let panicking = |_re: f64, _im: f64, _max: u32| -> u32 { panic!("boom") };
        let executor = TaskExecutor::new(Arc::new(panicking), &config);
        let partition = Partition {
            worker_id: 2,
            start_row: 0,
            end_row: 1,
        };
        let mut out = vec![0; config.width];
        let now = Instant::now();
        match executor.execute_guarded(&partition, &mut out, now, now) {
            Err(Error::WorkerFailure { worker_id, reason }) => {
                assert_eq!(worker_id, 2);
                assert!(reason.contains("boom"));
            }
            other => panic!("expected WorkerFailure, got {:?}", other),
        }
    }
}
