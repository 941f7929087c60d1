// shared_memory.rs
// 共享内存后端：网格按分区切成互不相交的行块，每个行块移交给一个线程独占写入；
// 唯一的锁是结果收集器，每个 worker 完成时追加一次。
use crate::backend::{BackendOutput, ExecutionBackend, RunJob};
use crate::config::{DeploymentMode, GridConfig};
use crate::error::{Error, Result};
use crate::field::{EscapeField, RowBlock};
use crate::kernel::EscapeKernel;
use crate::scheduler::ResultCollector;
use crate::task_executor::panic_message;
use crate::task_splitter::PartitionPlan;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

type WorkerHandle = (usize, JoinHandle<Result<RowBlock>>);

#[derive(Default)]
pub struct SharedMemoryBackend {
    dimensions: Option<(usize, usize)>,
    pending: Vec<RowBlock>,
    dispatched: bool,
    handles: Vec<WorkerHandle>,
    blocks: Vec<RowBlock>,
    collector: ResultCollector,
    expected: usize,
}

impl SharedMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 等待全部线程结束，返回完成的行块与第一个错误
fn join_all(handles: Vec<WorkerHandle>) -> (Vec<RowBlock>, Option<Error>) {
    let mut blocks = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (worker_id, handle) in handles {
        let outcome = match handle.join() {
            Ok(result) => result,
            Err(payload) => Err(Error::worker_failure(
                worker_id,
                format!("线程 panic: {}", panic_message(payload.as_ref())),
            )),
        };
        match outcome {
            Ok(block) => blocks.push(block),
            Err(e) => {
                debug!(worker_id, error = %e, "worker 失败");
                first_error.get_or_insert(e);
            }
        }
    }
    (blocks, first_error)
}

impl ExecutionBackend for SharedMemoryBackend {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::SharedMemory
    }

    /// 分配整块网格并按分区切成行块；切分时检查覆盖，任何重叠都在启动线程之前暴露
    fn prepare(&mut self, config: &GridConfig, plan: &PartitionPlan) -> Result<()> {
        if self.dimensions.is_some() {
            return Err(Error::InvalidState("共享内存后端已经分配过网格".to_string()));
        }
        self.pending = EscapeField::new(config.width, config.height).split_rows(&plan.partitions)?;
        self.expected = self.pending.len();
        self.dimensions = Some((config.width, config.height));
        Ok(())
    }

    fn dispatch<K: EscapeKernel + 'static>(&mut self, job: &RunJob<'_, K>) -> Result<()> {
        if self.dimensions.is_none() {
            return Err(Error::InvalidState("尚未分配网格".to_string()));
        }
        if self.dispatched {
            return Err(Error::InvalidState("共享内存后端已经派发过".to_string()));
        }
        self.dispatched = true;

        for mut block in std::mem::take(&mut self.pending) {
            let worker_id = block.partition().worker_id;
            let partition = *block.partition();
            let executor = job.executor.clone();
            let collector = self.collector.clone();
            let epoch = job.epoch;
            let created_at = Instant::now();
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", worker_id))
                .spawn(move || {
                    let result = executor.execute_guarded(&partition, block.cells_mut(), epoch, created_at)?;
                    collector.submit(result)?;
                    Ok(block)
                });
            match spawned {
                Ok(handle) => self.handles.push((worker_id, handle)),
                Err(e) => {
                    // 已启动的线程必须先 join，不能留在后台
                    let _ = join_all(std::mem::take(&mut self.handles));
                    return Err(Error::worker_failure(worker_id, format!("无法创建线程: {}", e)));
                }
            }
        }
        info!(
            run_id = %job.run_id,
            workers = self.expected,
            "已启动 {} 个 worker 线程",
            self.expected
        );
        Ok(())
    }

    fn await_all(&mut self) -> Result<()> {
        if !self.dispatched {
            return Err(Error::InvalidState("尚未派发任何 worker".to_string()));
        }
        let (blocks, first_error) = join_all(std::mem::take(&mut self.handles));
        self.blocks = blocks;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn collect_results(&mut self) -> Result<BackendOutput> {
        let (width, height) = self
            .dimensions
            .ok_or_else(|| Error::InvalidState("没有可收集的网格".to_string()))?;
        if !self.dispatched || !self.handles.is_empty() {
            return Err(Error::InvalidState("仍有 worker 未 join".to_string()));
        }
        let blocks = std::mem::take(&mut self.blocks);
        if blocks.len() != self.expected {
            return Err(Error::InsufficientData(format!(
                "只收回 {} 个行块，期望 {}",
                blocks.len(),
                self.expected
            )));
        }
        let field = EscapeField::from_blocks(width, height, blocks)?;
        let results = self.collector.take()?;
        if results.len() != self.expected {
            return Err(Error::InsufficientData(format!(
                "只收到 {} 个 worker 结果，期望 {}",
                results.len(),
                self.expected
            )));
        }
        Ok(BackendOutput {
            field,
            results,
            wall: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::kernel::Mandelbrot;
    use crate::task_executor::TaskExecutor;
    use crate::task_splitter::TaskSplitter;
    use crate::types::Partition;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_collect_before_await_is_rejected() {
        let config = GridConfig {
            width: 8,
            height: 6,
            max_iterations: 20,
            ..GridConfig::default()
        };
        let plan = TaskSplitter::default().partition(config.height, 3).unwrap();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let mut backend = SharedMemoryBackend::new();
        assert!(matches!(backend.collect_results(), Err(Error::InvalidState(_))));

        let job = RunJob {
            run_id: Uuid::new_v4(),
            config: &config,
            plan: &plan,
            executor: &executor,
            epoch: Instant::now(),
        };
        assert!(matches!(backend.dispatch(&job), Err(Error::InvalidState(_))));
        backend.prepare(&config, &plan).unwrap();
        assert!(matches!(backend.prepare(&config, &plan), Err(Error::InvalidState(_))));
        assert!(matches!(backend.collect_results(), Err(Error::InvalidState(_))));
        backend.dispatch(&job).unwrap();
        assert!(matches!(backend.collect_results(), Err(Error::InvalidState(_))));
        assert!(matches!(backend.dispatch(&job), Err(Error::InvalidState(_))));

        backend.await_all().unwrap();
        let output = backend.collect_results().unwrap();
        assert_eq!(output.results.len(), 3);
        assert_eq!(output.field.height(), 6);
    }

    #[test]
    fn test_prepare_rejects_overlapping_plan() {
        let config = GridConfig {
            width: 2,
            height: 4,
            ..GridConfig::default()
        };
        let plan = PartitionPlan {
            height: 4,
            requested_workers: 2,
            partitions: vec![
                Partition {
                    worker_id: 0,
                    start_row: 0,
                    end_row: 3,
                },
                Partition {
                    worker_id: 1,
                    start_row: 2,
                    end_row: 4,
                },
            ],
        };
        let mut backend = SharedMemoryBackend::new();
        assert!(matches!(
            backend.prepare(&config, &plan),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_join_all_keeps_first_error() {
        let handles: Vec<WorkerHandle> = (0..3)
            .map(|i| {
                let handle = thread::spawn(move || -> Result<RowBlock> {
                    Err(Error::worker_failure(i, "boom"))
                });
                (i, handle)
            })
            .collect();
        let (blocks, error) = join_all(handles);
        assert!(blocks.is_empty());
        assert!(matches!(error, Some(Error::WorkerFailure { worker_id: 0, .. })));
    }
}
