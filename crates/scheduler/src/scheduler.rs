// scheduler.rs
// 执行协调器：计算分区、派发 worker、等待全部完成、聚合指标；以及线程安全的 worker 结果收集器。
use crate::backend::{Backend, ExecutionBackend, RunJob};
use crate::config::GridConfig;
use crate::error::{Error, Result};
use crate::field::EscapeField;
use crate::kernel::EscapeKernel;
use crate::message_passing::MessagePassingBackend;
use crate::metrics::{AggregationInput, Baseline, MetricsAggregator, RunMetrics};
use crate::shared_memory::SharedMemoryBackend;
use crate::state::CoordinatorState;
use crate::task_executor::TaskExecutor;
use crate::task_splitter::{verify_coverage, PartitionPlan, TaskSplitter};
use crate::types::{WallSpan, WorkerResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// worker 结果收集器，每个 worker 完成时在锁内追加一次，线程安全
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    results: Arc<Mutex<HashMap<usize, WorkerResult>>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提交一个 worker 的结果，同一 worker_id 只能提交一次
    pub fn submit(&self, result: WorkerResult) -> Result<()> {
        let worker_id = result.worker_id;
        let mut results = self
            .results
            .lock()
            .map_err(|_| Error::worker_failure(worker_id, "结果收集器锁已中毒"))?;
        if results.insert(worker_id, result).is_some() {
            return Err(Error::worker_failure(worker_id, "重复提交结果"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.results.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取走全部结果，按 worker_id 排序
    pub fn take(&self) -> Result<Vec<WorkerResult>> {
        let mut results = self
            .results
            .lock()
            .map_err(|_| Error::Communication("结果收集器锁已中毒".to_string()))?;
        let mut taken: Vec<WorkerResult> = results.drain().map(|(_, r)| r).collect();
        taken.sort_by_key(|r| r.worker_id);
        Ok(taken)
    }
}

/// 一次完成的运行：输出网格交给渲染端，指标交给报告端
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub plan: PartitionPlan,
    pub field: EscapeField,
    pub metrics: RunMetrics,
}

/// 执行协调器。每次测量使用一个新实例；一个实例只能运行一次。
pub struct ExecutionCoordinator<K, B = Backend> {
    run_id: Uuid,
    config: GridConfig,
    plan: PartitionPlan,
    executor: TaskExecutor<K>,
    backend: B,
    baseline: Option<Baseline>,
    state: CoordinatorState,
    epoch: Option<Instant>,
    wall_end: Option<Duration>,
}

impl<K: EscapeKernel + 'static> ExecutionCoordinator<K, Backend> {
    /// 根据配置中的部署模式选择后端
    pub fn from_config(config: GridConfig, kernel: Arc<K>) -> Result<Self> {
        let backend = Backend::for_mode(config.mode);
        Self::with_backend(config, kernel, backend, &TaskSplitter::default())
    }
}

impl<K: EscapeKernel + 'static> ExecutionCoordinator<K, SharedMemoryBackend> {
    pub fn shared_memory(config: GridConfig, kernel: Arc<K>) -> Result<Self> {
        Self::with_backend(config, kernel, SharedMemoryBackend::new(), &TaskSplitter::default())
    }
}

impl<K: EscapeKernel + 'static> ExecutionCoordinator<K, MessagePassingBackend> {
    pub fn message_passing(config: GridConfig, kernel: Arc<K>) -> Result<Self> {
        Self::with_backend(config, kernel, MessagePassingBackend::new(), &TaskSplitter::default())
    }
}

impl<K: EscapeKernel + 'static, B: ExecutionBackend> ExecutionCoordinator<K, B> {
    /// 校验配置、计算并校验分区、分配输出网格，进入 Created 状态。任何配置错误都在此处、在计算开始前报告。
    pub fn with_backend(config: GridConfig, kernel: Arc<K>, backend: B, splitter: &TaskSplitter) -> Result<Self> {
        let mut config = config;
        let mut backend = backend;
        config.mode = backend.mode();
        config.validate()?;

        let plan = splitter.partition(config.height, config.participants())?;
        verify_coverage(&plan.partitions, config.height)?;
        if plan.adjusted() {
            warn!(
                requested = plan.requested_workers,
                actual = plan.worker_count(),
                "参与者数量已按网格高度调整"
            );
        }

        backend.prepare(&config, &plan)?;

        let executor = TaskExecutor::new(kernel, &config);
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            mode = ?config.mode,
            width = config.width,
            height = config.height,
            workers = plan.worker_count(),
            "创建协调器"
        );

        Ok(Self {
            run_id,
            config,
            plan,
            executor,
            backend,
            baseline: None,
            state: CoordinatorState::Created,
            epoch: None,
            wall_end: None,
        })
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    fn expect_state(&self, expected: CoordinatorState, phase: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "{} 需要状态 {}，当前为 {}",
                phase, expected, self.state
            )));
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        warn!(run_id = %self.run_id, error = %error, "运行失败，结果作废");
        self.state = CoordinatorState::Failed(error.to_string());
        error
    }

    /// Created -> Dispatched：为每个分区启动一个 worker
    pub fn dispatch(&mut self) -> Result<()> {
        self.expect_state(CoordinatorState::Created, "dispatch")?;
        let epoch = Instant::now();
        self.epoch = Some(epoch);
        let job = RunJob {
            run_id: self.run_id,
            config: &self.config,
            plan: &self.plan,
            executor: &self.executor,
            epoch,
        };
        match self.backend.dispatch(&job) {
            Ok(()) => {
                self.state = CoordinatorState::Dispatched;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Dispatched -> AwaitingCompletion -> (join 完成)：阻塞直到所有 worker 完成
    pub fn await_completion(&mut self) -> Result<()> {
        self.expect_state(CoordinatorState::Dispatched, "await_completion")?;
        self.state = CoordinatorState::AwaitingCompletion;
        match self.backend.await_all() {
            Ok(()) => {
                self.wall_end = self.epoch.map(|epoch| epoch.elapsed());
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// AwaitingCompletion -> Completed：收集网格与结果并聚合指标
    pub fn finish(&mut self) -> Result<RunOutcome> {
        self.expect_state(CoordinatorState::AwaitingCompletion, "finish")?;
        let wall_end = self
            .wall_end
            .ok_or_else(|| Error::InvalidState("worker 尚未全部 join".to_string()))?;

        let output = match self.backend.collect_results() {
            Ok(output) => output,
            Err(e) => return Err(self.fail(e)),
        };
        let wall = output
            .wall
            .unwrap_or_else(|| WallSpan::new(Duration::ZERO, wall_end));

        let metrics = MetricsAggregator.aggregate(AggregationInput {
            run_id: self.run_id,
            mode: self.config.mode,
            results: output.results,
            wall,
            total_cells: self.config.total_cells(),
            baseline: self.baseline,
        });
        let metrics = match metrics {
            Ok(m) => m,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = CoordinatorState::Completed;
        info!(
            run_id = %self.run_id,
            workers = metrics.worker_count,
            wall_ms = metrics.total_wall_time.as_secs_f64() * 1000.0,
            imbalance = metrics.imbalance,
            "运行完成"
        );

        Ok(RunOutcome {
            run_id: self.run_id,
            plan: self.plan.clone(),
            field: output.field,
            metrics,
        })
    }

    /// 依次执行三个阶段
    pub fn run(&mut self) -> Result<RunOutcome> {
        if self.state.is_terminal() {
            return Err(Error::InvalidState(format!(
                "协调器已结束于 {}，每次测量需要新的协调器",
                self.state
            )));
        }
        self.dispatch()?;
        self.await_completion()?;
        self.finish()
    }
}
