// backend.rs
// 执行后端接口：派发 worker、等待全部完成、收集结果。共享内存线程与消息传递节点是它的两种实现。
use crate::config::{DeploymentMode, GridConfig};
use crate::error::Result;
use crate::field::EscapeField;
use crate::kernel::EscapeKernel;
use crate::message_passing::MessagePassingBackend;
use crate::shared_memory::SharedMemoryBackend;
use crate::task_executor::TaskExecutor;
use crate::task_splitter::PartitionPlan;
use crate::types::{WallSpan, WorkerResult};
use std::time::Instant;
use uuid::Uuid;

/// 派发时交给后端的一次运行的全部信息
pub struct RunJob<'a, K> {
    pub run_id: Uuid,
    pub config: &'a GridConfig,
    pub plan: &'a PartitionPlan,
    pub executor: &'a TaskExecutor<K>,
    /// 协调器的时间起点，共享内存模式下 worker 时间戳都相对于它
    pub epoch: Instant,
}

/// 后端收集到的结果
#[derive(Debug)]
pub struct BackendOutput {
    pub field: EscapeField,
    pub results: Vec<WorkerResult>,
    /// 后端自己测得的墙钟区间（分布式模式下由根节点在两次屏障之间测量）；
    /// None 表示由协调器用派发到 join 的时间
    pub wall: Option<WallSpan>,
}

pub trait ExecutionBackend {
    fn mode(&self) -> DeploymentMode;

    /// 协调器创建时调用一次，分配本后端需要的输出网格
    fn prepare(&mut self, _config: &GridConfig, _plan: &PartitionPlan) -> Result<()> {
        Ok(())
    }

    /// 为每个分区启动一个 worker，不等待
    fn dispatch<K: EscapeKernel + 'static>(&mut self, job: &RunJob<'_, K>) -> Result<()>;

    /// 阻塞直到所有 worker 完成；任何 worker 失败都返回错误，
    /// 但仍会等待其余 worker 结束
    fn await_all(&mut self) -> Result<()>;

    /// 取走完成的网格和所有 worker 结果，只能调用一次
    fn collect_results(&mut self) -> Result<BackendOutput>;
}

/// 按部署模式在构造时选择的后端
pub enum Backend {
    SharedMemory(SharedMemoryBackend),
    MessagePassing(MessagePassingBackend),
}

impl Backend {
    pub fn for_mode(mode: DeploymentMode) -> Self {
        match mode {
            DeploymentMode::SharedMemory => Backend::SharedMemory(SharedMemoryBackend::new()),
            DeploymentMode::MessagePassing => Backend::MessagePassing(MessagePassingBackend::new()),
        }
    }
}

impl ExecutionBackend for Backend {
    fn mode(&self) -> DeploymentMode {
        match self {
            Backend::SharedMemory(b) => b.mode(),
            Backend::MessagePassing(b) => b.mode(),
        }
    }

    fn prepare(&mut self, config: &GridConfig, plan: &PartitionPlan) -> Result<()> {
        match self {
            Backend::SharedMemory(b) => b.prepare(config, plan),
            Backend::MessagePassing(b) => b.prepare(config, plan),
        }
    }

    fn dispatch<K: EscapeKernel + 'static>(&mut self, job: &RunJob<'_, K>) -> Result<()> {
        match self {
            Backend::SharedMemory(b) => b.dispatch(job),
            Backend::MessagePassing(b) => b.dispatch(job),
        }
    }

    fn await_all(&mut self) -> Result<()> {
        match self {
            Backend::SharedMemory(b) => b.await_all(),
            Backend::MessagePassing(b) => b.await_all(),
        }
    }

    fn collect_results(&mut self) -> Result<BackendOutput> {
        match self {
            Backend::SharedMemory(b) => b.collect_results(),
            Backend::MessagePassing(b) => b.collect_results(),
        }
    }
}
