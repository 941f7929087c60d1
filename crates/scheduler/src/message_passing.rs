// message_passing.rs
// 消息传递后端：每个节点在本地分配自己的子网格，计算完成后通过 gather 把计时和行块发给根节点；
// 两次屏障之间的时间由根节点测量，作为整次运行的墙钟时间。
use crate::backend::{BackendOutput, ExecutionBackend, RunJob};
use crate::communicator::{Communicator, LocalCluster, LocalEndpoint};
use crate::config::DeploymentMode;
use crate::error::{Error, Result};
use crate::field::EscapeField;
use crate::kernel::EscapeKernel;
use crate::task_executor::{panic_message, TaskExecutor};
use crate::task_splitter::PartitionPlan;
use crate::types::{Partition, WallSpan, WorkerResult, ROOT_RANK};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// 节点发给根节点的报告，序列化为 JSON 字节传输
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeReport {
    Completed {
        partition: Partition,
        result: WorkerResult,
        cells: Vec<u32>,
    },
    /// 节点数多于行数时，多出的节点只参与集合通信
    Idle { rank: usize },
    Failed { worker_id: usize, reason: String },
}

/// 根节点收集到的全部报告
#[derive(Debug, Clone)]
pub struct GatheredRun {
    pub reports: Vec<NodeReport>,
    pub wall: WallSpan,
}

/// 单个节点的完整流程：屏障 → 本地计算 → gather → 屏障。
/// `created_at` 是节点被创建的时刻，等待时间从它算起。
/// 根节点返回 Some，其余节点返回 None。
pub fn run_node<C, K>(
    comm: &C,
    plan: &PartitionPlan,
    executor: &TaskExecutor<K>,
    created_at: Instant,
) -> Result<Option<GatheredRun>>
where
    C: Communicator,
    K: EscapeKernel,
{
    let rank = comm.rank();
    if plan.worker_count() > comm.size() {
        return Err(Error::InvalidConfiguration(format!(
            "分区数 {} 多于节点数 {}",
            plan.worker_count(),
            comm.size()
        )));
    }

    comm.barrier()?;
    let epoch = Instant::now();

    let report = match plan.partitions.get(rank) {
        Some(partition) => {
            // 每个节点只分配自己那一块
            let mut cells = vec![0u32; partition.cell_count(executor.width())];
            match executor.execute_guarded(partition, &mut cells, epoch, created_at) {
                Ok(result) => NodeReport::Completed {
                    partition: *partition,
                    result,
                    cells,
                },
                Err(e) => NodeReport::Failed {
                    worker_id: partition.worker_id,
                    reason: e.to_string(),
                },
            }
        }
        None => NodeReport::Idle { rank },
    };

    // 编码失败也必须参与 gather，否则其余节点会一直阻塞
    let payload = match serde_json::to_vec(&report) {
        Ok(bytes) => bytes,
        Err(e) => serde_json::to_vec(&NodeReport::Failed {
            worker_id: rank,
            reason: format!("报告编码失败: {}", e),
        })?,
    };
    let gathered = comm.gather(ROOT_RANK, payload)?;
    comm.barrier()?;
    let wall = WallSpan::from_elapsed(epoch.elapsed());

    match gathered {
        Some(payloads) => {
            let reports = payloads
                .iter()
                .map(|bytes| serde_json::from_slice::<NodeReport>(bytes))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            debug!(nodes = reports.len(), "根节点收集完成");
            Ok(Some(GatheredRun { reports, wall }))
        }
        None => Ok(None),
    }
}

/// 把收集到的报告拼成完整网格；任何节点失败都使整次运行作废
pub fn assemble(width: usize, height: usize, run: GatheredRun) -> Result<BackendOutput> {
    let mut blocks = Vec::with_capacity(run.reports.len());
    let mut results = Vec::with_capacity(run.reports.len());
    for report in run.reports {
        match report {
            NodeReport::Completed {
                partition,
                result,
                cells,
            } => {
                blocks.push((partition, cells));
                results.push(result);
            }
            NodeReport::Idle { rank } => debug!(rank, "空闲节点"),
            NodeReport::Failed { worker_id, reason } => {
                return Err(Error::WorkerFailure { worker_id, reason });
            }
        }
    }
    let field = EscapeField::from_row_blocks(width, height, blocks)?;
    Ok(BackendOutput {
        field,
        results,
        wall: Some(run.wall),
    })
}

type NodeHandle = (usize, JoinHandle<Result<Option<GatheredRun>>>);

/// 启动一个节点线程。节点收到开始信号后才进入第一个屏障；
/// 信号端在发送前被丢弃时，节点不参与任何集合通信直接退出。
fn spawn_node<K: EscapeKernel + 'static>(
    endpoint: LocalEndpoint,
    plan: PartitionPlan,
    executor: TaskExecutor<K>,
    start: Receiver<()>,
) -> std::io::Result<NodeHandle> {
    let rank = endpoint.rank();
    let created_at = Instant::now();
    thread::Builder::new()
        .name(format!("node-{}", rank))
        .spawn(move || {
            if start.recv().is_err() {
                debug!(rank, "派发中止，节点退出");
                return Ok(None);
            }
            run_node(&endpoint, &plan, &executor, created_at)
        })
        .map(|handle| (rank, handle))
}

/// 在进程内模拟集群上运行的消息传递后端
#[derive(Default)]
pub struct MessagePassingBackend {
    handles: Vec<NodeHandle>,
    gathered: Option<GatheredRun>,
    dimensions: Option<(usize, usize)>,
}

impl MessagePassingBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionBackend for MessagePassingBackend {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::MessagePassing
    }

    fn dispatch<K: EscapeKernel + 'static>(&mut self, job: &RunJob<'_, K>) -> Result<()> {
        if self.dimensions.is_some() {
            return Err(Error::InvalidState("消息传递后端已经派发过".to_string()));
        }
        let nodes = job.config.node_count;
        if nodes < job.plan.worker_count() {
            return Err(Error::InvalidConfiguration(format!(
                "节点数 {} 少于分区数 {}",
                nodes,
                job.plan.worker_count()
            )));
        }
        if nodes > job.plan.worker_count() {
            warn!(
                nodes,
                partitions = job.plan.worker_count(),
                "节点数多于分区数，{} 个节点将空闲",
                nodes - job.plan.worker_count()
            );
        }

        let endpoints = LocalCluster::endpoints(nodes)?;
        let mut starts = Vec::with_capacity(nodes);
        for endpoint in endpoints {
            let rank = endpoint.rank();
            let (start_tx, start_rx) = mpsc::channel();
            match spawn_node(endpoint, job.plan.clone(), job.executor.clone(), start_rx) {
                Ok(handle) => {
                    self.handles.push(handle);
                    starts.push(start_tx);
                }
                Err(e) => {
                    // 丢弃开始信号，已启动的节点不会进入屏障，可以立即 join
                    drop(starts);
                    for (_, handle) in self.handles.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(Error::Communication(format!("无法启动节点 {}: {}", rank, e)));
                }
            }
        }
        for start in starts {
            // 接收端只会随节点线程退出而失效，此时 await_all 会报告该节点
            let _ = start.send(());
        }
        self.dimensions = Some((job.config.width, job.config.height));

        info!(run_id = %job.run_id, nodes, "已启动 {} 个模拟节点", nodes);
        Ok(())
    }

    fn await_all(&mut self) -> Result<()> {
        if self.dimensions.is_none() {
            return Err(Error::InvalidState("尚未派发任何节点".to_string()));
        }
        let mut first_error = None;
        for (rank, handle) in self.handles.drain(..) {
            match handle.join() {
                Ok(Ok(Some(run))) => self.gathered = Some(run),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    first_error.get_or_insert(Error::worker_failure(
                        rank,
                        format!("节点线程 panic: {}", panic_message(payload.as_ref())),
                    ));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn collect_results(&mut self) -> Result<BackendOutput> {
        let (width, height) = self
            .dimensions
            .ok_or_else(|| Error::InvalidState("尚未派发任何节点".to_string()))?;
        let run = self
            .gathered
            .take()
            .ok_or_else(|| Error::InsufficientData("根节点没有收集到任何报告".to_string()))?;
        assemble(width, height, run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::kernel::Mandelbrot;
    use crate::task_splitter::TaskSplitter;
    use std::sync::Arc;
    use std::time::Duration;

    fn run_cluster<K: EscapeKernel + 'static>(
        config: &GridConfig,
        kernel: K,
        nodes: usize,
    ) -> Result<BackendOutput> {
        let plan = TaskSplitter::default().partition(config.height, nodes)?;
        let executor = TaskExecutor::new(Arc::new(kernel), config);
        let handles: Vec<_> = LocalCluster::endpoints(nodes)?
            .into_iter()
            .map(|ep| {
                let plan = plan.clone();
                let executor = executor.clone();
                thread::spawn(move || run_node(&ep, &plan, &executor, Instant::now()))
            })
            .collect();
        let mut gathered = None;
        for handle in handles {
            if let Some(run) = handle.join().unwrap()? {
                gathered = Some(run);
            }
        }
        assemble(config.width, config.height, gathered.unwrap())
    }

    #[test]
    fn test_cluster_assembles_full_field() {
        let config = GridConfig {
            width: 30,
            height: 13,
            max_iterations: 40,
            ..GridConfig::default()
        };
        let output = run_cluster(&config, Mandelbrot, 3).unwrap();
        assert_eq!(output.field.width(), 30);
        assert_eq!(output.field.height(), 13);
        assert_eq!(output.results.len(), 3);
        assert!(output.field.as_slice().iter().all(|&v| v <= 40));
        assert!(output.wall.is_some());
    }

    #[test]
    fn test_failed_node_fails_the_run() {
        let config = GridConfig {
            width: 8,
            height: 8,
            max_iterations: 10,
            ..GridConfig::default()
        };
        let kernel = |_re: f64, im: f64, max: u32| if im > 0.0 { max + 5 } else { 0 };
        let result = run_cluster(&config, kernel, 4);
        assert!(matches!(result, Err(Error::WorkerFailure { .. })));
    }

    #[test]
    fn test_assemble_rejects_failed_report() {
        let run = GatheredRun {
            reports: vec![NodeReport::Failed {
                worker_id: 1,
                reason: "x".to_string(),
            }],
            wall: WallSpan::from_elapsed(Duration::from_millis(1)),
        };
        assert!(matches!(
            assemble(1, 1, run),
            Err(Error::WorkerFailure { worker_id: 1, .. })
        ));
    }

    #[test]
    fn test_wait_measured_from_node_creation() {
        let config = GridConfig {
            width: 4,
            height: 2,
            max_iterations: 10,
            ..GridConfig::default()
        };
        let plan = TaskSplitter::default().partition(config.height, 1).unwrap();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let endpoint = LocalCluster::endpoints(1).unwrap().pop().unwrap();
        let created_at = Instant::now().checked_sub(Duration::from_millis(50)).unwrap();

        let run = run_node(&endpoint, &plan, &executor, created_at).unwrap().unwrap();
        match &run.reports[0] {
            NodeReport::Completed { result, .. } => {
                assert!(result.wait_duration >= Duration::from_millis(50));
                assert!(result.response_duration >= result.wait_duration);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_dropped_start_signal_releases_nodes() {
        let config = GridConfig {
            width: 4,
            height: 3,
            max_iterations: 10,
            ..GridConfig::default()
        };
        let plan = TaskSplitter::default().partition(config.height, 3).unwrap();
        let executor = TaskExecutor::new(Arc::new(Mandelbrot), &config);
        let mut endpoints = LocalCluster::endpoints(3).unwrap();
        // 第三个节点从未启动，相当于派发中途失败
        let _never_started = endpoints.pop().unwrap();

        let mut starts = Vec::new();
        let mut handles = Vec::new();
        for endpoint in endpoints {
            let (start_tx, start_rx) = mpsc::channel();
            handles.push(spawn_node(endpoint, plan.clone(), executor.clone(), start_rx).unwrap());
            starts.push(start_tx);
        }
        drop(starts);
        for (_, handle) in handles {
            assert!(handle.join().unwrap().unwrap().is_none());
        }
    }

    #[test]
    fn test_report_wire_roundtrip() {
        let report = NodeReport::Idle { rank: 3 };
        let bytes = serde_json::to_vec(&report).unwrap();
        let decoded: NodeReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, report);
    }
}
