// task_splitter.rs
// 任务拆分器：把 height 行的网格按 worker 数量拆分为连续、互不重叠的行区间，最后一个 worker 吸收余数行。
use crate::error::{Error, Result};
use crate::types::Partition;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// worker 数量超过行数时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OversubscribePolicy {
    /// 把 worker 数量收缩到 height，并在计划中标记调整
    #[default]
    Clamp,
    /// 直接返回 InvalidConfiguration
    Reject,
}

/// 一次拆分的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub height: usize,
    /// 调用方请求的 worker 数量
    pub requested_workers: usize,
    pub partitions: Vec<Partition>,
}

impl PartitionPlan {
    /// 实际使用的 worker 数量
    pub fn worker_count(&self) -> usize {
        self.partitions.len()
    }

    /// worker 数量是否因行数不足被收缩
    pub fn adjusted(&self) -> bool {
        self.requested_workers != self.partitions.len()
    }
}

/// 任务拆分器，按行做静态划分
#[derive(Debug, Clone, Default)]
pub struct TaskSplitter {
    pub policy: OversubscribePolicy,
}

impl TaskSplitter {
    pub fn new(policy: OversubscribePolicy) -> Self {
        Self { policy }
    }

    /// 拆分 [0, height) 为 worker_count 个连续区间
    pub fn partition(&self, height: usize, worker_count: usize) -> Result<PartitionPlan> {
        if height == 0 {
            return Err(Error::InvalidConfiguration("网格高度必须大于0".to_string()));
        }
        if worker_count == 0 {
            return Err(Error::InvalidConfiguration("worker 数量必须大于0".to_string()));
        }

        let workers = if worker_count > height {
            match self.policy {
                OversubscribePolicy::Reject => {
                    return Err(Error::InvalidConfiguration(format!(
                        "worker 数量 {} 超过行数 {}，部分 worker 将分不到任何行",
                        worker_count, height
                    )));
                }
                OversubscribePolicy::Clamp => {
                    warn!(
                        requested = worker_count,
                        height, "worker 数量超过行数，收缩为 {}", height
                    );
                    height
                }
            }
        } else {
            worker_count
        };

        let rows_per_worker = height / workers;
        let partitions: Vec<Partition> = (0..workers)
            .map(|worker_id| {
                let start_row = worker_id * rows_per_worker;
                // 最后一个 worker 处理剩余的所有行
                let end_row = if worker_id == workers - 1 {
                    height
                } else {
                    (worker_id + 1) * rows_per_worker
                };
                Partition {
                    worker_id,
                    start_row,
                    end_row,
                }
            })
            .collect();

        debug!(
            height,
            workers,
            rows_per_worker,
            last_rows = partitions.last().map(|p| p.row_count()).unwrap_or(0),
            "按行拆分为 {} 个分区",
            partitions.len()
        );

        Ok(PartitionPlan {
            height,
            requested_workers: worker_count,
            partitions,
        })
    }
}

/// 校验分区按顺序恰好覆盖 [0, height)，无空洞、无重叠、无空分区、worker_id 连续
pub fn verify_coverage(partitions: &[Partition], height: usize) -> Result<()> {
    let mut next_row = 0;
    for (i, p) in partitions.iter().enumerate() {
        if p.worker_id != i {
            return Err(Error::InvalidConfiguration(format!(
                "分区 {} 的 worker_id 为 {}",
                i, p.worker_id
            )));
        }
        if p.start_row != next_row {
            return Err(Error::InvalidConfiguration(format!(
                "分区 {} 从第 {} 行开始，期望第 {} 行",
                i, p.start_row, next_row
            )));
        }
        if p.end_row <= p.start_row {
            return Err(Error::InvalidConfiguration(format!(
                "分区 {} 为空: [{}, {})",
                i, p.start_row, p.end_row
            )));
        }
        next_row = p.end_row;
    }
    if next_row != height {
        return Err(Error::InvalidConfiguration(format!(
            "分区覆盖到第 {} 行，网格共有 {} 行",
            next_row, height
        )));
    }
    Ok(())
}
