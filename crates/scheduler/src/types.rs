// types.rs
// 定义通用类型：行分区、worker 执行结果、运行时间跨度等。
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

/// 分配给单个 worker 的连续行区间 [start_row, end_row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub worker_id: usize,
    pub start_row: usize,
    /// 不包含
    pub end_row: usize,
}

impl Partition {
    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.end_row
    }

    pub fn row_count(&self) -> usize {
        self.end_row - self.start_row
    }

    pub fn cell_count(&self, width: usize) -> usize {
        self.row_count() * width
    }
}

/// 单个 worker 完成后产生的计时结果，产生后不再修改。
/// 时间戳均为相对于本次运行起点（epoch）的偏移量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub start_row: usize,
    pub end_row: usize,
    /// 本 worker 计算的单元格数
    pub cells: usize,
    pub start_timestamp: Duration,
    pub end_timestamp: Duration,
    /// end - start
    pub execution_duration: Duration,
    /// 创建到开始执行
    pub wait_duration: Duration,
    /// 创建到执行结束（等待 + 执行）
    pub response_duration: Duration,
}

/// 协调器测得的墙钟区间，相对于同一 epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSpan {
    pub start: Duration,
    pub end: Duration,
}

impl WallSpan {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// 从零开始、持续 `elapsed` 的区间
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self {
            start: Duration::ZERO,
            end: elapsed,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

// 分布式模式下的收集根节点
pub const ROOT_RANK: usize = 0;
