use serde::{Deserialize, Serialize};
use std::fmt;

/// 协调器状态，描述一次运行的生命周期
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorState {
    /// 分区已计算，输出网格已分配
    Created,
    /// 所有 worker 已启动
    Dispatched,
    /// 正在等待所有 worker 完成（join / 屏障）
    AwaitingCompletion,
    /// 所有结果可用
    Completed,
    /// 有 worker 失败，本次运行作废，包含失败原因
    Failed(String),
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Completed | CoordinatorState::Failed(_))
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Created => write!(f, "Created"),
            CoordinatorState::Dispatched => write!(f, "Dispatched"),
            CoordinatorState::AwaitingCompletion => write!(f, "AwaitingCompletion"),
            CoordinatorState::Completed => write!(f, "Completed"),
            CoordinatorState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}
