// error.rs
// 定义项目通用的错误类型（配置、数据不足、worker失败、通信、IO、JSON等）和Result类型。
use std::fmt;
use std::io;

/// 项目通用错误类型
#[derive(Debug)]
pub enum Error {
    /// IO错误
    Io(io::Error),
    /// JSON 序列化/反序列化错误（配置文件、节点间消息）
    Json(serde_json::Error),
    /// 配置无效：网格尺寸、worker/节点数量、复平面范围等不合法，在任何计算开始前报告
    InvalidConfiguration(String),
    /// 聚合时没有可用的 worker 结果
    InsufficientData(String),
    /// worker 执行失败，整个运行作废
    WorkerFailure { worker_id: usize, reason: String },
    /// 屏障/收集等集合通信失败
    Communication(String),
    /// 协调器阶段调用顺序错误
    InvalidState(String),
}

/// 通用结果类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 便捷构造 worker 失败
    pub fn worker_failure(worker_id: usize, reason: impl Into<String>) -> Self {
        Error::WorkerFailure {
            worker_id,
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO错误: {}", e),
            Error::Json(e) => write!(f, "JSON错误: {}", e),
            Error::InvalidConfiguration(msg) => write!(f, "配置无效: {}", msg),
            Error::InsufficientData(msg) => write!(f, "数据不足: {}", msg),
            Error::WorkerFailure { worker_id, reason } => {
                write!(f, "worker {} 执行失败: {}", worker_id, reason)
            }
            Error::Communication(msg) => write!(f, "通信错误: {}", msg),
            Error::InvalidState(msg) => write!(f, "状态错误: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}
