// lib.rs
// 调度器模块入口，声明并导出各子模块。
pub mod backend;
pub mod benchmark;
pub mod communicator;
pub mod config;
pub mod data_preparator;
pub mod error;
pub mod field;
pub mod kernel;
pub mod message_passing;
pub mod metrics;
pub mod scheduler;
pub mod shared_memory;
pub mod state;
pub mod task_executor;
pub mod task_splitter;
pub mod types;

pub use config::{DeploymentMode, GridConfig, Viewport};
pub use error::{Error, Result};
pub use field::EscapeField;
pub use kernel::{EscapeKernel, Mandelbrot};
pub use metrics::{Baseline, RunMetrics};
pub use scheduler::{ExecutionCoordinator, RunOutcome};
