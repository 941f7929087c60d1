// config.rs
// 运行配置：网格尺寸、复平面范围、最大迭代次数、worker/节点数量与部署模式，及其默认值、校验与 JSON 加载。
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 复平面上的可视区域
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Viewport {
    /// 经典 Mandelbrot 视图
    fn default() -> Self {
        Self {
            x_min: -2.5,
            x_max: 1.0,
            y_min: -1.0,
            y_max: 1.0,
        }
    }
}

impl Viewport {
    fn validate(&self) -> Result<()> {
        let all_finite = [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::InvalidConfiguration(format!(
                "复平面范围包含非有限值: {:?}",
                self
            )));
        }
        if self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(Error::InvalidConfiguration(format!(
                "复平面范围为空或颠倒: x=[{}, {}], y=[{}, {}]",
                self.x_min, self.x_max, self.y_min, self.y_max
            )));
        }
        Ok(())
    }
}

/// 部署模式：进程内共享内存线程，或消息传递的分布式节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    #[default]
    SharedMemory,
    MessagePassing,
}

/// 一次运行的完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// 网格宽度（列数）
    pub width: usize,
    /// 网格高度（行数）
    pub height: usize,
    pub viewport: Viewport,
    /// 单个单元格的最大迭代次数
    pub max_iterations: u32,
    /// 共享内存模式下的 worker 线程数
    pub worker_count: usize,
    pub mode: DeploymentMode,
    /// 分布式模式下的节点数
    pub node_count: usize,
}

impl Default for GridConfig {
    /// 默认配置：1920x1080，256次迭代，8个线程，共享内存模式
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            viewport: Viewport::default(),
            max_iterations: 256,
            worker_count: 8,
            mode: DeploymentMode::SharedMemory,
            node_count: 4,
        }
    }
}

/// 用于直接反序列化配置文件的结构体，
/// 所有字段可缺省，缺省值取自 GridConfig::default()
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GridConfigJson {
    width: Option<usize>,
    height: Option<usize>,
    x_range: Option<[f64; 2]>,
    y_range: Option<[f64; 2]>,
    max_iterations: Option<u32>,
    #[serde(alias = "threads")]
    worker_count: Option<usize>,
    mode: Option<DeploymentMode>,
    #[serde(alias = "nodes")]
    node_count: Option<usize>,
}

impl From<GridConfigJson> for GridConfig {
    fn from(json: GridConfigJson) -> Self {
        let defaults = GridConfig::default();
        let mut viewport = defaults.viewport;
        if let Some([x_min, x_max]) = json.x_range {
            viewport.x_min = x_min;
            viewport.x_max = x_max;
        }
        if let Some([y_min, y_max]) = json.y_range {
            viewport.y_min = y_min;
            viewport.y_max = y_max;
        }
        Self {
            width: json.width.unwrap_or(defaults.width),
            height: json.height.unwrap_or(defaults.height),
            viewport,
            max_iterations: json.max_iterations.unwrap_or(defaults.max_iterations),
            worker_count: json.worker_count.unwrap_or(defaults.worker_count),
            mode: json.mode.unwrap_or(defaults.mode),
            node_count: json.node_count.unwrap_or(defaults.node_count),
        }
    }
}

impl GridConfig {
    /// 从 JSON 字符串解析配置并校验
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let json: GridConfigJson = serde_json::from_str(contents)
            .map_err(|e| Error::InvalidConfiguration(format!("解析配置失败: {}", e)))?;
        let config = GridConfig::from(json);
        config.validate()?;
        Ok(config)
    }

    /// 从配置文件读取，文件不存在时返回错误
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InvalidConfiguration(format!(
                "未找到配置文件 {}",
                path.display()
            )));
        }
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json_str(&contents)
    }

    /// 网格单元总数
    pub fn total_cells(&self) -> usize {
        self.width * self.height
    }

    /// 当前部署模式下参与计算的 worker 数（线程数或节点数）
    pub fn participants(&self) -> usize {
        match self.mode {
            DeploymentMode::SharedMemory => self.worker_count,
            DeploymentMode::MessagePassing => self.node_count,
        }
    }

    /// 返回一个修改了参与者数量的副本，用于扩展性测试
    pub fn with_participants(&self, count: usize) -> Self {
        let mut config = self.clone();
        match config.mode {
            DeploymentMode::SharedMemory => config.worker_count = count,
            DeploymentMode::MessagePassing => config.node_count = count,
        }
        config
    }

    /// 在任何计算开始之前校验配置
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "网格尺寸必须为正: {}x{}",
                self.width, self.height
            )));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(Error::InvalidConfiguration(format!(
                "网格单元总数溢出: {}x{}",
                self.width, self.height
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfiguration(
                "max_iterations 必须大于0".to_string(),
            ));
        }
        if self.participants() == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "{:?} 模式下参与者数量为0",
                self.mode
            )));
        }
        self.viewport.validate()
    }
}
