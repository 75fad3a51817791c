use crate::utils::error::DetectError;
use crate::Result;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// 模型与推理配置
    pub model: ModelConfig,

    /// 服务器配置
    pub server: ServerConfig,

    /// 标注图片存储配置
    pub storage: StorageConfig,

    /// 标注绘制配置
    pub render: RenderConfig,
}

/// 推理设备偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(DetectError::Config(format!(
                "Unknown device '{}', expected one of: auto, cpu, cuda",
                other
            ))),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// ONNX模型文件
    pub model_path: PathBuf,

    /// 类别名称文件（每行一个），为空时使用内置COCO类别
    pub labels_path: Option<PathBuf>,

    pub device: DevicePreference,

    /// CPU线程数
    pub intra_threads: usize,

    /// 模型输入边长（正方形）
    pub input_size: u32,

    /// NMS前的候选分数阈值
    pub score_threshold: f32,

    /// NMS的IoU阈值
    pub iou_threshold: f32,

    /// 单张图片最多保留的检测数量
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 允许跨域访问的来源
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// 静态文件目录
    pub static_dir: PathBuf,

    /// 静态文件URL前缀
    pub url_prefix: String,

    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// 边框线宽（像素）
    pub line_thickness: u32,

    /// 可选的TrueType字体，缺省使用内置点阵字体
    pub label_font: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let cpu_cores = num_cpus::get();

        Self {
            model_path: PathBuf::from("models/yolov5s.onnx"),
            labels_path: None,
            device: DevicePreference::Auto,
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            input_size: 640,
            score_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            url_prefix: "/static".to_string(),
            jpeg_quality: 95,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            label_font: None,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        model_path: String,
        static_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let workers = workers.unwrap_or_else(num_cpus::get).max(1);

        let model = ModelConfig {
            model_path: PathBuf::from(model_path),
            ..ModelConfig::default()
        };

        let server = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 50 * 1024 * 1024, // 50MB
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        };

        let storage = StorageConfig {
            static_dir: PathBuf::from(static_dir),
            ..StorageConfig::default()
        };

        let config = Self {
            bind_addr,
            workers,
            dev_mode,
            model,
            server,
            storage,
            render: RenderConfig::default(),
        };
        config.validate()?;

        Ok(config)
    }

    pub fn with_labels(mut self, labels_path: Option<String>) -> Self {
        self.model.labels_path = labels_path.map(PathBuf::from);
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.model.device = device;
        self
    }

    pub fn with_label_font(mut self, label_font: Option<String>) -> Self {
        self.render.label_font = label_font.map(PathBuf::from);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.model.score_threshold) {
            return Err(DetectError::Config(format!(
                "score_threshold must be within [0, 1], got {}",
                self.model.score_threshold
            )));
        }
        if !unit.contains(&self.model.iou_threshold) {
            return Err(DetectError::Config(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.model.iou_threshold
            )));
        }
        if self.model.input_size == 0 {
            return Err(DetectError::Config("input_size must be positive".to_string()));
        }
        if self.model.max_detections == 0 {
            return Err(DetectError::Config(
                "max_detections must be positive".to_string(),
            ));
        }
        if !self.storage.url_prefix.starts_with('/') || self.storage.url_prefix.len() < 2 {
            return Err(DetectError::Config(format!(
                "Invalid static URL prefix '{}'",
                self.storage.url_prefix
            )));
        }
        if !(1..=100).contains(&self.storage.jpeg_quality) {
            return Err(DetectError::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.storage.jpeg_quality
            )));
        }
        if self.render.line_thickness == 0 {
            return Err(DetectError::Config(
                "line_thickness must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new(
            "127.0.0.1:8000".to_string(),
            "models/yolov5s.onnx".to_string(),
            "static".to_string(),
            Some(2),
            false,
        )
        .unwrap()
    }

    #[test]
    fn defaults_match_yolov5_inference_settings() {
        let config = config();
        assert_eq!(config.workers, 2);
        assert_eq!(config.model.input_size, 640);
        assert_eq!(config.model.score_threshold, 0.25);
        assert_eq!(config.model.iou_threshold, 0.45);
        assert_eq!(config.storage.url_prefix, "/static");
        assert_eq!(config.server.request_timeout, 60);
        assert!(config.model.labels_path.is_none());
    }

    #[test]
    fn dev_mode_extends_timeout() {
        let config = Config::new(
            "127.0.0.1:8000".to_string(),
            "m.onnx".to_string(),
            "static".to_string(),
            None,
            true,
        )
        .unwrap();
        assert_eq!(config.server.request_timeout, 300);
        assert!(config.workers >= 1);
    }

    #[test]
    fn rejects_out_of_range_iou() {
        let mut config = config();
        config.model.iou_threshold = 1.5;
        assert!(matches!(config.validate(), Err(DetectError::Config(_))));
    }

    #[test]
    fn rejects_relative_url_prefix() {
        let mut config = config();
        config.storage.url_prefix = "static".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_device_preference() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn builder_methods_set_optional_paths() {
        let config = config()
            .with_labels(Some("labels.txt".to_string()))
            .with_device(DevicePreference::Cpu)
            .with_label_font(Some("font.ttf".to_string()));
        assert_eq!(config.model.labels_path, Some(PathBuf::from("labels.txt")));
        assert_eq!(config.model.device, DevicePreference::Cpu);
        assert_eq!(config.render.label_font, Some(PathBuf::from("font.ttf")));
    }
}
