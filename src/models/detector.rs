use crate::image::Raster;
use crate::models::ClassNames;
use crate::Result;
use serde::Serialize;
use std::fmt;

/// 模型输出的单个目标，坐标为原图像素空间的 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 目标检测器
///
/// 进程启动时加载一次，之后只读地被所有请求共享。`infer` 只依赖输入图像和
/// 固定的模型权重，不会在调用之间保留状态，输出顺序不作保证。
pub trait ObjectDetector: Send + Sync {
    fn infer(&self, raster: &Raster) -> Result<Vec<RawDetection>>;

    /// 与模型同时加载的类别映射
    fn class_names(&self) -> &ClassNames;

    fn device(&self) -> ComputeDevice;
}
