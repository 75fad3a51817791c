use serde::{Deserialize, Serialize};

/// 未指定时使用的置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// 检测请求选项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    /// 置信度阈值，取值 [0, 1]
    pub confidence_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// 通过阈值筛选、带类别名称的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredDetection {
    pub class_name: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub class_id: usize,
}

/// `/detect` 的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    /// 标注图片的URL路径
    pub image_url: String,
    pub detections: Vec<FilteredDetection>,
    /// 处理耗时（秒）
    pub processing_time: f64,
    /// `[width, height]`
    pub image_size: [u32; 2],
}

/// 检测处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStage {
    Received,
    Validated,
    Decoded,
    Inferred,
    Filtered,
    Annotated,
    Stored,
    Responded,
}
