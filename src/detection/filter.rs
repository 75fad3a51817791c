use crate::detection::FilteredDetection;
use crate::models::{ClassNames, RawDetection};
use crate::utils::error::DetectError;
use crate::Result;
use std::cmp::Ordering;

/// 校验置信度阈值在 [0, 1] 内
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(DetectError::InvalidInput(
            "confidence_threshold must be between 0 and 1".to_string(),
        ))
    }
}

/// 解析表单中的阈值字段
pub fn parse_threshold(value: &str) -> Result<f32> {
    let threshold = value.trim().parse::<f32>().map_err(|_| {
        DetectError::InvalidInput("confidence_threshold must be a number".to_string())
    })?;

    validate_threshold(threshold)
}

/// 结果过滤器
pub struct ResultFilter;

impl ResultFilter {
    /// 保留 `confidence >= threshold` 的检测并解析类别名称
    ///
    /// 输出按置信度降序，置信度相同时按类别ID、左上角x排序。
    pub fn filter(
        detections: &[RawDetection],
        threshold: f32,
        classes: &ClassNames,
    ) -> Result<Vec<FilteredDetection>> {
        let threshold = validate_threshold(threshold)?;

        let mut filtered = detections
            .iter()
            .filter(|det| det.confidence >= threshold)
            .map(|det| {
                let class_name = classes
                    .get(det.class_id)
                    .ok_or(DetectError::UnknownClass(det.class_id))?;

                Ok(FilteredDetection {
                    class_name: class_name.to_string(),
                    confidence: det.confidence,
                    bbox: det.bbox,
                    class_id: det.class_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        filtered.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.class_id.cmp(&b.class_id))
                .then(a.bbox[0].partial_cmp(&b.bbox[0]).unwrap_or(Ordering::Equal))
        });

        Ok(filtered)
    }
}
