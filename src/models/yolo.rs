use crate::config::{DevicePreference, ModelConfig};
use crate::image::{ImageTransforms, Letterbox, Raster};
use crate::models::{ClassNames, ComputeDevice, ObjectDetector, RawDetection};
use crate::utils::error::DetectError;
use crate::Result;
use ndarray::{s, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix3};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider},
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::cmp::Ordering;

/// 基于ONNX Runtime的YOLO检测器（兼容YOLOv5/YOLOv8导出格式）
pub struct YoloDetector {
    // ort 的 run 需要独占会话，锁只在单次推理期间持有
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
    classes: ClassNames,
    device: ComputeDevice,
    postprocess: YoloPostprocess,
}

impl YoloDetector {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(DetectError::ModelLoad(format!(
                "Detection model not found: {}",
                model_path.display()
            )));
        }

        let classes = match &config.labels_path {
            Some(path) => {
                tracing::info!("Loading class names from: {}", path.display());
                ClassNames::from_file(path)?
            }
            None => ClassNames::coco(),
        };

        let device = select_device(config.device)?;
        tracing::info!("Using device: {}", device);
        tracing::info!("Loading detection model from: {}", model_path.display());

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;
        let builder = match device {
            ComputeDevice::Cuda => builder.with_execution_providers([
                CUDAExecutionProvider::default().build().error_on_failure(),
            ])?,
            ComputeDevice::Cpu => {
                builder.with_execution_providers([CPUExecutionProvider::default().build()])?
            }
        };
        let session = builder.commit_from_file(model_path)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(DetectError::ModelLoad(
                    "Detection model has no inputs".to_string(),
                ))
            }
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(DetectError::ModelLoad(
                    "Detection model has no outputs".to_string(),
                ))
            }
        };

        tracing::info!(
            "Detection model loaded: input='{}', output='{}', classes={}",
            input_name,
            output_name,
            classes.len()
        );
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Detection output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size: config.input_size,
            postprocess: YoloPostprocess {
                num_classes: classes.len(),
                score_threshold: config.score_threshold,
                iou_threshold: config.iou_threshold,
                max_detections: config.max_detections,
            },
            classes,
            device,
        })
    }

    fn run_session(&self, letterbox: &Letterbox) -> Result<ArrayD<f32>> {
        let input_tensor = Tensor::from_array(letterbox.tensor.clone())?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        match outputs.get(self.output_name.as_str()) {
            Some(output) => Ok(output.try_extract_array::<f32>()?.into_owned()),
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                Err(DetectError::Inference(format!(
                    "Output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )))
            }
        }
    }
}

impl ObjectDetector for YoloDetector {
    fn infer(&self, raster: &Raster) -> Result<Vec<RawDetection>> {
        let letterbox = ImageTransforms::letterbox(raster, self.input_size);
        let prediction = self.run_session(&letterbox)?;

        let (width, height) = raster.dimensions();
        let detections = self
            .postprocess
            .run(prediction.view(), &letterbox, width, height)?;

        tracing::debug!("Model produced {} detections", detections.len());
        Ok(detections)
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }
}

fn cuda_available() -> bool {
    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            tracing::debug!("CUDA availability check failed: {}", e);
            false
        }
    }
}

fn select_device(preference: DevicePreference) -> Result<ComputeDevice> {
    match preference {
        DevicePreference::Cpu => Ok(ComputeDevice::Cpu),
        DevicePreference::Cuda if cuda_available() => Ok(ComputeDevice::Cuda),
        DevicePreference::Cuda => Err(DetectError::ModelLoad(
            "CUDA was requested but the CUDA execution provider is not available".to_string(),
        )),
        DevicePreference::Auto if cuda_available() => Ok(ComputeDevice::Cuda),
        DevicePreference::Auto => Ok(ComputeDevice::Cpu),
    }
}

/// 输出张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputLayout {
    /// `[1, N, 5 + C]`：cx, cy, w, h, objectness, 类别分数
    Objectness,
    /// `[1, 4 + C, N]`：cx, cy, w, h, 类别分数
    Transposed,
}

/// YOLO后处理：候选筛选、NMS、坐标还原
#[derive(Debug, Clone)]
pub struct YoloPostprocess {
    pub num_classes: usize,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl YoloPostprocess {
    pub fn run(
        &self,
        prediction: ArrayViewD<f32>,
        letterbox: &Letterbox,
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>> {
        let shape = prediction.shape().to_vec();
        let prediction = prediction.into_dimensionality::<Ix3>().map_err(|_| {
            DetectError::Inference(format!(
                "Unsupported detection output shape: {:?}, expected 3D",
                shape
            ))
        })?;

        if shape[0] != 1 {
            return Err(DetectError::Inference(format!(
                "Expected batch size 1 for detection, got {}",
                shape[0]
            )));
        }

        let plane = prediction.index_axis(Axis(0), 0);
        let (rows, layout) = if shape[2] == self.num_classes + 5 {
            (plane, OutputLayout::Objectness)
        } else if shape[1] == self.num_classes + 4 {
            (plane.reversed_axes(), OutputLayout::Transposed)
        } else {
            return Err(DetectError::Inference(format!(
                "Detection output shape {:?} does not match {} classes",
                shape, self.num_classes
            )));
        };

        let candidates = self.candidates(rows, layout);
        tracing::debug!("Detection candidates above score threshold: {}", candidates.len());

        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        let (max_x, max_y) = (width as f32, height as f32);
        let detections = kept
            .into_iter()
            .filter_map(|det| {
                let b = letterbox.restore(det.bbox);
                let bbox = [
                    b[0].clamp(0.0, max_x),
                    b[1].clamp(0.0, max_y),
                    b[2].clamp(0.0, max_x),
                    b[3].clamp(0.0, max_y),
                ];
                // 裁剪后退化的框直接丢弃
                if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
                    return None;
                }
                Some(RawDetection {
                    bbox,
                    confidence: det.confidence.clamp(0.0, 1.0),
                    class_id: det.class_id,
                })
            })
            .collect();

        Ok(detections)
    }

    fn candidates(&self, rows: ArrayView2<f32>, layout: OutputLayout) -> Vec<RawDetection> {
        let mut candidates = Vec::new();

        for row in rows.outer_iter() {
            let confidence_and_class = match layout {
                OutputLayout::Objectness => {
                    let objectness = row[4];
                    if objectness < self.score_threshold {
                        continue;
                    }
                    best_class(row.slice(s![5..])).map(|(id, score)| (id, score * objectness))
                }
                OutputLayout::Transposed => best_class(row.slice(s![4..])),
            };

            let Some((class_id, confidence)) = confidence_and_class else {
                continue;
            };
            if !confidence.is_finite() || confidence < self.score_threshold {
                continue;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            if w <= 0.0 || h <= 0.0 {
                continue;
            }

            candidates.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                confidence,
                class_id,
            });
        }

        candidates
    }
}

fn best_class(scores: ArrayView1<f32>) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

/// 两个框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// 按类别分别做贪心NMS，结果按置信度降序
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn identity_letterbox() -> Letterbox {
        Letterbox {
            tensor: Array4::zeros((1, 3, 1, 1)),
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    fn postprocess(num_classes: usize) -> YoloPostprocess {
        YoloPostprocess {
            num_classes,
            score_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }

    fn det(bbox: [f32; 4], confidence: f32, class_id: usize) -> RawDetection {
        RawDetection {
            bbox,
            confidence,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let kept = non_max_suppression(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.6, 0),
                det([1.0, 1.0, 11.0, 11.0], 0.9, 0),
                det([1.0, 1.0, 11.0, 11.0], 0.8, 1),
                det([50.0, 50.0, 60.0, 60.0], 0.3, 0),
            ],
            0.45,
            10,
        );

        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.8, 0.3]);
    }

    #[test]
    fn nms_respects_max_detections() {
        let candidates = (0..5)
            .map(|i| det([i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0], 0.5, 0))
            .collect();
        assert_eq!(non_max_suppression(candidates, 0.45, 2).len(), 2);
    }

    #[test]
    fn decodes_objectness_layout() {
        // 2个候选，3个类别：[cx, cy, w, h, obj, c0, c1, c2]
        let mut output = Array3::<f32>::zeros((1, 2, 8));
        output
            .slice_mut(s![0, 0, ..])
            .assign(&ndarray::arr1(&[50.0, 40.0, 20.0, 10.0, 0.9, 0.1, 0.8, 0.1]));
        output
            .slice_mut(s![0, 1, ..])
            .assign(&ndarray::arr1(&[10.0, 10.0, 4.0, 4.0, 0.2, 0.9, 0.0, 0.0]));

        let detections = postprocess(3)
            .run(output.view().into_dyn(), &identity_letterbox(), 100, 100)
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert!((detections[0].confidence - 0.72).abs() < 1e-6);
        assert_eq!(detections[0].bbox, [40.0, 35.0, 60.0, 45.0]);
    }

    #[test]
    fn decodes_transposed_layout_and_clips() {
        // [1, 4 + 2, 1]
        let mut output = Array3::<f32>::zeros((1, 6, 1));
        for (i, v) in [95.0, 5.0, 20.0, 20.0, 0.3, 0.7].iter().enumerate() {
            output[[0, i, 0]] = *v;
        }

        let detections = postprocess(2)
            .run(output.view().into_dyn(), &identity_letterbox(), 100, 100)
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].bbox, [85.0, 0.0, 100.0, 15.0]);
    }

    #[test]
    fn boxes_outside_the_image_are_dropped() {
        let mut output = Array3::<f32>::zeros((1, 1, 6));
        output
            .slice_mut(s![0, 0, ..])
            .assign(&ndarray::arr1(&[150.0, 150.0, 10.0, 10.0, 0.9, 1.0]));

        let detections = postprocess(1)
            .run(output.view().into_dyn(), &identity_letterbox(), 100, 100)
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn class_count_mismatch_is_an_inference_error() {
        let output = Array3::<f32>::zeros((1, 10, 7));
        let err = postprocess(80)
            .run(output.view().into_dyn(), &identity_letterbox(), 10, 10)
            .unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
    }

    #[test]
    fn letterbox_offsets_are_removed() {
        let letterbox = Letterbox {
            tensor: Array4::zeros((1, 3, 1, 1)),
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 10.0,
        };
        let mut output = Array3::<f32>::zeros((1, 1, 6));
        output
            .slice_mut(s![0, 0, ..])
            .assign(&ndarray::arr1(&[20.0, 30.0, 10.0, 10.0, 0.9, 0.9]));

        let detections = postprocess(1)
            .run(output.view().into_dyn(), &letterbox, 200, 200)
            .unwrap();
        assert_eq!(detections[0].bbox, [30.0, 30.0, 50.0, 50.0]);
    }

    #[test]
    fn missing_model_fails_to_load() {
        let config = ModelConfig {
            model_path: "/nonexistent/model.onnx".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            YoloDetector::new(&config),
            Err(DetectError::ModelLoad(_))
        ));
    }
}
