use crate::{
    detection::{DetectOptions, DetectStage, DetectionResponse, ResultFilter},
    image::{Annotator, ImageCodec},
    models::ObjectDetector,
    storage::ArtifactStore,
    Result,
};
use std::sync::Arc;
use std::time::Instant;

/// 检测处理流水线：解码 → 推理 → 过滤 → 标注 → 存储
///
/// 每个请求独立持有一份，除只读的检测器外不共享可变状态。
#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn ObjectDetector>,
    annotator: Arc<Annotator>,
    store: Arc<ArtifactStore>,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        annotator: Arc<Annotator>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            detector,
            annotator,
            store,
        }
    }

    /// 同步执行整条流水线，CPU密集，调用方应放在阻塞线程池中
    ///
    /// `started` 为请求进入校验阶段的时刻，用于计算 `processing_time`。
    /// 标注图片写入成功后才会返回检测结果。
    pub fn process(
        &self,
        bytes: &[u8],
        options: DetectOptions,
        started: Instant,
    ) -> Result<DetectionResponse> {
        let mut stage = DetectStage::Validated;
        let result = self.run(bytes, options, started, &mut stage);

        if let Err(ref e) = result {
            tracing::debug!("Detection pipeline stopped after {:?}: {}", stage, e);
        }
        result
    }

    fn run(
        &self,
        bytes: &[u8],
        options: DetectOptions,
        started: Instant,
        stage: &mut DetectStage,
    ) -> Result<DetectionResponse> {
        let raster = ImageCodec::decode(bytes)?;
        let (width, height) = raster.dimensions();
        *stage = DetectStage::Decoded;
        tracing::debug!("Decoded image: {}x{}", width, height);

        let inference_start = Instant::now();
        let raw = self.detector.infer(&raster)?;
        *stage = DetectStage::Inferred;
        tracing::debug!(
            "Inference produced {} raw detections in {:.3}s",
            raw.len(),
            inference_start.elapsed().as_secs_f32()
        );

        let detections = ResultFilter::filter(
            &raw,
            options.confidence_threshold,
            self.detector.class_names(),
        )?;
        *stage = DetectStage::Filtered;

        let annotated = self.annotator.annotate(&raster, &detections);
        *stage = DetectStage::Annotated;

        let artifact = self.store.store(&annotated)?;
        *stage = DetectStage::Stored;

        let processing_time = started.elapsed().as_secs_f64();
        *stage = DetectStage::Responded;

        tracing::info!(
            "Detection completed: objects={}, threshold={}, image={}x{}, time={:.3}s",
            detections.len(),
            options.confidence_threshold,
            width,
            height,
            processing_time
        );

        Ok(DetectionResponse {
            success: true,
            image_url: artifact.url,
            detections,
            processing_time,
            image_size: [width, height],
        })
    }
}
