use crate::{
    detection::{parse_threshold, DetectOptions, DetectStage, DetectionResponse},
    utils::error::DetectError,
    web::{extractors::RequestId, AppState},
    Result,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: String,
}

/// Multipart图片上传检测处理器
pub async fn detect_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>> {
    // 模型未加载时直接失败，不做任何解码
    let pipeline = state.pipeline()?;

    // 非multipart请求同样以JSON错误返回
    let mut multipart = multipart.map_err(|rejection| {
        DetectError::InvalidInput(format!("Invalid multipart request: {}", rejection.body_text()))
    })?;

    let started = Instant::now();
    tracing::info!(
        "Processing detection request: request_id={}, stage={:?}",
        request_id,
        DetectStage::Received
    );

    let mut image_data: Option<Bytes> = None;
    let mut options = DetectOptions::default();

    // 解析multipart数据
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        DetectError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                // 验证内容类型
                let is_image = field
                    .content_type()
                    .map(|content_type| content_type.starts_with("image/"))
                    .unwrap_or(false);
                if !is_image {
                    return Err(DetectError::InvalidInput(
                        "File must be an image".to_string(),
                    ));
                }

                let data = field.bytes().await.map_err(|e| {
                    DetectError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;

                tracing::debug!("Received file: {} bytes", data.len());
                image_data = Some(data);
            }
            "confidence_threshold" => {
                let value = field.text().await.map_err(|e| {
                    DetectError::InvalidInput(format!("Failed to read form field: {}", e))
                })?;
                options.confidence_threshold = parse_threshold(&value)?;
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    // 验证必需的图像数据
    let image_data =
        image_data.ok_or_else(|| DetectError::InvalidInput("No file provided".to_string()))?;

    let response = tokio::task::spawn_blocking(move || {
        pipeline.process(&image_data, options, started)
    })
    .await
    .map_err(|e| DetectError::Internal(format!("Detection task failed: {}", e)))??;

    tracing::info!(
        "Detection request finished: request_id={}, objects={}, url={}",
        request_id,
        response.detections.len(),
        response.image_url
    );

    Ok(Json(response))
}

/// 健康检查端点，不触发推理
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.models.status();

    Json(HealthResponse {
        status: "healthy",
        model_loaded: status.model_loaded,
        device: status.device,
    })
}

/// 服务信息端点
pub async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Object Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "detect": "/detect - POST - Upload image for object detection",
            "health": "/health - GET - Check API health",
            "static": format!("{}/{{filename}} - GET - Annotated images", state.store.url_prefix()),
        }
    }))
}
