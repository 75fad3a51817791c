use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("{0}")]
    InvalidInput(String),

    /// 上传内容无法解码为图像，具体原因只写日志
    #[error("Invalid image file")]
    InvalidImage(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Detection refers to unknown class id {0}")]
    UnknownClass(usize),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("Artifact storage failed: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DetectError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DetectError::InvalidInput(_) => "INVALID_INPUT",
            DetectError::InvalidImage(_) => "INVALID_IMAGE",
            DetectError::ModelNotLoaded => "MODEL_NOT_LOADED",
            DetectError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            DetectError::Inference(_) => "INFERENCE_ERROR",
            DetectError::UnknownClass(_) => "UNKNOWN_CLASS",
            DetectError::Encode(_) => "ENCODE_ERROR",
            DetectError::Storage(_) => "STORAGE_ERROR",
            DetectError::Config(_) => "CONFIG_ERROR",
            DetectError::Io(_) => "IO_ERROR",
            DetectError::Ort(_) => "ORT_ERROR",
            DetectError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// 返回给客户端的错误描述
    pub fn detail(&self) -> String {
        match self {
            DetectError::InvalidInput(_)
            | DetectError::InvalidImage(_)
            | DetectError::ModelNotLoaded => self.to_string(),
            other => format!("Error processing image: {}", other),
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_client_error() {
            match &self {
                DetectError::InvalidImage(cause) => {
                    tracing::warn!("Rejected upload: {} ({})", cause, status)
                }
                other => tracing::warn!("Rejected request: {} ({})", other, status),
            }
        } else {
            tracing::error!("Request failed: {} ({})", self, status);
        }

        let body = serde_json::json!({
            "detail": self.detail(),
            "code": self.error_code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            DetectError::InvalidInput("File must be an image".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DetectError::InvalidImage("truncated".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_faults_map_to_internal_error() {
        assert_eq!(
            DetectError::ModelNotLoaded.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DetectError::Storage("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_image_hides_decoder_detail() {
        let err = DetectError::InvalidImage("unexpected EOF".into());
        assert_eq!(err.detail(), "Invalid image file");
    }

    #[test]
    fn internal_faults_are_prefixed() {
        let err = DetectError::Storage("permission denied".into());
        assert_eq!(
            err.detail(),
            "Error processing image: Artifact storage failed: permission denied"
        );
        assert_eq!(DetectError::ModelNotLoaded.detail(), "Model not loaded");
    }
}
