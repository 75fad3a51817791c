pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    detection::DetectionPipeline,
    image::Annotator,
    models::ModelManager,
    storage::ArtifactStore,
    utils::error::DetectError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelManager>,
    pub annotator: Arc<Annotator>,
    pub store: Arc<ArtifactStore>,
}

impl AppState {
    pub fn new(config: &Config, models: Arc<ModelManager>) -> Result<Self> {
        Ok(Self {
            models,
            annotator: Arc::new(Annotator::new(&config.render)?),
            store: Arc::new(ArtifactStore::new(&config.storage)?),
        })
    }

    /// 为单个请求组装流水线，模型未加载时返回 `ModelNotLoaded`
    pub fn pipeline(&self) -> Result<DetectionPipeline> {
        let detector = self.models.detector()?;
        Ok(DetectionPipeline::new(
            detector,
            Arc::clone(&self.annotator),
            Arc::clone(&self.store),
        ))
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let models = Arc::new(ModelManager::new());
    let state = AppState::new(&config, Arc::clone(&models))?;

    // 初始化模型，失败则服务不启动
    let loader = Arc::clone(&models);
    let model_config = config.clone();
    tokio::task::spawn_blocking(move || loader.init(&model_config))
        .await
        .map_err(|e| DetectError::Internal(format!("Model loading task failed: {}", e)))??;

    let app = create_app(&config, state)?;

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        DetectError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /detect    - Multipart image upload");
    tracing::info!("  GET  /health    - Health check");
    tracing::info!("  GET  /          - Service information");
    tracing::info!(
        "  GET  {}/*  - Annotated images from {}",
        config.storage.url_prefix,
        config.storage.static_dir.display()
    );

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DetectError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DetectError::Internal(format!("Server failed: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn create_app(config: &Config, state: AppState) -> Result<Router> {
    let static_files = ServeDir::new(state.store.root());

    let app = Router::new()
        .route("/detect", post(handlers::detect_handler))
        .route("/health", get(handlers::health_handler))
        .route("/", get(handlers::root_handler))
        .nest_service(&config.storage.url_prefix, static_files)
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(config.server.max_request_size))
        .layer(RequestBodyLimitLayer::new(config.server.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout,
        )))
        .layer(cors_layer(config)?)
        .with_state(state);

    Ok(app)
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    if config.dev_mode {
        return Ok(CorsLayer::permissive()); // 开发环境使用宽松CORS
    }

    let origins = config
        .server
        .cors_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                DetectError::Config(format!("Invalid CORS origin {}: {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
