use anyhow::Result;
use clap::Parser;
use object_detect_api::{
    config::{Config, DevicePreference},
    web::serve,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "object-detect-api")]
#[command(about = "ONNX-powered object detection service")]
struct Args {
    /// Server bind address
    #[arg(long, env = "DETECT_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Path to the ONNX detection model
    #[arg(long, env = "DETECT_MODEL", default_value = "models/yolov5s.onnx")]
    model: String,

    /// Class names file, one per line (defaults to COCO-80)
    #[arg(long, env = "DETECT_LABELS")]
    labels: Option<String>,

    /// Directory for annotated images
    #[arg(long, env = "DETECT_STATIC_DIR", default_value = "static")]
    static_dir: String,

    /// Inference device: auto, cpu or cuda
    #[arg(long, default_value = "auto")]
    device: String,

    /// TrueType font for box labels (built-in bitmap font if omitted)
    #[arg(long)]
    label_font: Option<String>,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting object detection service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Model path: {}", args.model);

    let device: DevicePreference = args.device.parse()?;

    // 创建配置
    let config = Config::new(
        args.bind,
        args.model,
        args.static_dir,
        args.workers,
        args.dev,
    )?
    .with_labels(args.labels)
    .with_device(device)
    .with_label_font(args.label_font);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    // 启动服务器
    runtime.block_on(serve(config))?;

    Ok(())
}
