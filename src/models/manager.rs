use crate::models::{ObjectDetector, YoloDetector};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;

/// 检测模型句柄
///
/// 启动时显式创建并注入到路由状态中，模型只设置一次，之后只读共享。
#[derive(Default)]
pub struct ModelManager {
    detector: OnceCell<Arc<dyn ObjectDetector>>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用已有的检测器创建
    pub fn with_detector(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector: OnceCell::with_value(detector),
        }
    }

    /// 加载ONNX检测模型，失败时整个服务不应启动
    pub fn init(&self, config: &Config) -> Result<()> {
        tracing::info!("Initializing model manager...");

        let detector = YoloDetector::new(&config.model)?;
        self.install(Arc::new(detector))?;

        tracing::info!("Model manager initialized successfully");
        Ok(())
    }

    pub fn install(&self, detector: Arc<dyn ObjectDetector>) -> Result<()> {
        self.detector
            .set(detector)
            .map_err(|_| DetectError::Internal("Model manager already initialized".to_string()))
    }

    /// 获取检测器引用
    pub fn detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        self.detector
            .get()
            .cloned()
            .ok_or(DetectError::ModelNotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.get().is_some()
    }

    /// 模型状态，不触发推理
    pub fn status(&self) -> ModelStatus {
        match self.detector.get() {
            Some(detector) => ModelStatus {
                model_loaded: true,
                device: detector.device().to_string(),
            },
            None => ModelStatus {
                model_loaded: false,
                device: "unknown".to_string(),
            },
        }
    }
}

/// 模型状态信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub device: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Raster;
    use crate::models::{ClassNames, ComputeDevice, RawDetection};

    struct StubDetector {
        classes: ClassNames,
    }

    impl ObjectDetector for StubDetector {
        fn infer(&self, _raster: &Raster) -> Result<Vec<RawDetection>> {
            Ok(Vec::new())
        }

        fn class_names(&self) -> &ClassNames {
            &self.classes
        }

        fn device(&self) -> ComputeDevice {
            ComputeDevice::Cpu
        }
    }

    fn stub() -> Arc<dyn ObjectDetector> {
        Arc::new(StubDetector {
            classes: ClassNames::coco(),
        })
    }

    #[test]
    fn empty_manager_reports_unknown_device() {
        let manager = ModelManager::new();
        assert_eq!(
            manager.status(),
            ModelStatus {
                model_loaded: false,
                device: "unknown".to_string()
            }
        );
        assert!(matches!(manager.detector(), Err(DetectError::ModelNotLoaded)));
    }

    #[test]
    fn installed_detector_is_shared() {
        let manager = ModelManager::with_detector(stub());
        assert!(manager.is_loaded());
        assert_eq!(manager.status().device, "cpu");

        let a = manager.detector().unwrap();
        let b = manager.detector().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn second_install_is_rejected() {
        let manager = ModelManager::new();
        manager.install(stub()).unwrap();
        assert!(manager.install(stub()).is_err());
    }

    #[test]
    fn preloaded_manager_keeps_its_detector() {
        let first = stub();
        let manager = ModelManager::with_detector(Arc::clone(&first));

        assert!(matches!(
            manager.install(stub()),
            Err(DetectError::Internal(_))
        ));
        assert!(Arc::ptr_eq(&manager.detector().unwrap(), &first));
    }
}
