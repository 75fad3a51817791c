pub mod detector;
pub mod labels;
pub mod manager;
pub mod yolo;

pub use detector::{ComputeDevice, ObjectDetector, RawDetection};
pub use labels::ClassNames;
pub use manager::{ModelManager, ModelStatus};
pub use yolo::{YoloDetector, YoloPostprocess};
