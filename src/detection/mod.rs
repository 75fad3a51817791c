pub mod filter;
pub mod pipeline;
pub mod types;

pub use filter::{parse_threshold, validate_threshold, ResultFilter};
pub use pipeline::DetectionPipeline;
pub use types::{
    DetectOptions, DetectStage, DetectionResponse, FilteredDetection,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
