pub mod annotate;
pub mod codec;
pub mod glyphs;
pub mod raster;
pub mod transforms;

pub use annotate::{Annotator, LabelFont};
pub use codec::ImageCodec;
pub use raster::Raster;
pub use transforms::{ImageTransforms, Letterbox};
