use crate::image::Raster;
use crate::utils::error::DetectError;
use crate::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::fs;
use std::io::Cursor;
use std::path::Path;

pub struct ImageCodec;

impl ImageCodec {
    /// 从字节流解码图像
    ///
    /// 按内容嗅探格式，应用EXIF方向，统一转换为RGB。
    /// 任何解码失败都属于客户端输入错误。
    pub fn decode(bytes: &[u8]) -> Result<Raster> {
        if bytes.is_empty() {
            return Err(DetectError::InvalidImage("Empty upload".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DetectError::InvalidImage(e.to_string()))?;

        if reader.format().is_none() {
            return Err(DetectError::InvalidImage(
                "Unrecognized image container".to_string(),
            ));
        }

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|e| DetectError::InvalidImage(e.to_string()))?;
        image.apply_orientation(orientation);

        Raster::from_rgb_image(&image.to_rgb8())
    }

    /// 编码为JPEG字节
    pub fn encode_jpeg(raster: &Raster, quality: u8) -> Result<Vec<u8>> {
        let rgb = raster.to_rgb_image();
        let mut buffer = Vec::new();

        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|e| DetectError::Encode(e.to_string()))?;

        Ok(buffer)
    }

    /// 编码并写入目标路径
    ///
    /// 先在内存中完成编码，再一次性写入；写入失败时清理残留文件。
    pub fn encode(raster: &Raster, destination: &Path, quality: u8) -> Result<()> {
        let bytes = Self::encode_jpeg(raster, quality)?;

        if let Err(e) = fs::write(destination, &bytes) {
            let _ = fs::remove_file(destination);
            return Err(DetectError::Encode(format!(
                "Failed to write {}: {}",
                destination.display(),
                e
            )));
        }

        Ok(())
    }
}
