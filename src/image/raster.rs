use crate::utils::error::DetectError;
use crate::Result;
use image::{Rgb, RgbImage};
use ndarray::{Array3, ArrayView3};

/// 解码后的像素缓冲区
///
/// 布局固定为 HWC：形状 `(height, width, 3)`，`u8` 采样，通道顺序 RGB，
/// 行优先。宽高始终大于零。需要修改时先显式 `clone`，原图不会被别名修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: Array3<u8>,
}

impl Raster {
    pub const CHANNELS: usize = 3;

    pub fn new(pixels: Array3<u8>) -> Result<Self> {
        let (height, width, channels) = pixels.dim();

        if height == 0 || width == 0 {
            return Err(DetectError::InvalidImage(format!(
                "Empty raster: {}x{}",
                width, height
            )));
        }
        if channels != Self::CHANNELS {
            return Err(DetectError::Internal(format!(
                "Raster must have {} channels, got {}",
                Self::CHANNELS,
                channels
            )));
        }

        Ok(Self {
            pixels: pixels.as_standard_layout().into_owned(),
        })
    }

    /// 从RGB图像构建
    pub fn from_rgb_image(image: &RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidImage(format!(
                "Empty raster: {}x{}",
                width, height
            )));
        }

        Ok(Self::from_canvas(image))
    }

    /// 画布来自合法的Raster时尺寸必然非零
    pub(crate) fn from_canvas(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_fn(
            (height as usize, width as usize, Self::CHANNELS),
            |(y, x, c)| image.get_pixel(x as u32, y as u32)[c],
        );

        Self { pixels }
    }

    /// 转换为RGB图像（复制像素）
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb([
                self.pixels[[y, x, 0]],
                self.pixels[[y, x, 1]],
                self.pixels[[y, x, 2]],
            ])
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let (x, y) = (x as usize, y as usize);
        [
            self.pixels[[y, x, 0]],
            self.pixels[[y, x, 1]],
            self.pixels[[y, x, 2]],
        ]
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_sized_pixels() {
        let err = Raster::new(Array3::zeros((0, 4, 3))).unwrap_err();
        assert!(matches!(err, DetectError::InvalidImage(_)));
    }

    #[test]
    fn rejects_wrong_channel_count() {
        assert!(Raster::new(Array3::zeros((2, 2, 4))).is_err());
    }

    #[test]
    fn rgb_image_conversion_preserves_layout() {
        let image = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 7]));
        let raster = Raster::from_rgb_image(&image).unwrap();

        assert_eq!(raster.dimensions(), (3, 2));
        assert_eq!(raster.view().dim(), (2, 3, 3));
        assert_eq!(raster.pixel(2, 1), [2, 1, 7]);
        assert_eq!(raster.to_rgb_image(), image);
    }

    #[test]
    fn non_standard_layout_is_normalized() {
        let mut pixels = Array3::<u8>::zeros((2, 3, 3));
        pixels[[1, 2, 0]] = 9;
        let transposed = pixels.view().permuted_axes([1, 0, 2]).to_owned();
        let raster = Raster::new(transposed).unwrap();

        assert_eq!(raster.dimensions(), (2, 3));
        assert_eq!(raster.pixel(1, 2), [9, 0, 0]);
    }
}
