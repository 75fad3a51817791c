use crate::image::Raster;
use ndarray::Array4;

/// letterbox填充值（YOLO训练时使用的灰色）
pub const LETTERBOX_FILL: f32 = 114.0;

/// 等比缩放并居中填充后的模型输入
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// NCHW，取值范围 [0, 1]
    pub tensor: Array4<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// 将模型坐标系中的框映射回原图坐标
    pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x) / self.scale,
            (bbox[1] - self.pad_y) / self.scale,
            (bbox[2] - self.pad_x) / self.scale,
            (bbox[3] - self.pad_y) / self.scale,
        ]
    }
}

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 等比缩放到 `size x size`，双线性插值，居中填充
    pub fn letterbox(raster: &Raster, size: u32) -> Letterbox {
        let image = raster.view();
        let (orig_h, orig_w, channels) = image.dim();
        let target = size as usize;

        // 计算缩放比例
        let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);

        let new_w = ((orig_w as f32 * scale).round() as usize).clamp(1, target);
        let new_h = ((orig_h as f32 * scale).round() as usize).clamp(1, target);

        // 计算padding偏移
        let offset_x = (target - new_w) / 2;
        let offset_y = (target - new_h) / 2;

        let mut tensor =
            Array4::<f32>::from_elem((1, channels, target, target), LETTERBOX_FILL / 255.0);

        // 双线性插值缩放，同时转换为CHW并归一化
        let inv_x = orig_w as f32 / new_w as f32;
        let inv_y = orig_h as f32 / new_h as f32;
        for h in 0..new_h {
            let src_h = ((h as f32 + 0.5) * inv_y - 0.5).max(0.0);
            let h1 = (src_h.floor() as usize).min(orig_h - 1);
            let h2 = (h1 + 1).min(orig_h - 1);
            let dh = src_h - h1 as f32;

            for w in 0..new_w {
                let src_w = ((w as f32 + 0.5) * inv_x - 0.5).max(0.0);
                let w1 = (src_w.floor() as usize).min(orig_w - 1);
                let w2 = (w1 + 1).min(orig_w - 1);
                let dw = src_w - w1 as f32;

                for c in 0..channels {
                    let v11 = image[[h1, w1, c]] as f32;
                    let v12 = image[[h1, w2, c]] as f32;
                    let v21 = image[[h2, w1, c]] as f32;
                    let v22 = image[[h2, w2, c]] as f32;

                    let interpolated = v11 * (1.0 - dh) * (1.0 - dw)
                        + v12 * (1.0 - dh) * dw
                        + v21 * dh * (1.0 - dw)
                        + v22 * dh * dw;

                    tensor[[0, c, h + offset_y, w + offset_x]] = interpolated / 255.0;
                }
            }
        }

        Letterbox {
            tensor,
            scale,
            pad_x: offset_x as f32,
            pad_y: offset_y as f32,
        }
    }
}
