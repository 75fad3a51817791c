use crate::config::RenderConfig;
use crate::detection::FilteredDetection;
use crate::image::glyphs::{self, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};
use crate::image::Raster;
use crate::utils::error::DetectError;
use crate::Result;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fs;
use std::path::Path;

/// 类别颜色表（RGB），按 `class_id % len` 取色
pub const PALETTE: [[u8; 3]; 12] = [
    [0, 0, 255],
    [0, 255, 0],
    [255, 0, 0],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
    [128, 0, 128],
    [0, 165, 255],
    [0, 128, 128],
    [128, 128, 0],
    [0, 0, 128],
    [0, 128, 0],
];

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 3;
const BITMAP_SCALE: u32 = 2;
const TRUETYPE_SIZE: f32 = 18.0;

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

pub fn label_text(detection: &FilteredDetection) -> String {
    format!("{}: {:.2}", detection.class_name, detection.confidence)
}

/// 标签字体
pub enum LabelFont {
    Bitmap { scale: u32 },
    Truetype { font: FontVec, scale: PxScale },
}

impl LabelFont {
    pub fn bitmap() -> Self {
        LabelFont::Bitmap {
            scale: BITMAP_SCALE,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            DetectError::Config(format!("Failed to read font {}: {}", path.display(), e))
        })?;
        let font = FontVec::try_from_vec(data).map_err(|e| {
            DetectError::Config(format!("Invalid font {}: {}", path.display(), e))
        })?;

        Ok(LabelFont::Truetype {
            font,
            scale: PxScale::from(TRUETYPE_SIZE),
        })
    }

    /// `(width, height)`
    fn text_size(&self, text: &str) -> (u32, u32) {
        match self {
            LabelFont::Bitmap { scale } => {
                let count = text.chars().count() as u32;
                let advance = (GLYPH_WIDTH + GLYPH_SPACING) * scale;
                let width = (count * advance).saturating_sub(GLYPH_SPACING * scale);
                (width, GLYPH_HEIGHT * scale)
            }
            LabelFont::Truetype { font, scale } => text_size(*scale, font, text),
        }
    }

    fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match self {
            LabelFont::Bitmap { scale } => {
                let advance = ((GLYPH_WIDTH + GLYPH_SPACING) * scale) as i32;
                for (i, ch) in text.chars().enumerate() {
                    let Some(bits) = glyphs::glyph_bits(ch) else {
                        continue;
                    };
                    let origin_x = x + i as i32 * advance;
                    for (col, row) in glyphs::lit_pixels(&bits) {
                        let rect = Rect::at(
                            origin_x + (col * scale) as i32,
                            y + (row * scale) as i32,
                        )
                        .of_size(*scale, *scale);
                        draw_filled_rect_mut(canvas, rect, color);
                    }
                }
            }
            LabelFont::Truetype { font, scale } => {
                draw_text_mut(canvas, color, x, y, *scale, font, text);
            }
        }
    }
}

/// 检测结果可视化
pub struct Annotator {
    line_thickness: u32,
    font: LabelFont,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            font: LabelFont::bitmap(),
        }
    }
}

impl Annotator {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let font = match &config.label_font {
            Some(path) => {
                tracing::info!("Loading label font from: {}", path.display());
                LabelFont::from_file(path)?
            }
            None => LabelFont::bitmap(),
        };

        Ok(Self {
            line_thickness: config.line_thickness.max(1),
            font,
        })
    }

    /// 在副本上绘制检测框和标签，输入图像保持不变
    pub fn annotate(&self, raster: &Raster, detections: &[FilteredDetection]) -> Raster {
        let mut canvas = raster.to_rgb_image();

        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }

        Raster::from_canvas(&canvas)
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &FilteredDetection) {
        let Some((x1, y1, x2, y2)) = clip_box(&detection.bbox, canvas.width(), canvas.height())
        else {
            tracing::debug!(
                "Skipping box outside image bounds: {:?} ({})",
                detection.bbox,
                detection.class_name
            );
            return;
        };
        let color = class_color(detection.class_id);

        // 绘制边框，线宽向内收缩
        for t in 0..self.line_thickness as i32 {
            let width = x2 - x1 - 2 * t + 1;
            let height = y2 - y1 - 2 * t + 1;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        // 标签位于左上角上方，超出顶部时贴住图像上边缘
        let label = label_text(detection);
        let (text_w, text_h) = self.font.text_size(&label);
        let background_w = text_w as i32 + 2 * LABEL_PADDING;
        let background_h = text_h as i32 + 2 * LABEL_PADDING;
        let label_x = x1;
        let label_y = (y1 - background_h).max(0);

        let background = Rect::at(label_x, label_y)
            .of_size(background_w.max(1) as u32, background_h.max(1) as u32);
        draw_filled_rect_mut(canvas, background, color);

        self.font.draw(
            canvas,
            label_x + LABEL_PADDING,
            label_y + LABEL_PADDING,
            &label,
            LABEL_TEXT_COLOR,
        );
    }
}

/// 四舍五入并裁剪到图像范围，与图像无交集时返回 `None`
pub fn clip_box(bbox: &[f32; 4], width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
    if bbox.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    let x1 = bbox[0].round() as i32;
    let y1 = bbox[1].round() as i32;
    let x2 = bbox[2].round() as i32;
    let y2 = bbox[3].round() as i32;

    if x2 < x1 || y2 < y1 || x2 < 0 || y2 < 0 || x1 > max_x || y1 > max_y {
        return None;
    }

    Some((
        x1.clamp(0, max_x),
        y1.clamp(0, max_y),
        x2.clamp(0, max_x),
        y2.clamp(0, max_y),
    ))
}
