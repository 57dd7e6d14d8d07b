// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 帧渲染: 缩放 → 检测/跟踪 → 绘制 → 显示

use std::io::Read;
use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use anyhow::{anyhow, Context, Result};
use fast_image_resize as fr;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::display::DisplayTarget;
use crate::error::StreamError;
use crate::predictor::ModelHandle;
use crate::tracking::TrackerSelection;
use crate::{Bbox, DetectionResult};

/// 显示宽度
pub const FRAME_WIDTH: u32 = 720;
/// 显示高度 = round(720 * 9 / 16)
pub const FRAME_HEIGHT: u32 = 405;
/// 显示标题
pub const CAPTION: &str = "Detected Video";

const FONT_NAME: &str = "Arial.ttf";
const FONT_URL: &str = "https://ultralytics.com/assets/Arial.ttf";

/// 缩放到 720x405 (不保持宽高比)
pub fn resize_frame(frame: &RgbImage) -> Result<RgbImage, StreamError> {
    if frame.dimensions() == (FRAME_WIDTH, FRAME_HEIGHT) {
        return Ok(frame.clone());
    }
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return Err(StreamError::Display(format!("empty frame {}x{}", w, h)));
    }

    let src_image = fr::images::Image::from_vec_u8(w, h, frame.as_raw().clone(), fr::PixelType::U8x3)
        .map_err(|e| StreamError::Display(format!("resize source: {}", e)))?;
    let mut dst_image = fr::images::Image::new(FRAME_WIDTH, FRAME_HEIGHT, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| StreamError::Display(format!("resize: {}", e)))?;

    RgbImage::from_raw(FRAME_WIDTH, FRAME_HEIGHT, dst_image.buffer().to_vec())
        .ok_or_else(|| StreamError::Display("resize produced a short buffer".into()))
}

/// 检测框绘制
pub struct Annotator {
    font: Option<FontArc>,
    color_palette: Vec<(u8, u8, u8)>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        let color_palette = vec![
            (255, 0, 0),     // 红色
            (0, 255, 0),     // 绿色
            (0, 0, 255),     // 蓝色
            (255, 255, 0),   // 黄色
            (255, 0, 255),   // 品红
            (0, 255, 255),   // 青色
            (255, 128, 0),   // 橙色
            (255, 0, 128),   // 粉红
            (128, 255, 0),   // 黄绿
            (0, 128, 255),   // 天蓝
            (255, 255, 255), // 白色
            (128, 0, 255),   // 紫色
        ];
        Self {
            font,
            color_palette,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 颜色: 有跟踪ID时按ID, 否则按类别
    pub fn color(&self, bbox: &Bbox) -> Rgb<u8> {
        let key = bbox.track_id().map_or(bbox.id(), |id| id as usize);
        let (r, g, b) = self.color_palette[key % self.color_palette.len()];
        Rgb([r, g, b])
    }

    pub fn label(bbox: &Bbox, names: &[String]) -> String {
        let name = names
            .get(bbox.id())
            .cloned()
            .unwrap_or_else(|| format!("class{}", bbox.id()));
        match bbox.track_id() {
            Some(id) => format!("id:{} {} {:.2}", id, name, bbox.confidence()),
            None => format!("{} {:.2}", name, bbox.confidence()),
        }
    }

    pub fn draw(&self, img: &mut RgbImage, result: &DetectionResult, names: &[String]) {
        let (img_w, img_h) = img.dimensions();
        let thickness = (img_w.max(img_h) / 360).max(1) as i32;
        let legend_size = (img_w.max(img_h) / 40).max(10) as f32;

        for bbox in result.bboxes() {
            let color = self.color(bbox);
            let x = bbox.xmin().round() as i32;
            let y = bbox.ymin().round() as i32;
            let w = bbox.width().round().max(1.) as u32;
            let h = bbox.height().round().max(1.) as u32;

            for t in 0..thickness {
                let (tw, th) = (w.saturating_sub(2 * t as u32), h.saturating_sub(2 * t as u32));
                if tw == 0 || th == 0 {
                    break;
                }
                draw_hollow_rect_mut(img, Rect::at(x + t, y + t).of_size(tw, th), color);
            }

            let Some(font) = self.font.as_ref() else {
                continue;
            };
            let legend = Self::label(bbox, names);
            let (tw, th) = text_size(legend_size, font, &legend);
            let label_y = if y - th as i32 - 2 >= 0 { y - th as i32 - 2 } else { y };
            draw_filled_rect_mut(
                img,
                Rect::at(x, label_y).of_size(tw.max(1) + 4, th.max(1) + 2),
                color,
            );
            draw_text_mut(
                img,
                Rgb([0, 0, 0]),
                x + 2,
                label_y,
                legend_size,
                font,
                &legend,
            );
        }
    }
}

/// 帧渲染器
pub struct FrameRenderer {
    annotator: Annotator,
}

impl FrameRenderer {
    pub fn new(annotator: Annotator) -> Self {
        Self { annotator }
    }

    /// 使用配置/缓存/下载的字体, 字体不可用时只画框
    pub fn with_font(font: Option<&Path>) -> Self {
        Self::new(Annotator::new(shared_font(font)))
    }

    /// 缩放 → predict/track → 绘制 → 显示
    pub fn render<H: ModelHandle + ?Sized>(
        &self,
        conf: f32,
        model: &mut H,
        display: &mut dyn DisplayTarget,
        frame: &RgbImage,
        selection: &TrackerSelection,
    ) -> Result<(), StreamError> {
        let image = DynamicImage::ImageRgb8(resize_frame(frame)?);

        let ys = match selection.kind() {
            Some(kind) if selection.is_enabled() => model.track(&image, conf, true, kind),
            _ => model.predict(&image, conf),
        }
        .map_err(StreamError::inference)?;

        let mut canvas = image.into_rgb8();
        if let Some(res) = ys.first() {
            debug!("{} detections", res.len());
            self.annotator.draw(&mut canvas, res, model.names());
        }
        display.show(&canvas, CAPTION)
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new(Annotator::new(None))
    }
}

static FONT: OnceCell<Option<FontArc>> = OnceCell::new();

/// 进程内只加载一次字体
fn shared_font(preferred: Option<&Path>) -> Option<FontArc> {
    FONT.get_or_init(|| match check_font(preferred) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("label font unavailable, drawing boxes only: {:#}", e);
            None
        }
    })
    .clone()
}

/// 查找字体: 指定路径 → ~/.config/Ultralytics → 当前目录 → 下载
pub fn check_font(preferred: Option<&Path>) -> Result<FontArc> {
    let font_path_config = dirs::config_dir().map(|mut d| {
        d.push("Ultralytics");
        d.push(FONT_NAME);
        d
    });
    let font_path_current = PathBuf::from(FONT_NAME);

    let candidates = preferred
        .map(Path::to_path_buf)
        .into_iter()
        .chain(font_path_config.clone())
        .chain(std::iter::once(font_path_current.clone()));
    for path in candidates {
        if path.exists() {
            return load_font(&path);
        }
    }

    let target = font_path_config.unwrap_or(font_path_current);
    download_font(&target)?;
    load_font(&target)
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

fn download_font(target: &Path) -> Result<()> {
    info!("Downloading font {} ...", FONT_URL);
    let resp = ureq::get(FONT_URL)
        .timeout(std::time::Duration::from_secs(30))
        .call()
        .with_context(|| format!("Failed to download font: {}", FONT_URL))?;

    let mut buffer = vec![];
    resp.into_reader()
        .take(20 * 1024 * 1024)
        .read_to_end(&mut buffer)?;

    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(target, &buffer)?;
    info!("Font saved at: {}", target.display());
    Ok(())
}
