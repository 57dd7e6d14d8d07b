// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型
// 包含: 模型加载、预处理、推理、后处理

use std::path::PathBuf;

use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayView2, Axis, IxDyn};
use tracing::{debug, info};

use crate::models::Model;
use crate::{non_max_suppression, Bbox, DetectionResult, OrtBackend, OrtConfig, OrtEP};

/// 加载参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: PathBuf,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    /// 跳过导出元数据校验 (仅本次加载有效)
    pub trusted: bool,
    pub iou: f32,
    /// 动态输入模型的推理尺寸 (height, width)
    pub image_size: (u32, u32),
}

impl Default for YOLOv8Config {
    fn default() -> Self {
        Self {
            model: PathBuf::from("weights/yolov8n.onnx"),
            ep: OrtEP::CPU,
            trt_fp16: false,
            trusted: true,
            iou: 0.45,
            image_size: (640, 640),
        }
    }
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    nc: u32,
    height: u32,
    width: u32,
    iou: f32,
    names: Vec<String>,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            trt_fp16: config.trt_fp16,
            image_size: config.image_size,
            trusted: config.trusted,
        })?;

        let (height, width) = (engine.height(), engine.width());
        let nc = engine
            .nc()
            .ok_or_else(|| anyhow::anyhow!("failed to infer the number of classes"))?;

        // 无元数据时使用通用类别名
        let names = match engine.names() {
            Some(names) if names.len() == nc as usize => names,
            _ => (0..nc).map(|i| format!("class{}", i)).collect(),
        };

        Ok(Self {
            engine,
            nc,
            height,
            width,
            iou: config.iou,
            names,
        })
    }

    pub fn nc(&self) -> u32 {
        self.nc
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

impl Model for YOLOv8 {
    fn preprocess(&mut self, xs: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let mut ys =
            Array::ones((xs.len(), 3, self.height as usize, self.width as usize)).into_dyn();
        ys.fill(144.0 / 255.0);
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) = scale_wh(
                w0 as f32,
                h0 as f32,
                self.width as f32,
                self.height as f32,
            );
            let img = x.resize_exact(
                w_new as u32,
                h_new as u32,
                image::imageops::FilterType::Triangle,
            );

            for (x, y, rgb) in img.pixels() {
                let x = x as usize;
                let y = y as usize;
                let [r, g, b, _] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[DynamicImage],
        conf: f32,
    ) -> Result<Vec<DetectionResult>> {
        let preds = xs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?;
        if preds.ndim() != 3 {
            anyhow::bail!("expected [batch, 4 + nc, anchors], got {:?}", preds.shape());
        }

        let mut ys = Vec::with_capacity(xs0.len());
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let Some(x0) = xs0.get(idx) else { break };
            let anchor = anchor.into_dimensionality::<ndarray::Ix2>()?;
            let (w0, h0) = (x0.width() as f32, x0.height() as f32);
            let ratio = (self.width as f32 / w0).min(self.height as f32 / h0);
            let bboxes = decode_predictions(anchor, self.nc as usize, ratio, (w0, h0), conf, self.iou);
            debug!("image {}: {} boxes", idx, bboxes.len());
            ys.push(DetectionResult::new(bboxes));
        }
        Ok(ys)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        self.engine.summary();
        info!(
            "YOLOv8: {} classes, input {}x{}, iou={:.2}",
            self.nc, self.width, self.height, self.iou
        );
    }
}

/// 解码单张图片的原始输出 `[4 + nc, anchors]`
///
/// 置信度过滤在 NMS 之前, 坐标还原到原图并裁剪
pub fn decode_predictions(
    anchor: ArrayView2<f32>,
    nc: usize,
    ratio: f32,
    (width_original, height_original): (f32, f32),
    conf: f32,
    iou: f32,
) -> Vec<Bbox> {
    const CXYWH_OFFSET: usize = 4;
    if anchor.nrows() < CXYWH_OFFSET + nc || nc == 0 {
        return Vec::new();
    }

    let mut data: Vec<Bbox> = Vec::new();
    for pred in anchor.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

        let Some((id, &confidence)) = clss
            .into_iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence < conf {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x = cx - w / 2.;
        let y = cy - h / 2.;
        data.push(Bbox::new(
            x.max(0.0f32).min(width_original),
            y.max(0.0f32).min(height_original),
            w,
            h,
            id,
            confidence,
        ));
    }

    non_max_suppression(&mut data, iou);
    data
}
