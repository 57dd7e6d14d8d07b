//! 模型句柄: 检测 (predict) 与跟踪 (track) 两个入口

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::{debug, info};

use crate::models::{Model, YOLOv8, YOLOv8Config};
use crate::tracking::{MultiObjectTracker, Tracker, TrackerKind};
use crate::{DetectionResult, OrtEP};

/// 渲染循环依赖的模型接口
pub trait ModelHandle {
    /// 单帧检测
    fn predict(&mut self, image: &DynamicImage, conf: f32) -> Result<Vec<DetectionResult>>;

    /// 检测 + 跟踪, `persist` 为 true 时跨调用复用跟踪状态
    fn track(
        &mut self,
        image: &DynamicImage,
        conf: f32,
        persist: bool,
        tracker: TrackerKind,
    ) -> Result<Vec<DetectionResult>>;

    fn names(&self) -> &[String];

    /// 丢弃跟踪状态, 每次播放开始时调用
    fn reset_tracking(&mut self) {}
}

/// 持有检测模型及其跟踪状态
pub struct Predictor<M: Model> {
    model: M,
    tracker: Option<MultiObjectTracker>,
}

impl<M: Model> Predictor<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            tracker: None,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// 当前跟踪器 (未调用过 track 时为 None)
    pub fn active_tracker(&self) -> Option<TrackerKind> {
        self.tracker.as_ref().map(|t| t.kind())
    }

    fn tracker_for(&mut self, kind: TrackerKind, persist: bool) -> &mut MultiObjectTracker {
        let reuse = persist && self.tracker.as_ref().is_some_and(|t| t.kind() == kind);
        if !reuse {
            debug!("new {} tracker (persist={})", kind, persist);
            self.tracker = None;
        }
        self.tracker
            .get_or_insert_with(|| MultiObjectTracker::new(kind))
    }
}

impl<M: Model> ModelHandle for Predictor<M> {
    fn predict(&mut self, image: &DynamicImage, conf: f32) -> Result<Vec<DetectionResult>> {
        self.model.forward(std::slice::from_ref(image), conf)
    }

    fn track(
        &mut self,
        image: &DynamicImage,
        conf: f32,
        persist: bool,
        tracker: TrackerKind,
    ) -> Result<Vec<DetectionResult>> {
        let ys = self.model.forward(std::slice::from_ref(image), conf)?;
        let tracker = self.tracker_for(tracker, persist);
        Ok(ys
            .into_iter()
            .map(|y| DetectionResult::new(tracker.update(y.bboxes())))
            .collect())
    }

    fn names(&self) -> &[String] {
        self.model.names()
    }

    fn reset_tracking(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            debug!("drop {} tracker ({} tracks)", tracker.kind(), tracker.track_count());
        }
    }
}

/// 单次加载参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// 放宽元数据校验, 只影响本次加载
    pub trusted: bool,
    pub ep: OrtEP,
    pub iou: f32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            trusted: true,
            ep: OrtEP::CPU,
            iou: 0.45,
        }
    }
}

/// 加载检测模型, 返回可直接推理的句柄
pub fn load_model(path: impl AsRef<Path>, options: LoadOptions) -> Result<Predictor<YOLOv8>> {
    let path = path.as_ref();
    let model = YOLOv8::new(YOLOv8Config {
        model: path.to_path_buf(),
        ep: options.ep,
        trusted: options.trusted,
        iou: options.iou,
        ..Default::default()
    })
    .with_context(|| format!("Unable to load model. Check the specified path: {}", path.display()))?;
    model.summary();
    info!("model loaded: {}", path.display());
    Ok(Predictor::new(model))
}
