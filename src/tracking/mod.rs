//! 多目标跟踪
//!
//! - `KalmanBoxFilter`: 匀速运动模型
//! - `MultiObjectTracker`: ByteTrack 两阶段关联 (BoT-SORT 增加近邻门限与分数融合)
//! - `TrackerSelection`: 界面上的 "Display Tracker" / "Tracker" 选项

use std::fmt;

use phf::phf_map;

use crate::error::StreamError;
use crate::Bbox;

pub mod byte_tracker;
pub mod kalman;

pub use byte_tracker::MultiObjectTracker;
pub use kalman::KalmanBoxFilter;

/// 跟踪器名称 → 类型 (允许带 `.yaml` 后缀)
static TRACKER_NAMES: phf::Map<&'static str, TrackerKind> = phf_map! {
    "bytetrack" => TrackerKind::ByteTrack,
    "bytetrack.yaml" => TrackerKind::ByteTrack,
    "botsort" => TrackerKind::BotSort,
    "botsort.yaml" => TrackerKind::BotSort,
};

/// 跟踪器类型 (封闭集合)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    ByteTrack,
    BotSort,
}

impl TrackerKind {
    pub const ALL: [TrackerKind; 2] = [TrackerKind::ByteTrack, TrackerKind::BotSort];

    pub fn parse(name: &str) -> Option<Self> {
        TRACKER_NAMES
            .get(name.trim().to_lowercase().as_str())
            .copied()
    }

    /// 配置文件名, 与界面选项一致
    pub fn config_name(&self) -> &'static str {
        match self {
            TrackerKind::ByteTrack => "bytetrack.yaml",
            TrackerKind::BotSort => "botsort.yaml",
        }
    }

    pub fn params(&self) -> TrackerParams {
        match self {
            TrackerKind::ByteTrack => TrackerParams::default(),
            TrackerKind::BotSort => TrackerParams {
                proximity_thresh: Some(0.5),
                fuse_score: true,
                ..TrackerParams::default()
            },
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// 跟踪参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerParams {
    pub track_high_thresh: f32, // 第一阶段关联的分数阈值
    pub track_low_thresh: f32, // 第二阶段 (救援) 的分数下限
    pub new_track_thresh: f32, // 新建轨迹的分数阈值
    pub track_buffer: u32, // 丢失轨迹保留帧数
    pub match_thresh: f32, // 第一阶段最大代价 (1 - IoU)
    pub low_match_thresh: f32, // 第二阶段最大代价
    pub proximity_thresh: Option<f32>, // 第一阶段 IoU 距离门限
    pub fuse_score: bool, // 代价中融合检测分数
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            track_high_thresh: 0.25,
            track_low_thresh: 0.1,
            new_track_thresh: 0.25,
            track_buffer: 30,
            match_thresh: 0.8,
            low_match_thresh: 0.5,
            proximity_thresh: None,
            fuse_score: false,
        }
    }
}

/// 跟踪器统一接口
pub trait Tracker {
    /// 输入当前帧检测框, 返回带 `track_id` 的已确认轨迹
    fn update(&mut self, detections: &[Bbox]) -> Vec<Bbox>;

    fn reset(&mut self);

    fn track_count(&self) -> usize;
}

/// 跟踪选项: (是否显示跟踪, 跟踪器类型)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerSelection {
    enabled: bool,
    kind: Option<TrackerKind>,
}

impl TrackerSelection {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            kind: None,
        }
    }

    pub fn enabled(kind: TrackerKind) -> Self {
        Self {
            enabled: true,
            kind: Some(kind),
        }
    }

    /// 对应界面上的两个单选框
    pub fn from_choice(display_tracker: bool, name: &str) -> Result<Self, StreamError> {
        if !display_tracker {
            return Ok(Self::disabled());
        }
        TrackerKind::parse(name)
            .map(Self::enabled)
            .ok_or_else(|| StreamError::InvalidInput(format!("Unknown tracker: {}", name)))
    }

    /// 命令行形式: `none` / `bytetrack` / `botsort`
    pub fn parse(s: &str) -> Result<Self, StreamError> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "no" => Ok(Self::disabled()),
            name => Self::from_choice(true, name),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> Option<TrackerKind> {
        self.kind
    }

    /// `(enabled, kind)` 元组形式
    pub fn as_pair(&self) -> (bool, Option<TrackerKind>) {
        (self.enabled, self.kind)
    }
}
