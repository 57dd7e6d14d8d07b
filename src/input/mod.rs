/// 视频输入 (Video Input)
///
/// - VideoSource: 四种视频源 (视频目录/摄像头/RTSP/YouTube) 与解析
/// - FrameSource: 逐帧读取接口, 读取失败即视为流结束
/// - SourceOpener: 打开策略, 每种视频源唯一的差异点
/// - FfmpegCapture: ez-ffmpeg 解码线程 + 有界通道
pub mod camera;
pub mod decode_filter;
pub mod decoder;
pub mod source;
pub mod youtube;

use image::RgbImage;

use crate::error::StreamError;

pub use camera::{list_video_devices, VideoDevice};
pub use decode_filter::CaptureFilter;
pub use decoder::{FfmpegCapture, FfmpegOpener};
pub use source::{ResolvedSource, SourceKind, VideoSource};
pub use youtube::{validate_youtube_url, StreamResolver, YtDlp};

/// 打开后获得的流信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProperties {
    pub width: u32,
    pub height: u32,
    /// 文件/流声明的帧率, 未知时为 None
    pub fps: Option<f64>,
}

impl StreamProperties {
    pub fn summary(&self) -> String {
        match self.fps {
            Some(fps) => format!("Resolution: {}x{} | FPS: {:.1}", self.width, self.height, fps),
            None => format!("Resolution: {}x{}", self.width, self.height),
        }
    }
}

/// 已打开的帧来源
pub trait FrameSource {
    fn is_opened(&self) -> bool;

    /// 下一帧; `None` 表示流结束或读取失败 (两者不区分)
    fn read(&mut self) -> Option<RgbImage>;

    fn properties(&self) -> Option<StreamProperties>;

    /// 释放底层资源, 可重复调用
    fn release(&mut self);
}

/// 视频源打开策略
pub trait SourceOpener: Send + Sync {
    fn open(&self, source: &ResolvedSource) -> Result<Box<dyn FrameSource>, StreamError>;
}
