/// FFmpeg 帧过滤器: rgb24 帧 → RgbImage → 有界通道
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// 解码线程内运行, 每帧阻塞发送 (不丢帧, 保持顺序)
///
/// 无法转换的帧直接终止解码, 播放端读到流结束
pub struct CaptureFilter {
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    total_frames: usize,
}

impl CaptureFilter {
    pub fn new(tx: Sender<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            count: 0,
            last: Instant::now(),
            total_frames: 0,
        }
    }
}

/// 校验 rgb24 平面尺寸, 返回 (宽, 高, 步长)
pub fn plane_layout(width: i32, height: i32, stride: i32) -> Result<(usize, usize, usize), String> {
    if width <= 0 || height <= 0 {
        return Err(format!("invalid frame size {}x{}", width, height));
    }
    let (w, h) = (width as usize, height as usize);
    if stride < 0 || (stride as usize) < w * 3 {
        return Err(format!("invalid stride {} for width {}", stride, width));
    }
    Ok((w, h, stride as usize))
}

/// 按行拷贝 packed RGB (去掉行尾对齐)
pub fn pack_rgb24(data: &[u8], width: usize, height: usize, stride: usize) -> Option<RgbImage> {
    let row = width * 3;
    if width == 0 || height == 0 || stride < row || data.len() < stride * (height - 1) + row {
        return None;
    }
    let mut buffer = Vec::with_capacity(row * height);
    for y in 0..height {
        let start = y * stride;
        buffer.extend_from_slice(&data[start..start + row]);
    }
    RgbImage::from_raw(width as u32, height as u32, buffer)
}

impl CaptureFilter {
    fn to_image(&self, frame: &Frame) -> Result<RgbImage, String> {
        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return Err("empty or corrupt frame".to_string());
            }

            let raw = &*frame.as_ptr();
            let (w, h, stride) = plane_layout(raw.width, raw.height, raw.linesize[0])?;
            let data = raw.data[0];
            if data.is_null() {
                return Err("frame has no pixel data".to_string());
            }

            let len = stride * (h - 1) + w * 3;
            let plane = std::slice::from_raw_parts(data as *const u8, len);
            pack_rgb24(plane, w, h, stride).ok_or_else(|| "rgb24 plane too short".to_string())
        }
    }
}

impl FrameFilter for CaptureFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 已释放: 终止解码
        if self.stop.load(Ordering::Relaxed) {
            return Err("Capture released".to_string());
        }

        self.total_frames += 1;

        // 坏帧与流结束同样处理
        let image = self.to_image(&frame).map_err(|reason| {
            warn!("帧 #{} 无法读取, 结束解码: {}", self.total_frames, reason);
            reason
        })?;

        // 接收端已关闭时终止解码
        if self.tx.send(image).is_err() {
            return Err("Capture released".to_string());
        }

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 5.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            debug!(
                "解码统计: {:.1}fps | 总帧{}",
                self.count as f64 / elapsed,
                self.total_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!("解码线程退出: 总帧{}", self.total_frames);
    }
}
