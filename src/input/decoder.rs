/// ez-ffmpeg 解码器: 文件 / 摄像头 / RTSP / YouTube 直链
///
/// 解码在独立线程中运行, 打开结果通过握手通道同步返回,
/// 帧经容量为 1 的通道逐帧传给播放循环
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::decode_filter::CaptureFilter;
use super::{FrameSource, ResolvedSource, SourceOpener, StreamProperties};
use crate::error::StreamError;

/// 生产环境的打开策略
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    /// 等待输入打开及首帧的超时
    open_timeout: Duration,
}

impl FfmpegOpener {
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(&self, source: &ResolvedSource) -> Result<Box<dyn FrameSource>, StreamError> {
        Ok(Box::new(FfmpegCapture::open(source, self.open_timeout)?))
    }
}

/// 根据视频源构建输入
fn build_input(source: &ResolvedSource) -> Input {
    match source {
        ResolvedSource::File(path) => Input::new(path.to_string_lossy().to_string()),
        ResolvedSource::Device { url, format } => Input::new(url.clone()).set_format(*format),
        // RTSP 强制 TCP 传输
        ResolvedSource::Rtsp(url) => Input::new(url.clone()).set_input_opts(
            [
                ("rtsp_transport", "tcp"),
                ("rtsp_flags", "prefer_tcp"),
                ("buffer_size", "8192000"),
            ]
            .into(),
        ),
        ResolvedSource::Stream { media_url, .. } => Input::new(media_url.clone()).set_input_opts(
            [
                ("reconnect", "1"),
                ("reconnect_streamed", "1"),
                ("reconnect_delay_max", "5"),
            ]
            .into(),
        ),
    }
}

/// 解码线程主体: 构建 → 启动 → 握手 → 等待结束
fn decode_worker(
    source: ResolvedSource,
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>,
    handshake: Sender<Result<(), String>>,
) {
    let target = source.describe();
    let filter = CaptureFilter::new(tx, stop);

    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("capture", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = match FfmpegContext::builder()
        .input(build_input(&source))
        .filter_desc("format=rgb24")
        .output(out)
        .build()
    {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = handshake.send(Err(e.to_string()));
            return;
        }
    };

    let sch = match ctx.start() {
        Ok(sch) => sch,
        Err(e) => {
            let _ = handshake.send(Err(e.to_string()));
            return;
        }
    };
    let _ = handshake.send(Ok(()));
    info!("解码启动: {}", target);

    match sch.wait() {
        Ok(_) => debug!("解码结束: {}", target),
        Err(e) => debug!("解码中止: {}: {}", target, e),
    }
}

/// 基于 ez-ffmpeg 的帧来源
pub struct FfmpegCapture {
    target: String,
    rx: Option<Receiver<RgbImage>>,
    pending: Option<RgbImage>,
    properties: Option<StreamProperties>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegCapture {
    pub fn open(source: &ResolvedSource, open_timeout: Duration) -> Result<Self, StreamError> {
        let target = source.describe();
        let (tx, rx) = crossbeam_channel::bounded::<RgbImage>(1);
        let (handshake_tx, handshake_rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let source = source.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name(format!("decoder-{}", source.kind()))
                .spawn(move || decode_worker(source, tx, stop, handshake_tx))?
        };

        let mut capture = Self {
            target: target.clone(),
            rx: Some(rx),
            pending: None,
            properties: None,
            stop,
            worker: Some(worker),
        };

        let opened = match handshake_rx.recv_timeout(open_timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(reason),
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "connection timeout after {}s",
                open_timeout.as_secs()
            )),
            Err(RecvTimeoutError::Disconnected) => Err("decoder thread exited".to_string()),
        };
        if let Err(reason) = opened {
            capture.release();
            return Err(StreamError::open_failed(target, reason));
        }

        // 预读首帧获取分辨率
        if let Some(rx) = capture.rx.as_ref() {
            match rx.recv_timeout(open_timeout) {
                Ok(frame) => {
                    capture.properties = Some(StreamProperties {
                        width: frame.width(),
                        height: frame.height(),
                        fps: None,
                    });
                    capture.pending = Some(frame);
                }
                // 未解出任何帧即结束, 与无法打开同样处理
                Err(RecvTimeoutError::Disconnected) => {
                    capture.release();
                    return Err(StreamError::open_failed(target, "no frames decoded"));
                }
                Err(RecvTimeoutError::Timeout) => {
                    capture.release();
                    return Err(StreamError::open_failed(
                        target,
                        format!("no frame within {}s (timeout)", open_timeout.as_secs()),
                    ));
                }
            }
        }

        Ok(capture)
    }
}

impl FrameSource for FfmpegCapture {
    fn is_opened(&self) -> bool {
        self.rx.is_some()
    }

    fn read(&mut self) -> Option<RgbImage> {
        if let Some(frame) = self.pending.take() {
            return Some(frame);
        }
        self.rx.as_ref()?.recv().ok()
    }

    fn properties(&self) -> Option<StreamProperties> {
        self.properties
    }

    fn release(&mut self) {
        if self.rx.is_none() && self.worker.is_none() {
            return;
        }
        self.stop.store(true, Ordering::Relaxed);
        // 关闭接收端, 阻塞中的发送立即失败
        self.rx = None;
        self.pending = None;

        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                if worker.join().is_err() {
                    warn!("解码线程异常退出: {}", self.target);
                }
            } else {
                debug!("解码线程仍在退出中: {}", self.target);
            }
        }
        info!("released {}", self.target);
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}
