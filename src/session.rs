//! 播放会话: 所有视频源共用的播放循环
//!
//! CONFIGURING → OPENING → STREAMING → {EXHAUSTED, FAILED} → RELEASED
//!
//! 打开成功后由 `CaptureGuard` 持有视频源, 任何退出路径 (包括 panic) 都只释放一次

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::display::DisplayTarget;
use crate::error::StreamError;
use crate::input::{
    FfmpegOpener, FrameSource, SourceKind, SourceOpener, StreamProperties, StreamResolver,
    VideoSource, YtDlp,
};
use crate::predictor::ModelHandle;
use crate::render::{resize_frame, FrameRenderer};
use crate::settings::Settings;
use crate::tracking::TrackerSelection;

/// 一次播放请求, 所有参数显式传入
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub source: VideoSource,
    pub confidence: f32,
    pub tracker: TrackerSelection,
}

impl PlaybackRequest {
    pub fn new(source: VideoSource, confidence: f32, tracker: TrackerSelection) -> Self {
        Self {
            source,
            confidence,
            tracker,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Configuring,
    Opening,
    Streaming,
    /// 读到流结束 (或读取失败, 或被取消)
    Exhausted,
    Failed,
    Released,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Configuring => "CONFIGURING",
            PlaybackState::Opening => "OPENING",
            PlaybackState::Streaming => "STREAMING",
            PlaybackState::Exhausted => "EXHAUSTED",
            PlaybackState::Failed => "FAILED",
            PlaybackState::Released => "RELEASED",
        };
        f.write_str(s)
    }
}

/// 会话结果
#[derive(Debug)]
pub struct PlaybackReport {
    /// 终止状态: Exhausted 或 Failed
    pub state: PlaybackState,
    pub frames: u64,
    /// 视频源是否成功打开 (打开过的一定已释放)
    pub opened: bool,
    pub cancelled: bool,
    pub properties: Option<StreamProperties>,
    pub error: Option<StreamError>,
}

impl PlaybackReport {
    fn failed(opened: bool, frames: u64, error: StreamError) -> Self {
        Self {
            state: PlaybackState::Failed,
            frames,
            opened,
            cancelled: false,
            properties: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PlaybackState::Exhausted
    }
}

/// 跨线程取消标志, 每帧之间检查
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 作用域守卫: 析构时释放视频源 (只释放一次)
pub struct CaptureGuard {
    source: Box<dyn FrameSource>,
    target: String,
    released: bool,
}

impl CaptureGuard {
    pub fn new(source: Box<dyn FrameSource>, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            released: false,
        }
    }

    pub fn is_opened(&self) -> bool {
        !self.released && self.source.is_opened()
    }

    pub fn read(&mut self) -> Option<RgbImage> {
        if self.released {
            return None;
        }
        self.source.read()
    }

    pub fn properties(&self) -> Option<StreamProperties> {
        self.source.properties()
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        debug!("{} → {}", self.target, PlaybackState::Released);
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("releasing {} while unwinding", self.target);
        }
        self.release();
    }
}

/// 播放器: 解析 → 打开 → 逐帧渲染
pub struct Player {
    settings: Settings,
    resolver: Arc<dyn StreamResolver>,
    opener: Arc<dyn SourceOpener>,
    renderer: FrameRenderer,
}

impl Player {
    /// 默认使用 yt-dlp 与 ez-ffmpeg, 渲染不带标签字体
    pub fn new(settings: Settings) -> Self {
        let resolver = Arc::new(YtDlp::new(&settings.youtube));
        Self {
            settings,
            resolver,
            opener: Arc::new(FfmpegOpener::default()),
            renderer: FrameRenderer::default(),
        }
    }

    pub fn with_opener(mut self, opener: impl SourceOpener + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    pub fn with_resolver(mut self, resolver: impl StreamResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_renderer(mut self, renderer: FrameRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn transition(kind: SourceKind, state: PlaybackState) {
        debug!("[{}] → {}", kind, state);
    }

    /// 执行一次播放, 错误已通过 `display` 展示, 返回结果摘要
    pub fn play<H: ModelHandle + ?Sized>(
        &self,
        request: &PlaybackRequest,
        model: &mut H,
        display: &mut dyn DisplayTarget,
        cancel: &CancelToken,
    ) -> PlaybackReport {
        let kind = request.source.kind();
        Self::transition(kind, PlaybackState::Configuring);

        // 输入校验 (不访问网络)
        if let Err(e) = request.source.validate(&self.settings) {
            warn!("[{}] rejected: {}", kind, e);
            display.error(&e.user_message(kind));
            return PlaybackReport::failed(false, 0, e);
        }

        if kind == SourceKind::YouTube {
            display.info("Extracting and opening YouTube video stream...");
        }
        let resolved = match request.source.resolve(&self.settings, self.resolver.as_ref()) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("[{}] resolve failed: {}", kind, e);
                display.error(&e.user_message(kind));
                return PlaybackReport::failed(false, 0, e);
            }
        };

        Self::transition(kind, PlaybackState::Opening);
        let target = resolved.describe();
        let capture = match self.opener.open(&resolved) {
            Ok(capture) => capture,
            Err(e) => {
                error!("[{}] open failed: {}", kind, e);
                display.error(&e.open_failure_message(kind));
                return PlaybackReport::failed(false, 0, e);
            }
        };

        let mut guard = CaptureGuard::new(capture, target.clone());
        if !guard.is_opened() {
            let e = StreamError::open_failed(target, "source is not opened");
            error!("[{}] {}", kind, e);
            display.error(&e.open_failure_message(kind));
            return PlaybackReport::failed(false, 0, e);
        }

        let properties = guard.properties();
        if let Some(p) = properties {
            info!("[{}] {}: {}", kind, target, p.summary());
        }
        if kind == SourceKind::YouTube {
            display.success("YouTube video opened successfully!");
            if let Some(p) = properties {
                display.info(&p.summary());
            }
        }

        Self::transition(kind, PlaybackState::Streaming);
        // 每次播放使用新的跟踪状态
        model.reset_tracking();
        let started = Instant::now();
        let mut frames = 0u64;
        let mut cancelled = false;
        let mut failure = None;
        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            // 读取失败与流结束同样处理
            let Some(frame) = guard.read() else {
                break;
            };
            if let Err(e) = self.renderer.render(
                request.confidence,
                &mut *model,
                &mut *display,
                &frame,
                &request.tracker,
            ) {
                failure = Some(e);
                break;
            }
            frames += 1;
        }

        let state = if failure.is_some() {
            PlaybackState::Failed
        } else {
            PlaybackState::Exhausted
        };
        Self::transition(kind, state);
        guard.release();

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "[{}] {} after {} frames ({:.1}s, {:.1} fps)",
            kind,
            state,
            frames,
            elapsed,
            if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 }
        );

        match &failure {
            Some(e) => {
                error!("[{}] playback failed: {}", kind, e);
                display.error(&e.user_message(kind));
            }
            None if cancelled => display.info(&format!("Playback stopped. Processed {} frames.", frames)),
            None => display.info(&format!("Stream ended. Processed {} frames.", frames)),
        }

        PlaybackReport {
            state,
            frames,
            opened: true,
            cancelled,
            properties,
            error: failure,
        }
    }

    /// 预览: 只解码首帧并缩放到显示尺寸, 不做推理
    pub fn preview(&self, source: &VideoSource) -> Result<RgbImage, StreamError> {
        let kind = source.kind();
        source.validate(&self.settings)?;
        let resolved = source.resolve(&self.settings, self.resolver.as_ref())?;
        let target = resolved.describe();

        let mut guard = CaptureGuard::new(self.opener.open(&resolved)?, target.clone());
        if !guard.is_opened() {
            return Err(StreamError::open_failed(target, "source is not opened"));
        }
        let frame = guard.read();
        guard.release();

        let frame = frame.ok_or_else(|| StreamError::open_failed(&target, "no frames decoded"))?;
        debug!("[{}] preview {}: {}x{}", kind, target, frame.width(), frame.height());
        resize_frame(&frame)
    }
}
