//! 显示目标: 单帧覆盖显示 + 侧边栏消息

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use image::{ImageFormat, RgbImage};
use tracing::{error, info};

use crate::error::StreamError;

/// 消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// 帧与消息的显示接口
///
/// `show` 每次覆盖同一个显示位置
pub trait DisplayTarget {
    fn show(&mut self, frame: &RgbImage, caption: &str) -> Result<(), StreamError>;

    fn notify(&mut self, level: NoticeLevel, message: &str);

    fn info(&mut self, message: &str) {
        self.notify(NoticeLevel::Info, message)
    }

    fn success(&mut self, message: &str) {
        self.notify(NoticeLevel::Success, message)
    }

    fn error(&mut self, message: &str) {
        self.notify(NoticeLevel::Error, message)
    }
}

#[derive(Debug, Default)]
struct SlotInner {
    frame: Option<(RgbImage, String)>,
    frames_shown: u64,
    notices: Vec<(NoticeLevel, String)>,
}

/// 内存中的最新帧 (可跨线程共享)
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    inner: Arc<Mutex<SlotInner>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut SlotInner) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn frame(&self) -> Option<(RgbImage, String)> {
        self.with(|s| s.frame.clone())
    }

    pub fn frames_shown(&self) -> u64 {
        self.with(|s| s.frames_shown)
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.with(|s| s.notices.clone())
    }

    pub fn clear_notices(&self) {
        self.with(|s| s.notices.clear())
    }
}

impl DisplayTarget for LatestFrame {
    fn show(&mut self, frame: &RgbImage, caption: &str) -> Result<(), StreamError> {
        self.with(|s| {
            s.frame = Some((frame.clone(), caption.to_string()));
            s.frames_shown += 1;
        });
        Ok(())
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.with(|s| s.notices.push((level, message.to_string())));
    }
}

/// 将最新帧写入文件 (先写临时文件再重命名)
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    format: ImageFormat,
    frames_written: u64,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let format = ImageFormat::from_path(&path)
            .map_err(|e| StreamError::Config(format!("{}: {}", path.display(), e)))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            path,
            format,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl DisplayTarget for SnapshotFile {
    fn show(&mut self, frame: &RgbImage, caption: &str) -> Result<(), StreamError> {
        let tmp = self.tmp_path();
        frame
            .save_with_format(&tmp, self.format)
            .map_err(|e| StreamError::Display(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)?;
        self.frames_written += 1;
        if self.frames_written == 1 {
            info!("{} → {}", caption, self.path.display());
        }
        Ok(())
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => error!("{}", message),
            _ => info!("{}", message),
        }
    }
}

/// 发往界面线程的事件
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Frame { image: RgbImage, caption: String },
    Notice { level: NoticeLevel, message: String },
}

/// 通过有界通道把帧转发给界面线程
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: Sender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn bounded(cap: usize) -> (Self, Receiver<DisplayEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        (Self { tx }, rx)
    }
}

impl DisplayTarget for ChannelDisplay {
    fn show(&mut self, frame: &RgbImage, caption: &str) -> Result<(), StreamError> {
        self.tx
            .send(DisplayEvent::Frame {
                image: frame.clone(),
                caption: caption.to_string(),
            })
            .map_err(|_| StreamError::Display("display window closed".into()))
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        // 界面已关闭时丢弃
        let _ = self.tx.send(DisplayEvent::Notice {
            level,
            message: message.to_string(),
        });
    }
}
