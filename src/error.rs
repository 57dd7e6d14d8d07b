//! 播放会话错误类型与面向用户的提示文案

use thiserror::Error;

use crate::input::SourceKind;

/// 播放流程的统一错误类型
#[derive(Error, Debug)]
pub enum StreamError {
    /// 输入校验失败 (未打开任何资源)
    #[error("{0}")]
    InvalidInput(String),

    /// 视频目录中不存在的条目
    #[error("unknown video `{0}`")]
    UnknownVideo(String),

    /// 视频源无法打开
    #[error("failed to open {target}: {reason}")]
    OpenFailed { target: String, reason: String },

    /// yt-dlp 解析失败
    #[error("yt-dlp: {0}")]
    Extraction(String),

    /// 模型推理失败
    #[error("inference failed: {0}")]
    Inference(String),

    /// 显示目标写入失败
    #[error("display update failed: {0}")]
    Display(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub fn open_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(err: anyhow::Error) -> Self {
        Self::Inference(format!("{:#}", err))
    }

    /// 是否为输入校验类错误 (直接显示原文, 不做分类)
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownVideo(_))
    }

    /// 打开失败时的提示 (按视频源给出排查建议)
    pub fn open_failure_message(&self, kind: SourceKind) -> String {
        match kind {
            SourceKind::YouTube => format!(
                "Failed to open video stream. Possible causes:\n\
                 - Video may be private, age-restricted, or removed\n\
                 - Video may be region-blocked\n\
                 - Network connectivity issues\n\n\
                 Please try a different public video.\n({})",
                self
            ),
            SourceKind::Rtsp => format!(
                "Error loading RTSP stream: {}\n\n\
                 Check the URL, the credentials and that the camera is reachable.",
                self
            ),
            SourceKind::Webcam => format!(
                "Error loading video: {}\n\n\
                 Check that the camera is connected and not used by another program.",
                self
            ),
            SourceKind::Stored => format!(
                "Error loading video: {}\n\nCheck that the video file exists.",
                self
            ),
        }
    }

    /// 解析或播放过程中失败的提示 (按错误文本分类)
    pub fn user_message(&self, kind: SourceKind) -> String {
        if self.is_input_error() {
            return self.to_string();
        }
        let error_msg = self.to_string();
        match ErrorCategory::classify(&error_msg) {
            ErrorCategory::Extraction => format!(
                "YouTube Video Error:\n{}\n\n\
                 Possible solutions:\n\
                 - Ensure the video is public and available\n\
                 - Check if the video is available in your region\n\
                 - Try a different video\n\
                 - Update yt-dlp to the latest release",
                error_msg
            ),
            ErrorCategory::Network => format!(
                "Network Error:\n{}\n\n\
                 The connection timed out or was interrupted:\n\
                 - Check your internet connection\n\
                 - Try again in a moment\n\
                 - Try a different video",
                error_msg
            ),
            ErrorCategory::Generic => match kind {
                SourceKind::YouTube => format!(
                    "An error occurred:\n{}\n\n\
                     Please try a different video or check your connection.",
                    error_msg
                ),
                SourceKind::Rtsp => format!("Error loading RTSP stream: {}", error_msg),
                SourceKind::Stored | SourceKind::Webcam => {
                    format!("Error loading video: {}", error_msg)
                }
            },
        }
    }
}

/// 错误文本的粗分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Extraction,
    Network,
    Generic,
}

impl ErrorCategory {
    pub fn classify(error_msg: &str) -> Self {
        if ["yt-dlp", "yt_dlp", "cap_from_youtube"]
            .iter()
            .any(|needle| error_msg.contains(needle))
        {
            return Self::Extraction;
        }
        let lower = error_msg.to_lowercase();
        if lower.contains("timeout") || lower.contains("connection") {
            Self::Network
        } else {
            Self::Generic
        }
    }
}
