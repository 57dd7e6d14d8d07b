//! 视频源选择与解析

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use super::camera;
use super::youtube::{validate_youtube_url, StreamResolver};
use crate::error::StreamError;
use crate::settings::Settings;

/// 视频源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Stored,
    Webcam,
    Rtsp,
    YouTube,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Stored,
        SourceKind::Webcam,
        SourceKind::Rtsp,
        SourceKind::YouTube,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Stored => "Video",
            SourceKind::Webcam => "Webcam",
            SourceKind::Rtsp => "RTSP",
            SourceKind::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 用户选择的视频源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// 视频目录中的名称
    Stored(String),
    /// 配置中的摄像头
    Webcam,
    Rtsp(String),
    YouTube(String),
}

/// 解析后可直接打开的视频源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    File(PathBuf),
    Device { url: String, format: &'static str },
    Rtsp(String),
    /// YouTube 页面与解析出的媒体直链
    Stream { page: String, media_url: String },
}

impl ResolvedSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ResolvedSource::File(_) => SourceKind::Stored,
            ResolvedSource::Device { .. } => SourceKind::Webcam,
            ResolvedSource::Rtsp(_) => SourceKind::Rtsp,
            ResolvedSource::Stream { .. } => SourceKind::YouTube,
        }
    }

    /// 日志中使用的目标描述 (不含直链)
    pub fn describe(&self) -> String {
        match self {
            ResolvedSource::File(path) => path.display().to_string(),
            ResolvedSource::Device { url, format } => format!("{} ({})", url, format),
            ResolvedSource::Rtsp(url) => url.clone(),
            ResolvedSource::Stream { page, .. } => page.clone(),
        }
    }
}

impl VideoSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            VideoSource::Stored(_) => SourceKind::Stored,
            VideoSource::Webcam => SourceKind::Webcam,
            VideoSource::Rtsp(_) => SourceKind::Rtsp,
            VideoSource::YouTube(_) => SourceKind::YouTube,
        }
    }

    /// 输入校验, 不访问网络
    pub fn validate(&self, settings: &Settings) -> Result<(), StreamError> {
        match self {
            VideoSource::Stored(name) => {
                if !settings.videos.contains_key(name) {
                    return Err(StreamError::UnknownVideo(name.clone()));
                }
            }
            VideoSource::Webcam => {
                if settings.webcam.trim().is_empty() {
                    return Err(StreamError::InvalidInput(
                        "No webcam is configured".to_string(),
                    ));
                }
            }
            VideoSource::Rtsp(url) => {
                if url.trim().is_empty() {
                    return Err(StreamError::InvalidInput(
                        "Please enter an RTSP stream URL".to_string(),
                    ));
                }
            }
            VideoSource::YouTube(url) => validate_youtube_url(url)?,
        }
        Ok(())
    }

    /// 校验并解析为可打开的视频源 (YouTube 需要网络)
    pub fn resolve(
        &self,
        settings: &Settings,
        resolver: &dyn StreamResolver,
    ) -> Result<ResolvedSource, StreamError> {
        self.validate(settings)?;
        let resolved = match self {
            VideoSource::Stored(name) => match settings.videos.get(name) {
                Some(path) => ResolvedSource::File(path.clone()),
                None => return Err(StreamError::UnknownVideo(name.clone())),
            },
            VideoSource::Webcam => ResolvedSource::Device {
                url: camera::device_url(&settings.webcam),
                format: camera::input_format(),
            },
            VideoSource::Rtsp(url) => ResolvedSource::Rtsp(url.trim().to_string()),
            VideoSource::YouTube(url) => {
                let page = url.trim().to_string();
                let media_url = resolver.resolve(&page)?;
                ResolvedSource::Stream { page, media_url }
            }
        };
        debug!("{} source resolved: {}", self.kind(), resolved.describe());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl StreamResolver for CountingResolver {
        fn resolve(&self, _url: &str) -> Result<String, StreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://media.example/v.mp4".into())
        }
    }

    #[test]
    fn test_stored_lookup() {
        let settings = Settings::default();
        let resolver = CountingResolver::default();
        let r = VideoSource::Stored("video_2".into())
            .resolve(&settings, &resolver)
            .unwrap();
        assert_eq!(r, ResolvedSource::File(PathBuf::from("videos/video_2.mp4")));
        assert!(matches!(
            VideoSource::Stored("nope".into()).resolve(&settings, &resolver),
            Err(StreamError::UnknownVideo(_))
        ));
    }

    #[test]
    fn test_youtube_validated_before_network() {
        let settings = Settings::default();
        let resolver = CountingResolver::default();
        let bad = VideoSource::YouTube("https://example.com/video".into());
        assert!(bad.resolve(&settings, &resolver).is_err());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

        let good = VideoSource::YouTube("https://youtu.be/abc123".into());
        let r = good.resolve(&settings, &resolver).unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.kind(), SourceKind::YouTube);
        assert_eq!(r.describe(), "https://youtu.be/abc123");
    }

    #[test]
    fn test_rtsp_requires_url() {
        let settings = Settings::default();
        let resolver = CountingResolver::default();
        assert!(matches!(
            VideoSource::Rtsp("  ".into()).resolve(&settings, &resolver),
            Err(StreamError::InvalidInput(_))
        ));
        let r = VideoSource::Rtsp("rtsp://cam/1".into())
            .resolve(&settings, &resolver)
            .unwrap();
        assert_eq!(r, ResolvedSource::Rtsp("rtsp://cam/1".into()));
    }

    #[test]
    fn test_webcam_uses_settings() {
        let settings = Settings::default();
        let resolver = CountingResolver::default();
        let r = VideoSource::Webcam.resolve(&settings, &resolver).unwrap();
        assert_eq!(r.kind(), SourceKind::Webcam);
        match r {
            ResolvedSource::Device { format, .. } => assert_eq!(format, camera::input_format()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
