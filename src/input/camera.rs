//! 摄像头输入 - DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use tracing::warn;

/// 可用的视频采集设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub index: usize,
    pub name: String,
}

/// 平台对应的 FFmpeg 采集格式
pub fn input_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow"
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation"
    }
    #[cfg(target_os = "linux")]
    {
        "v4l2"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "video4linux2"
    }
}

/// 配置中的摄像头 (索引或设备名) → FFmpeg 输入地址
///
/// - Windows: `video=<名称>`, 索引会先换成设备名
/// - macOS: 索引
/// - Linux: `/dev/video<索引>`, 已是路径时原样使用
pub fn device_url(webcam: &str) -> String {
    let webcam = webcam.trim();
    let index = webcam.parse::<usize>().ok();

    #[cfg(target_os = "windows")]
    {
        let name = match index {
            Some(i) => list_video_devices()
                .into_iter()
                .find(|d| d.index == i)
                .map(|d| d.name)
                .unwrap_or_else(|| webcam.to_string()),
            None => webcam.to_string(),
        };
        if name.starts_with("video=") {
            name
        } else {
            format!("video={}", name)
        }
    }
    #[cfg(target_os = "macos")]
    {
        let _ = index;
        webcam.to_string()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match index {
            Some(i) => format!("/dev/video{}", i),
            None => webcam.to_string(),
        }
    }
}

/// 获取可用的摄像头设备列表
pub fn list_video_devices() -> Vec<VideoDevice> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices
            .into_iter()
            .enumerate()
            .map(|(index, name)| VideoDevice { index, name })
            .collect(),
        Err(e) => {
            warn!("获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
