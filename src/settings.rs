//! 应用配置 - 通过JSON文件调整模型路径/视频目录/YouTube解析参数

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::StreamError;

/// yt-dlp 解析参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YoutubeConfig {
    pub program: String, // yt-dlp 可执行文件
    pub format: String, // 格式选择 (最高 720p)
    pub timeout_secs: u64,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "best[height<=720]".to_string(),
            timeout_secs: 30,
        }
    }
}

/// 应用配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // === 模型 ===
    pub detection_model: PathBuf, // ONNX 权重
    pub trusted_model: bool, // 跳过元数据严格校验
    pub default_confidence: f32, // 默认置信度

    // === 视频源 ===
    pub webcam: String, // 摄像头设备 (索引或名称)
    pub videos: BTreeMap<String, PathBuf>, // 视频目录: 名称 → 文件
    pub youtube: YoutubeConfig,

    // === 其他 ===
    pub font: Option<PathBuf>, // 标签字体, 为空时自动查找
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let videos = (1..=3)
            .map(|i| {
                (
                    format!("video_{}", i),
                    PathBuf::from(format!("videos/video_{}.mp4", i)),
                )
            })
            .collect();
        Self {
            detection_model: PathBuf::from("weights/yolov8n.onnx"),
            trusted_model: true,
            default_confidence: 0.40,
            webcam: "0".to_string(),
            videos,
            youtube: YoutubeConfig::default(),
            font: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// 从JSON文件加载配置, 不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let (settings, issues) = Self::read(path);
        for issue in issues {
            warn!("{}", issue);
        }
        settings
    }

    /// 同 `load`, 但问题以文本返回, 供日志初始化之后输出
    pub fn read(path: impl AsRef<Path>) -> (Self, Vec<String>) {
        let path = path.as_ref();
        let mut issues = Vec::new();
        let settings = match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(settings) => settings,
                Err(e) => {
                    issues.push(format!("配置文件 {} 解析失败: {}, 使用默认值", path.display(), e));
                    Self::default()
                }
            },
            Err(_) => {
                let settings = Self::default();
                if let Err(e) = settings.save(path) {
                    issues.push(format!("保存默认配置失败: {}", e));
                }
                settings
            }
        };
        (settings, issues)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StreamError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StreamError::Config(format!("序列化配置失败: {}", e)))?;
        fs::write(path.as_ref(), json)?;
        info!("配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(StreamError::Config(format!(
                "default_confidence must be within [0, 1], got {}",
                self.default_confidence
            )));
        }
        if self.youtube.program.trim().is_empty() {
            return Err(StreamError::Config("youtube.program is empty".into()));
        }
        Ok(())
    }

    /// 视频目录中的名称 (有序)
    pub fn video_names(&self) -> Vec<&str> {
        self.videos.keys().map(String::as_str).collect()
    }

    pub fn print_summary(&self) {
        info!("当前配置:");
        info!("  模型: {}", self.detection_model.display());
        info!("  默认置信度: {:.2}", self.default_confidence);
        info!("  摄像头: {}", self.webcam);
        info!("  视频目录: {} 个条目", self.videos.len());
        info!(
            "  YouTube: {} -f {}",
            self.youtube.program, self.youtube.format
        );
    }
}
