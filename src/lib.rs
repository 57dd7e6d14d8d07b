// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数
pub mod display; // 显示目标
pub mod error; // 错误类型与提示文案
pub mod input; // 视频输入系统
pub mod logging; // 日志初始化
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime 推理引擎
pub mod predictor; // 检测/跟踪入口
pub mod render; // 帧渲染
pub mod results; // 检测结果
pub mod session; // 播放会话
pub mod settings; // JSON 配置
pub mod tracking; // 多目标跟踪

pub use crate::config::Args;
pub use crate::error::{ErrorCategory, StreamError};
pub use crate::models::{Model, YOLOv8};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::predictor::{load_model, LoadOptions, ModelHandle, Predictor};
pub use crate::results::{non_max_suppression, Bbox, DetectionResult};
pub use crate::session::{CancelToken, PlaybackReport, PlaybackRequest, PlaybackState, Player};
pub use crate::settings::Settings;
pub use crate::tracking::{TrackerKind, TrackerSelection};
