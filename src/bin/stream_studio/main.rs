// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 图形界面: 左侧 egui 控制面板, 右侧显示标注后的视频帧
///
/// cargo run --bin stream-studio --release
mod panel;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, TryRecvError};
use egui_macroquad::egui;
use image::{DynamicImage, RgbImage};
use macroquad::prelude::*;
use tracing::{error, info, warn};

use yolov8_streams::display::{ChannelDisplay, DisplayEvent, DisplayTarget, NoticeLevel};
use yolov8_streams::logging::init_logging;
use yolov8_streams::render::{FrameRenderer, CAPTION, FRAME_HEIGHT, FRAME_WIDTH};
use yolov8_streams::input::VideoSource;
use yolov8_streams::{
    load_model, CancelToken, LoadOptions, PlaybackRequest, Player, Predictor, Settings,
    StreamError, YOLOv8,
};

use panel::{ControlPanel, PanelAction};

const SETTINGS_PATH: &str = "settings.json";
const PANEL_WIDTH: f32 = 320.0;

fn window_conf() -> Conf {
    Conf {
        window_title: "YOLOv8 Stream Studio".to_owned(),
        window_width: (PANEL_WIDTH as i32) + FRAME_WIDTH as i32 + 40,
        window_height: FRAME_HEIGHT as i32 + 120,
        high_dpi: true,
        ..Default::default()
    }
}

/// 模型只加载一次, 后续会话复用
type ModelSlot = Arc<Mutex<Option<Predictor<YOLOv8>>>>;

struct Session {
    cancel: CancelToken,
    events: Receiver<DisplayEvent>,
    worker: JoinHandle<()>,
}

/// 后台解码中的预览帧
struct Preview {
    name: String,
    result: Receiver<Result<RgbImage, StreamError>>,
}

struct Studio {
    settings: Settings,
    panel: ControlPanel,
    model: ModelSlot,
    session: Option<Session>,
    preview: Option<Preview>,
    texture: Option<Texture2D>,
    caption: String,
}

impl Studio {
    fn new(settings: Settings) -> Self {
        Self {
            panel: ControlPanel::new(&settings),
            settings,
            model: Arc::new(Mutex::new(None)),
            session: None,
            preview: None,
            texture: None,
            caption: String::new(),
        }
    }

    /// 在后台解码所选视频的首帧
    fn start_preview(&mut self, source: VideoSource) {
        let VideoSource::Stored(name) = &source else {
            return;
        };
        let name = name.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let settings = self.settings.clone();
        let spawned = thread::Builder::new()
            .name("preview".into())
            .spawn(move || {
                let _ = tx.send(Player::new(settings).preview(&source));
            });
        match spawned {
            Ok(_) => self.preview = Some(Preview { name, result: rx }),
            Err(e) => warn!("failed to spawn preview thread: {}", e),
        }
    }

    fn poll_preview(&mut self) {
        let Some(preview) = &self.preview else {
            return;
        };
        let outcome = match preview.result.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(StreamError::Display(
                "preview thread exited".into(),
            )),
        };
        let Some(preview) = self.preview.take() else {
            return;
        };
        match outcome {
            // 播放开始后不再覆盖画面
            Ok(frame) if self.session.is_none() => {
                self.upload(frame);
                self.caption = preview.name;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("preview of {} failed: {}", preview.name, e);
                self.panel.push_notice(NoticeLevel::Error, e.to_string());
            }
        }
    }

    /// 取消当前会话并启动新会话
    fn start(&mut self, request: PlaybackRequest) {
        self.stop();
        self.preview = None;
        self.panel.clear_notices();
        self.panel.frames = 0;

        let cancel = CancelToken::new();
        let (display, events) = ChannelDisplay::bounded(1);
        let settings = self.settings.clone();
        let model = self.model.clone();
        let token = cancel.clone();
        let worker = thread::Builder::new()
            .name("playback".into())
            .spawn(move || run_session(settings, model, request, display, token));

        match worker {
            Ok(worker) => {
                self.panel.running = true;
                self.session = Some(Session {
                    cancel,
                    events,
                    worker,
                });
            }
            Err(e) => {
                error!("failed to spawn playback thread: {}", e);
                self.panel
                    .push_notice(NoticeLevel::Error, format!("An error occurred:\n{}", e));
            }
        }
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            // 丢弃接收端, 阻塞在 show 上的工作线程随即退出
            drop(session.events);
            if session.worker.is_finished() {
                let _ = session.worker.join();
            }
        }
        self.panel.running = false;
    }

    fn update(&mut self) {
        self.poll_preview();
        let Some(session) = &self.session else {
            return;
        };
        let events: Vec<DisplayEvent> = session.events.try_iter().collect();
        let finished = session.worker.is_finished();

        let mut latest: Option<RgbImage> = None;
        for event in events {
            match event {
                DisplayEvent::Frame { image, caption } => {
                    latest = Some(image);
                    self.caption = caption;
                    self.panel.frames += 1;
                }
                DisplayEvent::Notice { level, message } => self.panel.push_notice(level, message),
            }
        }
        if let Some(frame) = latest {
            self.upload(frame);
        }

        if finished {
            if let Some(session) = self.session.take() {
                // 工作线程结束前发出的消息
                for event in session.events.try_iter() {
                    if let DisplayEvent::Notice { level, message } = event {
                        self.panel.push_notice(level, message);
                    }
                }
                if session.worker.join().is_err() {
                    self.panel
                        .push_notice(NoticeLevel::Error, "Playback thread panicked".into());
                }
            }
            self.panel.running = false;
        }
    }

    /// 只在分辨率变化时重建纹理
    fn upload(&mut self, frame: RgbImage) {
        let (width, height) = frame.dimensions();
        let rgba = DynamicImage::ImageRgb8(frame).to_rgba8().into_raw();
        let needs_rebuild = match &self.texture {
            Some(tex) => tex.width() != width as f32 || tex.height() != height as f32,
            None => true,
        };
        if needs_rebuild {
            let texture = Texture2D::from_rgba8(width as u16, height as u16, &rgba);
            texture.set_filter(FilterMode::Linear);
            self.texture = Some(texture);
        } else if let Some(tex) = &self.texture {
            tex.update(&Image {
                bytes: rgba,
                width: width as u16,
                height: height as u16,
            });
        }
    }

    fn draw(&self) {
        clear_background(BLACK);
        let left = PANEL_WIDTH + 20.0;
        let top = 40.0;
        match &self.texture {
            Some(texture) => {
                let scale = ((screen_width() - left - 20.0) / texture.width())
                    .min((screen_height() - top - 20.0) / texture.height())
                    .max(0.1);
                draw_texture_ex(
                    texture,
                    left,
                    top,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(texture.width() * scale, texture.height() * scale)),
                        ..Default::default()
                    },
                );
                let caption: &str = if self.caption.is_empty() {
                    CAPTION
                } else {
                    &self.caption
                };
                draw_text(caption, left, top - 12.0, 24.0, WHITE);
            }
            None => {
                draw_text("No video", left, top + 20.0, 24.0, GRAY);
            }
        }
    }

    fn draw_egui(&mut self) {
        let mut action = PanelAction::None;
        egui_macroquad::ui(|egui_ctx| {
            egui::SidePanel::left("controls")
                .exact_width(PANEL_WIDTH)
                .resizable(false)
                .show(egui_ctx, |ui| {
                    ui.heading("Object Detection using YOLOv8");
                    ui.separator();
                    action = self.panel.ui(ui);
                });
        });
        egui_macroquad::draw();

        match action {
            PanelAction::Preview => match self.panel.chosen_video() {
                Ok(source) => self.start_preview(source),
                Err(e) => warn!("{}", e),
            },
            PanelAction::Detect => match self.panel.request() {
                Ok(request) => self.start(request),
                Err(e) => {
                    self.panel.clear_notices();
                    self.panel.push_notice(NoticeLevel::Error, e.to_string());
                }
            },
            PanelAction::Stop => {
                if let Some(session) = &self.session {
                    session.cancel.cancel();
                }
            }
            PanelAction::None => {}
        }
    }
}

/// 工作线程: 加载模型 (首次) 后执行播放
fn run_session(
    settings: Settings,
    model: ModelSlot,
    request: PlaybackRequest,
    mut display: ChannelDisplay,
    cancel: CancelToken,
) {
    // 上一个会话仍持有模型时在此等待它退出
    let mut slot = match model.lock() {
        Ok(slot) => slot,
        Err(poisoned) => {
            warn!("model lock poisoned, reusing");
            poisoned.into_inner()
        }
    };
    if cancel.is_cancelled() {
        return;
    }
    if slot.is_none() {
        let options = LoadOptions {
            trusted: settings.trusted_model,
            ..Default::default()
        };
        match load_model(&settings.detection_model, options) {
            Ok(predictor) => *slot = Some(predictor),
            Err(e) => {
                error!("{:#}", e);
                display.error(&format!("{:#}", e));
                return;
            }
        }
    }
    let Some(predictor) = slot.as_mut() else {
        return;
    };

    let renderer = FrameRenderer::with_font(settings.font.as_deref());
    let player = Player::new(settings).with_renderer(renderer);
    let report = player.play(&request, predictor, &mut display, &cancel);
    info!(
        "session finished: {} ({} frames, cancelled: {})",
        report.state, report.frames, report.cancelled
    );
}

#[macroquad::main(window_conf)]
async fn main() {
    let (settings, issues) = Settings::read(SETTINGS_PATH);
    init_logging(&settings.log_level, false);
    for issue in issues {
        warn!("{}", issue);
    }
    if let Err(e) = settings.validate() {
        error!("invalid settings: {}", e);
    }
    settings.print_summary();

    let mut studio = Studio::new(settings);
    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        studio.update();
        studio.draw();
        studio.draw_egui();
        next_frame().await;
    }
    studio.stop();
}
