/// 命令行检测: 播放一个视频源, 最新的标注帧写入输出文件
///
/// cargo run --bin stream-detect -- --tracker bytetrack youtube https://youtu.be/<id>
use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn};

use yolov8_streams::config::Command;
use yolov8_streams::display::SnapshotFile;
use yolov8_streams::input::list_video_devices;
use yolov8_streams::logging::init_logging;
use yolov8_streams::render::FrameRenderer;
use yolov8_streams::{
    load_model, Args, CancelToken, PlaybackRequest, Player, Settings, TrackerSelection,
};

fn main() -> Result<()> {
    let args = Args::parse();
    let (settings, issues) = Settings::read(&args.settings);
    init_logging(&settings.log_level, args.json_log);
    for issue in issues {
        warn!("{}", issue);
    }
    settings.validate()?;
    settings.print_summary();

    let Some(source) = args.command.video_source() else {
        debug_assert_eq!(args.command, Command::Devices);
        println!("Videos:");
        for (name, path) in settings.videos.iter() {
            println!("  {:<12} {}", name, path.display());
        }
        println!("Capture devices:");
        for device in list_video_devices() {
            println!("  [{}] {}", device.index, device.name);
        }
        return Ok(());
    };

    let conf = args.confidence(&settings);
    if !(0.0..=1.0).contains(&conf) {
        bail!("--conf must be within [0, 1], got {}", conf);
    }
    let tracker = TrackerSelection::parse(&args.tracker)?;

    let mut model = load_model(args.model_path(&settings), args.load_options(&settings))?;
    let mut display = SnapshotFile::new(&args.output)?;
    let output_path = display.path().display().to_string();
    info!("writing annotated frames to {}", output_path);

    let renderer = FrameRenderer::with_font(settings.font.as_deref());
    let player = Player::new(settings).with_renderer(renderer);
    let request = PlaybackRequest::new(source, conf, tracker);
    let report = player.play(&request, &mut model, &mut display, &CancelToken::new());

    match report.error {
        Some(e) => Err(e.into()),
        None => {
            info!("done: {} frames", report.frames);
            Ok(())
        }
    }
}
