// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 区域越线计数 (Zone crossing counter)
///
/// 离线处理: 图片序列/视频 → 检测 → ByteTrack → 越线计数 → 标注帧
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use zonecount_rs::detection::ByteTracker;
use zonecount_rs::input::open_source;
use zonecount_rs::output::VideoSink;
use zonecount_rs::pipeline::{build_detector, prepare_output_dir};
use zonecount_rs::renderer::{Annotator, AnnotatorStyle};
use zonecount_rs::{gen_time_string, init_tracing, AnalyticsConfig, Args, Pipeline};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    info!("🚦 区域越线计数启动");

    let config = match &args.config {
        Some(path) => AnalyticsConfig::load(path)?,
        None => AnalyticsConfig::default(),
    };
    config.print_summary();

    let analytics = config.build_analytics(&args.zones);
    if analytics.zones().is_empty() {
        warn!("⚠️ 未定义任何区域, 仅输出跟踪结果");
    }

    let source = open_source(&args.source)
        .with_context(|| format!("无法打开输入 {}", args.source.display()))?;
    let detector = build_detector(&args, &config)?;
    let tracker = Box::new(ByteTracker::new(config.tracker_params()));
    let annotator = Annotator::new(&args.font, AnnotatorStyle::default());

    let output_dir = match &args.output {
        Some(dir) => {
            let run_dir = dir.join(format!("run_{}", gen_time_string("")));
            prepare_output_dir(&run_dir)?;
            info!("💾 输出目录: {}", run_dir.display());
            Some(run_dir)
        }
        None => None,
    };

    let mut video = match &args.video {
        Some(path) => Some(VideoSink::new(path, args.fps)?),
        None => None,
    };

    let mut pipeline = Pipeline::new(source, detector, tracker, analytics, annotator);
    pipeline.run(args.max_frames, |output| {
        for event in &output.events {
            info!(
                "🚦 帧{} 轨迹{} {} Zone {}",
                event.frame_index,
                event.track_id,
                event.kind.as_str(),
                event.zone + 1
            );
        }
        if let Some(video) = video.as_mut() {
            video.write(&output.zones_view)?;
        }
        match &output_dir {
            Some(dir) => output.save(dir),
            None => Ok(()),
        }
    })?;

    if let Some(video) = video {
        let path = video.path().to_path_buf();
        let frames = video
            .finish()
            .with_context(|| format!("视频写入失败 {}", path.display()))?;
        info!("🎥 已录制 {} 帧到 {}", frames, path.display());
    }

    pipeline.log_counts();
    Ok(())
}
