// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 交互式区域计数 (Interactive zone counter)
///
/// 1. 绘制阶段: 左键拖拽画区域, 右键或 U 撤销, Enter 开始
/// 2. 跟踪阶段: 逐帧处理并显示区域视图, Tab 切换轨迹视图
/// Q / Esc 随时退出
use anyhow::{Context, Result};
use clap::Parser;
use macroquad::prelude::*;
use macroquad::window::Conf;
use tracing::{error, info, warn};

use zonecount_rs::detection::{ByteTracker, Frame};
use zonecount_rs::input::{open_source, FrameSource};
use zonecount_rs::pipeline::build_detector;
use zonecount_rs::renderer::{Annotator, AnnotatorStyle};
use zonecount_rs::zones::{Point, ZoneAnalytics};
use zonecount_rs::{init_tracing, AnalyticsConfig, Args, Pipeline};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "区域越线计数".to_owned(),
        window_width: 1280,
        window_height: 720,
        high_dpi: true,
        ..Default::default()
    }
}

/// 图像在窗口中的适配变换
#[derive(Clone, Copy, Debug)]
struct Viewport {
    scale: f32,
    offset: Vec2,
    size: Vec2,
}

impl Viewport {
    fn fit(img_w: u32, img_h: u32) -> Self {
        let (w, h) = (img_w as f32, img_h as f32);
        let scale = (screen_width() / w).min(screen_height() / h);
        let size = vec2(w * scale, h * scale);
        let offset = vec2(
            (screen_width() - size.x) / 2.0,
            (screen_height() - size.y) / 2.0,
        );
        Self {
            scale,
            offset,
            size,
        }
    }

    /// 屏幕坐标 → 图像坐标 (图像外返回 None)
    fn to_image(&self, screen: Vec2) -> Option<Point> {
        let local = (screen - self.offset) / self.scale;
        let max = self.size / self.scale;
        (local.x >= 0.0 && local.y >= 0.0 && local.x <= max.x && local.y <= max.y)
            .then(|| Point::new(local.x, local.y))
    }

    fn to_screen(&self, p: Point) -> Vec2 {
        self.offset + vec2(p.x, p.y) * self.scale
    }
}

fn to_texture(img: &image::RgbImage) -> Texture2D {
    let rgba = image::DynamicImage::ImageRgb8(img.clone()).to_rgba8();
    let texture = Texture2D::from_rgba8(img.width() as u16, img.height() as u16, rgba.as_raw());
    texture.set_filter(FilterMode::Linear);
    texture
}

fn draw_frame(texture: &Texture2D, viewport: &Viewport) {
    draw_texture_ex(
        texture,
        viewport.offset.x,
        viewport.offset.y,
        WHITE,
        DrawTextureParams {
            dest_size: Some(viewport.size),
            ..Default::default()
        },
    );
}

fn quit_pressed() -> bool {
    is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape)
}

/// 区域绘制阶段; 返回 false 表示用户退出
async fn edit_zones(
    first: &Frame,
    analytics: &mut ZoneAnalytics,
    annotator: &Annotator,
) -> bool {
    let mut drag_start: Option<Point> = None;
    let mut preview = {
        let mut img = first.image.clone();
        annotator.annotate_zones(&mut img, analytics, &[]);
        to_texture(&img)
    };

    loop {
        if quit_pressed() {
            return false;
        }
        if is_key_pressed(KeyCode::Enter) {
            return true;
        }

        let viewport = Viewport::fit(first.width(), first.height());
        let mouse = Vec2::from(mouse_position());
        let mut changed = false;

        if is_mouse_button_pressed(MouseButton::Left) {
            drag_start = viewport.to_image(mouse);
        }
        if is_mouse_button_released(MouseButton::Left) {
            if let (Some(p1), Some(p2)) = (drag_start.take(), viewport.to_image(mouse)) {
                let index = analytics.add_zone(p1, p2);
                info!("📐 新增 Zone {}", index + 1);
                changed = true;
            }
        }
        if is_mouse_button_pressed(MouseButton::Right) || is_key_pressed(KeyCode::U) {
            if analytics.undo_last().is_some() {
                info!("↩️ 撤销区域, 剩余 {} 个", analytics.zones().len());
                changed = true;
            }
        }
        if changed {
            let mut img = first.image.clone();
            annotator.annotate_zones(&mut img, analytics, &[]);
            preview = to_texture(&img);
        }

        clear_background(BLACK);
        draw_frame(&preview, &viewport);
        if let Some(p1) = drag_start {
            let s = viewport.to_screen(p1);
            draw_line(s.x, s.y, mouse.x, mouse.y, 2.0, YELLOW);
        }
        draw_text(
            &format!(
                "Zones: {} | drag: add | right-click/U: undo | Enter: start | Q: quit",
                analytics.zones().len()
            ),
            10.0,
            24.0,
            22.0,
            WHITE,
        );

        next_frame().await;
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = match &args.config {
        Some(path) => AnalyticsConfig::load(path)?,
        None => AnalyticsConfig::default(),
    };
    config.print_summary();

    let mut source = open_source(&args.source)
        .with_context(|| format!("无法打开输入 {}", args.source.display()))?;
    let Some(first) = source.next_frame() else {
        warn!("⚠️ 输入为空: {}", source.describe());
        return Ok(());
    };

    let mut analytics = config.build_analytics(&args.zones);
    let annotator = Annotator::new(&args.font, AnnotatorStyle::default());
    if !edit_zones(&first, &mut analytics, &annotator).await {
        info!("👋 用户退出");
        return Ok(());
    }
    info!("▶️ 开始跟踪, 区域 {} 个", analytics.zones().len());

    let detector = build_detector(&args, &config)?;
    let tracker = Box::new(ByteTracker::new(config.tracker_params()));
    let mut pipeline = Pipeline::new(source, detector, tracker, analytics, annotator);

    let mut pending = Some(first);
    let mut show_tracks = false;
    let mut texture: Option<Texture2D> = None;
    let mut size = (1u32, 1u32);
    let mut finished = false;

    loop {
        if quit_pressed() {
            break;
        }
        if is_key_pressed(KeyCode::Tab) {
            show_tracks = !show_tracks;
        }

        let under_limit = args
            .max_frames
            .map_or(true, |max| pipeline.stats().frames < max);
        if !finished && under_limit {
            let output = match pending.take() {
                Some(frame) => Some(pipeline.process_frame(frame)),
                None => pipeline.step(),
            };
            match output {
                Some(output) => {
                    let view = if show_tracks {
                        &output.tracks_view
                    } else {
                        &output.zones_view
                    };
                    size = (view.width(), view.height());
                    texture = Some(to_texture(view));
                }
                None => {
                    info!("⏹️ 输入结束, 按 Q 退出");
                    finished = true;
                }
            }
        } else if !under_limit && !finished {
            info!("⏹️ 已达到最大帧数, 按 Q 退出");
            finished = true;
        }

        clear_background(BLACK);
        if let Some(tex) = &texture {
            draw_frame(tex, &Viewport::fit(size.0, size.1));
        }
        if finished {
            draw_text("finished - press Q to quit", 10.0, 24.0, 22.0, WHITE);
        }

        next_frame().await;
    }

    pipeline.log_counts();
    Ok(())
}

#[macroquad::main(window_conf)]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}
