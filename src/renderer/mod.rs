// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧标注器 (Frame Annotator)
//!
//! 每帧输出两个视图:
//! - 轨迹视图: 检测框 + "ID: n | 类别" 标签 + FPS
//! - 区域视图: 区域三条线 + 轨迹路径 + 各区域进入/离开计数汇总
//!
//! 绘制错误只影响当前帧,字体缺失时跳过文字但照常绘制几何图形。

pub mod palette;

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::detection::{class_name, TrackedObject};
use crate::zones::{LineSegment, Point, TrackId, ZoneAnalytics};
pub use palette::{color_of, rgb_of};
use palette::{BLACK, GREEN, RED, WHITE, YELLOW};

/// 默认字体路径
pub const DEFAULT_FONT_PATH: &str = "assets/font/DejaVuSans.ttf";

const DASH_LEN: f32 = 12.0;
const GAP_LEN: f32 = 8.0;
const SUMMARY_MARGIN: i32 = 10;
const SUMMARY_PADDING: i32 = 6;

/// 标注样式
#[derive(Clone, Copy, Debug)]
pub struct AnnotatorStyle {
    pub line_width: u32,
    pub text_scale: f32,
}

impl Default for AnnotatorStyle {
    fn default() -> Self {
        Self {
            line_width: 2,
            text_scale: 20.0,
        }
    }
}

pub struct Annotator {
    font: Option<FontVec>,
    style: AnnotatorStyle,
}

impl Annotator {
    /// 加载字体; 失败时记录一次警告, 之后不再绘制文字
    pub fn new(font_path: impl AsRef<Path>, style: AnnotatorStyle) -> Self {
        let font_path = font_path.as_ref();
        let font = fs::read(font_path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));

        let font = match font {
            Ok(font) => {
                info!("🔤 字体加载成功: {}", font_path.display());
                Some(font)
            }
            Err(e) => {
                warn!(
                    "⚠️ 字体不可用 {} ({}), 仅绘制图形",
                    font_path.display(),
                    e
                );
                None
            }
        };
        Self { font, style }
    }

    /// 不带字体 (只画几何图形)
    pub fn without_font(style: AnnotatorStyle) -> Self {
        Self { font: None, style }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 轨迹视图: 已确认轨迹的检测框 + 标签 + FPS
    pub fn annotate_tracks(&self, canvas: &mut RgbImage, tracks: &[TrackedObject], fps: f32) {
        for track in tracks {
            let bbox = &track.bbox;
            if bbox.is_degenerate() {
                continue;
            }
            let color = rgb_of(track.id);
            self.draw_box(canvas, bbox.x1, bbox.y1, bbox.x2, bbox.y2, color);

            let label = format!("ID: {} | {}", track.id, class_name(track.class_id));
            self.draw_label(canvas, &label, bbox.x1 as i32, bbox.y1 as i32, color);
        }

        self.draw_text(canvas, &format!("FPS: {:.2}", fps), 10, 10, GREEN);
    }

    /// 区域视图: 区域线 + 活跃轨迹路径 + 计数汇总
    pub fn annotate_zones(
        &self,
        canvas: &mut RgbImage,
        analytics: &ZoneAnalytics,
        active: &[TrackId],
    ) {
        let width = self.style.line_width;
        for (index, zone) in analytics.zones().iter().enumerate() {
            draw_thick_line(canvas, &zone.center, YELLOW, width);
            draw_dashed_line(canvas, &zone.entry_line, GREEN, width);
            draw_dashed_line(canvas, &zone.exit_line, RED, width);

            let anchor = zone.center.start;
            self.draw_text(
                canvas,
                &format!("Zone {}", index + 1),
                anchor.x as i32,
                anchor.y as i32 - self.style.text_scale as i32 - 2,
                YELLOW,
            );
        }

        for &track_id in active {
            draw_polyline(canvas, analytics.path_of(track_id), rgb_of(track_id), width);
        }

        self.draw_summary(canvas, analytics);
    }

    /// 计数汇总: 先清空背景区域, 再逐行写入
    fn draw_summary(&self, canvas: &mut RgbImage, analytics: &ZoneAnalytics) {
        let lines: Vec<String> = analytics
            .tallies()
            .iter()
            .enumerate()
            .map(|(i, t)| format!("Zone {}: entered {} | exited {}", i + 1, t.entered, t.exited))
            .collect();
        if lines.is_empty() {
            return;
        }

        let line_h = self.style.text_scale as i32 + 4;
        let text_w = lines
            .iter()
            .map(|l| self.measure(l).0 as i32)
            .max()
            .unwrap_or(0)
            .max(self.style.text_scale as i32 * 12);
        let box_w = (text_w + SUMMARY_PADDING * 2) as u32;
        let box_h = (line_h * lines.len() as i32 + SUMMARY_PADDING * 2) as u32;
        let x = SUMMARY_MARGIN;
        let y = canvas.height() as i32 - box_h as i32 - SUMMARY_MARGIN;

        draw_filled_rect_mut(canvas, Rect::at(x, y.max(0)).of_size(box_w, box_h), BLACK);
        for (i, line) in lines.iter().enumerate() {
            self.draw_text(
                canvas,
                line,
                x + SUMMARY_PADDING,
                y.max(0) + SUMMARY_PADDING + line_h * i as i32,
                WHITE,
            );
        }
    }

    fn draw_box(&self, canvas: &mut RgbImage, x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb<u8>) {
        let w = (x2 - x1).round().max(1.0) as u32;
        let h = (y2 - y1).round().max(1.0) as u32;
        for t in 0..self.style.line_width as i32 {
            let (ww, hh) = (w as i32 - 2 * t, h as i32 - 2 * t);
            if ww <= 0 || hh <= 0 {
                break;
            }
            let rect = Rect::at(x1 as i32 + t, y1 as i32 + t).of_size(ww as u32, hh as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    /// 带底色的标签, 放在框的上方
    fn draw_label(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32, bg: Rgb<u8>) {
        if self.font.is_none() {
            return;
        }
        let (tw, th) = self.measure(text);
        let th = th.max(1);
        let top = (y - th as i32 - 4).max(0);
        draw_filled_rect_mut(canvas, Rect::at(x, top).of_size(tw.max(1) + 4, th + 4), bg);
        self.draw_text(canvas, text, x + 2, top + 2, BLACK);
    }

    fn draw_text(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(canvas, color, x, y, self.scale(), font, text);
        }
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(self.scale(), font, text),
            None => (0, 0),
        }
    }

    fn scale(&self) -> PxScale {
        PxScale::from(self.style.text_scale)
    }
}

/// 粗实线 (沿法线方向平移叠加)
pub fn draw_thick_line(canvas: &mut RgbImage, line: &LineSegment, color: Rgb<u8>, width: u32) {
    draw_thick_segment(canvas, line.start, line.end, color, width);
}

fn draw_thick_segment(canvas: &mut RgbImage, a: Point, b: Point, color: Rgb<u8>, width: u32) {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if len > f32::EPSILON {
        (-dy / len, dx / len)
    } else {
        (0.0, 1.0)
    };

    let half = (width.max(1) as f32 - 1.0) / 2.0;
    let steps = width.max(1);
    for i in 0..steps {
        let off = i as f32 - half;
        draw_line_segment_mut(
            canvas,
            (a.x + nx * off, a.y + ny * off),
            (b.x + nx * off, b.y + ny * off),
            color,
        );
    }
}

/// 虚线
pub fn draw_dashed_line(canvas: &mut RgbImage, line: &LineSegment, color: Rgb<u8>, width: u32) {
    let (a, b) = (line.start, line.end);
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return;
    }
    let (ux, uy) = (dx / len, dy / len);

    let mut t = 0.0;
    while t < len {
        let end = (t + DASH_LEN).min(len);
        draw_thick_segment(
            canvas,
            Point::new(a.x + ux * t, a.y + uy * t),
            Point::new(a.x + ux * end, a.y + uy * end),
            color,
            width,
        );
        t += DASH_LEN + GAP_LEN;
    }
}

/// 轨迹路径折线
pub fn draw_polyline(canvas: &mut RgbImage, points: &[Point], color: Rgb<u8>, width: u32) {
    for pair in points.windows(2) {
        draw_thick_segment(canvas, pair[0], pair[1], color, width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn canvas() -> RgbImage {
        RgbImage::new(200, 200)
    }

    fn analytics_with_zone() -> ZoneAnalytics {
        let mut analytics = ZoneAnalytics::default();
        analytics.add_zone(Point::new(20.0, 100.0), Point::new(180.0, 100.0));
        analytics
    }

    #[test]
    fn test_zone_lines_use_fixed_styles() {
        let annotator = Annotator::without_font(AnnotatorStyle::default());
        let analytics = analytics_with_zone();
        let mut img = canvas();
        annotator.annotate_zones(&mut img, &analytics, &[]);

        assert_eq!(*img.get_pixel(100, 100), YELLOW);
        // 虚线第一段从起点开始
        assert_eq!(*img.get_pixel(22, 80), GREEN);
        assert_eq!(*img.get_pixel(22, 120), RED);
        // 虚线间隙
        assert_eq!(*img.get_pixel(20 + 15, 80), BLACK);
    }

    #[test]
    fn test_summary_background_is_cleared() {
        let annotator = Annotator::without_font(AnnotatorStyle::default());
        let analytics = analytics_with_zone();
        let mut img = RgbImage::from_pixel(300, 200, Rgb([10, 200, 10]));
        annotator.annotate_zones(&mut img, &analytics, &[]);

        // 汇总框位于左下角
        assert_eq!(*img.get_pixel(SUMMARY_MARGIN as u32 + 1, 200 - SUMMARY_MARGIN as u32 - 2), BLACK);
    }

    #[test]
    fn test_path_drawn_in_track_color() {
        let annotator = Annotator::without_font(AnnotatorStyle::default());
        let mut analytics = ZoneAnalytics::default();
        for (frame, y) in [(0u64, 20.0f32), (1, 40.0)] {
            analytics.observe(
                frame,
                &[crate::zones::TrackObservation {
                    track_id: 7,
                    center: Point::new(50.0, y),
                }],
            );
        }
        let mut img = canvas();
        annotator.annotate_zones(&mut img, &analytics, &[7]);
        assert_eq!(*img.get_pixel(50, 30), rgb_of(7));

        let mut untouched = canvas();
        annotator.annotate_zones(&mut untouched, &analytics, &[]);
        assert_eq!(*untouched.get_pixel(50, 30), BLACK);
    }

    #[test]
    fn test_track_box_drawn() {
        let annotator = Annotator::without_font(AnnotatorStyle::default());
        let track = TrackedObject {
            id: 3,
            bbox: BBox::from_ltwh(40.0, 40.0, 50.0, 60.0, 0.9),
            class_id: 0,
            hits: 3,
            frames_lost: 0,
            confirmed: true,
        };
        let mut img = canvas();
        annotator.annotate_tracks(&mut img, &[track], 30.0);
        assert_eq!(*img.get_pixel(40, 70), rgb_of(3));
        assert_eq!(*img.get_pixel(65, 70), BLACK);
    }

    #[test]
    fn test_missing_font_falls_back() {
        let annotator = Annotator::new("/nonexistent/font.ttf", AnnotatorStyle::default());
        assert!(!annotator.has_font());
    }
}
