// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单线程逐帧同步处理, 一帧完成后才读取下一帧:
/// 读帧 → 检测 → 跟踪 → 记录轨迹 → 越线计数 → 标注
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::{AnalyticsConfig, Args};
use crate::detection::{Detector, Frame, ReplayDetector, TrackedObject, Tracker};
use crate::input::FrameSource;
use crate::renderer::Annotator;
use crate::zones::{CrossingEvent, TrackId, TrackObservation, ZoneAnalytics};

/// 单帧处理结果
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub frame_index: u64,
    /// 轨迹视图 (检测框 + ID)
    pub tracks_view: RgbImage,
    /// 区域视图 (区域 + 路径 + 计数)
    pub zones_view: RgbImage,
    /// 本帧转发给区域分析的轨迹
    pub active: Vec<TrackedObject>,
    pub events: Vec<CrossingEvent>,
    pub fps: f32,
}

impl FrameOutput {
    /// 保存两个视图: tracks_NNNNNN.jpg / zones_NNNNNN.jpg
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let tracks = dir.join(format!("tracks_{:06}.jpg", self.frame_index));
        let zones = dir.join(format!("zones_{:06}.jpg", self.frame_index));
        self.tracks_view
            .save(&tracks)
            .with_context(|| format!("保存失败: {}", tracks.display()))?;
        self.zones_view
            .save(&zones)
            .with_context(|| format!("保存失败: {}", zones.display()))?;
        Ok(())
    }
}

/// 运行统计
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: u64,
    pub detections: u64,
    pub crossings: u64,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    analytics: ZoneAnalytics,
    annotator: Annotator,
    stats: PipelineStats,
}

/// 只转发已确认且本帧有更新的轨迹, 退化框跳过
pub fn select_active(tracks: &[TrackedObject]) -> Vec<TrackedObject> {
    tracks
        .iter()
        .filter(|t| t.is_confirmed() && t.is_fresh() && !t.bbox.is_degenerate())
        .cloned()
        .collect()
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        analytics: ZoneAnalytics,
        annotator: Annotator,
    ) -> Self {
        Self {
            source,
            detector,
            tracker,
            analytics,
            annotator,
            stats: PipelineStats::default(),
        }
    }

    /// 处理下一帧; 流结束返回 `None`
    pub fn step(&mut self) -> Option<FrameOutput> {
        let frame = self.source.next_frame()?;
        Some(self.process_frame(frame))
    }

    /// 处理一帧 (检测失败只影响本帧)
    pub fn process_frame(&mut self, frame: Frame) -> FrameOutput {
        let start = Instant::now();

        let detections = match self.detector.detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                warn!("⚠️ 帧{} 检测失败 ({}): {:#}", frame.index, self.detector.name(), e);
                Vec::new()
            }
        };
        self.stats.detections += detections.len() as u64;

        let active = select_active(self.tracker.update(&detections));
        let observations: Vec<TrackObservation> = active
            .iter()
            .map(|t| TrackObservation {
                track_id: t.id,
                center: t.center(),
            })
            .collect();
        let events = self.analytics.observe(frame.index, &observations);
        self.stats.crossings += events.len() as u64;

        let fps = 1.0 / start.elapsed().as_secs_f32().max(1e-6);
        let active_ids: Vec<TrackId> = active.iter().map(|t| t.id).collect();

        let mut tracks_view = frame.image.clone();
        self.annotator.annotate_tracks(&mut tracks_view, &active, fps);
        let mut zones_view = frame.image;
        self.annotator
            .annotate_zones(&mut zones_view, &self.analytics, &active_ids);

        self.stats.frames += 1;
        debug!(
            "🎞️ 帧{} 检测{} 活跃轨迹{} 越线{}",
            frame.index,
            detections.len(),
            active.len(),
            events.len()
        );

        FrameOutput {
            frame_index: frame.index,
            tracks_view,
            zones_view,
            active,
            events,
            fps,
        }
    }

    /// 跑完整个输入 (或达到 `max_frames`), 每帧交给 `sink`
    pub fn run<F>(&mut self, max_frames: Option<u64>, mut sink: F) -> Result<PipelineStats>
    where
        F: FnMut(&FrameOutput) -> Result<()>,
    {
        info!(
            "▶️ 开始处理: {} | 检测器 {} | 区域 {} 个",
            self.source.describe(),
            self.detector.name(),
            self.analytics.zones().len()
        );

        while max_frames.map_or(true, |max| self.stats.frames < max) {
            let Some(output) = self.step() else {
                info!("⏹️ 输入结束");
                break;
            };
            sink(&output)?;
        }

        info!(
            "✅ 处理完成: {} 帧, {} 个检测, {} 次越线",
            self.stats.frames, self.stats.detections, self.stats.crossings
        );
        Ok(self.stats)
    }

    pub fn analytics(&self) -> &ZoneAnalytics {
        &self.analytics
    }

    pub fn analytics_mut(&mut self) -> &mut ZoneAnalytics {
        &mut self.analytics
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// 输出当前各区域计数
    pub fn log_counts(&self) {
        for (i, tally) in self.analytics.tallies().iter().enumerate() {
            info!(
                "📊 Zone {}: entered {} | exited {}",
                i + 1,
                tally.entered,
                tally.exited
            );
        }
        let totals = self.analytics.totals();
        info!("📊 合计: entered {} | exited {}", totals.entered, totals.exited);
    }
}

/// 按命令行选择检测器: det.txt 回放优先, 否则 ONNX 模型
pub fn build_detector(args: &Args, config: &AnalyticsConfig) -> Result<Box<dyn Detector>> {
    if let Some(path) = &args.detections {
        let detector =
            ReplayDetector::from_file(path, config.detection_params(), config.replay_class_id)?;
        return Ok(Box::new(detector));
    }
    if let Some(model) = &args.model {
        return build_model_detector(model, args, config);
    }
    bail!("需要 --detections <det.txt> 或 --model <onnx> 之一");
}

#[cfg(feature = "onnx")]
fn build_model_detector(
    model: &Path,
    args: &Args,
    config: &AnalyticsConfig,
) -> Result<Box<dyn Detector>> {
    let detector = crate::detection::YoloDetector::new(
        model,
        config.detection_params(),
        args.classes.clone(),
    )?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn build_model_detector(
    model: &Path,
    _args: &Args,
    _config: &AnalyticsConfig,
) -> Result<Box<dyn Detector>> {
    Err(crate::error::ZoneCountError::Model(format!(
        "{} requires building with `--features onnx`",
        model.display()
    ))
    .into())
}

/// 创建输出目录
pub fn prepare_output_dir(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("无法创建输出目录 {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn track(id: TrackId, confirmed: bool, frames_lost: u32) -> TrackedObject {
        TrackedObject {
            id,
            bbox: BBox::from_ltwh(0.0, 0.0, 10.0, 10.0, 0.9),
            class_id: 0,
            hits: 3,
            frames_lost,
            confirmed,
        }
    }

    #[test]
    fn test_only_confirmed_fresh_tracks_forwarded() {
        let mut degenerate = track(4, true, 0);
        degenerate.bbox = BBox::from_ltwh(0.0, 0.0, 0.0, 10.0, 0.9);
        let tracks = vec![
            track(1, true, 0),
            track(2, false, 0),
            track(3, true, 2),
            degenerate,
        ];
        let active = select_active(&tracks);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 1);
    }
}
