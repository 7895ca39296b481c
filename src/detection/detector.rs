// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 一帧图像 → 检测框列表
//!
//! - `ReplayDetector`: 回放 MOTChallenge det.txt 预计算检测结果
//! - `YoloDetector`:   ONNX Runtime 实时推理 (需启用 `onnx` 功能)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use super::tracker::compute_iou;
use super::types::{BBox, Frame};
use crate::error::ZoneCountError;

/// 检测后处理参数
#[derive(Clone, Copy, Debug)]
pub struct DetectionParams {
    /// 置信度阈值
    pub conf_threshold: f32,
    /// NMS IOU阈值
    pub iou_threshold: f32,
    /// 每帧最多保留的检测数
    pub max_detections: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.3,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// 检测器统一接口
pub trait Detector {
    /// 检测一帧, 返回原图坐标系下的检测框
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BBox>>;

    /// 检测器名称 (用于日志)
    fn name(&self) -> &str;
}

/// 非极大值抑制: 按置信度降序保留, 与已保留框 IOU 超过阈值的丢弃
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let drop = (0..current_index).any(|prev| compute_iou(&xs[prev], &xs[index]) > iou_threshold);
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 置信度过滤 + NMS + 数量截断
pub fn postprocess_detections(mut xs: Vec<BBox>, params: &DetectionParams) -> Vec<BBox> {
    xs.retain(|b| b.confidence >= params.conf_threshold && !b.is_degenerate());
    non_max_suppression(&mut xs, params.iou_threshold);
    xs.truncate(params.max_detections);
    xs
}

/// 回放检测器: 读取 MOTChallenge det.txt
///
/// 每行: `frame, id, left, top, width, height, conf, x, y, z`, 帧号从1开始。
pub struct ReplayDetector {
    path: PathBuf,
    frames: HashMap<u64, Vec<BBox>>,
    params: DetectionParams,
    class_id: u32,
}

impl ReplayDetector {
    pub fn from_file(
        path: impl AsRef<Path>,
        params: DetectionParams,
        class_id: u32,
    ) -> std::result::Result<Self, ZoneCountError> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path).map_err(|e| ZoneCountError::SourceUnavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let frames = Self::parse(&path, &text, class_id)?;

        let total: usize = frames.values().map(Vec::len).sum();
        info!(
            "📄 检测回放: {} ({} 帧, {} 个检测框)",
            path.display(),
            frames.len(),
            total
        );

        Ok(Self {
            path,
            frames,
            params,
            class_id,
        })
    }

    fn parse(
        path: &Path,
        text: &str,
        class_id: u32,
    ) -> std::result::Result<HashMap<u64, Vec<BBox>>, ZoneCountError> {
        let mut frames: HashMap<u64, Vec<BBox>> = HashMap::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |reason: String| ZoneCountError::DetectionFile {
                path: path.to_path_buf(),
                line: line_no + 1,
                reason,
            };

            let mut columns = line.split(',').map(str::trim);
            let frame_field = columns.next().unwrap_or_default();
            // 帧号必须是 >= 1 的整数
            let frame_no = frame_field
                .parse::<u64>()
                .map_err(|_| err(format!("invalid frame number `{frame_field}`")))?;
            if frame_no == 0 {
                return Err(err("frame number must be >= 1".to_string()));
            }
            let frame_index = frame_no - 1;

            let fields: Vec<f32> = columns
                .take(6)
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| err(e.to_string()))?;
            if fields.len() < 6 {
                return Err(err(format!(
                    "expected at least 7 fields, got {}",
                    fields.len() + 1
                )));
            }

            let mut bbox = BBox::from_ltwh(fields[1], fields[2], fields[3], fields[4], fields[5]);
            bbox.class_id = class_id;
            frames.entry(frame_index).or_default().push(bbox);
        }

        Ok(frames)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 含检测结果的最大帧号 (从0开始)
    pub fn last_frame(&self) -> Option<u64> {
        self.frames.keys().max().copied()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BBox>> {
        let raw = self.frames.get(&frame.index).cloned().unwrap_or_default();
        let raw_len = raw.len();
        let kept = postprocess_detections(raw, &self.params);
        debug!(
            "🔍 帧{} 原始检测{}个 → 保留{}个 (class {})",
            frame.index,
            raw_len,
            kept.len(),
            self.class_id
        );
        Ok(kept)
    }

    fn name(&self) -> &str {
        "MOT回放"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn bbox(x: f32, conf: f32) -> BBox {
        BBox::from_ltwh(x, 0.0, 10.0, 10.0, conf)
    }

    #[test]
    fn test_nms_keeps_highest_of_overlapping() {
        let mut xs = vec![bbox(0.0, 0.5), bbox(1.0, 0.9), bbox(100.0, 0.7)];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence, 0.9);
        assert_eq!(xs[1].confidence, 0.7);
    }

    #[test]
    fn test_postprocess_filters_and_truncates() {
        let params = DetectionParams {
            conf_threshold: 0.3,
            iou_threshold: 0.45,
            max_detections: 2,
        };
        let xs = vec![
            bbox(0.0, 0.2),
            bbox(100.0, 0.9),
            bbox(200.0, 0.8),
            bbox(300.0, 0.7),
            BBox::from_ltwh(400.0, 0.0, 0.0, 5.0, 0.99),
        ];
        let kept = postprocess_detections(xs, &params);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].x1, 100.0);
        assert_eq!(kept[1].x1, 200.0);
    }

    #[test]
    fn test_parse_mot_lines() {
        let text = "1,-1,10,20,30,40,0.9,-1,-1,-1\n\n1,-1,100,20,30,40,0.8,-1,-1,-1\n3,-1,5,5,10,10,0.5\n";
        let frames = ReplayDetector::parse(Path::new("det.txt"), text, 0).expect("parse");
        assert_eq!(frames[&0].len(), 2);
        assert_eq!(frames[&2].len(), 1);
        assert!(!frames.contains_key(&1));
        assert_eq!(frames[&0][0].x2, 40.0);
        assert_eq!(frames[&0][0].y2, 60.0);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let text = "1,-1,10,20,30,40,0.9\n2,-1,abc,20,30,40,0.9\n";
        let err = ReplayDetector::parse(Path::new("det.txt"), text, 0).unwrap_err();
        match err {
            ZoneCountError::DetectionFile { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_non_integer_frame_numbers() {
        for bad in ["nan", "inf", "-inf", "1.5", "0", "-3", ""] {
            let text = format!("1,-1,10,20,30,40,0.9\n{bad},-1,10,20,30,40,0.9\n");
            match ReplayDetector::parse(Path::new("det.txt"), &text, 0) {
                Err(ZoneCountError::DetectionFile { line, .. }) => assert_eq!(line, 2, "{bad}"),
                other => panic!("frame `{bad}` should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_replay_detect_by_frame_index() {
        let path = std::env::temp_dir().join(format!("zonecount_det_{}.txt", std::process::id()));
        fs::write(&path, "2,-1,10,20,30,40,0.9,-1,-1,-1\n").expect("write fixture");

        let mut detector =
            ReplayDetector::from_file(&path, DetectionParams::default(), 0).expect("load");
        let img = RgbImage::new(8, 8);
        assert!(detector.detect(&Frame::new(0, img.clone())).expect("detect").is_empty());
        assert_eq!(detector.detect(&Frame::new(1, img)).expect("detect").len(), 1);
        assert_eq!(detector.last_frame(), Some(1));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let result = ReplayDetector::from_file(
            "/nonexistent/zonecount/det.txt",
            DetectionParams::default(),
            0,
        );
        assert!(matches!(result, Err(ZoneCountError::SourceUnavailable { .. })));
    }
}
