// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征
//!
//! 轨迹连续匹配 `n_init` 次后确认;未确认轨迹一旦丢失立即删除,
//! 已确认轨迹最多容忍 `max_lost_frames` 帧丢失。

use super::tracker::{compute_iou, KalmanBoxFilter, KalmanParams, TrackedObject, Tracker};
use super::types::BBox;
use crate::zones::TrackId;

/// ByteTrack 参数
#[derive(Clone, Copy, Debug)]
pub struct ByteTrackParams {
    /// 最大允许丢失帧数
    pub max_lost_frames: u32,
    /// 确认所需匹配次数
    pub n_init: u32,
    /// 高分检测阈值
    pub high_score_threshold: f32,
    /// 低分检测阈值 (用于救援)
    pub low_score_threshold: f32,
    /// 高分匹配 IOU 阈值
    pub high_iou_threshold: f32,
    /// 低分匹配 IOU 阈值
    pub low_iou_threshold: f32,
    pub kalman: KalmanParams,
}

impl Default for ByteTrackParams {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            n_init: 3,
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.3,
            low_iou_threshold: 0.3,
            kalman: KalmanParams::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct ByteTrack {
    object: TrackedObject,
    kalman: KalmanBoxFilter,
}

impl ByteTrack {
    fn new(id: TrackId, det: &BBox, params: &ByteTrackParams) -> Self {
        let kalman = KalmanBoxFilter::new(det, params.kalman);
        let mut bbox = kalman.state_bbox();
        bbox.confidence = det.confidence;
        bbox.class_id = det.class_id;
        Self {
            object: TrackedObject {
                id,
                bbox,
                class_id: det.class_id,
                hits: 1,
                frames_lost: 0,
                confirmed: params.n_init <= 1,
            },
            kalman,
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
    }

    fn update(&mut self, det: &BBox, n_init: u32) {
        self.kalman.update(det);
        let mut bbox = self.kalman.state_bbox();
        bbox.confidence = det.confidence;
        bbox.class_id = det.class_id;

        let obj = &mut self.object;
        obj.bbox = bbox;
        obj.class_id = det.class_id;
        obj.hits += 1;
        obj.frames_lost = 0;
        if obj.hits >= n_init {
            obj.confirmed = true;
        }
    }

    fn mark_lost(&mut self) {
        self.object.frames_lost += 1;
        let mut bbox = self.kalman.state_bbox();
        bbox.confidence = self.object.bbox.confidence;
        bbox.class_id = self.object.class_id;
        self.object.bbox = bbox;
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<ByteTrack>,
    outputs: Vec<TrackedObject>,
    next_id: TrackId,
    params: ByteTrackParams,
}

impl ByteTracker {
    pub fn new(params: ByteTrackParams) -> Self {
        Self {
            tracks: Vec::new(),
            outputs: Vec::new(),
            next_id: 1,
            params,
        }
    }

    /// IOU 贪心匹配, 返回 (检测索引, 轨迹索引)
    fn match_detections_to_tracks(
        &self,
        detections: &[(usize, &BBox)],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if detections.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (local_det, (det_idx, det)) in detections.iter().enumerate() {
            for (local_track, &track_idx) in track_indices.iter().enumerate() {
                let predicted = self.tracks[track_idx].kalman.state_bbox();
                let iou = compute_iou(det, &predicted);
                if iou >= iou_threshold {
                    candidates.push((1.0 - iou, *det_idx, local_det, track_idx, local_track));
                }
            }
        }

        // 按代价排序
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; track_indices.len()];
        for (_, det_idx, local_det, track_idx, local_track) in candidates {
            if !used_det[local_det] && !used_track[local_track] {
                assignments.push((det_idx, track_idx));
                used_det[local_det] = true;
                used_track[local_track] = true;
            }
        }
        assignments
    }

    /// 获取跟踪统计信息
    pub fn stats(&self) -> String {
        let confirmed = self.tracks.iter().filter(|t| t.object.confirmed).count();
        format!(
            "跟踪: {} 条 (已确认 {}) | 总ID: {}",
            self.tracks.len(),
            confirmed,
            self.next_id - 1
        )
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackParams::default())
    }
}

impl Tracker for ByteTracker {
    /// ByteTrack 两轮匹配
    fn update(&mut self, detections: &[BBox]) -> &[TrackedObject] {
        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.predict();
        }

        // 2. 分离高低分检测框
        let mut high_dets = Vec::new();
        let mut low_dets = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.is_degenerate() {
                continue;
            }
            if det.confidence >= self.params.high_score_threshold {
                high_dets.push((idx, det));
            } else if det.confidence >= self.params.low_score_threshold {
                low_dets.push((idx, det));
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];
        let n_init = self.params.n_init;

        // 3. 第一轮: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        for (det_idx, track_idx) in
            self.match_detections_to_tracks(&high_dets, &all_tracks, self.params.high_iou_threshold)
        {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx], n_init);
        }

        // 4. 第二轮: 低分检测 + 未匹配轨迹 (救援)
        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&idx| !matched_track[idx])
            .collect();
        for (det_idx, track_idx) in
            self.match_detections_to_tracks(&low_dets, &unmatched, self.params.low_iou_threshold)
        {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(&detections[det_idx], n_init);
        }

        // 5. 未匹配轨迹 → 标记丢失
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracks[track_idx].mark_lost();
            }
        }

        // 6. 删除: 未确认即丢失 / 丢失太久
        let max_lost = self.params.max_lost_frames;
        self.tracks.retain(|t| {
            let o = &t.object;
            if o.confirmed {
                o.frames_lost <= max_lost
            } else {
                o.frames_lost == 0
            }
        });

        // 7. 未匹配的高分检测 → 新建轨迹
        for &(det_idx, det) in &high_dets {
            if !matched_det[det_idx] {
                self.tracks.push(ByteTrack::new(self.next_id, det, &self.params));
                self.next_id += 1;
            }
        }

        self.outputs = self.tracks.iter().map(|t| t.object.clone()).collect();
        &self.outputs
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.outputs.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
