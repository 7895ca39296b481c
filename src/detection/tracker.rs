// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use super::types::BBox;
use crate::zones::{Point, TrackId};

// ========== 公共数据结构 ==========

/// 跟踪对象 (跟踪器对外输出)
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// 唯一跟踪ID
    pub id: TrackId,

    /// 当前边界框 (滤波平滑后)
    pub bbox: BBox,

    /// 最近一次匹配检测的类别
    pub class_id: u32,

    /// 累计匹配次数
    pub hits: u32,

    /// 连续丢失帧数
    pub frames_lost: u32,

    /// 是否已确认 (hits 达到 n_init 后保持确认)
    pub confirmed: bool,
}

impl TrackedObject {
    /// 中心点
    pub fn center(&self) -> Point {
        self.bbox.center()
    }

    /// 已确认: 跟踪器认为该轨迹足够稳定
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// 新鲜: 本帧有检测更新 (非预测外推)
    pub fn is_fresh(&self) -> bool {
        self.frames_lost == 0
    }
}

// ========== 卡尔曼滤波器 ==========

/// 卡尔曼滤波参数
#[derive(Clone, Copy, Debug)]
pub struct KalmanParams {
    /// 过程噪声 q (0.1-1.0, 越小越平滑)
    pub process_noise: f32,
    /// 观测噪声 r (越大越平滑)
    pub observation_noise: f32,
    /// 速度衰减因子 (0.9-0.99)
    pub velocity_decay: f32,
    /// 静止阈值 (像素/帧)
    pub stationary_threshold: f32,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            observation_noise: 0.5,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
        }
    }
}

/// 简化卡尔曼滤波器 (对角协方差)
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    params: KalmanParams,
    stationary_count: u32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BBox, params: KalmanParams) -> Self {
        let c = bbox.center();
        Self {
            state: [c.x, c.y, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            params,
            stationary_count: 0,
        }
    }

    fn speed(&self) -> f32 {
        (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt()
    }

    /// 预测下一帧 (匀速模型 + 速度衰减)
    pub fn predict(&mut self) {
        let stationary = self.speed() < self.params.stationary_threshold;

        let (pos_decay, size_decay) = if stationary {
            self.stationary_count += 1;
            // 连续静止3帧后大幅衰减
            let d = if self.stationary_count > 3 {
                0.7
            } else {
                self.params.velocity_decay
            };
            (d, d)
        } else {
            self.stationary_count = 0;
            (self.params.velocity_decay, 0.98)
        };
        self.state[4] *= pos_decay;
        self.state[5] *= pos_decay;
        self.state[6] *= size_decay;
        self.state[7] *= size_decay;

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q = self.params.process_noise * if stationary { 0.5 } else { 1.0 };
        self.p.iter_mut().for_each(|p| *p += q);
    }

    /// 融合观测 (残差越大越信任预测)
    pub fn update(&mut self, bbox: &BBox) {
        let c = bbox.center();
        let residual = [
            c.x - self.state[0],
            c.y - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        let residual_norm = (residual[0] * residual[0] + residual[1] * residual[1]).sqrt();
        let threshold = self.params.stationary_threshold;
        let r = self.params.observation_noise
            * if residual_norm < threshold {
                0.3
            } else if residual_norm < 10.0 {
                1.0
            } else {
                3.0
            };

        let velocity_gain = if residual_norm < threshold { 0.3 } else { 1.0 };

        for i in 0..4 {
            let k_pos = self.p[i] / (self.p[i] + r);
            let k_vel = self.p[i + 4] / (self.p[i + 4] + r * 10.0);
            self.state[i] += k_pos * residual[i];
            self.state[i + 4] += k_vel * residual[i] * velocity_gain;
            self.p[i] *= 1.0 - k_pos;
            self.p[i + 4] *= 1.0 - k_vel;
        }

        if residual_norm >= threshold {
            self.stationary_count = 0;
        }
    }

    fn to_bbox(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        let w = w.max(1.0);
        let h = h.max(1.0);
        BBox {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: 1.0,
            class_id: 0,
        }
    }

    /// 当前状态边界框
    pub fn state_bbox(&self) -> BBox {
        let s = &self.state;
        Self::to_bbox(s[0], s[1], s[2], s[3])
    }

    /// 预测边界框 (用于匹配)
    pub fn predicted_bbox(&self) -> BBox {
        let s = &self.state;
        Self::to_bbox(s[0] + s[4], s[1] + s[5], s[2] + s[6], s[3] + s[7])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// 关联算法由实现决定;调用方只依赖 `is_confirmed` / `is_fresh` 两个判定
pub trait Tracker {
    /// 用当前帧检测结果更新,返回所有存活轨迹 (包括未确认/丢失中的)
    fn update(&mut self, detections: &[BBox]) -> &[TrackedObject];

    /// 清除所有轨迹
    fn reset(&mut self);

    /// 当前轨迹数量
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::from_ltwh(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = BBox::from_ltwh(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::from_ltwh(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = BBox::from_ltwh(5.0, 0.0, 10.0, 10.0, 1.0);
        // 交 50, 并 150
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_kalman_follows_constant_motion() {
        let mut bbox = BBox::from_ltwh(100.0, 100.0, 40.0, 80.0, 0.9);
        let mut kf = KalmanBoxFilter::new(&bbox, KalmanParams::default());
        for _ in 0..20 {
            bbox.y1 += 5.0;
            bbox.y2 += 5.0;
            kf.predict();
            kf.update(&bbox);
        }
        let state = kf.state_bbox();
        assert!((state.center().y - bbox.center().y).abs() < 5.0);
        assert!(kf.velocity().1 > 0.0);
    }
}
