// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 越线检测 (Crossing Detector)
//!
//! 只比较轨迹最近两个点 (一阶差分):
//! - 进入: `prev.y < entry_y <= curr.y` (向下穿过进入线)
//! - 离开: `prev.y > exit_y >= curr.y` (向上穿过离开线)
//!
//! 检测器本身无状态,同一段位移重复输入会重复触发。
//! 单步位移跨越多个区域时,每个区域分别触发。

use serde::{Deserialize, Serialize};

use super::history::TrackId;
use super::registry::{LineSegment, Point, Zone};

/// 越线方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingKind {
    Entry,
    Exit,
}

impl CrossingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }
}

/// 越线事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub zone: usize,
    pub track_id: TrackId,
    pub kind: CrossingKind,
    pub frame_index: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CrossingDetector {
    /// 额外要求交点落在阈值线段的x范围内 (默认关闭,保持按整条水平线判断)
    clip_to_segment: bool,
}

impl CrossingDetector {
    pub fn new(clip_to_segment: bool) -> Self {
        Self { clip_to_segment }
    }

    /// 对单条轨迹的一步位移 (prev → curr) 检测所有区域
    pub fn evaluate(
        &self,
        track_id: TrackId,
        prev: Point,
        curr: Point,
        zones: &[Zone],
        frame_index: u64,
    ) -> Vec<CrossingEvent> {
        let mut events = Vec::new();

        for (zone_idx, zone) in zones.iter().enumerate() {
            let entry_y = zone.entry_y();
            if prev.y < entry_y && entry_y <= curr.y && self.within(&zone.entry_line, prev, curr)
            {
                events.push(CrossingEvent {
                    zone: zone_idx,
                    track_id,
                    kind: CrossingKind::Entry,
                    frame_index,
                });
            }

            let exit_y = zone.exit_y();
            if prev.y > exit_y && exit_y >= curr.y && self.within(&zone.exit_line, prev, curr) {
                events.push(CrossingEvent {
                    zone: zone_idx,
                    track_id,
                    kind: CrossingKind::Exit,
                    frame_index,
                });
            }
        }

        events
    }

    // 位移与阈值水平线交点的x是否落在线段范围内
    fn within(&self, line: &LineSegment, prev: Point, curr: Point) -> bool {
        if !self.clip_to_segment {
            return true;
        }
        let y = line.start.y;
        let dy = curr.y - prev.y;
        if dy == 0.0 {
            return false;
        }
        let t = (y - prev.y) / dy;
        let x = prev.x + t * (curr.x - prev.x);
        let (min_x, max_x) = line.x_extent();
        x >= min_x && x <= max_x
    }
}
