// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 轨迹历史 (Track History Store)
//!
//! track_id → 中心点序列,只追加不重排。
//! 长时间未出现的轨迹按帧数淘汰,避免长时间运行时内存无限增长。

use std::collections::HashMap;

use super::registry::Point;

/// 跟踪ID (由外部跟踪器分配)
pub type TrackId = u32;

/// 默认淘汰阈值 (帧)
pub const DEFAULT_MAX_IDLE_FRAMES: u64 = 300;

#[derive(Debug, Clone)]
struct TrackPath {
    points: Vec<Point>,
    last_frame: u64,
}

#[derive(Debug, Clone)]
pub struct TrackHistory {
    paths: HashMap<TrackId, TrackPath>,
    /// 0 表示不淘汰
    max_idle_frames: u64,
    current_frame: u64,
}

impl TrackHistory {
    pub fn new(max_idle_frames: u64) -> Self {
        Self {
            paths: HashMap::new(),
            max_idle_frames,
            current_frame: 0,
        }
    }

    /// 设置当前帧号 (用于记录轨迹最后出现的帧)
    pub fn set_frame(&mut self, frame_index: u64) {
        self.current_frame = frame_index;
    }

    /// 追加轨迹点,轨迹不存在时创建
    pub fn record(&mut self, track_id: TrackId, point: Point) {
        let frame = self.current_frame;
        let path = self.paths.entry(track_id).or_insert_with(|| TrackPath {
            points: Vec::new(),
            last_frame: frame,
        });
        path.points.push(point);
        path.last_frame = frame;
    }

    /// 完整轨迹 (未知ID返回空)
    pub fn path_of(&self, track_id: TrackId) -> &[Point] {
        self.paths
            .get(&track_id)
            .map(|p| p.points.as_slice())
            .unwrap_or(&[])
    }

    /// 最近两个点 (prev, curr)
    pub fn last_two(&self, track_id: TrackId) -> Option<(Point, Point)> {
        match self.path_of(track_id) {
            [.., prev, curr] => Some((*prev, *curr)),
            _ => None,
        }
    }

    /// 淘汰超过 max_idle_frames 帧未更新的轨迹,返回淘汰数量
    pub fn evict_idle(&mut self, current_frame: u64) -> usize {
        if self.max_idle_frames == 0 {
            return 0;
        }
        let before = self.paths.len();
        let max_idle = self.max_idle_frames;
        self.paths
            .retain(|_, path| current_frame.saturating_sub(path.last_frame) <= max_idle);
        before - self.paths.len()
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.paths.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for TrackHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_accumulates_in_order() {
        let mut history = TrackHistory::default();
        let points: Vec<Point> = (1..=6).map(|i| Point::new(i as f32, 10.0 * i as f32)).collect();
        for p in &points {
            history.record(7, *p);
        }
        assert_eq!(history.path_of(7), points.as_slice());
    }

    #[test]
    fn test_unknown_track_is_empty() {
        let history = TrackHistory::default();
        assert!(history.path_of(42).is_empty());
        assert!(history.last_two(42).is_none());
    }

    #[test]
    fn test_last_two_requires_two_points() {
        let mut history = TrackHistory::default();
        history.record(1, Point::new(0.0, 90.0));
        assert!(history.last_two(1).is_none());

        history.record(1, Point::new(0.0, 110.0));
        history.record(1, Point::new(0.0, 130.0));
        assert_eq!(
            history.last_two(1),
            Some((Point::new(0.0, 110.0), Point::new(0.0, 130.0)))
        );
    }

    #[test]
    fn test_paths_are_independent() {
        let mut history = TrackHistory::default();
        history.record(1, Point::new(1.0, 1.0));
        history.record(2, Point::new(2.0, 2.0));
        history.record(1, Point::new(3.0, 3.0));
        assert_eq!(history.path_of(1).len(), 2);
        assert_eq!(history.path_of(2), &[Point::new(2.0, 2.0)]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_evict_idle_tracks() {
        let mut history = TrackHistory::new(10);
        history.set_frame(0);
        history.record(1, Point::new(0.0, 0.0));
        history.set_frame(5);
        history.record(2, Point::new(0.0, 0.0));

        assert_eq!(history.evict_idle(10), 0);
        assert_eq!(history.evict_idle(11), 1);
        assert!(history.path_of(1).is_empty());
        assert_eq!(history.path_of(2).len(), 1);
    }

    #[test]
    fn test_eviction_disabled_with_zero() {
        let mut history = TrackHistory::new(0);
        history.record(1, Point::new(0.0, 0.0));
        assert_eq!(history.evict_idle(1_000_000), 0);
        assert_eq!(history.len(), 1);
    }
}
