// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域分析上下文
//!
//! 由运行循环持有,统一管理区域、计数和轨迹历史,每帧调用一次 `observe`。

use tracing::debug;

use super::counter::{ZoneCounter, ZoneTally};
use super::crossing::{CrossingDetector, CrossingEvent, CrossingKind};
use super::history::{TrackHistory, TrackId};
use super::registry::{Point, Zone, ZoneRegistry};

/// 本帧一条已确认轨迹的观测值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackObservation {
    pub track_id: TrackId,
    pub center: Point,
}

#[derive(Debug, Clone)]
pub struct ZoneAnalytics {
    registry: ZoneRegistry,
    counter: ZoneCounter,
    history: TrackHistory,
    detector: CrossingDetector,
}

impl ZoneAnalytics {
    pub fn new(zone_offset: f32, max_idle_frames: u64, clip_to_segment: bool) -> Self {
        Self {
            registry: ZoneRegistry::new(zone_offset),
            counter: ZoneCounter::new(),
            history: TrackHistory::new(max_idle_frames),
            detector: CrossingDetector::new(clip_to_segment),
        }
    }

    /// 添加区域并初始化其计数
    pub fn add_zone(&mut self, p1: Point, p2: Point) -> usize {
        let index = self.registry.add_zone(p1, p2);
        let counter_index = self.counter.push_zone();
        debug_assert_eq!(index, counter_index);
        index
    }

    /// 撤销最后一个区域,同时丢弃其计数
    pub fn undo_last(&mut self) -> Option<Zone> {
        let zone = self.registry.undo_last()?;
        self.counter.pop_zone();
        Some(zone)
    }

    /// 处理一帧: 记录轨迹点 → 越线检测 → 更新计数
    pub fn observe(
        &mut self,
        frame_index: u64,
        observations: &[TrackObservation],
    ) -> Vec<CrossingEvent> {
        self.history.set_frame(frame_index);

        let mut events = Vec::new();
        for obs in observations {
            self.history.record(obs.track_id, obs.center);

            let Some((prev, curr)) = self.history.last_two(obs.track_id) else {
                continue;
            };

            let fired = self.detector.evaluate(
                obs.track_id,
                prev,
                curr,
                self.registry.list_zones(),
                frame_index,
            );
            for event in &fired {
                match event.kind {
                    CrossingKind::Entry => self.counter.increment_entered(event.zone),
                    CrossingKind::Exit => self.counter.increment_exited(event.zone),
                }
                debug!(
                    "🚦 帧{} 轨迹{} {} 区域{}",
                    frame_index,
                    event.track_id,
                    event.kind.as_str(),
                    event.zone
                );
            }
            events.extend(fired);
        }

        let evicted = self.history.evict_idle(frame_index);
        if evicted > 0 {
            debug!("🧹 帧{} 淘汰 {} 条过期轨迹", frame_index, evicted);
        }

        events
    }

    pub fn zones(&self) -> &[Zone] {
        self.registry.list_zones()
    }

    pub fn tallies(&self) -> &[ZoneTally] {
        self.counter.tallies()
    }

    pub fn tally(&self, zone: usize) -> Option<ZoneTally> {
        self.counter.tally(zone)
    }

    pub fn totals(&self) -> ZoneTally {
        self.counter.totals()
    }

    pub fn path_of(&self, track_id: TrackId) -> &[Point] {
        self.history.path_of(track_id)
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }
}

impl Default for ZoneAnalytics {
    fn default() -> Self {
        Self::new(
            super::registry::DEFAULT_ZONE_OFFSET,
            super::history::DEFAULT_MAX_IDLE_FRAMES,
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(track_id: TrackId, y: f32) -> TrackObservation {
        TrackObservation {
            track_id,
            center: Point::new(100.0, y),
        }
    }

    #[test]
    fn test_crossing_updates_only_that_zone() {
        let mut analytics = ZoneAnalytics::default();
        analytics.add_zone(Point::new(0.0, 120.0), Point::new(640.0, 120.0)); // entry 100
        analytics.add_zone(Point::new(0.0, 420.0), Point::new(640.0, 420.0)); // entry 400

        analytics.observe(0, &[obs(1, 90.0)]);
        let events = analytics.observe(1, &[obs(1, 110.0)]);

        assert_eq!(events.len(), 1);
        assert_eq!(analytics.tally(0), Some(ZoneTally { entered: 1, exited: 0 }));
        assert_eq!(analytics.tally(1), Some(ZoneTally::default()));
    }

    #[test]
    fn test_first_sighting_never_counts() {
        let mut analytics = ZoneAnalytics::default();
        analytics.add_zone(Point::new(0.0, 120.0), Point::new(640.0, 120.0));
        let events = analytics.observe(0, &[obs(1, 100.0)]);
        assert!(events.is_empty());
        assert_eq!(analytics.totals(), ZoneTally::default());
    }

    #[test]
    fn test_repeated_segment_counts_again() {
        let mut analytics = ZoneAnalytics::default();
        analytics.add_zone(Point::new(0.0, 120.0), Point::new(640.0, 120.0));

        analytics.observe(0, &[obs(1, 90.0)]);
        analytics.observe(1, &[obs(1, 110.0)]);
        analytics.observe(2, &[obs(1, 90.0)]);
        analytics.observe(3, &[obs(1, 110.0)]);

        assert_eq!(analytics.tally(0).map(|t| t.entered), Some(2));
    }

    #[test]
    fn test_undo_discards_counts() {
        let mut analytics = ZoneAnalytics::default();
        analytics.add_zone(Point::new(0.0, 120.0), Point::new(640.0, 120.0));
        analytics.observe(0, &[obs(1, 90.0)]);
        analytics.observe(1, &[obs(1, 110.0)]);

        assert!(analytics.undo_last().is_some());
        assert!(analytics.zones().is_empty());
        assert!(analytics.tallies().is_empty());
        assert!(analytics.undo_last().is_none());
    }

    #[test]
    fn test_idle_tracks_are_evicted() {
        let mut analytics = ZoneAnalytics::new(20.0, 2, false);
        analytics.observe(0, &[obs(1, 10.0)]);
        analytics.observe(1, &[obs(2, 10.0)]);
        analytics.observe(3, &[obs(2, 20.0)]);
        assert!(analytics.path_of(1).is_empty());
        assert_eq!(analytics.path_of(2).len(), 2);
    }
}
