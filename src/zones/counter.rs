// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域计数器 (Zone Counter)

use serde::Serialize;

/// 单个区域的进入/离开计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneTally {
    pub entered: u64,
    pub exited: u64,
}

/// 按区域索引聚合计数,与注册表保持同步
#[derive(Debug, Clone, Default)]
pub struct ZoneCounter {
    tallies: Vec<ZoneTally>,
}

impl ZoneCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新区域计数初始化为 0/0
    pub fn push_zone(&mut self) -> usize {
        self.tallies.push(ZoneTally::default());
        self.tallies.len() - 1
    }

    /// 丢弃最后一个区域的计数
    pub fn pop_zone(&mut self) -> Option<ZoneTally> {
        self.tallies.pop()
    }

    pub fn increment_entered(&mut self, zone: usize) {
        self.tally_mut(zone).entered += 1;
    }

    pub fn increment_exited(&mut self, zone: usize) {
        self.tally_mut(zone).exited += 1;
    }

    pub fn tally(&self, zone: usize) -> Option<ZoneTally> {
        self.tallies.get(zone).copied()
    }

    pub fn tallies(&self) -> &[ZoneTally] {
        &self.tallies
    }

    /// 所有区域合计
    pub fn totals(&self) -> ZoneTally {
        self.tallies.iter().fold(ZoneTally::default(), |acc, t| ZoneTally {
            entered: acc.entered + t.entered,
            exited: acc.exited + t.exited,
        })
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    // 未注册的区域索引属于调用方的编程错误
    fn tally_mut(&mut self, zone: usize) -> &mut ZoneTally {
        let len = self.tallies.len();
        match self.tallies.get_mut(zone) {
            Some(tally) => tally,
            None => panic!("zone index {zone} is not registered ({len} zones)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zone_starts_at_zero() {
        let mut counter = ZoneCounter::new();
        let idx = counter.push_zone();
        assert_eq!(idx, 0);
        assert_eq!(counter.tally(0), Some(ZoneTally::default()));
    }

    #[test]
    fn test_increments_are_per_zone() {
        let mut counter = ZoneCounter::new();
        counter.push_zone();
        counter.push_zone();
        counter.increment_entered(0);
        counter.increment_entered(0);
        counter.increment_exited(1);

        assert_eq!(counter.tally(0), Some(ZoneTally { entered: 2, exited: 0 }));
        assert_eq!(counter.tally(1), Some(ZoneTally { entered: 0, exited: 1 }));
        assert_eq!(counter.totals(), ZoneTally { entered: 2, exited: 1 });
    }

    #[test]
    fn test_pop_zone_discards_counts() {
        let mut counter = ZoneCounter::new();
        counter.push_zone();
        counter.increment_exited(0);
        assert_eq!(counter.pop_zone(), Some(ZoneTally { entered: 0, exited: 1 }));
        assert!(counter.is_empty());
        assert_eq!(counter.pop_zone(), None);
    }

    #[test]
    #[should_panic(expected = "zone index 3 is not registered")]
    fn test_unknown_zone_panics() {
        let mut counter = ZoneCounter::new();
        counter.push_zone();
        counter.increment_entered(3);
    }
}
