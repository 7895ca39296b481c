// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域注册表 (Zone Registry)
//!
//! 每个区域由一条中心线和上下平移得到的进入/离开阈值线组成。
//! 区域只能追加或撤销最后一个,创建后不可修改。

use serde::{Deserialize, Serialize};

/// 默认阈值线偏移 (像素,沿y轴)
pub const DEFAULT_ZONE_OFFSET: f32 = 20.0;

/// 屏幕坐标点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 沿y轴平移
    pub fn shifted_y(&self, dy: f32) -> Self {
        Self {
            x: self.x,
            y: self.y + dy,
        }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// 线段 (两个端点)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

impl LineSegment {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// 整条线段沿y轴平移
    pub fn shifted_y(&self, dy: f32) -> Self {
        Self {
            start: self.start.shifted_y(dy),
            end: self.end.shifted_y(dy),
        }
    }

    /// x方向覆盖范围 (min, max)
    pub fn x_extent(&self) -> (f32, f32) {
        (self.start.x.min(self.end.x), self.start.x.max(self.end.x))
    }
}

/// 方向性区域
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub center: LineSegment,
    pub entry_line: LineSegment,
    pub exit_line: LineSegment,
}

impl Zone {
    /// 由拖拽起点/终点构造区域
    ///
    /// 进入线 = 中心线上移 `offset`,离开线 = 中心线下移 `offset`。
    pub fn from_drag(p1: Point, p2: Point, offset: f32) -> Self {
        let center = LineSegment::new(p1, p2);
        Self {
            center,
            entry_line: center.shifted_y(-offset),
            exit_line: center.shifted_y(offset),
        }
    }

    /// 进入阈值的y坐标
    ///
    /// 阈值线按水平线处理;非水平拖拽时取第一个端点的y。
    pub fn entry_y(&self) -> f32 {
        self.entry_line.start.y
    }

    /// 离开阈值的y坐标
    pub fn exit_y(&self) -> f32 {
        self.exit_line.start.y
    }
}

/// 区域注册表: 按创建顺序保存区域,索引即插入位置
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    offset: f32,
}

impl ZoneRegistry {
    pub fn new(offset: f32) -> Self {
        Self {
            zones: Vec::new(),
            offset,
        }
    }

    /// 添加区域,返回其索引
    pub fn add_zone(&mut self, p1: Point, p2: Point) -> usize {
        let index = self.zones.len();
        self.zones.push(Zone::from_drag(p1, p2, self.offset));
        index
    }

    /// 撤销最后添加的区域 (空注册表时无操作)
    pub fn undo_last(&mut self) -> Option<Zone> {
        self.zones.pop()
    }

    /// 只读快照 (用于渲染)
    pub fn list_zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_thresholds_offset_on_y_only() {
        let mut registry = ZoneRegistry::default();
        let idx = registry.add_zone(Point::new(10.0, 200.0), Point::new(300.0, 260.0));
        assert_eq!(idx, 0);

        let zone = &registry.list_zones()[0];
        assert_eq!(zone.center.start, Point::new(10.0, 200.0));
        assert_eq!(zone.center.end, Point::new(300.0, 260.0));

        assert_eq!(zone.entry_line.start, Point::new(10.0, 180.0));
        assert_eq!(zone.entry_line.end, Point::new(300.0, 240.0));
        assert_eq!(zone.exit_line.start, Point::new(10.0, 220.0));
        assert_eq!(zone.exit_line.end, Point::new(300.0, 280.0));
    }

    #[test]
    fn test_indices_follow_insertion_order() {
        let mut registry = ZoneRegistry::default();
        assert_eq!(registry.add_zone(Point::new(0.0, 0.0), Point::new(1.0, 0.0)), 0);
        assert_eq!(registry.add_zone(Point::new(0.0, 5.0), Point::new(1.0, 5.0)), 1);
        assert_eq!(registry.add_zone(Point::new(0.0, 9.0), Point::new(1.0, 9.0)), 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(1).map(|z| z.center.start.y), Some(5.0));
    }

    #[test]
    fn test_undo_last_removes_newest() {
        let mut registry = ZoneRegistry::default();
        registry.add_zone(Point::new(0.0, 100.0), Point::new(50.0, 100.0));
        registry.add_zone(Point::new(0.0, 300.0), Point::new(50.0, 300.0));

        let removed = registry.undo_last().expect("zone removed");
        assert_eq!(removed.center.start.y, 300.0);
        assert_eq!(registry.len(), 1);

        // 撤销后索引复用
        assert_eq!(registry.add_zone(Point::new(0.0, 400.0), Point::new(9.0, 400.0)), 1);
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut registry = ZoneRegistry::default();
        assert!(registry.undo_last().is_none());
        assert!(registry.undo_last().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_custom_offset() {
        let mut registry = ZoneRegistry::new(5.0);
        registry.add_zone(Point::new(0.0, 50.0), Point::new(10.0, 50.0));
        let zone = &registry.list_zones()[0];
        assert_eq!(zone.entry_y(), 45.0);
        assert_eq!(zone.exit_y(), 55.0);
    }
}
