// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 区域分析系统 (Zone Analytics)
///
/// - Registry: 区域注册表 (中心线 + 进入/离开阈值线)
/// - History:  轨迹历史
/// - Crossing: 越线检测
/// - Counter:  进入/离开计数
/// - Context:  运行循环持有的分析上下文
pub mod context;
pub mod counter;
pub mod crossing;
pub mod history;
pub mod registry;

pub use context::{TrackObservation, ZoneAnalytics};
pub use counter::{ZoneCounter, ZoneTally};
pub use crossing::{CrossingDetector, CrossingEvent, CrossingKind};
pub use history::{TrackHistory, TrackId};
pub use registry::{LineSegment, Point, Zone, ZoneRegistry, DEFAULT_ZONE_OFFSET};
