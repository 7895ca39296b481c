// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 运行配置
//! - `Args`: 命令行参数 (clap)
//! - `AnalyticsConfig`: 区域分析/检测/跟踪参数 (JSON 文件)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{ByteTrackParams, DetectionParams, KalmanParams};
use crate::error::ZoneCountError;
use crate::renderer::DEFAULT_FONT_PATH;
use crate::zones::{Point, ZoneAnalytics, DEFAULT_ZONE_OFFSET};

/// 命令行指定的区域 `x1,y1,x2,y2`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneArg {
    pub p1: Point,
    pub p2: Point,
}

/// 解析 `x1,y1,x2,y2`
pub fn parse_zone(s: &str) -> Result<ZoneArg, ZoneCountError> {
    let values: Vec<f32> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| ZoneCountError::InvalidZone(s.to_string()))?;

    match values.as_slice() {
        [x1, y1, x2, y2] if values.iter().all(|v| v.is_finite()) => Ok(ZoneArg {
            p1: Point::new(*x1, *y1),
            p2: Point::new(*x2, *y2),
        }),
        _ => Err(ZoneCountError::InvalidZone(s.to_string())),
    }
}

#[derive(Parser, Clone, Debug)]
#[command(name = "zonecount", author, version, about = "区域越线计数 (Zone crossing counter)")]
pub struct Args {
    /// 输入: 图片序列目录或视频文件
    #[arg(long)]
    pub source: PathBuf,

    /// MOTChallenge det.txt 预计算检测结果
    #[arg(long, conflicts_with = "model")]
    pub detections: Option<PathBuf>,

    /// ONNX 检测模型 (需启用 `onnx` 功能)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// 只保留这些类别 (仅模型检测, 可重复)
    #[arg(long = "class")]
    pub classes: Vec<u32>,

    /// JSON 配置文件, 不存在时写入默认值
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 区域 x1,y1,x2,y2 (可重复)
    #[arg(long = "zone", value_parser = parse_zone)]
    pub zones: Vec<ZoneArg>,

    /// 标注帧输出目录
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// 把区域视图录制为一个视频文件 (需启用 `ffmpeg` 功能)
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// 录制视频的帧率
    #[arg(long, default_value_t = 25.0)]
    pub fps: f32,

    /// 标注字体
    #[arg(long, default_value = DEFAULT_FONT_PATH)]
    pub font: PathBuf,

    /// 最多处理帧数
    #[arg(long)]
    pub max_frames: Option<u64>,
}

/// 配置文件中的区域
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub p1: [f32; 2],
    pub p2: [f32; 2],
}

impl ZoneConfig {
    pub fn points(&self) -> (Point, Point) {
        (
            Point::new(self.p1[0], self.p1[1]),
            Point::new(self.p2[0], self.p2[1]),
        )
    }
}

/// 区域分析参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    // === 区域参数 ===
    pub zone_offset: f32,            // 进入/离开线相对中心线的偏移(像素)
    pub zones: Vec<ZoneConfig>,      // 预设区域
    pub clip_to_segment: bool,       // 越线点须落在线段x范围内
    pub track_history_max_idle_frames: u64, // 轨迹历史空闲淘汰帧数 (0=不淘汰)

    // === 检测参数 ===
    pub detection_conf_threshold: f32, // 检测置信度阈值
    pub detection_iou_threshold: f32,  // NMS IOU阈值
    pub max_detections: usize,         // 每帧最大检测数
    pub replay_class_id: u32,          // 回放检测的类别

    // === ByteTrack参数 ===
    pub bytetrack_max_lost_frames: u32,      // 最大丢失帧数
    pub bytetrack_n_init: u32,               // 确认所需匹配次数
    pub bytetrack_high_score_threshold: f32, // 高分阈值
    pub bytetrack_low_score_threshold: f32,  // 低分阈值
    pub bytetrack_high_iou_threshold: f32,   // 高分IOU阈值
    pub bytetrack_low_iou_threshold: f32,    // 低分IOU阈值

    // === 卡尔曼滤波参数 ===
    pub kalman_process_noise: f32,        // 过程噪声 q
    pub kalman_obs_noise: f32,            // 观测噪声 r
    pub kalman_velocity_decay: f32,       // 速度衰减
    pub kalman_stationary_threshold: f32, // 静止判定阈值(像素)
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let detection = DetectionParams::default();
        let tracker = ByteTrackParams::default();
        Self {
            zone_offset: DEFAULT_ZONE_OFFSET,
            zones: Vec::new(),
            clip_to_segment: false,
            track_history_max_idle_frames: crate::zones::history::DEFAULT_MAX_IDLE_FRAMES,

            detection_conf_threshold: detection.conf_threshold,
            detection_iou_threshold: detection.iou_threshold,
            max_detections: detection.max_detections,
            replay_class_id: 0,

            bytetrack_max_lost_frames: tracker.max_lost_frames,
            bytetrack_n_init: tracker.n_init,
            bytetrack_high_score_threshold: tracker.high_score_threshold,
            bytetrack_low_score_threshold: tracker.low_score_threshold,
            bytetrack_high_iou_threshold: tracker.high_iou_threshold,
            bytetrack_low_iou_threshold: tracker.low_iou_threshold,

            kalman_process_noise: tracker.kalman.process_noise,
            kalman_obs_noise: tracker.kalman.observation_noise,
            kalman_velocity_decay: tracker.kalman.velocity_decay,
            kalman_stationary_threshold: tracker.kalman.stationary_threshold,
        }
    }
}

impl AnalyticsConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZoneCountError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config: Self = serde_json::from_str(&json)
                    .map_err(|e| ZoneCountError::Config(format!("{}: {}", path.display(), e)))?;
                config.validate()?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                Ok(config)
            }
            Err(e) => Err(ZoneCountError::Config(format!(
                "无法读取 {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// 保存配置到JSON文件 (失败只记录警告)
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    pub fn validate(&self) -> Result<(), ZoneCountError> {
        if !self.zone_offset.is_finite() || self.zone_offset < 0.0 {
            return Err(ZoneCountError::Config(format!(
                "zone_offset must be a non-negative number, got {}",
                self.zone_offset
            )));
        }
        let thresholds = [
            ("detection_conf_threshold", self.detection_conf_threshold),
            ("detection_iou_threshold", self.detection_iou_threshold),
            ("bytetrack_high_score_threshold", self.bytetrack_high_score_threshold),
            ("bytetrack_low_score_threshold", self.bytetrack_low_score_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ZoneCountError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            conf_threshold: self.detection_conf_threshold,
            iou_threshold: self.detection_iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn tracker_params(&self) -> ByteTrackParams {
        ByteTrackParams {
            max_lost_frames: self.bytetrack_max_lost_frames,
            n_init: self.bytetrack_n_init,
            high_score_threshold: self.bytetrack_high_score_threshold,
            low_score_threshold: self.bytetrack_low_score_threshold,
            high_iou_threshold: self.bytetrack_high_iou_threshold,
            low_iou_threshold: self.bytetrack_low_iou_threshold,
            kalman: KalmanParams {
                process_noise: self.kalman_process_noise,
                observation_noise: self.kalman_obs_noise,
                velocity_decay: self.kalman_velocity_decay,
                stationary_threshold: self.kalman_stationary_threshold,
            },
        }
    }

    /// 构建区域分析上下文: 先配置文件区域, 再命令行区域
    pub fn build_analytics(&self, extra_zones: &[ZoneArg]) -> ZoneAnalytics {
        let mut analytics = ZoneAnalytics::new(
            self.zone_offset,
            self.track_history_max_idle_frames,
            self.clip_to_segment,
        );
        let declared = self
            .zones
            .iter()
            .map(ZoneConfig::points)
            .chain(extra_zones.iter().map(|z| (z.p1, z.p2)));
        for (p1, p2) in declared {
            let index = analytics.add_zone(p1, p2);
            info!(
                "📐 Zone {}: ({:.0},{:.0}) → ({:.0},{:.0})",
                index + 1,
                p1.x,
                p1.y,
                p2.x,
                p2.y
            );
        }
        analytics
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            "🎛️ 区域偏移 {:.1}px | 预设区域 {} 个 | 历史淘汰 {} 帧 | 线段裁剪 {}",
            self.zone_offset,
            self.zones.len(),
            self.track_history_max_idle_frames,
            self.clip_to_segment
        );
        info!(
            "🎛️ 检测置信度 {:.2} | NMS {:.2} | ByteTrack 丢失 {} 帧 / 确认 {} 次",
            self.detection_conf_threshold,
            self.detection_iou_threshold,
            self.bytetrack_max_lost_frames,
            self.bytetrack_n_init
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("zonecount_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_parse_zone() {
        let zone = parse_zone("10, 20,300,20").expect("valid zone");
        assert_eq!(zone.p1, Point::new(10.0, 20.0));
        assert_eq!(zone.p2, Point::new(300.0, 20.0));
        assert!(parse_zone("1,2,3").is_err());
        assert!(parse_zone("a,b,c,d").is_err());
        assert!(parse_zone("1,2,3,inf").is_err());
    }

    #[test]
    fn test_args_collect_repeated_zones() {
        let args = Args::try_parse_from([
            "zonecount",
            "--source",
            "frames",
            "--detections",
            "det.txt",
            "--zone",
            "0,100,640,100",
            "--zone",
            "0,300,640,300",
        ])
        .expect("parse args");
        assert_eq!(args.zones.len(), 2);
        assert!(args.video.is_none());
        assert_eq!(args.fps, 25.0);
        assert_eq!(args.zones[1].p1.y, 300.0);
        assert_eq!(args.font, PathBuf::from(DEFAULT_FONT_PATH));
    }

    #[test]
    fn test_args_reject_bad_zone() {
        let result = Args::try_parse_from(["zonecount", "--source", "x", "--zone", "1,2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_writes_defaults() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let config = AnalyticsConfig::load(&path).expect("defaults");
        assert_eq!(config, AnalyticsConfig::default());
        assert!(path.exists());

        let reloaded = AnalyticsConfig::load(&path).expect("reload");
        assert_eq!(reloaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let path = temp_path("partial");
        fs::write(
            &path,
            r#"{ "zone_offset": 35.0, "zones": [{ "p1": [0, 50], "p2": [100, 50] }] }"#,
        )
        .expect("write");

        let config = AnalyticsConfig::load(&path).expect("load");
        assert_eq!(config.zone_offset, 35.0);
        assert_eq!(config.zones[0].points().1, Point::new(100.0, 50.0));
        assert_eq!(config.bytetrack_n_init, 3);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        let path = temp_path("malformed");
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            AnalyticsConfig::load(&path),
            Err(ZoneCountError::Config(_))
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unreadable_config_is_kept() {
        let path = temp_path("not_utf8");
        let bytes = b"{ \"zone_offset\": 35.0, \"x\": \"\xff\" }".to_vec();
        fs::write(&path, &bytes).expect("write");
        assert!(matches!(
            AnalyticsConfig::load(&path),
            Err(ZoneCountError::Config(_))
        ));
        assert_eq!(fs::read(&path).expect("read back"), bytes);
        let _ = fs::remove_file(&path);

        // 目录不是配置文件, 也不能被默认配置覆盖
        let dir = temp_path("dir_config");
        fs::create_dir_all(&dir).expect("mkdir");
        assert!(matches!(
            AnalyticsConfig::load(&dir),
            Err(ZoneCountError::Config(_))
        ));
        assert!(dir.is_dir());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_build_analytics_zone_order() {
        let config = AnalyticsConfig {
            zone_offset: 10.0,
            zones: vec![ZoneConfig {
                p1: [0.0, 50.0],
                p2: [100.0, 50.0],
            }],
            ..Default::default()
        };
        let cli = [parse_zone("0,200,100,200").expect("zone")];
        let analytics = config.build_analytics(&cli);

        assert_eq!(analytics.zones().len(), 2);
        assert_eq!(analytics.zones()[0].entry_y(), 40.0);
        assert_eq!(analytics.zones()[1].exit_y(), 210.0);
        assert_eq!(analytics.tallies().len(), 2);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = AnalyticsConfig {
            detection_conf_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
