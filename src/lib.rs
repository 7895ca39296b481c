// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行与JSON配置
pub mod detection; // 检测与跟踪
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod output; // 标注视频输出
pub mod pipeline; // 逐帧处理流水线
pub mod renderer; // 帧标注
pub mod zones; // 区域越线计数

pub use crate::config::{AnalyticsConfig, Args};
pub use crate::error::ZoneCountError;
pub use crate::pipeline::{FrameOutput, Pipeline};
pub use crate::zones::ZoneAnalytics;

/// 日志初始化: 优先 `RUST_LOG`, 默认 info
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("zonecount_rs=info,zonecount=info,ort=warn")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 运行ID时间戳 (北京时间)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset).naive_local(),
        None => chrono::Utc::now().naive_utc(),
    };
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
