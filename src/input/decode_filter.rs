// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg帧过滤器: YUV420P帧 → RgbImage → 处理线程
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// 最大允许分辨率
const MAX_DIMENSION: u32 = 8192;

/// 一帧 YUV420P 的三个平面
pub struct Yuv420Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct DecodeStats {
    decoded: usize,
    dropped: usize,
    window_frames: usize,
}

#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    stats: DecodeStats,
    window_start: Instant,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self {
            tx,
            stats: DecodeStats::default(),
            window_start: Instant::now(),
        }
    }

    fn reject(&mut self, reason: &str) {
        self.stats.dropped += 1;
        // 只提示前几次, 避免刷屏
        if self.stats.dropped <= 10 {
            warn!("⚠️ 丢弃解码帧: {}", reason);
        }
    }

    /// 从 AVFrame 拷出 RGB 图像; 不合法的帧返回 Err(原因)
    fn convert(frame: &Frame) -> Result<RgbImage, String> {
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return Err("空帧/损坏帧".into());
        }

        // SAFETY: 指针非空, 且帧在本次回调期间有效
        let raw = unsafe { &*frame.as_ptr() };
        let (w, h) = (raw.width.max(0) as u32, raw.height.max(0) as u32);
        if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(format!("非法分辨率 {}x{}", w, h));
        }
        if raw.linesize[0] <= 0 || raw.linesize[1] <= 0 || raw.linesize[2] != raw.linesize[1] {
            return Err("步长异常".into());
        }
        let y_stride = raw.linesize[0] as usize;
        let uv_stride = raw.linesize[1] as usize;
        if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
            return Err(format!("步长过小 y={} uv={}", y_stride, uv_stride));
        }
        if raw.data[0].is_null() || raw.data[1].is_null() || raw.data[2].is_null() {
            return Err("YUV平面为空".into());
        }

        let chroma_rows = (h as usize).div_ceil(2);
        // SAFETY: format=yuv420p 滤镜保证三个平面分别覆盖 h 行 / (h+1)/2 行
        let planes = unsafe {
            Yuv420Planes {
                y: std::slice::from_raw_parts(raw.data[0], y_stride * h as usize),
                u: std::slice::from_raw_parts(raw.data[1], uv_stride * chroma_rows),
                v: std::slice::from_raw_parts(raw.data[2], uv_stride * chroma_rows),
                y_stride,
                uv_stride,
            }
        };
        Ok(yuv420p_to_rgb(&planes, w, h))
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        let image = match Self::convert(&frame) {
            Ok(image) => image,
            Err(reason) => {
                self.reject(&reason);
                return Ok(None);
            }
        };

        self.stats.decoded += 1;
        self.stats.window_frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            debug!(
                "📺 解码 {:.1}fps | 已解码{} | 丢弃{}",
                self.stats.window_frames as f64 / elapsed,
                self.stats.decoded,
                self.stats.dropped
            );
            self.stats.window_frames = 0;
            self.window_start = Instant::now();
        }

        // 处理线程已退出 → 停止解码
        self.tx
            .send(image)
            .map_err(|_| "frame receiver closed".to_string())?;

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(
            "✅ 解码线程退出 (已解码{}, 丢弃{})",
            self.stats.decoded, self.stats.dropped
        );
    }
}

/// YUV420P → RGB (BT.601 定点近似, 系数/128)
pub fn yuv420p_to_rgb(planes: &Yuv420Planes<'_>, width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let uv = (y / 2) * planes.uv_stride + x / 2;
        let luma = planes.y[y * planes.y_stride + x] as i32;
        let cb = planes.u[uv] as i32 - 128;
        let cr = planes.v[uv] as i32 - 128;

        let r = luma + ((cr * 179) >> 7);
        let g = luma - ((cb * 44) >> 7) - ((cr * 91) >> 7);
        let b = luma + ((cb * 227) >> 7);
        image::Rgb([
            r.clamp(0, 255) as u8,
            g.clamp(0, 255) as u8,
            b.clamp(0, 255) as u8,
        ])
    })
}
