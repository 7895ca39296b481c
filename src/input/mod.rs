// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - ImageSequence: 图片序列目录 (MOT img1/ 等)
/// - VideoDecoder:  FFmpeg 视频文件/流解码 (需启用 `ffmpeg` 功能)
/// - DecodeFilter:  YUV420P → RGB 帧过滤器
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
pub mod image_sequence;

use std::path::Path;

use crate::detection::Frame;
use crate::error::ZoneCountError;

#[cfg(feature = "ffmpeg")]
pub use decode_filter::DecodeFilter;
#[cfg(feature = "ffmpeg")]
pub use decoder::VideoDecoder;
pub use image_sequence::ImageSequence;

/// 帧来源: 按顺序产出帧, `None` 表示流结束
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;

    /// 来源描述 (用于日志)
    fn describe(&self) -> String;
}

/// 按路径打开输入源: 目录 → 图片序列, 文件 → 视频解码
pub fn open_source(path: impl AsRef<Path>) -> Result<Box<dyn FrameSource>, ZoneCountError> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Box::new(ImageSequence::open(path)?));
    }
    open_video(path)
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, ZoneCountError> {
    Ok(Box::new(VideoDecoder::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, ZoneCountError> {
    let reason = if path.exists() {
        "video input requires the `ffmpeg` feature"
    } else {
        "no such file or directory"
    };
    Err(ZoneCountError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// 内存帧来源 (测试与GUI预览用)
pub struct VecSource {
    frames: std::vec::IntoIter<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.next()
    }

    fn describe(&self) -> String {
        format!("内存帧 ({} 帧剩余)", self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_source_fails() {
        let result = open_source("/nonexistent/zonecount/video.mp4");
        assert!(matches!(
            result,
            Err(ZoneCountError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_vec_source_in_order() {
        let frames = (0..3)
            .map(|i| Frame::new(i, image::RgbImage::new(4, 4)))
            .collect();
        let mut source = VecSource::new(frames);
        assert_eq!(source.next_frame().map(|f| f.index), Some(0));
        assert_eq!(source.next_frame().map(|f| f.index), Some(1));
        assert_eq!(source.next_frame().map(|f| f.index), Some(2));
        assert!(source.next_frame().is_none());
    }
}
