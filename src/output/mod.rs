// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 标注视频输出 (Annotated video output)
///
/// - VideoSink:     首帧确定尺寸后再打开编码器
/// - VideoRecorder: FFmpeg 编码线程 (需启用 `ffmpeg` 功能)
#[cfg(feature = "ffmpeg")]
pub mod video;

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::error::ZoneCountError;

#[cfg(feature = "ffmpeg")]
pub use video::VideoRecorder;

#[cfg(feature = "ffmpeg")]
use video::VideoRecorder as Backend;

/// 未启用 `ffmpeg` 时没有可用的编码器
#[cfg(not(feature = "ffmpeg"))]
enum Backend {}

#[cfg(not(feature = "ffmpeg"))]
impl Backend {
    fn unsupported(path: &Path) -> ZoneCountError {
        ZoneCountError::Recording {
            path: path.to_path_buf(),
            reason: "video output requires the `ffmpeg` feature".to_string(),
        }
    }

    fn check(path: &Path) -> Result<(), ZoneCountError> {
        Err(Self::unsupported(path))
    }

    fn open(path: &Path, _width: u32, _height: u32, _fps: f32) -> Result<Self, ZoneCountError> {
        Err(Self::unsupported(path))
    }

    fn write(&mut self, _image: &RgbImage) -> Result<(), ZoneCountError> {
        match *self {}
    }

    fn finish(self) -> Result<u64, ZoneCountError> {
        match self {}
    }
}

/// 逐帧写入一个视频文件, 所有帧必须与首帧同尺寸
pub struct VideoSink {
    path: PathBuf,
    fps: f32,
    writer: Option<Backend>,
}

impl VideoSink {
    pub fn new(path: impl AsRef<Path>, fps: f32) -> Result<Self, ZoneCountError> {
        let path = path.as_ref().to_path_buf();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ZoneCountError::Recording {
                path,
                reason: format!("fps must be positive, got {}", fps),
            });
        }
        Backend::check(&path)?;
        Ok(Self {
            path,
            fps,
            writer: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, image: &RgbImage) -> Result<(), ZoneCountError> {
        if self.writer.is_none() {
            info!(
                "🎥 录制视频: {} ({}x{} @ {}fps)",
                self.path.display(),
                image.width(),
                image.height(),
                self.fps
            );
            self.writer = Some(Backend::open(
                &self.path,
                image.width(),
                image.height(),
                self.fps,
            )?);
        }
        match self.writer.as_mut() {
            Some(writer) => writer.write(image),
            None => Ok(()),
        }
    }

    /// 结束编码, 返回写入帧数
    pub fn finish(self) -> Result<u64, ZoneCountError> {
        match self.writer {
            Some(writer) => writer.finish(),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_fps() {
        for fps in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                VideoSink::new("out.avi", fps),
                Err(ZoneCountError::Recording { .. })
            ));
        }
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_video_requires_ffmpeg() {
        match VideoSink::new("out.avi", 25.0) {
            Err(ZoneCountError::Recording { reason, .. }) => assert!(reason.contains("ffmpeg")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("video output should be unavailable"),
        }
    }
}
