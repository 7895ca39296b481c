// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频编码器: 原始 RGB 帧经有界通道交给 FFmpeg 编码线程
/// Video encoder fed with raw RGB frames over a bounded channel
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::{FfmpegContext, Input, Output};
use image::RgbImage;
use tracing::{error, info};

use crate::error::ZoneCountError;

/// 处理线程与编码线程之间的缓冲帧数
const FRAME_QUEUE_DEPTH: usize = 4;

/// FFERRTAG('E','O','F',' ')
const AVERROR_EOF: i32 = -0x2046_4F45;

/// 输出编码 (任何 FFmpeg 构建都自带)
const VIDEO_CODEC: &str = "mpeg4";

/// FFmpeg 读回调: 把通道里的整帧字节按需切给 demuxer
pub struct RawFrameReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl RawFrameReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// 返回写入字节数; 发送端全部关闭后返回 `AVERROR_EOF`
    pub fn read(&mut self, buf: &mut [u8]) -> i32 {
        while self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(bytes) => {
                    self.pending = bytes;
                    self.offset = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }
        let n = (self.pending.len() - self.offset)
            .min(buf.len())
            .min(i32::MAX as usize);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        n as i32
    }
}

pub struct VideoRecorder {
    path: PathBuf,
    size: (u32, u32),
    frames: u64,
    tx: Option<Sender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<(), String>>>,
}

impl VideoRecorder {
    pub(super) fn check(_path: &Path) -> Result<(), ZoneCountError> {
        Ok(())
    }

    /// 启动编码线程; 编码器错误在 `write` / `finish` 时报告
    pub fn open(path: &Path, width: u32, height: u32, fps: f32) -> Result<Self, ZoneCountError> {
        let path = path.to_path_buf();
        let recording_error = |reason: String| ZoneCountError::Recording {
            path: path.clone(),
            reason,
        };
        if width == 0 || height == 0 {
            return Err(recording_error(format!("invalid frame size {}x{}", width, height)));
        }

        let (tx, rx) = bounded::<Vec<u8>>(FRAME_QUEUE_DEPTH);
        let url = path.to_string_lossy().to_string();
        let video_size = format!("{}x{}", width, height);
        let frame_rate = format!("{}", fps);

        let worker = thread::Builder::new()
            .name("zonecount-encode".to_string())
            .spawn(move || {
                info!("🎬 编码器启动: {} ({})", url, VIDEO_CODEC);
                let mut reader = RawFrameReader::new(rx);
                let input = Input::new_by_read_callback(move |buf: &mut [u8]| reader.read(buf))
                    .set_format("rawvideo")
                    .set_input_opts(
                        [
                            ("video_size", video_size.as_str()),
                            ("pixel_format", "rgb24"),
                            ("framerate", frame_rate.as_str()),
                        ]
                        .into(),
                    );
                let output = Output::from(url.as_str()).set_video_codec(VIDEO_CODEC);

                let result = FfmpegContext::builder()
                    .input(input)
                    .output(output)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)))
                    .and_then(|sch| sch.wait().map_err(|e| format!("编码失败: {}", e)));
                match &result {
                    Ok(()) => info!("✅ 编码器退出: {}", url),
                    Err(e) => error!("❌ {}", e),
                }
                result
            })
            .map_err(|e| recording_error(e.to_string()))?;

        Ok(Self {
            path,
            size: (width, height),
            frames: 0,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn write(&mut self, image: &RgbImage) -> Result<(), ZoneCountError> {
        if image.dimensions() != self.size {
            return Err(ZoneCountError::Recording {
                path: self.path.clone(),
                reason: format!(
                    "frame size {:?} differs from video size {:?}",
                    image.dimensions(),
                    self.size
                ),
            });
        }
        let sent = self
            .tx
            .as_ref()
            .map(|tx| tx.send(image.as_raw().clone()).is_ok())
            .unwrap_or(false);
        if !sent {
            // 编码线程已退出, 取回它的错误
            let reason = self
                .join()
                .err()
                .unwrap_or_else(|| "encoder stopped".to_string());
            return Err(ZoneCountError::Recording {
                path: self.path.clone(),
                reason,
            });
        }
        self.frames += 1;
        Ok(())
    }

    /// 关闭输入并等待编码完成
    pub fn finish(mut self) -> Result<u64, ZoneCountError> {
        self.join().map_err(|reason| ZoneCountError::Recording {
            path: self.path.clone(),
            reason,
        })?;
        info!("💾 视频已保存: {} ({} 帧)", self.path.display(), self.frames);
        Ok(self.frames)
    }

    fn join(&mut self) -> Result<(), String> {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| "encoder thread panicked".to_string())?,
            None => Ok(()),
        }
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_splits_frames_across_reads() {
        let (tx, rx) = bounded(2);
        tx.send(vec![1, 2, 3, 4, 5]).expect("send");
        tx.send(vec![6]).expect("send");
        drop(tx);

        let mut reader = RawFrameReader::new(rx);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(reader.read(&mut buf), 1);
        assert_eq!(buf[0], 6);
        assert_eq!(reader.read(&mut buf), AVERROR_EOF);
    }

    #[test]
    fn test_reader_skips_empty_chunks() {
        let (tx, rx) = bounded(2);
        tx.send(Vec::new()).expect("send");
        tx.send(vec![9, 9]).expect("send");
        drop(tx);

        let mut reader = RawFrameReader::new(rx);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(reader.read(&mut buf), AVERROR_EOF);
    }
}
