// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频解码器: 独立线程解码, 通过有界通道按序交付帧
/// Video decoder running on its own thread, frames delivered in order
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{error, info};

use super::decode_filter::DecodeFilter;
use super::FrameSource;
use crate::detection::Frame;
use crate::error::ZoneCountError;

/// 解码线程与处理线程之间的缓冲帧数
const FRAME_QUEUE_DEPTH: usize = 2;

pub struct VideoDecoder {
    path: PathBuf,
    rx: Option<Receiver<RgbImage>>,
    next_index: u64,
    worker: Option<JoinHandle<()>>,
}

impl VideoDecoder {
    /// 打开视频文件或流地址, 启动失败即返回错误
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ZoneCountError> {
        let path = path.as_ref().to_path_buf();
        let url = path.to_string_lossy().to_string();
        let is_stream = url.contains("://");
        if !is_stream && !path.is_file() {
            return Err(ZoneCountError::SourceUnavailable {
                path,
                reason: "no such file".to_string(),
            });
        }

        let (tx, rx) = bounded::<RgbImage>(FRAME_QUEUE_DEPTH);
        let (started_tx, started_rx) = bounded::<Result<(), String>>(1);

        let worker = thread::Builder::new()
            .name("zonecount-decode".to_string())
            .spawn(move || {
                info!("🎬 解码器启动: {}", url);
                let filter = DecodeFilter::new(tx);
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let started = FfmpegContext::builder()
                    .input(Input::new(url.as_str()))
                    .filter_descs(["format=yuv420p"].into())
                    .output(out)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)));

                match started {
                    Ok(sch) => {
                        let _ = started_tx.send(Ok(()));
                        if let Err(e) = sch.wait() {
                            // 接收端关闭也会走到这里
                            info!("🛑 解码结束: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("❌ {}", e);
                        let _ = started_tx.send(Err(e));
                    }
                }
                info!("❌ 解码器退出");
            })
            .map_err(|e| ZoneCountError::SourceUnavailable {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        match started_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                path,
                rx: Some(rx),
                next_index: 0,
                worker: Some(worker),
            }),
            Ok(Err(reason)) => Err(ZoneCountError::SourceUnavailable { path, reason }),
            Err(_) => Err(ZoneCountError::SourceUnavailable {
                path,
                reason: "decoder thread exited".to_string(),
            }),
        }
    }
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> Option<Frame> {
        let image = self.rx.as_ref()?.recv().ok()?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Some(frame)
    }

    fn describe(&self) -> String {
        format!("{} [帧 {}]", self.path.display(), self.next_index)
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        // 先关闭接收端, 让解码线程的发送失败并退出
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
