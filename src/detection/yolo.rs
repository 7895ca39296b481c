// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8/YOLO11 ONNX 检测器
// 包含: 模型加载、letterbox 预处理、推理、后处理

use std::path::Path;

use anyhow::Result;
use fast_image_resize as fr;
use ndarray::{ArrayView2, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

use super::detector::{postprocess_detections, DetectionParams, Detector};
use super::types::{BBox, Frame, INF_SIZE};
use crate::error::ZoneCountError;

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: u8 = 114;

/// letterbox 变换参数 (原图 → 推理输入)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn new(src_w: u32, src_h: u32, target: u32) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale).round();
        let scaled_h = (src_h as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - scaled_w) / 2.0).floor(),
            pad_y: ((target as f32 - scaled_h) / 2.0).floor(),
        }
    }

    /// 推理坐标 → 原图坐标
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// ONNX YOLO 检测器
pub struct YoloDetector {
    session: Session,
    params: DetectionParams,
    /// 只保留这些类别 (空 = 全部)
    classes: Vec<u32>,
    resizer: fr::Resizer,
}

impl YoloDetector {
    pub fn new(
        model_path: impl AsRef<Path>,
        params: DetectionParams,
        classes: Vec<u32>,
    ) -> std::result::Result<Self, ZoneCountError> {
        let model_path = model_path.as_ref();
        info!("🧠 加载模型: {}", model_path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| ZoneCountError::Model(format!("{}: {e}", model_path.display())))?;

        info!("✅ YOLO 检测器就绪");
        Ok(Self {
            session,
            params,
            classes,
            resizer: fr::Resizer::new(),
        })
    }

    /// letterbox + 归一化 + HWC → CHW
    fn preprocess(&mut self, frame: &Frame) -> Result<(Vec<f32>, Letterbox)> {
        let size = INF_SIZE as usize;
        let lb = Letterbox::new(frame.width(), frame.height(), INF_SIZE);
        let scaled_w = ((frame.width() as f32 * lb.scale).round() as u32).clamp(1, INF_SIZE);
        let scaled_h = ((frame.height() as f32 * lb.scale).round() as u32).clamp(1, INF_SIZE);

        let src = fr::images::Image::from_vec_u8(
            frame.width(),
            frame.height(),
            frame.image.as_raw().clone(),
            fr::PixelType::U8x3,
        )?;
        let mut dst = fr::images::Image::new(scaled_w, scaled_h, fr::PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )?;

        let mut input = vec![PAD_VALUE as f32 / 255.0; 3 * size * size];
        let (ox, oy) = (lb.pad_x as usize, lb.pad_y as usize);
        for (i, rgb) in dst.buffer().chunks_exact(3).enumerate() {
            let (dx, dy) = (i % scaled_w as usize + ox, i / scaled_w as usize + oy);
            if dx >= size || dy >= size {
                continue;
            }
            for c in 0..3 {
                input[c * size * size + dy * size + dx] = rgb[c] as f32 / 255.0;
            }
        }
        Ok((input, lb))
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
        let shape = [1usize, 3, INF_SIZE as usize, INF_SIZE as usize];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims = shape.iter().map(|&d| d as usize).collect();
        Ok((dims, data.to_vec()))
    }

    fn wanted(&self, class_id: u32) -> bool {
        self.classes.is_empty() || self.classes.contains(&class_id)
    }
}

/// 解码 [4 + nc, N] 输出为原图坐标检测框 (未做 NMS)
pub fn decode_predictions(
    preds: ArrayView2<f32>,
    lb: &Letterbox,
    frame_w: f32,
    frame_h: f32,
    conf_threshold: f32,
) -> Vec<BBox> {
    let mut out = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        if pred.len() <= CXYWH_OFFSET {
            continue;
        }
        let (class_id, confidence) = pred
            .iter()
            .skip(CXYWH_OFFSET)
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, &c)| if c > best.1 { (i, c) } else { best });
        if confidence < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
        let (x1, y1) = lb.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.unmap(cx + w / 2.0, cy + h / 2.0);
        out.push(BBox {
            x1: x1.clamp(0.0, frame_w),
            y1: y1.clamp(0.0, frame_h),
            x2: x2.clamp(0.0, frame_w),
            y2: y2.clamp(0.0, frame_h),
            confidence,
            class_id: class_id as u32,
        });
    }
    out
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BBox>> {
        let t_pre = std::time::Instant::now();
        let (input, lb) = self.preprocess(frame)?;
        let (dims, data) = self.infer(input)?;
        if dims.len() != 3 || dims[0] != 1 {
            return Err(ZoneCountError::Model(format!("unexpected output shape {dims:?}")).into());
        }

        let preds = ArrayView2::from_shape((dims[1], dims[2]), &data)?;
        let mut xs = decode_predictions(
            preds,
            &lb,
            frame.width() as f32,
            frame.height() as f32,
            self.params.conf_threshold,
        );
        xs.retain(|b| self.wanted(b.class_id));
        let xs = postprocess_detections(xs, &self.params);

        debug!(
            "🔍 帧{} 推理 {:?}, 检测 {} 个",
            frame.index,
            t_pre.elapsed(),
            xs.len()
        );
        Ok(xs)
    }

    fn name(&self) -> &str {
        "YOLO"
    }
}
