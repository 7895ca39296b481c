// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - Detector: 目标检测 (回放 / ONNX)
/// - Tracker:  目标追踪 (ByteTrack)
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use bytetrack::{ByteTrackParams, ByteTracker};
pub use detector::{
    non_max_suppression, postprocess_detections, DetectionParams, Detector, ReplayDetector,
};
pub use tracker::{compute_iou, KalmanParams, TrackedObject, Tracker};
pub use types::{class_name, BBox, Frame, COCO_CLASSES, INF_SIZE};
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;
