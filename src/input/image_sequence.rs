// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片序列输入: 目录内图片按文件名排序逐帧读取

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::FrameSource;
use crate::detection::Frame;
use crate::error::ZoneCountError;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

pub struct ImageSequence {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequence {
    /// 打开目录; 目录不可读或不含图片即失败
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ZoneCountError> {
        let dir = dir.as_ref().to_path_buf();
        let unavailable = |reason: String| ZoneCountError::SourceUnavailable {
            path: dir.clone(),
            reason,
        };

        let entries = fs::read_dir(&dir).map_err(|e| unavailable(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(unavailable("directory contains no images".to_string()));
        }

        info!("🖼️ 图片序列: {} ({} 帧)", dir.display(), files.len());
        Ok(Self {
            dir,
            files,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Option<Frame> {
        let path = self.files.get(self.cursor)?;
        match image::open(path) {
            Ok(img) => {
                let frame = Frame::new(self.cursor as u64, img.into_rgb8());
                self.cursor += 1;
                Some(frame)
            }
            Err(e) => {
                // 读帧失败即流结束
                warn!("⚠️ 读取帧失败 {}: {}", path.display(), e);
                self.cursor = self.files.len();
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} [{}/{}]", self.dir.display(), self.cursor, self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("zonecount_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create fixture dir");
        dir
    }

    #[test]
    fn test_frames_in_sorted_order() {
        let dir = fixture_dir("seq");
        for (name, shade) in [("000002.png", 200u8), ("000001.png", 100u8)] {
            RgbImage::from_pixel(4, 3, Rgb([shade, 0, 0]))
                .save(dir.join(name))
                .expect("save fixture");
        }
        fs::write(dir.join("notes.txt"), "skip me").expect("write");

        let mut seq = ImageSequence::open(&dir).expect("open");
        assert_eq!(seq.len(), 2);
        let f0 = seq.next_frame().expect("frame 0");
        assert_eq!(f0.index, 0);
        assert_eq!(f0.image.get_pixel(0, 0)[0], 100);
        let f1 = seq.next_frame().expect("frame 1");
        assert_eq!(f1.index, 1);
        assert_eq!((f1.width(), f1.height()), (4, 3));
        assert!(seq.next_frame().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = fixture_dir("empty");
        assert!(matches!(
            ImageSequence::open(&dir),
            Err(ZoneCountError::SourceUnavailable { .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_frame_ends_stream() {
        let dir = fixture_dir("corrupt");
        RgbImage::new(2, 2).save(dir.join("a.png")).expect("save");
        fs::write(dir.join("b.png"), b"not a png").expect("write");
        RgbImage::new(2, 2).save(dir.join("c.png")).expect("save");

        let mut seq = ImageSequence::open(&dir).expect("open");
        assert!(seq.next_frame().is_some());
        assert!(seq.next_frame().is_none());
        assert!(seq.next_frame().is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
