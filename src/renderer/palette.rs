// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 轨迹配色: 由轨迹ID确定性地生成颜色

use image::Rgb;

use crate::zones::TrackId;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 固定样式颜色
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

/// 轨迹ID → 颜色 (纯函数, 同一ID永远同色)
pub fn color_of(track_id: TrackId) -> (u8, u8, u8) {
    let hash = fnv1a64(&track_id.to_le_bytes());
    let hue = (hash % 360) as f32;
    // 饱和度 0.6-0.95, 亮度 0.7-0.95, 保证深色背景上可见
    let s = 0.6 + ((hash >> 16) % 36) as f32 / 100.0;
    let v = 0.7 + ((hash >> 32) % 26) as f32 / 100.0;
    hsv_to_rgb(hue, s, v)
}

pub fn rgb_of(track_id: TrackId) -> Rgb<u8> {
    let (r, g, b) = color_of(track_id);
    Rgb([r, g, b])
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_is_deterministic() {
        for id in [0, 1, 7, 42, u32::MAX] {
            assert_eq!(color_of(id), color_of(id));
        }
    }

    #[test]
    fn test_neighbouring_ids_differ() {
        let colors: Vec<_> = (1..=16).map(color_of).collect();
        let distinct = colors
            .iter()
            .enumerate()
            .filter(|(i, c)| !colors[..*i].contains(c))
            .count();
        assert!(distinct >= 12);
    }

    #[test]
    fn test_fnv1a_reference_value() {
        // FNV-1a 64 of empty input is the offset basis
        assert_eq!(fnv1a64(&[]), FNV_OFFSET);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
    }
}
