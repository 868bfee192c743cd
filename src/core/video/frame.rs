use image::{Rgb, RgbImage};
use std::time::Duration;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage, // RGB 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ms: u64, frame_number: u64) -> Self {
        Self {
            image,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// 按帧率推算时间戳
    pub fn at_rate(image: RgbImage, frame_number: u64, fps: f64) -> Self {
        let timestamp_ms = if fps > 0.0 {
            (frame_number as f64 * 1000.0 / fps).round() as u64
        } else {
            0
        };
        Self::new(image, timestamp_ms, frame_number)
    }

    /// 纯色帧，测试与占位用
    pub fn filled(width: u32, height: u32, color: [u8; 3], frame_number: u64) -> Self {
        Self::new(
            RgbImage::from_pixel(width, height, Rgb(color)),
            0,
            frame_number,
        )
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::filled(100, 80, [255, 255, 255], 30);

        assert_eq!(frame.width(), 100);
        assert_eq!(frame.height(), 80);
        assert_eq!(frame.pixel_count(), 8000);
        assert_eq!(frame.frame_number, 30);
    }

    #[test]
    fn test_timestamp_from_rate() {
        let frame = Frame::at_rate(RgbImage::new(4, 4), 45, 30.0);
        assert_eq!(frame.timestamp.as_millis(), 1500);
        assert_eq!(frame.frame_number, 45);
        assert_eq!(frame.dimensions(), (4, 4));
    }
}
