use super::frame::Frame;
use crate::core::error::Result;
use serde::{Deserialize, Serialize};

/// 检测框，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// 外部目标检测模型，每帧调用一次
pub trait VehicleDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

type DetectionPattern = Box<dyn Fn(u64) -> Vec<Detection> + Send + Sync>;

pub struct MockVehicleDetector {
    // 按帧号返回预设的检测结果
    pattern: Option<DetectionPattern>,
}

impl MockVehicleDetector {
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<Detection> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
        }
    }

    /// 按帧号给出车辆中心 x，None 表示该帧没有车
    pub fn with_track<F>(label: &str, width: f32, height: f32, center_x: F) -> Self
    where
        F: Fn(u64) -> Option<f32> + Send + Sync + 'static,
    {
        let label = label.to_string();
        Self::with_pattern(move |frame_num| {
            center_x(frame_num)
                .map(|cx| {
                    vec![Detection {
                        label: label.clone(),
                        confidence: 0.9,
                        bbox: BBox::new(cx - width / 2.0, 0.0, cx + width / 2.0, height),
                    }]
                })
                .unwrap_or_default()
        })
    }
}

impl Default for MockVehicleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleDetector for MockVehicleDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self
            .pattern
            .as_ref()
            .map(|p| p(frame.frame_number))
            .unwrap_or_default())
    }
}
