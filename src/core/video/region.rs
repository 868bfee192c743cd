//! 感兴趣区域：归一化坐标 → 像素坐标

use crate::core::error::{PitStopError, Result};
use serde::{Deserialize, Serialize};

/// 以帧宽高比例表示的矩形区域，四个值均在 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// 像素坐标区域，半开区间 [top, bottom) × [left, right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl NormalizedRegion {
    pub fn new(top: f64, bottom: f64, left: f64, right: f64) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// 整帧
    pub fn full() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }

    /// 按固定帧尺寸换算为像素区域，每个视频只计算一次
    pub fn resolve(&self, width: u32, height: u32) -> Result<PixelRegion> {
        if width == 0 || height == 0 {
            return Err(PitStopError::config(format!(
                "frame size {}x{} cannot hold a region",
                width, height
            )));
        }

        let w = width as f64;
        let h = height as f64;

        let top = Self::scale(self.top, h, "top")?;
        let bottom = Self::scale(self.bottom, h, "bottom")?;
        let left = Self::scale(self.left, w, "left")?;
        let right = Self::scale(self.right, w, "right")?;

        if top > h || bottom > h || left > w || right > w {
            return Err(PitStopError::config(format!(
                "region {:?} falls outside {}x{}",
                self, width, height
            )));
        }

        if top >= bottom || left >= right {
            return Err(PitStopError::config(format!(
                "region {:?} is empty at {}x{}",
                self, width, height
            )));
        }

        Ok(PixelRegion {
            top: top as u32,
            bottom: bottom as u32,
            left: left as u32,
            right: right as u32,
        })
    }

    fn scale(fraction: f64, extent: f64, edge: &str) -> Result<f64> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(PitStopError::config(format!(
                "region {} = {} is not a fraction in [0, 1]",
                edge, fraction
            )));
        }
        Ok((extent * fraction).round())
    }

    /// 与帧尺寸无关的基本校验（配置加载时使用）
    pub fn validate(&self, name: &str) -> Result<()> {
        for (edge, value) in [
            ("top", self.top),
            ("bottom", self.bottom),
            ("left", self.left),
            ("right", self.right),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PitStopError::config(format!(
                    "{} region {} = {} is not a fraction in [0, 1]",
                    name, edge, value
                )));
            }
        }
        if self.top >= self.bottom || self.left >= self.right {
            return Err(PitStopError::config(format!(
                "{} region {:?} needs top < bottom and left < right",
                name, self
            )));
        }
        Ok(())
    }
}

impl PixelRegion {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// 与像素框 (x1, y1, x2, y2) 是否相交；区域右、下边界不含，框完全位于一侧即不相交
    pub fn intersects(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let (left, right) = (self.left as f32, self.right as f32);
        let (top, bottom) = (self.top as f32, self.bottom as f32);
        !(x2 < left || x1 >= right || y2 < top || y1 >= bottom)
    }
}
