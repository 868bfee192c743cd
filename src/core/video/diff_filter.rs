use super::frame::Frame;
use super::region::PixelRegion;
use crate::core::error::{PitStopError, Result};
use image::{imageops, GrayImage};
use imageproc::filter::gaussian_blur_f32;

/// 平滑核 sigma，按经验取值（约等于 21x21 高斯核），用于压制传感器与压缩噪声，不对外暴露调节
pub const SMOOTHING_SIGMA: f32 = 3.5;

/// 裁剪 → 灰度 → 高斯平滑
pub fn preprocess(frame: &Frame, region: &PixelRegion) -> GrayImage {
    let cropped = imageops::crop_imm(
        &frame.image,
        region.left,
        region.top,
        region.width(),
        region.height(),
    )
    .to_image();
    let gray = imageops::grayscale(&cropped);
    gaussian_blur_f32(&gray, SMOOTHING_SIGMA)
}

/// 两帧预处理结果的变化像素百分比 (0-100)
///
/// 逐像素取绝对差，大于 `sensitivity` 记为变化。纯函数，与参数顺序无关。
pub fn motion_score(prev: &GrayImage, current: &GrayImage, sensitivity: f64) -> Result<f64> {
    if prev.dimensions() != current.dimensions() {
        return Err(PitStopError::config(format!(
            "cannot diff {:?} against {:?}",
            prev.dimensions(),
            current.dimensions()
        )));
    }

    let total = prev.as_raw().len();
    if total == 0 {
        return Ok(0.0);
    }

    let changed = prev
        .as_raw()
        .iter()
        .zip(current.as_raw().iter())
        .filter(|&(&a, &b)| (a as i16 - b as i16).abs() as f64 > sensitivity)
        .count();

    debug_assert!(changed <= total);
    Ok(100.0 * changed as f64 / total as f64)
}

/// 单个区域的帧差过滤器，缓存上一帧的预处理结果
pub struct RegionDiffFilter {
    region: PixelRegion,
    sensitivity: f64,
    last_gray: Option<GrayImage>,
}

impl RegionDiffFilter {
    pub fn new(region: PixelRegion, sensitivity: f64) -> Self {
        Self {
            region,
            sensitivity,
            last_gray: None,
        }
    }

    /// 首帧（或 reset 之后的第一帧）返回 0
    pub fn score(&mut self, frame: &Frame) -> Result<f64> {
        let current = preprocess(frame, &self.region);

        let score = match &self.last_gray {
            Some(last) => motion_score(last, &current, self.sensitivity)?,
            None => 0.0,
        };

        self.last_gray = Some(current);
        Ok(score)
    }

    pub fn reset(&mut self) {
        self.last_gray = None;
    }
}
