use super::detector::BBox;
use super::frame::Frame;
use super::region::PixelRegion;
use super::state_machine::PitPhase;
use crate::core::config::OverlayConfig;
use crate::core::error::{PitStopError, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::info;
use rusttype::{Font, Scale};

pub const CAR_COLOR: [u8; 3] = [0, 255, 0];
pub const SIGNBOARD_COLOR: [u8; 3] = [0, 160, 255];
pub const TRACK_COLOR: [u8; 3] = [255, 0, 255];

const TEXT_COLOR: [u8; 3] = [255, 255, 255];
// 无字体时计时条每秒的像素长度
const BAR_PIXELS_PER_SECOND: f64 = 20.0;

fn phase_color(phase: PitPhase) -> [u8; 3] {
    match phase {
        PitPhase::WaitingForVehicle => [90, 90, 90],
        PitPhase::VehicleInStall => [200, 140, 0],
        PitPhase::Stationary => [200, 0, 0],
        PitPhase::Leaving => [0, 120, 200],
        PitPhase::Complete => [0, 150, 0],
    }
}

/// 当前帧需要画出的内容
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub phase: PitPhase,
    pub regions: Vec<(PixelRegion, [u8; 3])>,
    /// (名称, 已进行秒数)，只包含仍在进行的区间
    pub timers: Vec<(&'static str, f64)>,
    pub tracked_box: Option<BBox>,
}

pub struct OverlayRenderer {
    font: Option<Font<'static>>,
    scale: Scale,
    thickness: u32,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    PitStopError::config(format!("overlay font {}: {}", path.display(), e))
                })?;
                let font = Font::try_from_vec(bytes).ok_or_else(|| {
                    PitStopError::config(format!("overlay font {} is not a TTF/OTF font", path.display()))
                })?;
                info!("🔤 overlay font loaded from {}", path.display());
                Some(font)
            }
            None => None,
        };

        Ok(Self {
            font,
            scale: Scale::uniform(config.font_size),
            thickness: config.line_thickness.max(1),
        })
    }

    /// 在帧的副本上绘制，原帧保持不变
    pub fn render(&self, frame: &Frame, state: &OverlayState) -> RgbImage {
        let mut canvas = frame.image.clone();

        for (region, color) in &state.regions {
            self.draw_box(
                &mut canvas,
                region.left as i32,
                region.top as i32,
                region.width(),
                region.height(),
                *color,
            );
        }

        if let Some(bbox) = state.tracked_box {
            self.draw_box(
                &mut canvas,
                bbox.x1.round() as i32,
                bbox.y1.round() as i32,
                bbox.width().round().max(1.0) as u32,
                bbox.height().round().max(1.0) as u32,
                TRACK_COLOR,
            );
        }

        self.draw_status(&mut canvas, state);
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: [u8; 3]) {
        for inset in 0..self.thickness {
            let inner_w = w.saturating_sub(2 * inset);
            let inner_h = h.saturating_sub(2 * inset);
            if inner_w == 0 || inner_h == 0 {
                break;
            }
            let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(canvas, rect, Rgb(color));
        }
    }

    fn draw_status(&self, canvas: &mut RgbImage, state: &OverlayState) {
        let width = canvas.width();
        let line_height = (self.scale.y.ceil() as u32).max(8) + 4;
        let banner_height = (line_height * (1 + state.timers.len() as u32)).min(canvas.height());

        draw_filled_rect_mut(
            canvas,
            Rect::at(0, 0).of_size(width, banner_height.max(1)),
            Rgb(phase_color(state.phase)),
        );

        match &self.font {
            Some(font) => {
                draw_text_mut(canvas, Rgb(TEXT_COLOR), 4, 2, self.scale, font, state.phase.label());
                for (i, (name, seconds)) in state.timers.iter().enumerate() {
                    let text = format!("{}: {:.2}s", name, seconds);
                    let y = (line_height * (i as u32 + 1)) as i32 + 2;
                    draw_text_mut(canvas, Rgb(TEXT_COLOR), 4, y, self.scale, font, &text);
                }
            }
            None => {
                // 没有字体：每个计时用一条长度随秒数增长的白条表示
                for (i, (_, seconds)) in state.timers.iter().enumerate() {
                    let len = ((seconds * BAR_PIXELS_PER_SECOND) as u32).clamp(1, width);
                    let y = (line_height * (i as u32 + 1)) as i32 + line_height as i32 / 4;
                    let bar_height = (line_height / 2).max(1);
                    if y as u32 + bar_height > canvas.height() {
                        break;
                    }
                    draw_filled_rect_mut(
                        canvas,
                        Rect::at(0, y).of_size(len, bar_height),
                        Rgb(TEXT_COLOR),
                    );
                }
            }
        }
    }
}
