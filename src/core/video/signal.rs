//! 每帧运动信号：帧差或检测框位置稳定性，二者给出同一套守卫条件

use super::detector::{BBox, VehicleDetector};
use super::diff_filter::RegionDiffFilter;
use super::frame::Frame;
use super::region::PixelRegion;
use super::state_machine::{PhaseGuards, PitPhase};
use crate::core::config::{DetectionConfig, StopCue, Thresholds};
use crate::core::error::Result;
use log::trace;
use std::collections::VecDeque;
use std::sync::Arc;

/// 单帧读数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalReading {
    /// 主区域分数：帧差为变化百分比，位置跟踪为中心标准差
    pub primary_score: f64,
    /// 副区域（指示牌）帧差分数，未启用时为 None
    pub secondary_score: Option<f64>,
    pub guards: PhaseGuards,
    /// 位置跟踪模式下锁定的车辆框
    pub tracked_box: Option<BBox>,
}

pub trait PhaseSignal {
    fn name(&self) -> &'static str;

    /// `phase` 为处理本帧之前的阶段，用于按需启用区域
    fn observe(&mut self, frame: &Frame, phase: PitPhase) -> Result<SignalReading>;
}

/// 帧差信号：车位区域 + 可选指示牌区域
pub struct FrameDiffSignal {
    primary: RegionDiffFilter,
    secondary: Option<RegionDiffFilter>,
    thresholds: Thresholds,
    cue: StopCue,
}

impl FrameDiffSignal {
    pub fn new(
        car: PixelRegion,
        signboard: Option<PixelRegion>,
        thresholds: Thresholds,
        cue: StopCue,
    ) -> Self {
        let secondary = match cue {
            StopCue::SignboardHit => signboard.map(|r| RegionDiffFilter::new(r, thresholds.sensitivity)),
            StopCue::CarSettled => None,
        };

        Self {
            primary: RegionDiffFilter::new(car, thresholds.sensitivity),
            secondary,
            thresholds,
            cue,
        }
    }
}

impl PhaseSignal for FrameDiffSignal {
    fn name(&self) -> &'static str {
        "frame_diff"
    }

    fn observe(&mut self, frame: &Frame, phase: PitPhase) -> Result<SignalReading> {
        let primary_score = self.primary.score(frame)?;

        // 指示牌区域只在车辆进入车位后启用，启用后的第一帧得分为 0
        let secondary_score = match self.secondary.as_mut() {
            Some(filter) if phase == PitPhase::VehicleInStall => Some(filter.score(frame)?),
            Some(filter) => {
                filter.reset();
                None
            }
            None => None,
        };

        trace!(
            "frame {}: car={:.2} sign={:?}",
            frame.frame_number,
            primary_score,
            secondary_score
        );

        Ok(SignalReading {
            primary_score,
            secondary_score,
            guards: self
                .thresholds
                .frame_diff_guards(primary_score, secondary_score, self.cue),
            tracked_box: None,
        })
    }
}

/// 位置跟踪信号：车位区域内检测框横向中心的滑动标准差
pub struct PositionSignal {
    detector: Arc<dyn VehicleDetector>,
    region: PixelRegion,
    config: DetectionConfig,
    movement: f64,
    centers: VecDeque<f64>,
}

impl PositionSignal {
    pub fn new(
        detector: Arc<dyn VehicleDetector>,
        region: PixelRegion,
        config: DetectionConfig,
        movement: f64,
    ) -> Self {
        let capacity = config.window_size;
        Self {
            detector,
            region,
            config,
            movement,
            centers: VecDeque::with_capacity(capacity),
        }
    }

    fn locate(&self, frame: &Frame) -> Result<Option<BBox>> {
        let detections = self.detector.detect(frame)?;

        Ok(detections
            .into_iter()
            .filter(|d| self.config.is_vehicle(&d.label))
            .filter(|d| d.confidence > self.config.confidence_cutoff)
            .filter(|d| self.region.intersects(d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|d| d.bbox))
    }

    /// 窗口未满时返回 None
    fn spread(&self) -> Option<f64> {
        if self.centers.len() < self.config.window_size {
            return None;
        }
        Some(population_std(self.centers.iter().copied()))
    }
}

impl PhaseSignal for PositionSignal {
    fn name(&self) -> &'static str {
        "position_tracking"
    }

    fn observe(&mut self, frame: &Frame, _phase: PitPhase) -> Result<SignalReading> {
        let tracked = self.locate(frame)?;

        match tracked {
            Some(bbox) => {
                if self.centers.len() == self.config.window_size {
                    self.centers.pop_front();
                }
                self.centers.push_back(bbox.center_x() as f64);
            }
            None => self.centers.clear(),
        }

        let spread = self.spread();

        trace!(
            "frame {}: tracked={:?} spread={:?}",
            frame.frame_number,
            tracked.map(|b| b.center_x()),
            spread
        );

        Ok(SignalReading {
            primary_score: spread.unwrap_or(0.0),
            secondary_score: None,
            guards: PhaseGuards {
                arrived: tracked.is_some(),
                stopped: spread.map(|s| s < self.movement).unwrap_or(false),
                departing: spread.map(|s| s >= self.movement).unwrap_or(false),
                exited: tracked.is_none(),
            },
            tracked_box: tracked,
        })
    }
}

fn population_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (sum, count) = values.clone().fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    variance.sqrt()
}
