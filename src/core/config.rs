//! 分析配置：区域、阈值、信号模式
//!
//! 配置文件为 JSON5，所有字段都有参考默认值，调用方可按视频机位调整。

use crate::core::error::{PitStopError, Result};
use crate::core::video::region::NormalizedRegion;
use crate::core::video::state_machine::PhaseGuards;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 各阈值相互独立，均为非负数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// 主区域运动分数高于此值视为车辆到达
    pub arrival: f64,
    /// 副区域（指示牌）运动分数高于此值视为停车到位；
    /// `StopCue::CarSettled` 下为主区域运动分数的上限
    pub hit: f64,
    /// 停稳后主区域运动分数高于此值视为重新起步
    pub departure: f64,
    /// 离开阶段主区域运动分数低于此值视为已驶出
    pub exit: f64,
    /// 单像素灰度差阈值
    pub sensitivity: f64,
    /// 位置跟踪模式下横向中心标准差阈值（像素）
    pub movement: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            arrival: 5.0,
            hit: 2.0,
            departure: 5.0,
            exit: 1.0,
            sensitivity: 25.0,
            movement: 5.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("arrival", self.arrival),
            ("hit", self.hit),
            ("departure", self.departure),
            ("exit", self.exit),
            ("sensitivity", self.sensitivity),
            ("movement", self.movement),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PitStopError::config(format!(
                    "threshold {} = {} must be a non-negative number",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// 帧差模式下的守卫求值
    pub fn frame_diff_guards(&self, primary: f64, secondary: Option<f64>, cue: StopCue) -> PhaseGuards {
        let stopped = match cue {
            StopCue::SignboardHit => secondary.map(|s| s > self.hit).unwrap_or(false),
            StopCue::CarSettled => primary < self.hit,
        };

        PhaseGuards {
            arrived: primary > self.arrival,
            stopped,
            departing: primary > self.departure,
            exited: primary < self.exit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMode {
    #[default]
    FrameDiff,
    PositionTracking,
}

/// 判定"停稳"的依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCue {
    /// 指示牌区域出现动作（换胎开始）
    #[default]
    SignboardHit,
    /// 主区域的到达运动回落到阈值以下（单区域旧拓扑）
    CarSettled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub car: NormalizedRegion,
    pub signboard: NormalizedRegion,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            car: NormalizedRegion::new(0.35, 0.85, 0.15, 0.85),
            signboard: NormalizedRegion::new(0.10, 0.35, 0.40, 0.60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence_cutoff: f32,
    pub vehicle_labels: Vec<String>,
    /// 横向中心滑动窗口长度（帧）
    pub window_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_cutoff: 0.5,
            vehicle_labels: vec!["car".to_string()],
            window_size: 10,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_cutoff) {
            return Err(PitStopError::config(format!(
                "confidence cutoff {} is outside [0, 1]",
                self.confidence_cutoff
            )));
        }
        if self.window_size < 2 {
            return Err(PitStopError::config(format!(
                "position window of {} frames cannot measure spread",
                self.window_size
            )));
        }
        if self.vehicle_labels.is_empty() {
            return Err(PitStopError::config("no vehicle labels configured"));
        }
        Ok(())
    }

    pub fn is_vehicle(&self, label: &str) -> bool {
        self.vehicle_labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TTF/OTF 字体路径
    ///
    /// 默认为空：调试帧上没有阶段名称和秒数文字，只有按阶段着色的色条
    /// 和按秒数增长的计时白条（每秒 20 像素）。
    /// 需要可读的标签时必须配置字体。
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub line_thickness: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 24.0,
            line_thickness: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub regions: RegionConfig,
    pub thresholds: Thresholds,
    pub mode: SignalMode,
    pub stop_cue: StopCue,
    pub detection: DetectionConfig,
    pub overlay: OverlayConfig,
}

impl AnalysisConfig {
    /// 车位 + 指示牌双区域，四阶段计时
    pub fn dual_region() -> Self {
        Self::default()
    }

    /// 单区域：只看车位区域运动回落来判定停稳
    pub fn single_region() -> Self {
        Self {
            stop_cue: StopCue::CarSettled,
            thresholds: Thresholds {
                hit: 1.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// 由目标检测框的横向位置稳定性驱动
    pub fn position_tracking() -> Self {
        Self {
            mode: SignalMode::PositionTracking,
            ..Default::default()
        }
    }

    pub fn from_json5_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.regions.car.validate("car")?;
        if self.mode == SignalMode::FrameDiff && self.stop_cue == StopCue::SignboardHit {
            self.regions.signboard.validate("signboard")?;
        }
        self.thresholds.validate()?;
        if self.mode == SignalMode::PositionTracking {
            self.detection.validate()?;
        }
        if !(self.overlay.font_size > 0.0) {
            return Err(PitStopError::config(format!(
                "overlay font size {} must be positive",
                self.overlay.font_size
            )));
        }
        Ok(())
    }

    /// 是否需要副区域
    pub fn uses_signboard(&self) -> bool {
        self.mode == SignalMode::FrameDiff && self.stop_cue == StopCue::SignboardHit
    }
}
