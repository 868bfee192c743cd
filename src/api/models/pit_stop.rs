use crate::core::error::Result;
use crate::core::video::pipeline::RunOutcome;
use crate::core::video::state_machine::{FrameInterval, PitPhase, TransitionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 区间完整度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// 起止都在视频中观测到
    Closed,
    /// 视频结束时仍在进行，以最后一帧收尾
    OpenAtEnd,
    /// 从未开始
    NotDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalReport {
    pub seconds: f64,
    pub start_frame: Option<u64>,
    pub end_frame: Option<u64>,
    pub completeness: Completeness,
}

impl IntervalReport {
    fn from_interval(outcome: &RunOutcome, interval: FrameInterval) -> Self {
        let completeness = match (interval.start, interval.end) {
            (None, _) => Completeness::NotDetected,
            (Some(_), None) => Completeness::OpenAtEnd,
            (Some(_), Some(_)) => Completeness::Closed,
        };
        let finalized = outcome.finalized(interval);

        Self {
            seconds: outcome.seconds(interval).unwrap_or(0.0),
            start_frame: finalized.start,
            end_frame: finalized.end,
            completeness,
        }
    }
}

/// 进站计时结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStopReport {
    /// 换胎时长（秒）
    pub tire_change_time: f64,
    /// 进站总时长（秒）
    pub total_pit_time: f64,
    pub tire_change: IntervalReport,
    pub total: IntervalReport,
    pub final_phase: PitPhase,
    pub transitions: Vec<TransitionRecord>,
    pub frames_processed: u64,
    pub frame_rate: f64,
}

impl PitStopReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let tire_change = IntervalReport::from_interval(outcome, outcome.tire_change);
        let total = IntervalReport::from_interval(outcome, outcome.total);

        Self {
            tire_change_time: tire_change.seconds,
            total_pit_time: total.seconds,
            tire_change,
            total,
            final_phase: outcome.final_phase,
            transitions: outcome.transitions.clone(),
            frames_processed: outcome.frames_processed,
            frame_rate: outcome.frame_rate,
        }
    }

    /// 两个区间都完整观测到
    pub fn is_complete(&self) -> bool {
        self.tire_change.completeness == Completeness::Closed
            && self.total.completeness == Completeness::Closed
    }

    pub fn durations(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("tire_change_time", self.tire_change_time),
            ("total_pit_time", self.total_pit_time),
        ])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
