use crate::core::error::{PitStopError, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// 进站阶段，每个阶段在一次分析中最多进入一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitPhase {
    WaitingForVehicle,
    VehicleInStall,
    Stationary,
    Leaving,
    Complete,
}

impl PitPhase {
    /// 唯一合法的后继阶段
    pub fn successor(self) -> Option<PitPhase> {
        match self {
            PitPhase::WaitingForVehicle => Some(PitPhase::VehicleInStall),
            PitPhase::VehicleInStall => Some(PitPhase::Stationary),
            PitPhase::Stationary => Some(PitPhase::Leaving),
            PitPhase::Leaving => Some(PitPhase::Complete),
            PitPhase::Complete => None,
        }
    }

    pub fn can_transition_to(self, next: PitPhase) -> bool {
        self.successor() == Some(next)
    }

    pub fn label(self) -> &'static str {
        match self {
            PitPhase::WaitingForVehicle => "WAITING FOR CAR",
            PitPhase::VehicleInStall => "CAR IN BOX",
            PitPhase::Stationary => "TIRE CHANGE",
            PitPhase::Leaving => "LEAVING",
            PitPhase::Complete => "COMPLETE",
        }
    }
}

/// 当前帧上各守卫条件的求值结果，由信号源给出
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseGuards {
    /// 车辆到达 / 出现在主区域
    pub arrived: bool,
    /// 车辆停稳（换胎开始）
    pub stopped: bool,
    /// 车辆重新运动
    pub departing: bool,
    /// 车辆离开主区域
    pub exited: bool,
}

impl PhaseGuards {
    fn fires_from(&self, phase: PitPhase) -> bool {
        match phase {
            PitPhase::WaitingForVehicle => self.arrived,
            PitPhase::VehicleInStall => self.stopped,
            PitPhase::Stationary => self.departing,
            PitPhase::Leaving => self.exited,
            PitPhase::Complete => false,
        }
    }
}

/// (到达的阶段, 首次观测到的帧号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub phase: PitPhase,
    pub frame_index: u64,
}

/// 帧号区间，end 未知表示区间仍在进行
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInterval {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl FrameInterval {
    pub fn is_open(&self) -> bool {
        self.start.is_some() && self.end.is_none()
    }

    /// 收尾：仍在进行的区间以最后处理的帧号作为结束
    pub fn closed_at(&self, last_frame: u64) -> FrameInterval {
        match (self.start, self.end) {
            (Some(start), None) => FrameInterval {
                start: Some(start),
                end: Some(last_frame.max(start)),
            },
            _ => *self,
        }
    }

    pub fn frames(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

pub struct PhaseMachine {
    phase: PitPhase,
    history: Vec<TransitionRecord>,
    total: FrameInterval,
    tire_change: FrameInterval,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: PitPhase::WaitingForVehicle,
            history: Vec::new(),
            total: FrameInterval::default(),
            tire_change: FrameInterval::default(),
        }
    }

    /// 每帧调用一次：只检查当前阶段的守卫，一帧最多一次转移
    pub fn advance(&mut self, frame_index: u64, guards: &PhaseGuards) -> Result<Option<TransitionRecord>> {
        if !guards.fires_from(self.phase) {
            return Ok(None);
        }

        match self.phase.successor() {
            Some(next) => self.transition_to(next, frame_index).map(Some),
            None => Ok(None),
        }
    }

    /// 执行转移，不在转移表中的目标阶段返回 Config 错误
    pub fn transition_to(&mut self, next: PitPhase, frame_index: u64) -> Result<TransitionRecord> {
        if !self.phase.can_transition_to(next) {
            return Err(PitStopError::config(format!(
                "illegal phase transition {:?} -> {:?}",
                self.phase, next
            )));
        }

        if let Some(last) = self.history.last() {
            if frame_index <= last.frame_index {
                return Err(PitStopError::config(format!(
                    "transition to {:?} at frame {} does not follow frame {}",
                    next, frame_index, last.frame_index
                )));
            }
        }

        match next {
            PitPhase::VehicleInStall => self.total.start = Some(frame_index),
            PitPhase::Stationary => self.tire_change.start = Some(frame_index),
            PitPhase::Leaving => self.tire_change.end = Some(frame_index),
            PitPhase::Complete => self.total.end = Some(frame_index),
            PitPhase::WaitingForVehicle => {}
        }

        info!("🏁 phase {:?} -> {:?} at frame {}", self.phase, next, frame_index);

        let record = TransitionRecord {
            phase: next,
            frame_index,
        };
        self.phase = next;
        self.history.push(record);
        Ok(record)
    }

    pub fn current_phase(&self) -> PitPhase {
        self.phase
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn total_interval(&self) -> FrameInterval {
        self.total
    }

    pub fn tire_change_interval(&self) -> FrameInterval {
        self.tire_change
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guards(arrived: bool, stopped: bool, departing: bool, exited: bool) -> PhaseGuards {
        PhaseGuards {
            arrived,
            stopped,
            departing,
            exited,
        }
    }

    #[test]
    fn test_full_run() {
        let mut sm = PhaseMachine::new();

        assert_eq!(sm.advance(0, &guards(false, false, false, false)).unwrap(), None);
        assert!(sm.advance(3, &guards(true, false, false, false)).unwrap().is_some());
        assert_eq!(sm.current_phase(), PitPhase::VehicleInStall);

        sm.advance(10, &guards(false, true, false, false)).unwrap();
        assert_eq!(sm.current_phase(), PitPhase::Stationary);

        sm.advance(40, &guards(false, false, true, false)).unwrap();
        assert_eq!(sm.current_phase(), PitPhase::Leaving);

        sm.advance(55, &guards(false, false, false, true)).unwrap();
        assert_eq!(sm.current_phase(), PitPhase::Complete);

        assert_eq!(sm.total_interval().frames(), Some(52));
        assert_eq!(sm.tire_change_interval().frames(), Some(30));
    }

    #[test]
    fn test_one_transition_per_frame() {
        let mut sm = PhaseMachine::new();
        let all = guards(true, true, true, true);

        for frame in 0..4 {
            sm.advance(frame, &all).unwrap();
        }

        let frames: Vec<u64> = sm.history().iter().map(|r| r.frame_index).collect();
        assert_eq!(frames, vec![0, 1, 2, 3]);
        assert!(frames.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sm.current_phase(), PitPhase::Complete);
    }

    #[test]
    fn test_only_current_phase_guard_matters() {
        let mut sm = PhaseMachine::new();

        // 尚未到达时，停稳/离开信号不起作用
        sm.advance(0, &guards(false, true, true, true)).unwrap();
        assert_eq!(sm.current_phase(), PitPhase::WaitingForVehicle);
        assert!(sm.history().is_empty());
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut sm = PhaseMachine::new();
        let all = guards(true, true, true, true);
        for frame in 0..10 {
            sm.advance(frame, &all).unwrap();
        }
        assert_eq!(sm.history().len(), 4);
        assert_eq!(sm.total_interval().end, Some(3));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut sm = PhaseMachine::new();

        let err = sm.transition_to(PitPhase::Stationary, 5).unwrap_err();
        assert!(matches!(err, PitStopError::Config(_)));

        sm.transition_to(PitPhase::VehicleInStall, 5).unwrap();
        assert!(sm.transition_to(PitPhase::VehicleInStall, 6).is_err());
        assert!(sm.transition_to(PitPhase::WaitingForVehicle, 6).is_err());
    }

    #[test]
    fn test_non_increasing_frame_rejected() {
        let mut sm = PhaseMachine::new();
        sm.transition_to(PitPhase::VehicleInStall, 5).unwrap();
        assert!(sm.transition_to(PitPhase::Stationary, 5).is_err());
        assert_eq!(sm.current_phase(), PitPhase::VehicleInStall);
    }

    #[test]
    fn test_interval_finalization() {
        let open = FrameInterval {
            start: Some(30),
            end: None,
        };
        assert!(open.is_open());
        assert_eq!(open.closed_at(149).frames(), Some(119));

        let closed = FrameInterval {
            start: Some(30),
            end: Some(90),
        };
        assert_eq!(closed.closed_at(149), closed);

        let absent = FrameInterval::default();
        assert_eq!(absent.closed_at(149).frames(), None);
    }
}
