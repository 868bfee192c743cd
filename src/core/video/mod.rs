//! 进站视频分析 - 从帧序列中测量停车与换胎时间
//!
//! 核心流程：
//! 1. 区域换算 - 归一化区域在每个视频上只换算一次
//! 2. 帧差打分 - 灰度 + 高斯平滑后统计变化像素百分比
//! 3. 状态机驱动 - 等待 → 进入车位 → 换胎 → 驶离 → 完成
//! 4. 检测框替代信号 - 用车辆中心的位置稳定性代替帧差

pub mod detector;
pub mod diff_filter;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod region;
pub mod signal;
pub mod source;
pub mod state_machine;

pub use detector::{BBox, Detection, MockVehicleDetector, VehicleDetector};
pub use diff_filter::{motion_score, preprocess, RegionDiffFilter, SMOOTHING_SIGMA};
pub use frame::Frame;
pub use overlay::{OverlayRenderer, OverlayState};
pub use pipeline::{PitStopAnalyzer, RunOutcome};
pub use region::{NormalizedRegion, PixelRegion};
pub use signal::{FrameDiffSignal, PhaseSignal, PositionSignal, SignalReading};
pub use source::{
    FrameSink, ImageSequenceSink, ImageSequenceSource, MemoryFrameSink, MemoryVideoSource, SinkFormat, VideoSource,
};
pub use state_machine::{FrameInterval, PhaseGuards, PhaseMachine, PitPhase, TransitionRecord};
