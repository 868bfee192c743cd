use super::detector::VehicleDetector;
use super::overlay::{OverlayRenderer, OverlayState, CAR_COLOR, SIGNBOARD_COLOR};
use super::region::PixelRegion;
use super::signal::{FrameDiffSignal, PhaseSignal, PositionSignal, SignalReading};
use super::source::{FrameSink, VideoSource};
use super::state_machine::{FrameInterval, PhaseMachine, PitPhase, TransitionRecord};
use crate::core::config::{AnalysisConfig, SignalMode};
use crate::core::error::{PitStopError, Result};
use log::{debug, info, warn};
use std::sync::Arc;

/// 一次分析的原始结果（帧号层面）
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub transitions: Vec<TransitionRecord>,
    pub total: FrameInterval,
    pub tire_change: FrameInterval,
    pub final_phase: PitPhase,
    /// 最后处理的帧号，没有任何帧时为 None
    pub last_frame: Option<u64>,
    pub frames_processed: u64,
    pub frame_rate: f64,
}

impl RunOutcome {
    /// 收尾后的区间：仍在进行的区间结束于最后一帧
    pub fn finalized(&self, interval: FrameInterval) -> FrameInterval {
        match self.last_frame {
            Some(last) => interval.closed_at(last),
            None => interval,
        }
    }

    pub fn seconds(&self, interval: FrameInterval) -> Option<f64> {
        self.finalized(interval)
            .frames()
            .map(|frames| frames as f64 / self.frame_rate)
    }

    pub fn tire_change_seconds(&self) -> Option<f64> {
        self.seconds(self.tire_change)
    }

    pub fn total_seconds(&self) -> Option<f64> {
        self.seconds(self.total)
    }

    pub fn arrival_detected(&self) -> bool {
        self.total.start.is_some()
    }
}

/// 结束时无论成功与否都释放视频源
struct SourceGuard<'a> {
    source: &'a mut dyn VideoSource,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// 调试输出只关闭一次：正常路径显式 close，错误路径由 Drop 兜底
struct SinkGuard<'a> {
    sink: Option<&'a mut dyn FrameSink>,
    closed: bool,
}

impl SinkGuard<'_> {
    fn write(&mut self, image: &image::RgbImage) -> Result<()> {
        match self.sink.as_deref_mut() {
            Some(sink) => sink.write_frame(image),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.as_deref_mut() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("⚠️ debug sink close failed on error exit: {}", e);
        }
    }
}

/// 逐帧驱动：信号 → 状态机 → （可选）叠加层
///
/// 帧缓存、滑动窗口与状态机都在每次 `run` 内新建，同一个分析器可以重复使用。
pub struct PitStopAnalyzer {
    config: AnalysisConfig,
    detector: Option<Arc<dyn VehicleDetector>>,
}

impl PitStopAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            detector: None,
        })
    }

    pub fn with_detector(mut self, detector: Arc<dyn VehicleDetector>) -> Self {
        self.set_detector(detector);
        self
    }

    pub fn set_detector(&mut self, detector: Arc<dyn VehicleDetector>) {
        self.detector = Some(detector);
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, source: &mut dyn VideoSource, sink: Option<&mut dyn FrameSink>) -> Result<RunOutcome> {
        let source = SourceGuard { source };
        let mut sink = SinkGuard {
            sink,
            closed: false,
        };

        let fps = source.source.frame_rate();
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PitStopError::SourceOpen(format!(
                "could not determine a usable frame rate ({})",
                fps
            )));
        }
        let (width, height) = source.source.dimensions();

        let car = self.config.regions.car.resolve(width, height)?;
        let signboard = if self.config.uses_signboard() {
            Some(self.config.regions.signboard.resolve(width, height)?)
        } else {
            None
        };

        let mut signal = self.build_signal(car, signboard)?;
        let renderer = if sink.sink.is_some() {
            Some(OverlayRenderer::new(&self.config.overlay)?)
        } else {
            None
        };

        info!(
            "🚦 PitStopAnalyzer: {} signal, {}x{} @ {:.2} fps, car={:?} sign={:?}",
            signal.name(),
            width,
            height,
            fps,
            car,
            signboard
        );

        let mut machine = PhaseMachine::new();
        let mut frames_processed = 0u64;
        let mut last_frame = None;

        while let Some(frame) = source.source.read_frame() {
            let index = frames_processed;
            let before = machine.current_phase();

            let reading = signal.observe(&frame, before)?;
            machine.advance(index, &reading.guards)?;

            if let Some(renderer) = &renderer {
                let state = self.overlay_state(&machine, &reading, index, fps, car, signboard);
                let annotated = renderer.render(&frame, &state);
                sink.write(&annotated)?;
            }

            if index % 300 == 0 {
                debug!(
                    "frame {}: phase={:?} car={:.2}",
                    index,
                    machine.current_phase(),
                    reading.primary_score
                );
            }

            frames_processed += 1;
            last_frame = Some(index);
        }

        sink.close()?;

        let outcome = RunOutcome {
            transitions: machine.history().to_vec(),
            total: machine.total_interval(),
            tire_change: machine.tire_change_interval(),
            final_phase: machine.current_phase(),
            last_frame,
            frames_processed,
            frame_rate: fps,
        };

        if outcome.final_phase != PitPhase::Complete {
            info!(
                "⏱️ video ended in {:?} after {} frames; open intervals close at the last frame",
                outcome.final_phase, frames_processed
            );
        }

        Ok(outcome)
    }

    fn build_signal(&self, car: PixelRegion, signboard: Option<PixelRegion>) -> Result<Box<dyn PhaseSignal>> {
        match self.config.mode {
            SignalMode::FrameDiff => Ok(Box::new(FrameDiffSignal::new(
                car,
                signboard,
                self.config.thresholds,
                self.config.stop_cue,
            ))),
            SignalMode::PositionTracking => {
                let detector = self.detector.clone().ok_or_else(|| {
                    PitStopError::config("position tracking needs a vehicle detector")
                })?;
                Ok(Box::new(PositionSignal::new(
                    detector,
                    car,
                    self.config.detection.clone(),
                    self.config.thresholds.movement,
                )))
            }
        }
    }

    fn overlay_state(
        &self,
        machine: &PhaseMachine,
        reading: &SignalReading,
        index: u64,
        fps: f64,
        car: PixelRegion,
        signboard: Option<PixelRegion>,
    ) -> OverlayState {
        let mut regions = vec![(car, CAR_COLOR)];
        if let Some(sign) = signboard {
            regions.push((sign, SIGNBOARD_COLOR));
        }

        let mut timers = Vec::new();
        for (name, interval) in [
            ("tire change", machine.tire_change_interval()),
            ("total", machine.total_interval()),
        ] {
            if let (true, Some(start)) = (interval.is_open(), interval.start) {
                timers.push((name, index.saturating_sub(start) as f64 / fps));
            }
        }

        OverlayState {
            phase: machine.current_phase(),
            regions,
            timers,
            tracked_box: reading.tracked_box,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Thresholds;
    use crate::core::video::detector::MockVehicleDetector;
    use crate::core::video::region::NormalizedRegion;
    use crate::core::video::frame::Frame;
    use crate::core::video::source::{MemoryFrameSink, MemoryVideoSource};
    use image::{Rgb, RgbImage};

    const W: u32 = 160;
    const H: u32 = 120;

    /// 主区域为左半边；`moving` 时左半边棋盘格按帧号奇偶翻转
    fn synthetic(frame: u32, moving: bool) -> RgbImage {
        RgbImage::from_fn(W, H, |x, y| {
            if x < W / 2 && moving {
                let on = ((x / 20) + (y / 20) + frame) % 2 == 0;
                if on {
                    Rgb([230, 230, 230])
                } else {
                    Rgb([20, 20, 20])
                }
            } else {
                Rgb([120, 120, 120])
            }
        })
    }

    fn scenario(moving: impl Fn(u32) -> bool, count: u32) -> MemoryVideoSource {
        let frames = (0..count).map(|i| synthetic(i, moving(i))).collect();
        MemoryVideoSource::new(frames, 30.0).unwrap()
    }

    fn single_region_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::single_region();
        config.regions.car = NormalizedRegion::new(0.0, 1.0, 0.0, 0.5);
        config
    }

    #[test]
    fn test_static_video_detects_nothing() {
        let analyzer = PitStopAnalyzer::new(single_region_config()).unwrap();
        let mut source = scenario(|_| false, 150);

        let outcome = analyzer.run(&mut source, None).unwrap();

        assert!(outcome.transitions.is_empty());
        assert_eq!(outcome.frames_processed, 150);
        assert_eq!(outcome.last_frame, Some(149));
        assert_eq!(outcome.tire_change_seconds(), None);
        assert!(!outcome.arrival_detected());
    }

    #[test]
    fn test_arrive_stop_depart() {
        let analyzer = PitStopAnalyzer::new(single_region_config()).unwrap();
        let mut source = scenario(|i| i < 30 || (90..120).contains(&i), 120);

        let outcome = analyzer.run(&mut source, None).unwrap();
        let phases: Vec<PitPhase> = outcome.transitions.iter().map(|t| t.phase).collect();
        assert_eq!(
            phases,
            vec![PitPhase::VehicleInStall, PitPhase::Stationary, PitPhase::Leaving]
        );

        let stationary = outcome.tire_change_seconds().unwrap();
        assert!((stationary - 2.0).abs() < 0.05, "stationary = {}", stationary);

        // 离开阶段到视频结束仍未驶出：总时长收尾于最后一帧
        assert_eq!(outcome.finalized(outcome.total).end, Some(119));
        assert!(outcome.total_seconds().unwrap() >= stationary);
    }

    #[test]
    fn test_ends_while_stationary() {
        let analyzer = PitStopAnalyzer::new(single_region_config()).unwrap();
        let mut source = scenario(|i| i < 30, 100);

        let outcome = analyzer.run(&mut source, None).unwrap();
        assert_eq!(outcome.final_phase, PitPhase::Stationary);
        assert_eq!(outcome.finalized(outcome.tire_change).end, Some(99));
        assert!(outcome.total_seconds().unwrap() >= outcome.tire_change_seconds().unwrap());
    }

    #[test]
    fn test_exit_completes_run() {
        let mut config = single_region_config();
        config.thresholds = Thresholds {
            hit: 1.0,
            exit: 1.0,
            ..Default::default()
        };
        let analyzer = PitStopAnalyzer::new(config).unwrap();
        let mut source = scenario(|i| i < 30 || (90..110).contains(&i), 140);

        let outcome = analyzer.run(&mut source, None).unwrap();
        assert_eq!(outcome.final_phase, PitPhase::Complete);
        // 110 帧仍与上一帧不同，111 帧起静止
        assert_eq!(outcome.total.end, Some(111));
        assert_eq!(outcome.frames_processed, 140);
    }

    #[test]
    fn test_signboard_hit_topology() {
        let mut config = AnalysisConfig::dual_region();
        config.regions.car = NormalizedRegion::new(0.0, 1.0, 0.0, 0.5);
        config.regions.signboard = NormalizedRegion::new(0.0, 1.0, 0.5, 1.0);
        let analyzer = PitStopAnalyzer::new(config).unwrap();

        // 车位区域运动 0-29，指示牌区域（右半边）在 40-44 变化，车位再次运动 90-119
        let frames = (0..120)
            .map(|i| {
                let mut img = synthetic(i, i < 30 || (90..120).contains(&i));
                if (40..45).contains(&i) {
                    for y in 0..H {
                        for x in W / 2..W {
                            let v = if ((x / 20) + (y / 20) + i) % 2 == 0 { 240 } else { 10 };
                            img.put_pixel(x, y, Rgb([v, v, v]));
                        }
                    }
                }
                img
            })
            .collect();
        let mut source = MemoryVideoSource::new(frames, 30.0).unwrap();

        let outcome = analyzer.run(&mut source, None).unwrap();
        assert_eq!(outcome.tire_change.start, Some(40));
        assert_eq!(outcome.tire_change.end, Some(90));
        assert_eq!(outcome.total.start, Some(1));
    }

    #[test]
    fn test_debug_sink_gets_every_frame() {
        let analyzer = PitStopAnalyzer::new(single_region_config()).unwrap();
        let mut source = scenario(|i| i < 10, 40);
        let mut sink = MemoryFrameSink::new();

        analyzer.run(&mut source, Some(&mut sink)).unwrap();

        assert_eq!(sink.frames.len(), 40);
        assert_eq!(sink.closed, 1);
        assert!(sink.frames.iter().all(|f| f.dimensions() == (W, H)));
    }

    struct FailingSink {
        writes: u32,
        closed: u32,
    }

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _image: &RgbImage) -> Result<()> {
            self.writes += 1;
            if self.writes > 3 {
                return Err(PitStopError::SinkWrite("disk full".into()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    struct TrackingSource {
        inner: MemoryVideoSource,
        released: bool,
    }

    impl VideoSource for TrackingSource {
        fn frame_rate(&self) -> f64 {
            self.inner.frame_rate()
        }

        fn dimensions(&self) -> (u32, u32) {
            self.inner.dimensions()
        }

        fn read_frame(&mut self) -> Option<Frame> {
            self.inner.read_frame()
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    #[test]
    fn test_resources_released_on_error() {
        let analyzer = PitStopAnalyzer::new(single_region_config()).unwrap();
        let mut source = TrackingSource {
            inner: scenario(|_| true, 20),
            released: false,
        };
        let mut sink = FailingSink {
            writes: 0,
            closed: 0,
        };

        let err = analyzer.run(&mut source, Some(&mut sink)).unwrap_err();
        assert!(matches!(err, PitStopError::SinkWrite(_)));
        assert!(source.released);
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn test_bad_region_fails_before_frames() {
        let mut config = single_region_config();
        // 在 4 像素宽的帧上退化为空区域
        config.regions.car = NormalizedRegion::new(0.0, 1.0, 0.5, 0.55);
        let analyzer = PitStopAnalyzer::new(config).unwrap();

        let mut source = TrackingSource {
            inner: MemoryVideoSource::new(vec![RgbImage::new(4, 4); 5], 30.0).unwrap(),
            released: false,
        };
        let mut sink = MemoryFrameSink::new();

        let err = analyzer.run(&mut source, Some(&mut sink)).unwrap_err();
        assert!(matches!(err, PitStopError::Config(_)));
        assert!(sink.frames.is_empty());
        assert!(source.released);
    }

    #[test]
    fn test_position_tracking_needs_detector() {
        let analyzer = PitStopAnalyzer::new(AnalysisConfig::position_tracking()).unwrap();
        let mut source = scenario(|_| false, 3);
        assert!(matches!(
            analyzer.run(&mut source, None),
            Err(PitStopError::Config(_))
        ));
    }

    #[test]
    fn test_set_detector_enables_position_tracking() {
        let mut analyzer = PitStopAnalyzer::new(AnalysisConfig::position_tracking()).unwrap();
        analyzer.set_detector(Arc::new(MockVehicleDetector::new()));

        let outcome = analyzer.run(&mut scenario(|_| false, 5), None).unwrap();
        assert_eq!(outcome.frames_processed, 5);
        assert!(!outcome.arrival_detected());
    }

    #[test]
    fn test_position_tracking_run() {
        let mut config = AnalysisConfig::position_tracking();
        config.regions.car = NormalizedRegion::new(0.0, 1.0, 0.25, 0.75);
        config.thresholds.movement = 2.0;
        config.detection.window_size = 5;

        // 0-19 驶入，20-79 停稳，80-99 驶离，100 起离开画面
        let detector = Arc::new(MockVehicleDetector::with_track("car", 30.0, 40.0, |n| {
            let x = match n {
                0..=19 => 20.0 + n as f32 * 3.0,
                20..=79 => 80.0,
                80..=99 => 80.0 + (n - 79) as f32 * 4.0,
                _ => return None,
            };
            Some(x)
        }));
        let analyzer = PitStopAnalyzer::new(config).unwrap().with_detector(detector);
        let mut source = scenario(|_| false, 130);

        let outcome = analyzer.run(&mut source, None).unwrap();
        assert_eq!(outcome.final_phase, PitPhase::Complete);

        let arrival = outcome.total.start.unwrap();
        let stop = outcome.tire_change.start.unwrap();
        let go = outcome.tire_change.end.unwrap();
        assert!(arrival < 20);
        assert!((20..=30).contains(&stop), "stop at {}", stop);
        assert!((80..=85).contains(&go), "go at {}", go);
        assert!(outcome.total.end.unwrap() > go);
    }
}
