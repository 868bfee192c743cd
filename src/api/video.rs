//! 进站计时器

use crate::api::models::pit_stop::PitStopReport;
use crate::core::config::AnalysisConfig;
use crate::core::error::{PitStopError, Result};
use crate::core::video::detector::VehicleDetector;
use crate::core::video::pipeline::PitStopAnalyzer;
use crate::core::video::source::{FrameSink, ImageSequenceSink, ImageSequenceSource, SinkFormat, VideoSource};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

/// 进站计时器 - 帧差 / 检测框位置 两种信号
///
/// ```ignore
/// let timer = PitStopTimer::create(AnalysisConfig::single_region())?;
/// let seconds = timer.measure_stationary_time(&mut source)?;
/// ```
pub struct PitStopTimer {
    analyzer: PitStopAnalyzer,
}

impl PitStopTimer {
    /// 创建计时器，配置不合法时直接返回 Config 错误
    pub fn create(config: AnalysisConfig) -> Result<Self> {
        crate::init_logging();
        let analyzer = PitStopAnalyzer::new(config)?;
        info!(
            "🏎️ PitStopTimer: created ({:?}, {:?})",
            analyzer.config().mode,
            analyzer.config().stop_cue
        );
        Ok(Self { analyzer })
    }

    /// 从 JSON5 配置文件创建
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("📄 Loading analysis config: {}", path.display());
        Self::create(AnalysisConfig::from_file(path)?)
    }

    /// 位置跟踪模式需要外部检测器
    pub fn with_detector(mut self, detector: Arc<dyn VehicleDetector>) -> Self {
        self.analyzer.set_detector(detector);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.analyzer.config()
    }

    /// 车辆静止（换胎）时长，单位秒
    ///
    /// 不输出调试视频；从未检测到静止阶段时返回 `PitStopError::Analysis`。
    /// 视频在静止阶段中结束时，以最后一帧作为结束。
    pub fn measure_stationary_time(&self, source: &mut dyn VideoSource) -> Result<f64> {
        let outcome = self.analyzer.run(source, None)?;

        match outcome.tire_change_seconds() {
            Some(seconds) => {
                info!("✅ Stationary for {:.2}s", seconds);
                Ok(seconds)
            }
            None => {
                let reason = if outcome.arrival_detected() {
                    "vehicle arrived but never became stationary"
                } else {
                    "no vehicle arrival detected"
                };
                error!("❌ {} in {} frames", reason, outcome.frames_processed);
                Err(PitStopError::Analysis(format!(
                    "{} in {} frames",
                    reason, outcome.frames_processed
                )))
            }
        }
    }

    /// 完整计时报告，可同时写出带叠加层的调试视频
    ///
    /// 未检测到的阶段记为 0 秒而不是报错，调试视频照常输出，便于调参。
    pub fn analyze(&self, source: &mut dyn VideoSource, debug_sink: Option<&mut dyn FrameSink>) -> Result<PitStopReport> {
        let outcome = self.analyzer.run(source, debug_sink)?;
        let report = PitStopReport::from_outcome(&outcome);

        if !outcome.arrival_detected() {
            warn!(
                "⚠️ No arrival detected in {} frames; reporting zero durations",
                outcome.frames_processed
            );
        } else {
            info!(
                "✅ tire change {:.2}s ({:?}), total {:.2}s ({:?})",
                report.tire_change_time,
                report.tire_change.completeness,
                report.total_pit_time,
                report.total.completeness
            );
        }

        Ok(report)
    }
}

impl Drop for PitStopTimer {
    fn drop(&mut self) {
        info!("🗑️ PitStopTimer: released");
    }
}

/// 对抽帧目录测量静止时长
pub fn measure_stationary_time_in_dir(
    frames_dir: impl AsRef<Path>,
    fps: f64,
    config: AnalysisConfig,
) -> Result<f64> {
    let timer = PitStopTimer::create(config)?;
    let mut source = ImageSequenceSource::open(frames_dir, fps)?;
    timer.measure_stationary_time(&mut source)
}

/// 对抽帧目录生成计时报告；给出 `debug_dir` 时写出逐帧 PNG 叠加图
pub fn analyze_dir(
    frames_dir: impl AsRef<Path>,
    fps: f64,
    config: AnalysisConfig,
    debug_dir: Option<&Path>,
) -> Result<PitStopReport> {
    let timer = PitStopTimer::create(config)?;
    let mut source = ImageSequenceSource::open(frames_dir, fps)?;

    match debug_dir {
        Some(dir) => {
            let mut sink = ImageSequenceSink::create(dir, SinkFormat::Png)?;
            timer.analyze(&mut source, Some(&mut sink))
        }
        None => timer.analyze(&mut source, None),
    }
}
