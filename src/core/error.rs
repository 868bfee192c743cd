use thiserror::Error;

pub type Result<T> = std::result::Result<T, PitStopError>;

#[derive(Debug, Error)]
pub enum PitStopError {
    #[error("Video source open failed: {0}")]
    SourceOpen(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Analysis failed: {0}")]
    Analysis(String),
    #[error("Debug video write failed: {0}")]
    SinkWrite(String),
    #[error("Vehicle detector failed: {0}")]
    Detector(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] json5::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PitStopError {
    pub fn config(msg: impl Into<String>) -> Self {
        PitStopError::Config(msg.into())
    }

    /// 调用方可据此区分"未检测到"与真正的故障
    pub fn is_detection_failure(&self) -> bool {
        matches!(self, PitStopError::Analysis(_))
    }
}
