//! 帧来源与调试视频输出
//!
//! 容器解码不在本库范围内：`VideoSource` 只要求按顺序给出固定尺寸的 RGB 帧。
//! 自带两种实现：内存帧序列，以及按序号命名的图片目录（ffmpeg 抽帧结果）。

use super::frame::Frame;
use crate::core::error::{PitStopError, Result};
use image::{ImageOutputFormat, RgbImage};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub trait VideoSource {
    /// 帧率，> 0
    fn frame_rate(&self) -> f64;

    /// (宽, 高)，整个序列固定不变
    fn dimensions(&self) -> (u32, u32);

    /// 下一帧；读取失败等同于序列结束
    fn read_frame(&mut self) -> Option<Frame>;

    fn release(&mut self) {}
}

pub trait FrameSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;

    /// 只会被调用一次，在最后一帧之后
    fn close(&mut self) -> Result<()>;
}

fn check_rate(fps: f64) -> Result<()> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(PitStopError::SourceOpen(format!(
            "could not determine a usable frame rate ({})",
            fps
        )));
    }
    Ok(())
}

/// 内存中的帧序列
pub struct MemoryVideoSource {
    frames: VecDeque<RgbImage>,
    fps: f64,
    dimensions: (u32, u32),
    next_index: u64,
}

impl MemoryVideoSource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Result<Self> {
        check_rate(fps)?;
        let dimensions = frames
            .first()
            .map(|f| f.dimensions())
            .ok_or_else(|| PitStopError::SourceOpen("video holds no frames".to_string()))?;
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(PitStopError::SourceOpen(format!(
                "frame size {}x{} is empty",
                dimensions.0, dimensions.1
            )));
        }

        Ok(Self {
            frames: frames.into(),
            fps,
            dimensions,
            next_index: 0,
        })
    }
}

impl VideoSource for MemoryVideoSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let image = self.frames.pop_front()?;
        if image.dimensions() != self.dimensions {
            warn!(
                "⚠️ frame {} is {:?}, expected {:?}; treating as end of video",
                self.next_index,
                image.dimensions(),
                self.dimensions
            );
            self.frames.clear();
            return None;
        }

        let frame = Frame::at_rate(image, self.next_index, self.fps);
        self.next_index += 1;
        Some(frame)
    }

    fn release(&mut self) {
        self.frames.clear();
    }
}

static FRAME_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(?i:png|jpe?g|bmp)$").unwrap());

/// 图片目录：文件名末尾的数字为帧序号，例如 `frame_000123.png`
pub struct ImageSequenceSource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    fps: f64,
    dimensions: (u32, u32),
    first: Option<RgbImage>,
    next_index: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        check_rate(fps)?;

        let entries = fs::read_dir(&dir).map_err(|e| {
            PitStopError::SourceOpen(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut numbered: Vec<(u64, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let number = FRAME_NUMBER.captures(name)?.get(1)?.as_str().parse().ok()?;
                Some((number, path))
            })
            .collect();
        numbered.sort_by_key(|(number, _)| *number);

        let mut pending: VecDeque<PathBuf> = numbered.into_iter().map(|(_, path)| path).collect();

        let first_path = pending.pop_front().ok_or_else(|| {
            PitStopError::SourceOpen(format!("no numbered frames in {}", dir.display()))
        })?;
        let first = image::open(&first_path)
            .map_err(|e| {
                PitStopError::SourceOpen(format!("cannot decode {}: {}", first_path.display(), e))
            })?
            .to_rgb8();
        let dimensions = first.dimensions();

        info!(
            "🎬 ImageSequenceSource: {} frames {}x{} @ {} fps from {}",
            pending.len() + 1,
            dimensions.0,
            dimensions.1,
            fps,
            dir.display()
        );

        Ok(Self {
            dir,
            pending,
            fps,
            dimensions,
            first: Some(first),
            next_index: 0,
        })
    }
}

impl VideoSource for ImageSequenceSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let image = match self.first.take() {
            Some(image) => image,
            None => {
                let path = self.pending.pop_front()?;
                match image::open(&path) {
                    Ok(img) => img.to_rgb8(),
                    Err(e) => {
                        warn!("⚠️ cannot decode {}: {}; treating as end of video", path.display(), e);
                        self.pending.clear();
                        return None;
                    }
                }
            }
        };

        if image.dimensions() != self.dimensions {
            warn!(
                "⚠️ frame {} is {:?}, expected {:?}; treating as end of video",
                self.next_index,
                image.dimensions(),
                self.dimensions
            );
            self.pending.clear();
            return None;
        }

        let frame = Frame::at_rate(image, self.next_index, self.fps);
        self.next_index += 1;
        Some(frame)
    }

    fn release(&mut self) {
        if !self.pending.is_empty() {
            debug!("ImageSequenceSource: {} unread frames in {}", self.pending.len(), self.dir.display());
        }
        self.pending.clear();
        self.first = None;
    }
}

/// 收集到内存，测试与预览用
#[derive(Default)]
pub struct MemoryFrameSink {
    pub frames: Vec<RgbImage>,
    pub closed: u32,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemoryFrameSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if self.closed > 0 {
            return Err(PitStopError::SinkWrite("sink already closed".to_string()));
        }
        self.frames.push(image.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    Png,
    Jpeg(u8),
}

/// 按序号写出图片，之后可用 ffmpeg 以同一帧率合成为调试视频
pub struct ImageSequenceSink {
    dir: PathBuf,
    format: SinkFormat,
    written: u64,
    closed: bool,
}

impl ImageSequenceSink {
    pub fn create(dir: impl AsRef<Path>, format: SinkFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            PitStopError::SinkWrite(format!("cannot create {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            dir,
            format,
            written: 0,
            closed: false,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        let ext = match self.format {
            SinkFormat::Png => "png",
            SinkFormat::Jpeg(_) => "jpg",
        };
        self.dir.join(format!("frame_{:06}.{}", index, ext))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if self.closed {
            return Err(PitStopError::SinkWrite("sink already closed".to_string()));
        }

        let path = self.frame_path(self.written);
        let output_format = match self.format {
            SinkFormat::Png => ImageOutputFormat::Png,
            SinkFormat::Jpeg(quality) => ImageOutputFormat::Jpeg(quality),
        };

        let file = File::create(&path)
            .map_err(|e| PitStopError::SinkWrite(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        image
            .write_to(&mut writer, output_format)
            .map_err(|e| PitStopError::SinkWrite(format!("{}: {}", path.display(), e)))?;

        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            info!("🎞️ ImageSequenceSink: {} frames in {}", self.written, self.dir.display());
        }
        Ok(())
    }
}
