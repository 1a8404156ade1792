//! Animated GIF export.
//!
//! An export renders one second of animation offscreen: `fps` frames at
//! times `i / fps`, independent of the live view's clock. Frames go through
//! a [`FrameCapture`] so the encoder can be swapped out in tests.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use thiserror::Error;
use viewconfig::{Configuration, DEFAULT_EXPORT_SIZE};

use crate::compile::ShaderSources;
use crate::gpu::{draw_frame, GpuContext, RenderTarget, ResourceSet, ResourceSlot};
use crate::transform::LatticeTransform;
use crate::types::GpuPowerPreference;

pub const EXPORT_FPS: u32 = 60;

// NeuQuant sampling factor; 1 is slowest, 30 fastest.
const GIF_SPEED: i32 = 10;

/// Sample times of an export: `0, 1/fps, .., (fps-1)/fps`.
pub fn export_timestamps(fps: u32) -> impl Iterator<Item = f32> {
    (0..fps).map(move |index| index as f32 / fps as f32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    /// Edge length of the square export canvas.
    pub size: u32,
    pub fps: u32,
    pub output: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_EXPORT_SIZE,
            fps: EXPORT_FPS,
            output: PathBuf::from("lattice.gif"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("capture is not recording")]
    NotRecording,
    #[error("capture is already recording")]
    AlreadyRecording,
    #[error("capture has no stopped recording to save")]
    NothingToSave,
    #[error("frame is {found:?}, capture expects {expected:?}")]
    FrameSize {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("failed to render export frame {index}: {message}")]
    Render { index: usize, message: String },
    #[error("failed to encode GIF")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Recorder for a sequence of equally sized frames.
pub trait FrameCapture {
    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<(), ExportError>;
    fn capture(&mut self, frame: &RgbaImage) -> Result<(), ExportError>;
    fn stop(&mut self) -> Result<(), ExportError>;
    fn save(&mut self, path: &Path) -> Result<(), ExportError>;
}

enum CaptureState {
    Idle,
    Recording {
        size: (u32, u32),
        fps: u32,
        frames: Vec<RgbaImage>,
    },
    Stopped {
        fps: u32,
        frames: Vec<RgbaImage>,
    },
}

/// Buffers frames in memory and encodes them as a looping GIF on save.
pub struct GifCapture {
    state: CaptureState,
}

impl Default for GifCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl GifCapture {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, CaptureState::Recording { .. })
    }
}

impl FrameCapture for GifCapture {
    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<(), ExportError> {
        if self.is_recording() {
            return Err(ExportError::AlreadyRecording);
        }
        self.state = CaptureState::Recording {
            size: (width, height),
            fps: fps.max(1),
            frames: Vec::with_capacity(fps as usize),
        };
        Ok(())
    }

    fn capture(&mut self, frame: &RgbaImage) -> Result<(), ExportError> {
        let CaptureState::Recording { size, frames, .. } = &mut self.state else {
            return Err(ExportError::NotRecording);
        };
        if frame.dimensions() != *size {
            return Err(ExportError::FrameSize {
                expected: *size,
                found: frame.dimensions(),
            });
        }
        frames.push(frame.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ExportError> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Recording { fps, frames, .. } => {
                self.state = CaptureState::Stopped { fps, frames };
                Ok(())
            }
            previous => {
                self.state = previous;
                Err(ExportError::NotRecording)
            }
        }
    }

    fn save(&mut self, path: &Path) -> Result<(), ExportError> {
        let (fps, frames) = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Stopped { fps, frames } => (fps, frames),
            previous => {
                self.state = previous;
                return Err(ExportError::NothingToSave);
            }
        };

        let io_error = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        let delay = Delay::from_numer_denom_ms(1000, fps);
        {
            // The trailer is written when the encoder drops.
            let mut encoder = GifEncoder::new_with_speed(&mut writer, GIF_SPEED);
            encoder.set_repeat(Repeat::Infinite)?;
            for image in frames {
                encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
            }
        }
        writer.flush().map_err(io_error)?;
        tracing::debug!(path = %path.display(), fps, "wrote GIF");
        Ok(())
    }
}

/// Renders single frames of the lattice view off screen.
pub trait OffscreenRenderer {
    fn render_offscreen(
        &mut self,
        configuration: &Configuration,
        time: f32,
    ) -> anyhow::Result<RgbaImage>;
}

/// Offscreen renderer with its own device and resources.
///
/// Nothing here is shared with the live window, so an export cannot disturb
/// the live view's GPU state.
pub struct HeadlessRenderer {
    resources: ResourceSlot<ResourceSet>,
    target: RenderTarget,
    context: GpuContext,
}

impl HeadlessRenderer {
    pub fn new(
        sources: &ShaderSources,
        image: &RgbaImage,
        size: u32,
        gpu_power: GpuPowerPreference,
    ) -> anyhow::Result<Self> {
        let context = GpuContext::headless(gpu_power)?;
        let target = RenderTarget::new(&context, size, size)?;
        let mut resources = ResourceSlot::new();
        resources.replace_with(|| ResourceSet::build(&context, sources, image, target.format()))?;
        tracing::debug!(
            adapter = %context.adapter_profile().name,
            size,
            "created headless renderer"
        );
        Ok(Self {
            resources,
            target,
            context,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

impl OffscreenRenderer for HeadlessRenderer {
    fn render_offscreen(
        &mut self,
        configuration: &Configuration,
        time: f32,
    ) -> anyhow::Result<RgbaImage> {
        let resources = self
            .resources
            .get_mut()
            .ok_or_else(|| anyhow::anyhow!("headless renderer has no resources"))?;
        draw_frame(&self.context, resources, self.target.view(), configuration, time);
        self.target.read_pixels(&self.context)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub frames: usize,
    pub output: PathBuf,
}

/// Renders `settings.fps` frames and saves them to `settings.output`.
pub fn run_export<R, C>(
    renderer: &mut R,
    capture: &mut C,
    configuration: &Configuration,
    settings: &ExportSettings,
) -> Result<ExportReport, ExportError>
where
    R: OffscreenRenderer,
    C: FrameCapture,
{
    tracing::info!(
        output = %settings.output.display(),
        size = settings.size,
        fps = settings.fps,
        "starting GIF export"
    );
    if !LatticeTransform::derive(configuration).contracting {
        tracing::warn!(
            scale = configuration.scale,
            "exporting a lattice map that is not contracting"
        );
    }
    capture.start(settings.size, settings.size, settings.fps)?;

    let mut frames = 0;
    for (index, time) in export_timestamps(settings.fps).enumerate() {
        let frame = match renderer.render_offscreen(configuration, time) {
            Ok(frame) => frame,
            Err(err) => {
                if let Err(stop_err) = capture.stop() {
                    tracing::debug!(error = %stop_err, "capture stop after failed render");
                }
                return Err(ExportError::Render {
                    index,
                    message: format!("{err:#}"),
                });
            }
        };
        if let Err(err) = capture.capture(&frame) {
            if let Err(stop_err) = capture.stop() {
                tracing::debug!(error = %stop_err, "capture stop after failed capture");
            }
            return Err(err);
        }
        frames += 1;
    }

    capture.stop()?;
    capture.save(&settings.output)?;
    tracing::info!(frames, output = %settings.output.display(), "GIF export finished");
    Ok(ExportReport {
        frames,
        output: settings.output.clone(),
    })
}
