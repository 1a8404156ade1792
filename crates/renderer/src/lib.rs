//! Renderer crate for the lattice viewer.
//!
//! An image is tiled on a lattice and drawn through a contracting affine map,
//! nested into itself by the fragment shader. The overall flow is:
//!
//! ```text
//!   CLI / latticeview
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ LiveSession ──▶ winit event loop ──▶ draw_frame()
//!          │                                      │
//!          │                                      └─▶ LatticeTransform ─▶ uniform block
//!          ▼
//!   Renderer::export ──▶ HeadlessRenderer ──▶ GifCapture ──▶ lattice.gif
//! ```
//!
//! GPU objects are wrapped in [`gpu`] and swapped transactionally through
//! [`gpu::ResourceSlot`]. Shader text is compiled and introspected with naga
//! in [`compile`], which also backs the GPU-free `check` path.

pub mod assets;
pub mod compile;
pub mod driver;
pub mod export;
pub mod gpu;
pub mod runtime;
pub mod transform;
pub mod types;
mod window;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use image::RgbaImage;

pub use compile::{check_shaders, ProgramInterface, ShaderError, ShaderOrigin, ShaderSources};
pub use driver::{FrameRenderer, LiveSession};
pub use export::{
    run_export, ExportError, ExportReport, ExportSettings, FrameCapture, GifCapture,
    HeadlessRenderer, OffscreenRenderer,
};
pub use transform::LatticeTransform;
pub use types::{AdapterProfile, GpuPowerPreference, RendererConfig};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the interactive window and blocks until it is closed.
    pub fn run(&mut self) -> Result<()> {
        let image = self.source_image()?;
        window::run_window(&self.config, image)
    }

    /// Renders one GIF without opening a window.
    pub fn export(&self) -> Result<ExportReport> {
        let image = self.source_image()?;
        let settings = &self.config.export;
        let mut renderer = HeadlessRenderer::new(
            &self.config.shaders,
            &image,
            settings.size,
            self.config.gpu_power,
        )
        .context("failed to create export renderer")?;
        let mut capture = GifCapture::new();
        let report = run_export(
            &mut renderer,
            &mut capture,
            &self.config.configuration,
            settings,
        )?;
        Ok(report)
    }

    fn source_image(&self) -> Result<RgbaImage> {
        match &self.config.image {
            Some(path) => assets::load_image(path),
            None => {
                tracing::info!("no image given; showing the placeholder checkerboard");
                Ok(assets::placeholder_image())
            }
        }
    }
}
