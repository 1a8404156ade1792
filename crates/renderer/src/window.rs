use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use viewconfig::{Configuration, ControlChange};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::assets::load_image;
use crate::compile::ShaderSources;
use crate::driver::{FrameRenderer, LiveSession};
use crate::export::{run_export, ExportReport, ExportSettings, GifCapture, HeadlessRenderer};
use crate::gpu::{draw_frame, GpuContext, PresentSurface, ResourceSet, ResourceSlot};
use crate::types::{GpuPowerPreference, RendererConfig};

const WINDOW_TITLE: &str = "Lattice Viewer";

const SPEED_STEP: f32 = 0.1;
const TRANSLATION_STEP: f32 = 0.05;
const LATTICE_STEP: f32 = 0.1;
const SCALE_STEP: f32 = 0.1;
const ROTATION_STEP: f32 = 5.0;

/// What a key press asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum KeyAction {
    Control(ControlChange),
    Export,
    Quit,
}

pub(crate) fn key_action(key: &Key) -> Option<KeyAction> {
    use KeyAction::Control;

    let action = match key {
        Key::Named(NamedKey::Escape) => KeyAction::Quit,
        Key::Named(NamedKey::ArrowLeft) => {
            Control(ControlChange::NudgeTranslation([-TRANSLATION_STEP, 0.0]))
        }
        Key::Named(NamedKey::ArrowRight) => {
            Control(ControlChange::NudgeTranslation([TRANSLATION_STEP, 0.0]))
        }
        Key::Named(NamedKey::ArrowUp) => {
            Control(ControlChange::NudgeTranslation([0.0, TRANSLATION_STEP]))
        }
        Key::Named(NamedKey::ArrowDown) => {
            Control(ControlChange::NudgeTranslation([0.0, -TRANSLATION_STEP]))
        }
        Key::Character(text) => match text.to_ascii_lowercase().as_str() {
            "b" => Control(ControlChange::ToggleBoundary),
            "[" => Control(ControlChange::NudgeAnimationSpeed(-SPEED_STEP)),
            "]" => Control(ControlChange::NudgeAnimationSpeed(SPEED_STEP)),
            "0" => Control(ControlChange::SetAnimationSpeed(0.0)),
            "j" => Control(ControlChange::NudgeLatticePoint([-LATTICE_STEP, 0.0])),
            "l" => Control(ControlChange::NudgeLatticePoint([LATTICE_STEP, 0.0])),
            "k" => Control(ControlChange::NudgeLatticePoint([0.0, -LATTICE_STEP])),
            "i" => Control(ControlChange::NudgeLatticePoint([0.0, LATTICE_STEP])),
            "-" => Control(ControlChange::NudgeScale(-SCALE_STEP)),
            "=" | "+" => Control(ControlChange::NudgeScale(SCALE_STEP)),
            "q" => Control(ControlChange::NudgeRotation(-ROTATION_STEP)),
            "e" => Control(ControlChange::NudgeRotation(ROTATION_STEP)),
            "r" => Control(ControlChange::Reset),
            "g" => KeyAction::Export,
            _ => return None,
        },
        _ => return None,
    };
    Some(action)
}

/// Presents the lattice view into the window surface.
///
/// Field order is drop order: GPU objects go before the window they
/// present into.
struct SurfaceRenderer {
    resources: ResourceSlot<ResourceSet>,
    surface: PresentSurface,
    context: GpuContext,
    shaders: ShaderSources,
    image: RgbaImage,
    window: Arc<Window>,
}

impl SurfaceRenderer {
    fn new(
        window: Arc<Window>,
        shaders: ShaderSources,
        image: RgbaImage,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self> {
        let (context, surface) =
            GpuContext::with_surface(window.as_ref(), window.inner_size(), gpu_power)?;
        let profile = context.adapter_profile();
        if profile.is_software() {
            tracing::warn!(
                adapter = %profile.name,
                backend = ?profile.backend,
                "software rasterizer detected; animation may not reach 60 FPS"
            );
        }
        let mut renderer = Self {
            resources: ResourceSlot::new(),
            surface,
            context,
            shaders,
            image,
            window,
        };
        renderer.rebuild()?;
        Ok(renderer)
    }

    /// Builds a fresh resource set; on failure the current one stays active.
    fn rebuild(&mut self) -> Result<()> {
        let Self {
            resources,
            surface,
            context,
            shaders,
            image,
            ..
        } = self;
        resources.replace_with(|| ResourceSet::build(context, shaders, image, surface.format()))
    }

    fn image(&self) -> &RgbaImage {
        &self.image
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(&self.context, size);
        tracing::debug!(
            width = self.surface.size().width,
            height = self.surface.size().height,
            "surface resized"
        );
    }

    fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.acquire() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.surface.reconfigure(&self.context);
                match self.surface.acquire() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        Err(anyhow!("surface out of memory"))
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "surface unavailable after reconfigure; skipping frame");
                        Ok(None)
                    }
                }
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("surface out of memory")),
            Err(err) => {
                tracing::warn!(error = %err, "failed to acquire surface texture; skipping frame");
                Ok(None)
            }
        }
    }
}

impl FrameRenderer for SurfaceRenderer {
    fn render(&mut self, configuration: &Configuration, time: f32) -> Result<()> {
        let Some(frame) = self.acquire()? else {
            return Ok(());
        };
        let resources = self
            .resources
            .get_mut()
            .ok_or_else(|| anyhow!("live view has no GPU resources"))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        draw_frame(&self.context, resources, &view, configuration, time);
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }

    fn replace_image(&mut self, image: &RgbaImage) -> Result<()> {
        let resources = self
            .resources
            .get_mut()
            .ok_or_else(|| anyhow!("live view has no GPU resources"))?;
        resources.texture.upload_image(&self.context, image)?;
        self.image = image.clone();
        Ok(())
    }
}

/// Opens the viewer window and runs its event loop until the user quits.
pub(crate) fn run_window(config: &RendererConfig, image: RgbaImage) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_inner_size(PhysicalSize::new(
            config.surface_size.0,
            config.surface_size.1,
        ))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create viewer window: {err}"))?;
    let window = Arc::new(window);

    let image_size = image.dimensions();
    let renderer = SurfaceRenderer::new(
        Arc::clone(&window),
        config.shaders.clone(),
        image,
        config.gpu_power,
    )
    .context("failed to initialise the live view")?;
    let mut session = LiveSession::new(
        renderer,
        config.configuration.clone(),
        image_size,
        Instant::now(),
    );
    tracing::info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        shaders = %config.shaders.origin,
        "viewer window opened"
    );

    session.reinitialise(Instant::now());
    session.render()?;

    let export = config.export.clone();
    let shaders = config.shaders.clone();
    let gpu_power = config.gpu_power;
    let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
    let loop_failure = Rc::clone(&failure);

    let run_result = event_loop.run(move |event, elwt| {
        let outcome = match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                    Ok(())
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed {
                        return;
                    }
                    match key_action(&event.logical_key) {
                        Some(KeyAction::Quit) => {
                            elwt.exit();
                            Ok(())
                        }
                        Some(KeyAction::Control(change)) => {
                            session.apply_control(change).map(|_| ())
                        }
                        Some(KeyAction::Export) if !event.repeat => {
                            export_from_window(&mut session, &shaders, &export, gpu_power)
                        }
                        _ => Ok(()),
                    }
                }
                WindowEvent::DroppedFile(path) => replace_from_file(&mut session, &path),
                WindowEvent::Resized(size) => {
                    session.renderer_mut().resize(size);
                    session.render()
                }
                WindowEvent::RedrawRequested => session.render(),
                _ => Ok(()),
            },
            Event::AboutToWait => {
                let result = session.on_tick(Instant::now()).map(|_| ());
                elwt.set_control_flow(ControlFlow::WaitUntil(session.next_deadline()));
                result
            }
            _ => Ok(()),
        };

        if let Err(err) = outcome {
            tracing::error!(error = %format!("{err:#}"), "live view failed; closing window");
            *loop_failure.borrow_mut() = Some(err);
            elwt.exit();
        }
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Records a GIF off screen, then redraws the live view once.
///
/// Export failures are reported and the viewer keeps running.
fn export_from_window(
    session: &mut LiveSession<SurfaceRenderer>,
    shaders: &ShaderSources,
    settings: &ExportSettings,
    gpu_power: GpuPowerPreference,
) -> Result<()> {
    if !session.begin_export() {
        tracing::debug!("export already running; ignoring request");
        return Ok(());
    }

    match export_view(
        session.renderer().image(),
        session.configuration(),
        shaders,
        settings,
        gpu_power,
    ) {
        Ok(report) => tracing::info!(
            frames = report.frames,
            output = %report.output.display(),
            "saved GIF"
        ),
        Err(err) => tracing::error!(error = %format!("{err:#}"), "GIF export failed"),
    }

    if let Err(err) = session.renderer_mut().rebuild() {
        tracing::error!(error = %format!("{err:#}"), "failed to rebuild live view; keeping previous resources");
    }
    session.finish_export();
    session.render()
}

fn export_view(
    image: &RgbaImage,
    configuration: &Configuration,
    shaders: &ShaderSources,
    settings: &ExportSettings,
    gpu_power: GpuPowerPreference,
) -> Result<ExportReport> {
    let mut renderer = HeadlessRenderer::new(shaders, image, settings.size, gpu_power)
        .context("failed to create export renderer")?;
    let mut capture = GifCapture::new();
    Ok(run_export(&mut renderer, &mut capture, configuration, settings)?)
}

fn replace_from_file(session: &mut LiveSession<SurfaceRenderer>, path: &Path) -> Result<()> {
    let image = match load_image(path) {
        Ok(image) => image,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "ignoring dropped file");
            return Ok(());
        }
    };
    if let Err(err) = session.replace_image(&image) {
        tracing::error!(error = %format!("{err:#}"), "failed to display dropped image");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(text: &str) -> Key {
        Key::Character(text.into())
    }

    #[test]
    fn letters_map_case_insensitively() {
        assert_eq!(
            key_action(&character("b")),
            Some(KeyAction::Control(ControlChange::ToggleBoundary))
        );
        assert_eq!(
            key_action(&character("B")),
            Some(KeyAction::Control(ControlChange::ToggleBoundary))
        );
        assert_eq!(key_action(&character("G")), Some(KeyAction::Export));
    }

    #[test]
    fn paired_keys_nudge_in_opposite_directions() {
        assert_eq!(
            key_action(&character("[")),
            Some(KeyAction::Control(ControlChange::NudgeAnimationSpeed(-0.1)))
        );
        assert_eq!(
            key_action(&character("]")),
            Some(KeyAction::Control(ControlChange::NudgeAnimationSpeed(0.1)))
        );
        assert_eq!(
            key_action(&character("q")),
            Some(KeyAction::Control(ControlChange::NudgeRotation(-5.0)))
        );
        assert_eq!(
            key_action(&character("e")),
            Some(KeyAction::Control(ControlChange::NudgeRotation(5.0)))
        );
        assert_eq!(
            key_action(&character("k")),
            Some(KeyAction::Control(ControlChange::NudgeLatticePoint([0.0, -0.1])))
        );
    }

    #[test]
    fn named_keys_cover_translation_and_quit() {
        assert_eq!(
            key_action(&Key::Named(NamedKey::ArrowUp)),
            Some(KeyAction::Control(ControlChange::NudgeTranslation([0.0, 0.05])))
        );
        assert_eq!(
            key_action(&Key::Named(NamedKey::ArrowLeft)),
            Some(KeyAction::Control(ControlChange::NudgeTranslation([-0.05, 0.0])))
        );
        assert_eq!(key_action(&Key::Named(NamedKey::Escape)), Some(KeyAction::Quit));
    }

    #[test]
    fn zero_pauses_and_unbound_keys_are_ignored() {
        assert_eq!(
            key_action(&character("0")),
            Some(KeyAction::Control(ControlChange::SetAnimationSpeed(0.0)))
        );
        assert_eq!(key_action(&character("z")), None);
        assert_eq!(key_action(&Key::Named(NamedKey::Space)), None);
    }
}
