//! Frame driver for the live view.
//!
//! `LiveSession` decides *when* to render; what a render means is delegated
//! to a [`FrameRenderer`]. Every render, whatever triggered it, uploads the
//! current time and then advances the clock by one frame at the current
//! animation speed.

use std::time::Instant;

use anyhow::Result;
use image::RgbaImage;
use viewconfig::{Configuration, ControlChange};

use crate::runtime::{AnimationClock, FrameTicker, FPS};
use crate::transform::LatticeTransform;

/// Something that can draw the lattice view for a configuration and time.
pub trait FrameRenderer {
    fn render(&mut self, configuration: &Configuration, time: f32) -> Result<()>;

    /// Replaces the displayed image; the next render shows it.
    fn replace_image(&mut self, image: &RgbaImage) -> Result<()>;
}

pub struct LiveSession<R> {
    renderer: R,
    configuration: Configuration,
    clock: AnimationClock,
    ticker: FrameTicker,
    exporting: bool,
    image_size: (u32, u32),
    shape: MapShape,
}

/// Degenerate map states already reported, so each is logged once on entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MapShape {
    expanding: bool,
    diverged: bool,
}

impl MapShape {
    fn of(configuration: &Configuration) -> Self {
        let transform = LatticeTransform::derive(configuration);
        Self {
            expanding: !transform.contracting,
            diverged: transform.diverged,
        }
    }
}

impl<R: FrameRenderer> LiveSession<R> {
    pub fn new(
        renderer: R,
        configuration: Configuration,
        image_size: (u32, u32),
        now: Instant,
    ) -> Self {
        let mut session = Self {
            renderer,
            configuration,
            clock: AnimationClock::new(),
            ticker: FrameTicker::new(FPS, now),
            exporting: false,
            image_size,
            shape: MapShape::default(),
        };
        session.check_map_shape();
        session
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn time(&self) -> f32 {
        self.clock.time()
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    pub fn next_deadline(&self) -> Instant {
        self.ticker.next_deadline()
    }

    /// Renders on a due tick while animating. Returns whether a frame was drawn.
    pub fn on_tick(&mut self, now: Instant) -> Result<bool> {
        if !self.ticker.poll(now) || !self.configuration.is_animating() {
            return Ok(false);
        }
        self.render()?;
        Ok(true)
    }

    /// Applies a control edit and renders once, paused or not.
    ///
    /// Returns whether the configuration changed; an invalid edit is logged
    /// and still yields a render of the unchanged view.
    pub fn apply_control(&mut self, change: ControlChange) -> Result<bool> {
        let changed = match self.configuration.apply(change) {
            Ok(changed) => changed,
            Err(err) => {
                tracing::warn!(?change, error = %err, "rejected control change");
                false
            }
        };
        if changed {
            tracing::debug!(?change, configuration = ?self.configuration, "configuration updated");
            self.check_map_shape();
        }
        self.render()?;
        Ok(changed)
    }

    /// Swaps in a new image and renders exactly once.
    pub fn replace_image(&mut self, image: &RgbaImage) -> Result<()> {
        self.renderer.replace_image(image)?;
        self.image_size = image.dimensions();
        tracing::info!(
            width = self.image_size.0,
            height = self.image_size.1,
            "displaying new image"
        );
        self.render()
    }

    /// Renders with the current time, then advances the clock.
    pub fn render(&mut self) -> Result<()> {
        self.renderer
            .render(&self.configuration, self.clock.time())?;
        self.clock.advance(self.configuration.animation_speed);
        Ok(())
    }

    /// Marks an export as running. Returns false if one already is.
    pub fn begin_export(&mut self) -> bool {
        if self.exporting {
            return false;
        }
        self.exporting = true;
        true
    }

    pub fn finish_export(&mut self) {
        self.exporting = false;
    }

    fn check_map_shape(&mut self) {
        let shape = MapShape::of(&self.configuration);
        if shape.expanding && !self.shape.expanding {
            tracing::warn!(
                scale = self.configuration.scale,
                "lattice map is not contracting; origin is not a fixed point"
            );
        }
        if shape.diverged && !self.shape.diverged {
            tracing::warn!(
                translation = ?self.configuration.translation,
                "lattice origin diverged; falling back to the translation"
            );
        }
        self.shape = shape;
    }

    /// Resets time as a fresh viewer would.
    pub fn reinitialise(&mut self, now: Instant) {
        self.clock.reset();
        self.ticker.reset(now);
    }
}
