use anyhow::{Context, Result};
use image::RgbaImage;
use viewconfig::Configuration;

use crate::compile::ShaderSources;
use crate::transform::LatticeTransform;

use super::uniforms::UniformValue;
use super::{GpuContext, GpuResource, ShaderProgram, Texture, VertexBuffer, QUAD_VERTICES};

pub const U_TEXTURE: &str = "uTexture";
pub const U_SCALE: &str = "uScale";
pub const U_ROTATION: &str = "uRotation";
pub const U_TRANSLATION: &str = "uTranslation";
pub const U_ORIGIN: &str = "uOrigin";
pub const U_TIME: &str = "uTime";
pub const U_SIZE: &str = "uSize";
pub const U_BOUNDARY: &str = "uBoundary";
pub const U_LATTICE_POINT: &str = "uLatticePoint";

/// Texture, quad and program that together draw one view.
pub struct ResourceSet {
    pub texture: Texture,
    pub quad: VertexBuffer,
    pub program: ShaderProgram,
}

impl ResourceSet {
    /// Builds a complete set; nothing is returned unless every part succeeded.
    pub fn build(
        context: &GpuContext,
        sources: &ShaderSources,
        image: &RgbaImage,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let program =
            ShaderProgram::new(context, &sources.vertex, &sources.fragment, target_format)
                .with_context(|| format!("failed to build shader program ({})", sources.origin))?;
        if program.texture_slot(U_TEXTURE).is_none() {
            tracing::warn!("shader program declares no `{U_TEXTURE}`; the image will not be visible");
        }

        let mut texture = Texture::new(context, "lattice image");
        texture.upload_image(context, image)?;

        let mut quad = VertexBuffer::new(context, "lattice quad");
        quad.set_data(context, &QUAD_VERTICES)?;

        Ok(Self {
            texture,
            quad,
            program,
        })
    }
}

impl GpuResource for ResourceSet {
    fn label(&self) -> &str {
        "lattice resources"
    }

    fn destroy(self) {
        self.program.destroy();
        self.quad.destroy();
        self.texture.destroy();
    }
}

/// Holder that swaps resources transactionally.
///
/// A replacement is fully constructed before it is installed; the previous
/// value is destroyed only after the swap, and a failed build leaves it in
/// place.
pub struct ResourceSlot<T: GpuResource> {
    current: Option<T>,
}

impl<T: GpuResource> Default for ResourceSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T: GpuResource> ResourceSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.current.as_mut()
    }

    /// Installs `next`, destroying whatever was installed before.
    pub fn install(&mut self, next: T) {
        if let Some(previous) = self.current.replace(next) {
            tracing::debug!(resource = previous.label(), "releasing replaced resources");
            previous.destroy();
        }
    }

    /// Runs `build` and installs its result; on error the current value stays.
    pub fn replace_with<E>(&mut self, build: impl FnOnce() -> Result<T, E>) -> Result<(), E> {
        let next = build()?;
        self.install(next);
        Ok(())
    }

    pub fn clear(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.destroy();
        }
    }
}

impl<T: GpuResource> Drop for ResourceSlot<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Encodes and submits one frame of the lattice view into `view`.
///
/// Uniforms are uploaded with the caller's `time`; advancing time is left to
/// the frame driver.
pub fn draw_frame(
    context: &GpuContext,
    resources: &mut ResourceSet,
    view: &wgpu::TextureView,
    configuration: &Configuration,
    time: f32,
) {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lattice encoder"),
        });

    let transform = LatticeTransform::derive(configuration);
    let program = &mut resources.program;
    program.set_uniform(U_SCALE, UniformValue::Float(transform.scale));
    program.set_uniform(U_ROTATION, UniformValue::Float(transform.rotation));
    program.set_uniform(U_TRANSLATION, UniformValue::Vec2(transform.translation));
    program.set_uniform(U_ORIGIN, UniformValue::Vec2(transform.origin));
    program.set_uniform(U_TIME, UniformValue::Float(time));
    program.set_uniform(
        U_SIZE,
        UniformValue::Vec2([
            resources.texture.width() as f32,
            resources.texture.height() as f32,
        ]),
    );
    program.set_uniform(U_BOUNDARY, UniformValue::Int(i32::from(configuration.boundary)));
    program.set_uniform(U_LATTICE_POINT, UniformValue::Vec2(configuration.lattice_point));

    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lattice pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        resources.quad.bind(&mut pass, 0);
        resources
            .program
            .use_program(context, &mut pass, &resources.texture);
        pass.draw(0..resources.quad.vertex_count(), 0..1);
    }

    context.queue.submit(std::iter::once(encoder.finish()));
    tracing::trace!(time, origin = ?transform.origin, "drew lattice frame");
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct Counted {
        name: &'static str,
        destroyed: Rc<RefCell<Vec<&'static str>>>,
    }

    impl GpuResource for Counted {
        fn label(&self) -> &str {
            self.name
        }

        fn destroy(self) {
            self.destroyed.borrow_mut().push(self.name);
        }
    }

    fn counted(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Counted {
        Counted {
            name,
            destroyed: Rc::clone(log),
        }
    }

    #[test]
    fn install_destroys_previous_after_swap() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slot = ResourceSlot::new();
        slot.install(counted("first", &log));
        assert!(log.borrow().is_empty());

        slot.install(counted("second", &log));
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(slot.get().map(|value| value.label()), Some("second"));
    }

    #[test]
    fn failed_build_keeps_current() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slot = ResourceSlot::new();
        slot.install(counted("stable", &log));

        let result: Result<(), &str> = slot.replace_with(|| Err("shader failed"));
        assert_eq!(result, Err("shader failed"));
        assert!(log.borrow().is_empty());
        assert_eq!(slot.get().map(|value| value.label()), Some("stable"));
    }

    #[test]
    fn repeated_replacement_releases_each_generation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let names = ["a", "b", "c", "d"];
        {
            let mut slot = ResourceSlot::new();
            for name in names {
                slot.replace_with(|| Ok::<_, ()>(counted(name, &log))).unwrap();
            }
            assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        }
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
    }
}
