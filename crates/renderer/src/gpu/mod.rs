//! GPU resource wrappers and the per-frame draw routine.
//!
//! - `context` owns the wgpu instance/adapter/device/queue and, for the live
//!   window, the presentation surface.
//! - `texture`, `buffer`, `target` and `program` wrap one wgpu object family
//!   each behind the [`GpuResource`] trait; `destroy` consumes the handle.
//! - `uniforms` is the CPU mirror of the program's std140 block, written by
//!   uniform name.
//! - `state` groups a texture, quad and program into a [`ResourceSet`], swaps
//!   sets transactionally, and encodes a frame with [`draw_frame`].

mod buffer;
mod context;
mod program;
mod state;
mod target;
mod texture;
mod uniforms;

pub use buffer::{VertexBuffer, QUAD_VERTICES};
pub use context::GpuContext;
pub(crate) use context::PresentSurface;
pub use program::{ShaderProgram, QUAD_ATTRIBUTE};
pub use state::{draw_frame, ResourceSet, ResourceSlot};
pub use target::RenderTarget;
pub use texture::{Texture, TextureBinding, IMAGE_FORMAT};
pub use uniforms::{UniformBlock, UniformValue, UniformWrite};

/// GPU object with an explicit, consuming release.
pub trait GpuResource {
    fn label(&self) -> &str;

    /// Releases the GPU memory immediately instead of waiting for the last
    /// reference held by in-flight command buffers to drop.
    fn destroy(self);
}
