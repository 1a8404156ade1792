use anyhow::Result;
use wgpu::util::DeviceExt;

use super::{GpuContext, GpuResource};

/// Unit quad as a 4-vertex triangle strip of `vec2` positions.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

const COMPONENTS: usize = 2;

/// Immutable vertex storage of tightly packed `vec2<f32>` positions.
pub struct VertexBuffer {
    label: String,
    buffer: Option<wgpu::Buffer>,
    vertex_count: u32,
}

impl VertexBuffer {
    pub fn new(_context: &GpuContext, label: &str) -> Self {
        Self {
            label: label.to_string(),
            buffer: None,
            vertex_count: 0,
        }
    }

    /// Uploads `data` immediately, replacing any previous contents.
    pub fn set_data(&mut self, context: &GpuContext, data: &[f32]) -> Result<()> {
        if data.is_empty() || data.len() % COMPONENTS != 0 {
            anyhow::bail!(
                "vertex buffer `{}` needs a non-empty multiple of {COMPONENTS} floats, got {}",
                self.label,
                data.len()
            );
        }
        let buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&self.label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        if let Some(previous) = self.buffer.replace(buffer) {
            previous.destroy();
        }
        self.vertex_count = (data.len() / COMPONENTS) as u32;
        Ok(())
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>, slot: u32) {
        if let Some(buffer) = self.buffer.as_ref() {
            pass.set_vertex_buffer(slot, buffer.slice(..));
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl GpuResource for VertexBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn destroy(self) {
        if let Some(buffer) = self.buffer {
            buffer.destroy();
        }
    }
}
