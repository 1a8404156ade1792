use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;

use super::texture::IMAGE_FORMAT;
use super::{GpuContext, GpuResource, Texture};

/// Offscreen colour target whose sole attachment is a backing [`Texture`].
pub struct RenderTarget {
    texture: Texture,
}

impl RenderTarget {
    pub fn new(context: &GpuContext, width: u32, height: u32) -> Result<Self> {
        let mut texture = Texture::with_usage(
            context,
            "offscreen target",
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        texture.upload_raw(context, width, height, None)?;
        Ok(Self { texture })
    }

    /// Colour attachment to render into.
    pub fn view(&self) -> &wgpu::TextureView {
        self.texture.view()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        IMAGE_FORMAT
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Copies the target back to the CPU, top row first.
    pub fn read_pixels(&self, context: &GpuContext) -> Result<RgbaImage> {
        let width = self.width();
        let height = self.height();
        let unpadded = width * 4;
        let padded = padded_bytes_per_row(width);

        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture.raw(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        context
            .device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for GPU readback")?;
        receiver
            .recv()
            .map_err(|_| anyhow!("readback callback was dropped"))?
            .context("failed to map readback buffer")?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, unpadded as usize, padded as usize, height as usize)
        };
        buffer.unmap();
        buffer.destroy();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("readback produced a short buffer for {width}x{height}"))
    }
}

impl GpuResource for RenderTarget {
    fn label(&self) -> &str {
        self.texture.label()
    }

    fn destroy(self) {
        self.texture.destroy();
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

fn unpad_rows(data: &[u8], unpadded: usize, padded: usize, rows: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(unpadded * rows);
    for row in data.chunks(padded).take(rows) {
        pixels.extend_from_slice(&row[..unpadded]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(512), 2048);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn unpadding_drops_row_tails() {
        let padded = [1, 2, 0, 0, 3, 4, 0, 0];
        assert_eq!(unpad_rows(&padded, 2, 4, 2), vec![1, 2, 3, 4]);
    }
}
