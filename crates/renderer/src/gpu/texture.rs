use anyhow::Result;
use image::RgbaImage;

use super::{GpuContext, GpuResource};

/// Pixel format for image textures and offscreen targets.
///
/// Non-sRGB so sampled values reach the shader exactly as stored.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];

/// 2D RGBA texture with a fixed linear/clamp sampler.
pub struct Texture {
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    usage: wgpu::TextureUsages,
    width: u32,
    height: u32,
}

/// View and sampler a program binds for one texture slot.
pub struct TextureBinding<'a> {
    pub slot: u32,
    pub view: &'a wgpu::TextureView,
    pub sampler: &'a wgpu::Sampler,
}

impl Texture {
    /// Creates a sampled texture holding a single opaque black pixel.
    pub fn new(context: &GpuContext, label: &str) -> Self {
        Self::with_usage(
            context,
            label,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )
    }

    pub(crate) fn with_usage(
        context: &GpuContext,
        label: &str,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = allocate(context, label, usage, 1, 1);
        write_pixels(context, &texture, 1, 1, &PLACEHOLDER_PIXEL);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            label: label.to_string(),
            texture,
            view,
            sampler,
            usage,
            width: 1,
            height: 1,
        }
    }

    /// Replaces the contents with a decoded image at its natural size.
    pub fn upload_image(&mut self, context: &GpuContext, image: &RgbaImage) -> Result<()> {
        self.upload_raw(context, image.width(), image.height(), Some(image.as_raw()))?;
        tracing::debug!(
            texture = %self.label,
            width = self.width,
            height = self.height,
            "uploaded image texture"
        );
        Ok(())
    }

    /// Writes tightly packed RGBA8 rows, reallocating when the size changes.
    ///
    /// `None` leaves the storage uninitialised, which render targets rely on.
    pub fn upload_raw(
        &mut self,
        context: &GpuContext,
        width: u32,
        height: u32,
        data: Option<&[u8]>,
    ) -> Result<()> {
        context.check_extent(width, height)?;
        if let Some(data) = data {
            let expected = width as usize * height as usize * 4;
            if data.len() != expected {
                anyhow::bail!(
                    "texture `{}` expected {expected} bytes for {width}x{height}, got {}",
                    self.label,
                    data.len()
                );
            }
        }

        if width != self.width || height != self.height {
            let texture = allocate(context, &self.label, self.usage, width, height);
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let previous = std::mem::replace(&mut self.texture, texture);
            previous.destroy();
            self.view = view;
            self.width = width;
            self.height = height;
        }

        if let Some(data) = data {
            write_pixels(context, &self.texture, width, height, data);
        }
        Ok(())
    }

    pub fn binding(&self, slot: u32) -> TextureBinding<'_> {
        TextureBinding {
            slot,
            view: &self.view,
            sampler: &self.sampler,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl GpuResource for Texture {
    fn label(&self) -> &str {
        &self.label
    }

    fn destroy(self) {
        self.texture.destroy();
    }
}

fn allocate(
    context: &GpuContext,
    label: &str,
    usage: wgpu::TextureUsages,
    width: u32,
    height: u32,
) -> wgpu::Texture {
    context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: IMAGE_FORMAT,
        usage,
        view_formats: &[],
    })
}

fn write_pixels(context: &GpuContext, texture: &wgpu::Texture, width: u32, height: u32, data: &[u8]) {
    context.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}
