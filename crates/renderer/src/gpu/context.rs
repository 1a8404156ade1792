use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::types::{AdapterProfile, GpuPowerPreference};

/// Device/queue pair plus the adapter they came from.
///
/// Every resource wrapper is created against exactly one context and must not
/// be used with another; the live window and each export own separate ones.
pub struct GpuContext {
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    adapter_profile: AdapterProfile,
    max_texture_dimension: u32,
}

impl GpuContext {
    /// Creates a context with no presentation surface, for offscreen rendering.
    pub fn headless(gpu_power: GpuPowerPreference) -> Result<Self> {
        let instance = create_instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: gpu_power.to_wgpu(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .or_else(|err| {
            tracing::debug!(error = %err, "no hardware adapter; trying the fallback adapter");
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: gpu_power.to_wgpu(),
                compatible_surface: None,
                force_fallback_adapter: true,
            }))
        })
        .context("failed to find a suitable GPU adapter")?;

        Self::from_adapter(instance, adapter, "latticeview headless device")
    }

    /// Creates a context and a surface presenting into `target`.
    ///
    /// `target` must outlive the returned surface; callers keep the window in
    /// the same owner and drop the surface first.
    pub(crate) fn with_surface<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        gpu_power: GpuPowerPreference,
    ) -> Result<(Self, PresentSurface)>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // SAFETY: the caller keeps the window alive for as long as the surface.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: gpu_power.to_wgpu(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let context = Self::from_adapter(instance, adapter, "latticeview device")?;
        let surface = PresentSurface::new(surface, &context, initial_size)?;
        Ok((context, surface))
    }

    fn from_adapter(instance: wgpu::Instance, adapter: wgpu::Adapter, label: &str) -> Result<Self> {
        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info());
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            adapter_profile,
            max_texture_dimension: limits.max_texture_dimension_2d,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.adapter_profile
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    pub(crate) fn check_extent(&self, width: u32, height: u32) -> Result<()> {
        let max = self.max_texture_dimension;
        if width == 0 || height == 0 {
            anyhow::bail!("texture extent {width}x{height} is empty");
        }
        if width > max || height > max {
            anyhow::bail!("GPU max texture dimension is {max}, requested {width}x{height}");
        }
        Ok(())
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

/// Swapchain surface of the live window.
pub(crate) struct PresentSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl PresentSurface {
    fn new(
        surface: wgpu::Surface<'static>,
        context: &GpuContext,
        size: PhysicalSize<u32>,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(&context.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if format.is_srgb() {
            tracing::warn!(
                ?format,
                "no linear (non-sRGB) surface format available; colours will be gamma encoded twice"
            );
        }

        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?format, ?present_mode, "configured presentation surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &config);
        Ok(Self { surface, config })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Applies a new window size; zero-sized (minimised) windows are ignored.
    pub(crate) fn resize(&mut self, context: &GpuContext, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let max = context.max_texture_dimension();
        if new_size.width > max || new_size.height > max {
            tracing::warn!(
                width = new_size.width,
                height = new_size.height,
                max,
                "resize exceeds GPU max texture dimension; keeping previous size"
            );
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&context.device, &self.config);
    }

    pub(crate) fn reconfigure(&self, context: &GpuContext) {
        self.surface.configure(&context.device, &self.config);
    }

    pub(crate) fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface.get_current_texture()
    }
}
