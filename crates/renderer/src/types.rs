use std::path::PathBuf;

use viewconfig::Configuration;

use crate::compile::ShaderSources;
use crate::export::ExportSettings;

/// Adapter power preference requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    /// Prefer integrated or otherwise power-efficient adapters.
    #[default]
    Low,
    /// Prefer discrete, high-performance adapters.
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl std::fmt::Display for GpuPowerPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuPowerPreference::Low => f.write_str("low"),
            GpuPowerPreference::High => f.write_str("high"),
        }
    }
}

/// Summary of the adapter a context was created on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    /// True for CPU rasterizers such as llvmpipe, lavapipe or SwiftShader.
    pub fn is_software(&self) -> bool {
        if matches!(self.device_type, wgpu::DeviceType::Cpu) {
            return true;
        }
        let name = self.name.to_ascii_lowercase();
        ["llvmpipe", "lavapipe", "swiftshader", "softpipe"]
            .iter()
            .any(|marker| name.contains(marker))
    }
}

/// Immutable start-up description of a viewer session.
///
/// `RendererConfig` mirrors CLI flags and the config file: which image and
/// shader pair to load, how large the window should be, and where exports go.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Initial transform parameters.
    pub configuration: Configuration,
    /// Image to display; a generated checkerboard is used when absent.
    pub image: Option<PathBuf>,
    /// Vertex/fragment shader pair.
    pub shaders: ShaderSources,
    /// Adapter selection hint.
    pub gpu_power: GpuPowerPreference,
    /// GIF export parameters used by both the window and headless export.
    pub export: ExportSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1024, 768),
            configuration: Configuration::default(),
            image: None,
            shaders: ShaderSources::bundled(),
            gpu_power: GpuPowerPreference::default(),
            export: ExportSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, device_type: wgpu::DeviceType) -> AdapterProfile {
        AdapterProfile {
            name: name.to_string(),
            backend: wgpu::Backend::Vulkan,
            device_type,
        }
    }

    #[test]
    fn detects_software_adapters() {
        assert!(profile("llvmpipe (LLVM 17.0.6, 256 bits)", wgpu::DeviceType::Other).is_software());
        assert!(profile("Anything", wgpu::DeviceType::Cpu).is_software());
        assert!(!profile("AMD Radeon RX 7800 XT", wgpu::DeviceType::DiscreteGpu).is_software());
    }
}
