mod control;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use control::ControlChange;

/// Smallest configured scale accepted before the reciprocal is taken.
pub const MIN_SCALE: f32 = 1.0e-3;

/// Edge length of the square export surface when the config file is silent.
pub const DEFAULT_EXPORT_SIZE: u32 = 512;

/// Largest export edge accepted from the config file or the command line.
pub const MAX_EXPORT_SIZE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// User-facing transform parameters read by every rendered frame.
///
/// Fields are public for struct literals and serde. [`Configuration::apply`]
/// and the setters keep every field finite and the scale strictly positive;
/// direct writes skip those checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Highlight lattice cell boundaries in the shader.
    pub boundary: bool,
    /// Transform-parameter increment per second of animation (0 pauses).
    pub animation_speed: f32,
    /// Period of the lattice the image is tiled on.
    pub lattice_point: [f32; 2],
    /// Zoom-out factor; the shader receives its reciprocal.
    pub scale: f32,
    /// Translation of the affine map.
    pub translation: [f32; 2],
    /// Rotation of the affine map in degrees.
    pub rotation: f32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            boundary: false,
            animation_speed: 0.0,
            lattice_point: [1.0, 1.0],
            scale: 4.0,
            translation: [0.0, 0.0],
            rotation: 0.0,
        }
    }
}

impl Configuration {
    pub fn is_animating(&self) -> bool {
        self.animation_speed != 0.0
    }

    pub fn set_animation_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        self.animation_speed = finite("animation_speed", speed)?;
        Ok(())
    }

    pub fn set_lattice_point(&mut self, point: [f32; 2]) -> Result<(), ConfigError> {
        self.lattice_point = finite_pair("lattice_point", point)?;
        Ok(())
    }

    pub fn set_translation(&mut self, translation: [f32; 2]) -> Result<(), ConfigError> {
        self.translation = finite_pair("translation", translation)?;
        Ok(())
    }

    pub fn set_rotation(&mut self, degrees: f32) -> Result<(), ConfigError> {
        self.rotation = finite("rotation", degrees)?;
        Ok(())
    }

    /// Stores a new scale, clamping anything below [`MIN_SCALE`] up to it.
    pub fn set_scale(&mut self, scale: f32) -> Result<(), ConfigError> {
        self.scale = clamp_scale(finite("scale", scale)?);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        finite("animation_speed", self.animation_speed)?;
        finite_pair("lattice_point", self.lattice_point)?;
        finite_pair("translation", self.translation)?;
        finite("rotation", self.rotation)?;
        let scale = finite("scale", self.scale)?;
        if scale < MIN_SCALE {
            return Err(ConfigError::Invalid(format!(
                "scale must be at least {MIN_SCALE}, got {scale}"
            )));
        }
        Ok(())
    }
}

fn clamp_scale(scale: f32) -> f32 {
    scale.max(MIN_SCALE)
}

fn finite(field: &str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be a finite number, got {value}"
        )))
    }
}

fn finite_pair(field: &str, value: [f32; 2]) -> Result<[f32; 2], ConfigError> {
    finite(field, value[0])?;
    finite(field, value[1])?;
    Ok(value)
}

/// Export section of the config file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub size: Option<u32>,
    pub output: Option<PathBuf>,
}

/// On-disk TOML document (`view.toml`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFile {
    pub view: Configuration,
    pub export: ExportSection,
}

impl ViewFile {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewFile = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn configuration(&self) -> Configuration {
        self.view.clone()
    }

    pub fn export_size(&self) -> u32 {
        self.export.size.unwrap_or(DEFAULT_EXPORT_SIZE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.view.validate()?;
        if let Some(size) = self.export.size {
            if size == 0 || size > MAX_EXPORT_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "export.size must be between 1 and {MAX_EXPORT_SIZE}, got {size}"
                )));
            }
        }
        if let Some(output) = &self.export.output {
            if output.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("export.output may not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[view]
boundary = true
animation_speed = 0.5
lattice_point = [2.0, 1]
scale = 2.0
translation = [1.0, 0.0]
rotation = 90

[export]
size = 256
output = "spiral.gif"
"#;

    #[test]
    fn parses_sample_config() {
        let file = ViewFile::from_toml_str(SAMPLE).expect("parse config");
        let config = file.configuration();
        assert!(config.boundary);
        assert_eq!(config.animation_speed, 0.5);
        assert_eq!(config.lattice_point, [2.0, 1.0]);
        assert_eq!(config.scale, 2.0);
        assert_eq!(config.translation, [1.0, 0.0]);
        assert_eq!(config.rotation, 90.0);
        assert_eq!(file.export_size(), 256);
        assert_eq!(file.export.output, Some(PathBuf::from("spiral.gif")));
    }

    #[test]
    fn empty_document_uses_viewer_defaults() {
        let file = ViewFile::from_toml_str("").expect("parse empty config");
        assert_eq!(file.configuration(), Configuration::default());
        assert_eq!(file.export_size(), DEFAULT_EXPORT_SIZE);
    }

    #[test]
    fn rejects_zero_scale() {
        let err = ViewFile::from_toml_str("[view]\nscale = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_oversized_export() {
        let err = ViewFile::from_toml_str("[export]\nsize = 100000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ViewFile::from_toml_str("[view\nscale = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn set_scale_clamps_to_minimum() {
        let mut config = Configuration::default();
        config.set_scale(0.0).unwrap();
        assert_eq!(config.scale, MIN_SCALE);
        config.set_scale(-3.0).unwrap();
        assert_eq!(config.scale, MIN_SCALE);
        assert!(config.set_scale(f32::NAN).is_err());
        assert_eq!(config.scale, MIN_SCALE);
    }

    #[test]
    fn setters_reject_non_finite_values() {
        let mut config = Configuration::default();
        assert!(config.set_rotation(f32::INFINITY).is_err());
        assert!(config.set_translation([0.0, f32::NAN]).is_err());
        assert!(config.set_lattice_point([f32::NEG_INFINITY, 1.0]).is_err());
        assert!(config.set_animation_speed(f32::NAN).is_err());
        assert_eq!(config, Configuration::default());
    }
}
