use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use renderer::{
    check_shaders, ExportSettings, ProgramInterface, Renderer, RendererConfig, ShaderSources,
};
use tracing_subscriber::EnvFilter;
use viewconfig::{Configuration, ControlChange, ViewFile};

use crate::cli::{ExportArgs, ViewArgs};
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Opens the interactive viewer.
pub fn run_window(args: &ViewArgs) -> Result<()> {
    let file = load_view_file(args)?;
    let config = renderer_config(args, &file, None)?;
    tracing::info!(
        image = ?config.image,
        shaders = %config.shaders.origin,
        gpu_power = %config.gpu_power,
        "starting lattice viewer"
    );
    Renderer::new(config).run()
}

/// Writes a GIF and exits.
pub fn run_export(args: &ViewArgs, export: &ExportArgs) -> Result<()> {
    let file = load_view_file(args)?;
    let config = renderer_config(args, &file, Some(export))?;
    let report = Renderer::new(config).export()?;
    println!(
        "Wrote {} frames to {}",
        report.frames,
        report.output.display()
    );
    Ok(())
}

/// Compiles the shader pair and prints its slot table.
pub fn run_check(args: &ViewArgs) -> Result<()> {
    let sources = shader_sources(args)?;
    let interface = check_shaders(&sources)
        .with_context(|| format!("shader check failed ({})", sources.origin))?;
    println!("Shaders: {}", sources.origin);
    print!("{}", describe_interface(&interface));
    Ok(())
}

fn describe_interface(interface: &ProgramInterface) -> String {
    let mut out = String::new();
    out.push_str("Uniforms:\n");
    for slot in &interface.uniforms {
        out.push_str(&format!("  {:<16} {}\n", slot.name, slot.kind));
    }
    out.push_str("Attributes:\n");
    for attribute in &interface.attributes {
        out.push_str(&format!(
            "  location={:<3} {:<16} {}\n",
            attribute.location, attribute.name, attribute.ty
        ));
    }
    out
}

fn load_view_file(args: &ViewArgs) -> Result<ViewFile> {
    if let Some(path) = &args.config {
        return read_view_file(path);
    }

    let paths = match AppPaths::discover() {
        Ok(paths) => paths,
        Err(err) => {
            tracing::warn!(error = %err, "no config directory; using built-in defaults");
            return Ok(ViewFile::default());
        }
    };
    let path = paths.config_file();
    if path.is_file() {
        read_view_file(&path)
    } else {
        tracing::debug!(
            config_dir = %paths.config_dir().display(),
            "no view.toml found; using built-in defaults"
        );
        Ok(ViewFile::default())
    }
}

fn read_view_file(path: &Path) -> Result<ViewFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let file = ViewFile::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded view configuration");
    Ok(file)
}

fn shader_sources(args: &ViewArgs) -> Result<ShaderSources> {
    match &args.shader_dir {
        Some(dir) => ShaderSources::from_dir(dir)
            .with_context(|| format!("failed to load shaders from {}", dir.display())),
        None => Ok(ShaderSources::bundled()),
    }
}

/// Layers CLI flags over the config file over built-in defaults.
fn configuration(args: &ViewArgs, file: &ViewFile) -> Result<Configuration> {
    let mut configuration = file.configuration();
    if args.boundary {
        configuration.apply(ControlChange::SetBoundary(true))?;
    }
    if let Some(speed) = args.speed {
        configuration.set_animation_speed(speed)?;
    }
    if let Some(lattice) = args.lattice {
        configuration.set_lattice_point(lattice)?;
    }
    if let Some(scale) = args.scale {
        configuration.set_scale(scale)?;
        if configuration.scale != scale {
            tracing::warn!(
                requested = scale,
                applied = configuration.scale,
                "scale below the minimum; clamped"
            );
        }
    }
    if let Some(translation) = args.translation {
        configuration.set_translation(translation)?;
    }
    if let Some(rotation) = args.rotation {
        configuration.set_rotation(rotation)?;
    }
    Ok(configuration)
}

fn renderer_config(
    args: &ViewArgs,
    file: &ViewFile,
    export: Option<&ExportArgs>,
) -> Result<RendererConfig> {
    let defaults = RendererConfig::default();

    let mut export_settings = ExportSettings {
        size: file.export_size(),
        ..ExportSettings::default()
    };
    if let Some(output) = &file.export.output {
        export_settings.output = output.clone();
    }
    if let Some(export) = export {
        if let Some(size) = export.export_size {
            export_settings.size = size;
        }
        if let Some(output) = &export.output {
            export_settings.output = output.clone();
        }
    }

    Ok(RendererConfig {
        surface_size: args.size.unwrap_or(defaults.surface_size),
        configuration: configuration(args, file)?,
        image: args.image.clone(),
        shaders: shader_sources(args)?,
        gpu_power: args.gpu_power.unwrap_or(defaults.gpu_power),
        export: export_settings,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn file(text: &str) -> ViewFile {
        ViewFile::from_toml_str(text).unwrap()
    }

    #[test]
    fn cli_flags_override_config_file() {
        let file = file("[view]\nscale = 3.0\nrotation = 10.0\nanimation_speed = 0.5\n");
        let args = ViewArgs {
            scale: Some(2.0),
            boundary: true,
            ..ViewArgs::default()
        };
        let configuration = configuration(&args, &file).unwrap();
        assert_eq!(configuration.scale, 2.0);
        assert_eq!(configuration.rotation, 10.0);
        assert_eq!(configuration.animation_speed, 0.5);
        assert!(configuration.boundary);
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let configuration = configuration(&ViewArgs::default(), &ViewFile::default()).unwrap();
        assert_eq!(configuration, Configuration::default());
    }

    #[test]
    fn tiny_scale_flag_is_clamped() {
        let args = ViewArgs {
            scale: Some(0.0),
            ..ViewArgs::default()
        };
        let configuration = configuration(&args, &ViewFile::default()).unwrap();
        assert_eq!(configuration.scale, viewconfig::MIN_SCALE);
    }

    #[test]
    fn export_settings_layer_in_order() {
        let file = file("[export]\nsize = 256\noutput = \"from-file.gif\"\n");
        let args = ViewArgs::default();

        let config = renderer_config(&args, &file, None).unwrap();
        assert_eq!(config.export.size, 256);
        assert_eq!(config.export.output, PathBuf::from("from-file.gif"));

        let export = ExportArgs {
            output: Some(PathBuf::from("cli.gif")),
            export_size: None,
        };
        let config = renderer_config(&args, &file, Some(&export)).unwrap();
        assert_eq!(config.export.size, 256);
        assert_eq!(config.export.output, PathBuf::from("cli.gif"));
    }

    #[test]
    fn config_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.toml");
        fs::write(&path, "[view]\nscale = 0.0\n").unwrap();
        let err = read_view_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("view.toml"));
    }

    #[test]
    fn bundled_interface_lists_abi_names() {
        let interface = check_shaders(&ShaderSources::bundled()).unwrap();
        let table = describe_interface(&interface);
        for name in ["uScale", "uTexture", "uLatticePoint", "vertexPosition"] {
            assert!(table.contains(name), "missing {name} in\n{table}");
        }
    }
}
