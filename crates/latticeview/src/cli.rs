use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::GpuPowerPreference;
use viewconfig::MAX_EXPORT_SIZE;

#[derive(Parser, Debug)]
#[command(
    name = "latticeview",
    author,
    version,
    about = "Lattice fractal image viewer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub view: ViewArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct ViewArgs {
    /// View configuration TOML (defaults to `view.toml` in the config directory).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Image to display; a placeholder checkerboard is used when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    pub image: Option<PathBuf>,

    /// Directory holding `shader.vert` and `shader.frag` to use instead of the bundled pair.
    #[arg(long, value_name = "DIR", global = true)]
    pub shader_dir: Option<PathBuf>,

    /// Window size in physical pixels (e.g. `1024x768`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, global = true)]
    pub size: Option<(u32, u32)>,

    /// Highlight lattice cell boundaries.
    #[arg(long, global = true)]
    pub boundary: bool,

    /// Animation speed in transform units per second (0 pauses).
    #[arg(long, value_name = "SPEED", allow_negative_numbers = true, global = true)]
    pub speed: Option<f32>,

    /// Lattice period as `X,Y`.
    #[arg(long, value_name = "X,Y", value_parser = parse_pair, allow_hyphen_values = true, global = true)]
    pub lattice: Option<[f32; 2]>,

    /// Zoom-out factor of the affine map.
    #[arg(long, value_name = "SCALE", global = true)]
    pub scale: Option<f32>,

    /// Translation of the affine map as `X,Y`.
    #[arg(long, value_name = "X,Y", value_parser = parse_pair, allow_hyphen_values = true, global = true)]
    pub translation: Option<[f32; 2]>,

    /// Rotation of the affine map in degrees.
    #[arg(long, value_name = "DEGREES", allow_negative_numbers = true, global = true)]
    pub rotation: Option<f32>,

    /// Adapter preference: `low` (integrated) or `high` (discrete).
    #[arg(long, value_name = "POWER", value_parser = parse_gpu_power, global = true)]
    pub gpu_power: Option<GpuPowerPreference>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a one-second looping GIF without opening a window.
    Export(ExportArgs),
    /// Compile and introspect the shader pair without touching the GPU.
    Check,
}

#[derive(Parser, Debug, Default)]
pub struct ExportArgs {
    /// Output GIF path.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Edge length of the square export in pixels.
    #[arg(
        long,
        value_name = "PIXELS",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_EXPORT_SIZE))
    )]
    pub export_size: Option<u32>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_pair(value: &str) -> Result<[f32; 2], String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| "expected X,Y".to_string())?;
    let parse = |part: &str| {
        let part = part.trim();
        match part.parse::<f32>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(format!("invalid number '{part}'")),
        }
    };
    Ok([parse(x)?, parse(y)?])
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power preference '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn parses_window_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 640X480 ").unwrap(), (640, 480));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("widex720").is_err());
    }

    #[test]
    fn parses_coordinate_pairs() {
        assert_eq!(parse_pair("1,1").unwrap(), [1.0, 1.0]);
        assert_eq!(parse_pair("-0.5, 2.25").unwrap(), [-0.5, 2.25]);
        assert!(parse_pair("1").is_err());
        assert!(parse_pair("1,nan").is_err());
        assert!(parse_pair("a,b").is_err());
    }

    #[test]
    fn parses_gpu_power() {
        assert_eq!(parse_gpu_power("LOW").unwrap(), GpuPowerPreference::Low);
        assert_eq!(parse_gpu_power("discrete").unwrap(), GpuPowerPreference::High);
        assert!(parse_gpu_power("medium").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_view_flags_reach_subcommands() {
        let cli = Cli::try_parse_from([
            "latticeview",
            "export",
            "--scale",
            "2",
            "--translation",
            "-1,0.5",
            "--export-size",
            "128",
        ])
        .unwrap();
        assert_eq!(cli.view.scale, Some(2.0));
        assert_eq!(cli.view.translation, Some([-1.0, 0.5]));
        match cli.command {
            Some(Command::Export(args)) => assert_eq!(args.export_size, Some(128)),
            other => panic!("expected export command, got {other:?}"),
        }
    }

    #[test]
    fn rejects_oversized_export() {
        assert!(Cli::try_parse_from(["latticeview", "export", "--export-size", "5000"]).is_err());
    }
}
