use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dpi::{LogicalSize, PhysicalSize};
use lumen_core::{EdgeThresholds, PipelineConfig};
use lumen_render::{Rotation, SensorOrientation};

pub const DEFAULT_PATTERN_FRAME_RATE: u32 = 30;

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Synthetic moving color bars
    Pattern,
    /// A YUV4MPEG2 file, played in a loop
    Y4m,
}

#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    #[clap(long, value_enum, default_value_t = SourceKind::Pattern)]
    pub source: SourceKind,
    /// Y4M file to play with `--source y4m`
    #[clap(long, required_if_eq("source", "y4m"))]
    pub input: Option<PathBuf>,

    /// Test pattern frame width
    #[clap(long, default_value_t = 1280, value_parser = parse_even)]
    pub width: u32,
    /// Test pattern frame height
    #[clap(long, default_value_t = 720, value_parser = parse_even)]
    pub height: u32,
    /// Frames per second to pace the source to, 0 to run unpaced [default: 30, or the rate in the Y4M header]
    #[clap(long)]
    pub frame_rate: Option<u32>,
    /// Bytes appended to every test pattern row
    #[clap(long, default_value_t = 64)]
    pub row_padding: usize,
    /// Maximum number of sensor frames in flight
    #[clap(long, default_value_t = 2, value_parser = parse_nonzero)]
    pub pool_size: usize,

    /// Weight of the newest sample in the FPS average, in (0, 1]
    #[clap(long, default_value_t = 0.1, value_parser = parse_smoothing)]
    pub smoothing: f64,

    /// Sensor rotation relative to the display, in degrees clockwise
    #[clap(long, default_value = "0", value_parser = parse_rotation)]
    pub rotation: Rotation,
    /// Mirror the image horizontally
    #[clap(long)]
    pub mirror: bool,

    /// Start with edge detection disabled
    #[clap(long)]
    pub effect_off: bool,
    #[clap(long, default_value_t = 50)]
    pub edge_low: u32,
    #[clap(long, default_value_t = 150)]
    pub edge_high: u32,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            smoothing: self.smoothing,
            effect_enabled: !self.effect_off,
            edge_thresholds: EdgeThresholds {
                low: self.edge_low,
                high: self.edge_high,
            },
        }
    }

    pub fn orientation(&self) -> SensorOrientation {
        SensorOrientation {
            rotation: self.rotation,
            mirror: self.mirror,
        }
    }

    pub fn pattern_size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width, self.height)
    }
}

/// Window size that shows a `frame_size` frame upright at its native size.
pub fn window_size(frame_size: PhysicalSize<u32>, orientation: SensorOrientation) -> LogicalSize<u32> {
    if orientation.swaps_axes() {
        LogicalSize::new(frame_size.height, frame_size.width)
    } else {
        LogicalSize::new(frame_size.width, frame_size.height)
    }
}

fn parse_even(value: &str) -> Result<u32, String> {
    let value: u32 = value.parse().map_err(|e| format!("{}", e))?;
    if value == 0 || value % 2 != 0 {
        return Err(format!("{} is not a positive even number", value));
    }
    Ok(value)
}

fn parse_nonzero(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(e) => Err(format!("{}", e)),
    }
}

fn parse_smoothing(value: &str) -> Result<f64, String> {
    let value: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if !(value > 0.0 && value <= 1.0) {
        return Err(format!("{} is not in (0, 1]", value));
    }
    Ok(value)
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: u32 = value.parse().map_err(|e| format!("{}", e))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("{} is not one of 0, 90, 180, 270", degrees))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::{CommandFactory, error::ErrorKind};

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("lumen").chain(args.iter().copied()))
    }

    #[test]
    fn test_command() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();

        assert_eq!(cli.source, SourceKind::Pattern);
        assert_eq!(cli.pattern_size(), PhysicalSize::new(1280, 720));
        assert_eq!(cli.frame_rate, None);
        assert_eq!(cli.row_padding, 64);
        assert_eq!(cli.pool_size, 2);
        assert_eq!(cli.orientation(), SensorOrientation::default());
        assert_eq!(cli.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn test_y4m_needs_input() {
        assert_matches!(
            parse(&["--source", "y4m"]),
            Err(e) if e.kind() == ErrorKind::MissingRequiredArgument
        );

        let cli = parse(&["--source", "y4m", "--input", "clip.y4m"]).unwrap();
        assert_eq!(cli.source, SourceKind::Y4m);
        assert_eq!(cli.input, Some(PathBuf::from("clip.y4m")));
    }

    #[test]
    fn test_invalid_values() {
        for args in [
            &["--width", "641"][..],
            &["--height", "0"],
            &["--pool-size", "0"],
            &["--smoothing", "0"],
            &["--smoothing", "1.5"],
            &["--rotation", "45"],
        ] {
            assert_matches!(
                parse(args),
                Err(e) if e.kind() == ErrorKind::ValueValidation,
                "{:?}",
                args
            );
        }
    }

    #[test]
    fn test_config_mapping() {
        let cli = parse(&[
            "--effect-off",
            "--smoothing",
            "0.5",
            "--edge-low",
            "20",
            "--edge-high",
            "80",
            "--rotation",
            "90",
            "--mirror",
        ])
        .unwrap();

        assert_eq!(
            cli.pipeline_config(),
            PipelineConfig {
                smoothing: 0.5,
                effect_enabled: false,
                edge_thresholds: EdgeThresholds { low: 20, high: 80 },
            }
        );
        assert_eq!(
            cli.orientation(),
            SensorOrientation {
                rotation: Rotation::Deg90,
                mirror: true,
            }
        );
        assert_eq!(
            window_size(cli.pattern_size(), cli.orientation()),
            LogicalSize::new(720, 1280)
        );
    }
}
