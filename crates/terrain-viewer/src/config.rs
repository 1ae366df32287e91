use clap::Parser;
use geoclipmap::{config::DEFAULT_HEIGHT_BIAS, ClipmapConfig};
use std::path::PathBuf;

/// `terrain_viewer` - Interactive geometry-clipmap viewer for a DEM draped
/// with georeferenced imagery.
///
/// With no `--dem`, an analytic dataset of `--synthetic` pixels per side is
/// generated instead.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// ESRI ASCII grid (`.asc`) holding the elevation model.
    #[arg(long, env = "TERRAIN_DEM")]
    pub dem: Option<PathBuf>,

    /// Colour image draped over the DEM, georeferenced by a world file
    /// (`.pgw`, `.jgw`, `.tfw` or `.wld`) next to it.
    ///
    /// Without it the DEM is coloured by height.
    #[arg(long, env = "TERRAIN_IMAGE")]
    pub image: Option<PathBuf>,

    /// Clipmap power k; every level is 2^k - 1 vertices per side.
    #[arg(long, default_value_t = 8)]
    pub clipmap_power: u32,

    /// Number of nested clipmap levels.
    #[arg(long, default_value_t = 6)]
    pub levels: u32,

    /// Z component of the shared world origin.
    #[arg(long, default_value_t = DEFAULT_HEIGHT_BIAS)]
    pub height_bias: f64,

    #[arg(long, default_value_t = 1.0)]
    pub vertical_exaggeration: f32,

    /// Side length in pixels of the generated dataset.
    #[arg(long, default_value_t = 1024)]
    pub synthetic: u32,
}

impl Config {
    pub fn clipmap(&self) -> ClipmapConfig {
        ClipmapConfig {
            vertical_exaggeration: self.vertical_exaggeration,
            ..ClipmapConfig::new(self.clipmap_power, self.levels).with_height_bias(self.height_bias)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library() {
        let config = Config::try_parse_from(["terrain_viewer"]).unwrap();
        assert!(config.dem.is_none());
        assert_eq!(config.clipmap(), ClipmapConfig::default());
        assert_eq!(config.synthetic, 1024);
    }

    #[test]
    fn flags_reach_clipmap_config() {
        let config = Config::try_parse_from([
            "terrain_viewer",
            "--dem",
            "alps.asc",
            "--clipmap-power",
            "6",
            "--levels",
            "4",
            "--height-bias",
            "250",
            "--vertical-exaggeration",
            "2.5",
        ])
        .unwrap();
        assert_eq!(config.dem, Some(PathBuf::from("alps.asc")));
        let clipmap = config.clipmap();
        assert_eq!((clipmap.power, clipmap.levels), (6, 4));
        assert_eq!(clipmap.height_bias, 250.0);
        assert_eq!(clipmap.vertical_exaggeration, 2.5);
    }
}
