//! Assembles the DEM + colour raster pair the terrain is built from.

use super::{ascii_grid, world_file};
use crate::config::Config;
use anyhow::{Context, Result};
use geoclipmap::{MemoryRaster, RasterSource};
use glam::DVec2;
use rayon::prelude::*;
use std::path::Path;

/// Colour bands never contain this; image pixels are all valid.
const COLOR_NO_DATA: f32 = -1.0;

/// Pixel size of the generated dataset.
const SYNTHETIC_PIXEL_M: f64 = 10.0;
/// Top-left of the generated dataset, a typical UTM easting/northing.
const SYNTHETIC_TOP_LEFT: DVec2 = DVec2::new(500_000.0, 5_620_000.0);

pub struct Dataset {
    pub name: String,
    pub dem: MemoryRaster,
    pub image: MemoryRaster,
}

impl Dataset {
    pub fn load(config: &Config) -> Result<Self> {
        let Some(dem_path) = config.dem.as_deref() else {
            log::info!(
                "No DEM given; generating a {0}x{0} synthetic dataset",
                config.synthetic
            );
            return synthetic(config.synthetic.max(2));
        };

        let dem = ascii_grid::load(dem_path)?;
        let image = match config.image.as_deref() {
            Some(path) => load_image(path)?,
            None => {
                log::info!("No image given; colouring the DEM by height");
                height_colors(&dem)?
            }
        };
        Ok(Self {
            name: dem_path.display().to_string(),
            dem,
            image,
        })
    }
}

/// Reads an RGB image and its world file into a three-band raster.
pub fn load_image(path: &Path) -> Result<MemoryRaster> {
    let georef = world_file::find_for(path)?;
    let rgb = image::open(path)
        .with_context(|| format!("decoding image {}", path.display()))?
        .to_rgb32f();
    let (cols, rows) = rgb.dimensions();
    log::info!(
        "Image {} {}x{} @ {:.3} m",
        path.display(),
        cols,
        rows,
        georef.a
    );
    let pixels = rgb.as_raw();
    let band = |channel: usize| -> Vec<f32> {
        pixels.par_chunks_exact(3).map(|px| px[channel]).collect()
    };
    Ok(MemoryRaster::new(cols, rows, georef.top_left(), georef.pixel_scale())
        .with_band(band(0), COLOR_NO_DATA)?
        .with_band(band(1), COLOR_NO_DATA)?
        .with_band(band(2), COLOR_NO_DATA)?)
}

/// Analytic rolling hills and a ridge, with a small no-data hole.
pub fn synthetic(size: u32) -> Result<Dataset> {
    let elevation = |col: u32, row: u32| -> f32 {
        let x = col as f64 * SYNTHETIC_PIXEL_M;
        let y = row as f64 * SYNTHETIC_PIXEL_M;
        let hills = 180.0 * (x / 1300.0).sin() * (y / 1700.0).cos();
        let ridge = 420.0 * (-((x - y * 0.6 - 2000.0) / 900.0).powi(2)).exp();
        let detail = 12.0 * (x / 90.0).sin() * (y / 110.0).sin();
        (600.0 + hills + ridge + detail) as f32
    };
    let hole_at = size / 4;
    let hole = (size / 64).max(1);

    let samples: Vec<f32> = (0..size)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..size).map(move |col| {
                if col.abs_diff(hole_at) < hole && row.abs_diff(hole_at) < hole {
                    ascii_grid::DEFAULT_NO_DATA
                } else {
                    elevation(col, row)
                }
            })
        })
        .collect();

    let dem = MemoryRaster::new(
        size,
        size,
        SYNTHETIC_TOP_LEFT,
        DVec2::splat(SYNTHETIC_PIXEL_M),
    )
    .with_band(samples, ascii_grid::DEFAULT_NO_DATA)?;
    let image = height_colors(&dem)?;
    Ok(Dataset {
        name: format!("synthetic {size}x{size}"),
        dem,
        image,
    })
}

/// Hypsometric tint of a DEM, on the DEM's own grid.
pub fn height_colors(dem: &MemoryRaster) -> Result<MemoryRaster> {
    let (cols, rows) = (dem.cols(), dem.rows());
    let no_data = dem.no_data_value(1)?;
    let heights = dem.read_block(1, 0, 0, cols as usize, rows as usize, 1, 1)?;

    let (lo, hi) = heights
        .par_iter()
        .copied()
        .filter(|&h| h != no_data && h.is_finite())
        .fold(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), h| (lo.min(h), hi.max(h)),
        )
        .reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );
    let lo = if lo.is_finite() { lo } else { 0.0 };
    let span = (hi - lo).max(1.0);

    let rgb: Vec<[f32; 3]> = heights
        .par_iter()
        .map(|&h| {
            if h == no_data || !h.is_finite() {
                [0.0, 0.0, 0.0]
            } else {
                tint((h - lo) / span)
            }
        })
        .collect();
    let band = |c: usize| rgb.iter().map(|px| px[c]).collect::<Vec<_>>();

    Ok(MemoryRaster::new(cols, rows, dem.top_left(), dem.pixel_scale())
        .with_band(band(0), COLOR_NO_DATA)?
        .with_band(band(1), COLOR_NO_DATA)?
        .with_band(band(2), COLOR_NO_DATA)?)
}

/// Green lowlands through brown slopes to white peaks.
fn tint(t: f32) -> [f32; 3] {
    const STOPS: [(f32, [f32; 3]); 4] = [
        (0.0, [0.20, 0.42, 0.22]),
        (0.45, [0.55, 0.58, 0.32]),
        (0.75, [0.52, 0.40, 0.28]),
        (1.0, [0.95, 0.95, 0.97]),
    ];
    let t = t.clamp(0.0, 1.0);
    for pair in STOPS.windows(2) {
        let ((t0, c0), (t1, c1)) = (pair[0], pair[1]);
        if t <= t1 {
            let s = (t - t0) / (t1 - t0);
            return [
                c0[0] + (c1[0] - c0[0]) * s,
                c0[1] + (c1[1] - c0[1]) * s,
                c0[2] + (c1[2] - c0[2]) * s,
            ];
        }
    }
    STOPS[3].1
}
