//! Raster access: the dataset boundary, windowed decimated reads, and
//! world-space elevation / colour lookup over the resident sample buffers.
//!
//! Band indices are 1-based, matching the usual raster-library convention.

use crate::error::RasterError;
use glam::{DVec2, IVec2, Vec2};

/// A georeferenced, pixel-addressable raster dataset.
///
/// World coordinates grow east (x) and north (y); rows grow south.
pub trait RasterSource {
    fn cols(&self) -> u32;
    fn rows(&self) -> u32;
    fn band_count(&self) -> usize;
    /// World units per pixel, both components positive.
    fn pixel_scale(&self) -> DVec2;
    /// World coordinate of the top-left corner of pixel (0, 0).
    fn top_left(&self) -> DVec2;
    fn no_data_value(&self, band: usize) -> Result<f32, RasterError>;

    /// Reads `width x height` output samples starting at pixel `(x0, y0)`,
    /// taking every `step_x`-th column and `step_y`-th row. The caller
    /// guarantees the sampled pixels are inside the raster.
    fn read_block(
        &self,
        band: usize,
        x0: u32,
        y0: u32,
        width: usize,
        height: usize,
        step_x: u32,
        step_y: u32,
    ) -> Result<Vec<f32>, RasterError>;
}

/// Reads the pixel window `[x0, xf] x [y0, yf]` into an `out_n x out_m`
/// row-major array.
///
/// Output cell `(i, j)` samples source pixel `(x0 + i*sx, y0 + j*sy)` where
/// `sx = (xf - x0 + 1) / out_n` and `sy = (yf - y0 + 1) / out_m` (stride
/// subsampling, no averaging). Cells that land outside the raster are filled
/// with the band's no-data sentinel. `offset` is subtracted from valid
/// samples only; source no-data samples keep the raw sentinel.
#[allow(clippy::too_many_arguments)]
pub fn read_window<R: RasterSource + ?Sized>(
    raster: &R,
    band: usize,
    x0: i64,
    xf: i64,
    y0: i64,
    yf: i64,
    out_n: usize,
    out_m: usize,
    offset: f32,
) -> Result<Vec<f32>, RasterError> {
    let invalid = || RasterError::InvalidWindow {
        x0,
        xf,
        y0,
        yf,
        out_n,
        out_m,
    };
    if out_n == 0 || out_m == 0 || xf < x0 || yf < y0 {
        return Err(invalid());
    }
    let sx = (xf - x0 + 1) / out_n as i64;
    let sy = (yf - y0 + 1) / out_m as i64;
    if sx == 0 || sy == 0 {
        return Err(invalid());
    }

    let no_data = raster.no_data_value(band)?;
    let (i_range, j_range) = (
        valid_cells(x0, sx, out_n, raster.cols()),
        valid_cells(y0, sy, out_m, raster.rows()),
    );

    let mut out = vec![no_data; out_n * out_m];
    let (Some((i0, i1)), Some((j0, j1))) = (i_range, j_range) else {
        return Ok(out);
    };

    let block = raster.read_block(
        band,
        (x0 + i0 as i64 * sx) as u32,
        (y0 + j0 as i64 * sy) as u32,
        i1 - i0,
        j1 - j0,
        sx as u32,
        sy as u32,
    )?;
    let width = i1 - i0;
    if block.len() != width * (j1 - j0) {
        return Err(RasterError::SizeMismatch {
            expected: width * (j1 - j0),
            actual: block.len(),
        });
    }

    for (row, j) in (j0..j1).enumerate() {
        let src = &block[row * width..(row + 1) * width];
        let dst = &mut out[j * out_n + i0..j * out_n + i1];
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = if s == no_data { s } else { s - offset };
        }
    }
    Ok(out)
}

/// Half-open range of output cells whose sampled pixel lies in `[0, len)`.
fn valid_cells(start: i64, step: i64, count: usize, len: u32) -> Option<(usize, usize)> {
    let len = len as i64;
    // First cell with start + i*step >= 0.
    let first = if start >= 0 { 0 } else { (-start + step - 1) / step };
    // One past the last cell with start + i*step < len.
    let end = if start >= len {
        0
    } else {
        (len - 1 - start) / step + 1
    };
    let end = end.min(count as i64);
    (first < end).then(|| (first as usize, end as usize))
}

/// An in-memory multi-band raster.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    cols: u32,
    rows: u32,
    top_left: DVec2,
    pixel_scale: DVec2,
    bands: Vec<Vec<f32>>,
    no_data: Vec<f32>,
}

impl MemoryRaster {
    pub fn new(cols: u32, rows: u32, top_left: DVec2, pixel_scale: DVec2) -> Self {
        Self {
            cols,
            rows,
            top_left,
            pixel_scale,
            bands: Vec::new(),
            no_data: Vec::new(),
        }
    }

    /// Appends a band of `cols * rows` row-major samples.
    pub fn push_band(&mut self, data: Vec<f32>, no_data: f32) -> Result<usize, RasterError> {
        let expected = self.cols as usize * self.rows as usize;
        if data.len() != expected {
            return Err(RasterError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        self.bands.push(data);
        self.no_data.push(no_data);
        Ok(self.bands.len())
    }

    pub fn with_band(mut self, data: Vec<f32>, no_data: f32) -> Result<Self, RasterError> {
        self.push_band(data, no_data)?;
        Ok(self)
    }

    /// Builds a band by evaluating `f(col, row)` for every pixel.
    pub fn with_band_fn<F>(self, no_data: f32, f: F) -> Result<Self, RasterError>
    where
        F: Fn(u32, u32) -> f32,
    {
        let mut data = Vec::with_capacity(self.cols as usize * self.rows as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                data.push(f(col, row));
            }
        }
        self.with_band(data, no_data)
    }

    fn band(&self, band: usize) -> Result<&[f32], RasterError> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .map(Vec::as_slice)
            .ok_or(RasterError::BandOutOfRange {
                band,
                count: self.bands.len(),
            })
    }
}

impl RasterSource for MemoryRaster {
    fn cols(&self) -> u32 {
        self.cols
    }

    fn rows(&self) -> u32 {
        self.rows
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn pixel_scale(&self) -> DVec2 {
        self.pixel_scale
    }

    fn top_left(&self) -> DVec2 {
        self.top_left
    }

    fn no_data_value(&self, band: usize) -> Result<f32, RasterError> {
        self.band(band)?;
        Ok(self.no_data[band - 1])
    }

    fn read_block(
        &self,
        band: usize,
        x0: u32,
        y0: u32,
        width: usize,
        height: usize,
        step_x: u32,
        step_y: u32,
    ) -> Result<Vec<f32>, RasterError> {
        let data = self.band(band)?;
        let cols = self.cols as usize;
        let mut out = Vec::with_capacity(width * height);
        for j in 0..height {
            let row = y0 as usize + j * step_y as usize;
            for i in 0..width {
                let col = x0 as usize + i * step_x as usize;
                if col >= cols || row >= self.rows as usize {
                    return Err(RasterError::InvalidWindow {
                        x0: col as i64,
                        xf: col as i64,
                        y0: row as i64,
                        yf: row as i64,
                        out_n: width,
                        out_m: height,
                    });
                }
                out.push(data[row * cols + col]);
            }
        }
        Ok(out)
    }
}

/// Resident elevation samples in world space (offset already applied).
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    /// World-space position of the raster's top-left corner.
    pub upper_left: Vec2,
    pub pixel_scale: Vec2,
    pub cols: u32,
    pub rows: u32,
    pub no_data: f32,
    pub samples: Vec<f32>,
}

impl ElevationGrid {
    /// Maps a world position to the containing pixel. The result may lie
    /// outside the raster; callers bounds-check it.
    pub fn world_to_pixel(&self, world: Vec2) -> IVec2 {
        world_to_pixel(self.upper_left, self.pixel_scale, world)
    }

    /// World position of the centre of pixel `(col, row)`.
    pub fn pixel_to_world(&self, col: u32, row: u32) -> Vec2 {
        Vec2::new(
            self.upper_left.x + (col as f32 + 0.5) * self.pixel_scale.x,
            self.upper_left.y - (row as f32 + 0.5) * self.pixel_scale.y,
        )
    }

    pub fn index_of(&self, world: Vec2) -> Option<usize> {
        lookup_index(self.upper_left, self.pixel_scale, world, self.cols, self.rows)
    }

    /// Elevation under `world`, or `None` outside the raster or on no-data.
    pub fn elevation_at(&self, world: Vec2) -> Option<f32> {
        let value = *self.samples.get(self.index_of(world)?)?;
        (value != self.no_data && !value.is_nan()).then_some(value)
    }
}

/// Resident colour samples (bands 1..=3 of the image raster).
#[derive(Debug, Clone)]
pub struct ColorGrid {
    pub upper_left: Vec2,
    pub pixel_scale: Vec2,
    pub cols: u32,
    pub rows: u32,
    pub no_data: [f32; 3],
    pub reds: Vec<f32>,
    pub greens: Vec<f32>,
    pub blues: Vec<f32>,
}

impl ColorGrid {
    pub fn color_at(&self, world: Vec2) -> Option<[f32; 3]> {
        let i = lookup_index(self.upper_left, self.pixel_scale, world, self.cols, self.rows)?;
        let rgb = [
            *self.reds.get(i)?,
            *self.greens.get(i)?,
            *self.blues.get(i)?,
        ];
        (rgb != self.no_data).then_some(rgb)
    }
}

/// `col = (x - ul.x) / sx`, `row = (ul.y - y) / sy` (row axis points south).
#[inline]
pub fn world_to_pixel(upper_left: Vec2, pixel_scale: Vec2, world: Vec2) -> IVec2 {
    IVec2::new(
        ((world.x - upper_left.x) / pixel_scale.x).floor() as i32,
        ((upper_left.y - world.y) / pixel_scale.y).floor() as i32,
    )
}

/// Row-major sample index under `world`. NaN casts to pixel 0, so
/// non-finite queries are rejected before the mapping.
#[inline]
fn lookup_index(upper_left: Vec2, pixel_scale: Vec2, world: Vec2, cols: u32, rows: u32) -> Option<usize> {
    if !world.is_finite() {
        return None;
    }
    pixel_index(world_to_pixel(upper_left, pixel_scale, world), cols, rows)
}

#[inline]
fn pixel_index(pixel: IVec2, cols: u32, rows: u32) -> Option<usize> {
    let inside = pixel.x >= 0 && pixel.y >= 0 && (pixel.x as u32) < cols && (pixel.y as u32) < rows;
    inside.then(|| pixel.y as usize * cols as usize + pixel.x as usize)
}
