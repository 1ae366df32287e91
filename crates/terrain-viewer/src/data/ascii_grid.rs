//! ESRI ASCII grid (`.asc`) elevation models.
//!
//! ```text
//! ncols        4
//! nrows        3
//! xllcorner    500000.0
//! yllcorner    5600000.0
//! cellsize     10.0
//! NODATA_value -9999
//! 12.0 13.5 ...        (nrows lines, northernmost first)
//! ```

use anyhow::{anyhow, bail, Context, Result};
use geoclipmap::MemoryRaster;
use glam::DVec2;
use std::path::Path;

pub const DEFAULT_NO_DATA: f32 = -9999.0;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<u32>,
    nrows: Option<u32>,
    xll: Option<(f64, bool)>,
    yll: Option<(f64, bool)>,
    cell: Option<DVec2>,
    no_data: Option<f32>,
}

pub fn load(path: &Path) -> Result<MemoryRaster> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading DEM {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing ESRI ASCII grid {}", path.display()))
}

pub fn parse(text: &str) -> Result<MemoryRaster> {
    let mut header = Header::default();
    let mut tokens = text.split_whitespace().peekable();

    while let Some(key) = tokens.next_if(|t| t.starts_with(|c: char| c.is_ascii_alphabetic())) {
        let value = tokens
            .next()
            .ok_or_else(|| anyhow!("header key '{}' has no value", key))?;
        let num = || -> Result<f64> {
            value
                .parse::<f64>()
                .with_context(|| format!("header '{}' = '{}'", key, value))
        };
        match key.to_ascii_lowercase().as_str() {
            "ncols" => header.ncols = Some(num()? as u32),
            "nrows" => header.nrows = Some(num()? as u32),
            "xllcorner" => header.xll = Some((num()?, false)),
            "xllcenter" => header.xll = Some((num()?, true)),
            "yllcorner" => header.yll = Some((num()?, false)),
            "yllcenter" => header.yll = Some((num()?, true)),
            "cellsize" => header.cell = Some(DVec2::splat(num()?)),
            "dx" => {
                let dx = num()?;
                header.cell = Some(DVec2::new(dx, header.cell.map_or(dx, |c| c.y)));
            }
            "dy" => {
                let dy = num()?;
                header.cell = Some(DVec2::new(header.cell.map_or(dy, |c| c.x), dy));
            }
            "nodata_value" => header.no_data = Some(num()? as f32),
            other => log::warn!("Ignoring unknown ASCII grid header '{}'", other),
        }
    }

    let cols = header.ncols.ok_or_else(|| anyhow!("missing ncols"))?;
    let rows = header.nrows.ok_or_else(|| anyhow!("missing nrows"))?;
    let (xll, x_centre) = header.xll.ok_or_else(|| anyhow!("missing xllcorner"))?;
    let (yll, y_centre) = header.yll.ok_or_else(|| anyhow!("missing yllcorner"))?;
    let cell = header.cell.ok_or_else(|| anyhow!("missing cellsize"))?;
    if cols == 0 || rows == 0 {
        bail!("empty grid ({}x{})", cols, rows);
    }
    if !(cell.x > 0.0 && cell.y > 0.0) {
        bail!("cell size must be positive, got ({}, {})", cell.x, cell.y);
    }
    let no_data = header.no_data.unwrap_or(DEFAULT_NO_DATA);

    let left = if x_centre { xll - cell.x * 0.5 } else { xll };
    let bottom = if y_centre { yll - cell.y * 0.5 } else { yll };
    let top_left = DVec2::new(left, bottom + rows as f64 * cell.y);

    let expected = (cols as usize)
        .checked_mul(rows as usize)
        .ok_or_else(|| anyhow!("grid {}x{} is too large to address", cols, rows))?;
    // The header is untrusted; reserve no more than the text can hold.
    let mut samples = Vec::with_capacity(expected.min(text.len() / 2 + 1));
    for token in tokens {
        let value: f32 = token
            .parse()
            .with_context(|| format!("sample {} ('{}')", samples.len(), token))?;
        samples.push(value);
    }
    if samples.len() != expected {
        bail!(
            "grid declares {}x{} = {} samples but holds {}",
            cols,
            rows,
            expected,
            samples.len()
        );
    }

    log::info!(
        "ASCII grid {}x{} @ {:.3} m, top-left ({:.3}, {:.3})",
        cols,
        rows,
        cell.x,
        top_left.x,
        top_left.y
    );
    Ok(MemoryRaster::new(cols, rows, top_left, cell).with_band(samples, no_data)?)
}
