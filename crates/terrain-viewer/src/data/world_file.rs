//! World files (`.pgw`, `.jgw`, `.tfw`, `.wld`): the six-line affine
//! georeference that sits next to a plain raster image.

use anyhow::{bail, Context, Result};
use glam::DVec2;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    /// Line 1: x size of a pixel.
    pub a: f64,
    /// Line 2: rotation about y.
    pub d: f64,
    /// Line 3: rotation about x.
    pub b: f64,
    /// Line 4: y size of a pixel, negative for north-up images.
    pub e: f64,
    /// Lines 5, 6: centre of the upper-left pixel.
    pub c: f64,
    pub f: f64,
}

impl WorldFile {
    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split_whitespace()
            .map(|t| t.parse::<f64>().with_context(|| format!("world file value '{}'", t)))
            .collect::<Result<Vec<_>>>()?;
        let [a, d, b, e, c, f] = values[..] else {
            bail!("world file needs 6 values, found {}", values.len());
        };
        if d != 0.0 || b != 0.0 {
            bail!("rotated world files are not supported (terms {}, {})", d, b);
        }
        if a <= 0.0 || e == 0.0 {
            bail!("degenerate pixel size ({}, {})", a, e);
        }
        Ok(Self { a, d, b, e, c, f })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading world file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing world file {}", path.display()))
    }

    pub fn pixel_scale(&self) -> DVec2 {
        DVec2::new(self.a, self.e.abs())
    }

    /// Outer corner of the upper-left pixel.
    pub fn top_left(&self) -> DVec2 {
        DVec2::new(self.c - self.a * 0.5, self.f + self.e.abs() * 0.5)
    }
}

/// Candidate sidecar paths for `image`, most specific first: `photo.png`
/// gives `photo.pgw`, `photo.pngw`, `photo.wld`.
pub fn sidecar_candidates(image: &Path) -> Vec<PathBuf> {
    let Some(ext) = image.extension().and_then(|e| e.to_str()) else {
        return vec![image.with_extension("wld")];
    };
    let mut chars = ext.chars();
    let mut out = Vec::with_capacity(3);
    if let (Some(first), Some(last)) = (chars.next(), chars.last()) {
        out.push(image.with_extension(format!("{first}{last}w")));
    }
    out.push(image.with_extension(format!("{ext}w")));
    out.push(image.with_extension("wld"));
    out
}

pub fn find_for(image: &Path) -> Result<WorldFile> {
    let candidates = sidecar_candidates(image);
    match candidates.iter().find(|p| p.is_file()) {
        Some(path) => WorldFile::load(path),
        None => bail!(
            "no world file next to {} (tried {:?})",
            image.display(),
            candidates
        ),
    }
}
