//! Error types for the terrain core.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RasterError {
    #[error("band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("invalid window [{x0}..={xf}] x [{y0}..={yf}] for {out_n}x{out_m} output")]
    InvalidWindow {
        x0: i64,
        xf: i64,
        y0: i64,
        yf: i64,
        out_n: usize,
        out_m: usize,
    },

    #[error("band data has {actual} samples, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("raster has zero extent ({cols}x{rows})")]
    Empty { cols: u32, rows: u32 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("clipmap power {0} outside supported range 3..=14")]
    Power(u32),

    #[error("clipmap needs at least one level")]
    NoLevels,

    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("{what} buffer needs {size} bytes, device allows {limit}")]
    BufferTooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("GPU rejected {what}: {reason}")]
    Rejected { what: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum TerrainError {
    /// The session has no established world origin; no terrain is created.
    #[error("world origin has not been established for this session")]
    MissingWorldOrigin,

    #[error("invalid clipmap configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("graphics backend: {0}")]
    Backend(#[from] BackendError),

    #[error("{which} raster has {count} bands, need at least {need}")]
    MissingBands {
        which: &'static str,
        count: usize,
        need: usize,
    },
}
