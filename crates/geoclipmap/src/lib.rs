// src/lib.rs
//! Geometry-clipmap terrain for a georeferenced DEM draped with imagery.
//!
//! Both rasters are re-centred on one shared `f64` world origin, read into
//! resident sample buffers once, and drawn every frame as nested rings of
//! instanced grid templates that snap to the DEM pixel grid around the
//! camera's focus. GPU access goes through [`backend::TerrainBackend`], so
//! everything here runs headless.

pub mod backend;
pub mod config;
pub mod error;
pub mod follow;
pub mod footprint;
pub mod geometry;
pub mod georef;
pub mod instances;
pub mod raster;
pub mod sync;
pub mod terrain;

pub use backend::{RasterBuffers, TerrainBackend, TerrainUniforms};
pub use config::{ClipmapConfig, SyncPolicy};
pub use error::{BackendError, ConfigError, RasterError, TerrainError};
pub use follow::TerrainFollow;
pub use footprint::{CameraView, ClipmapLayout, FootprintEngine, FootprintReport, LevelFrame};
pub use geometry::{ClipmapGeometry, GridMesh};
pub use georef::{GeoBounds, GeoTransform, WorldOrigin};
pub use instances::{InstanceBuffer, InstanceKind};
pub use raster::{read_window, ColorGrid, ElevationGrid, MemoryRaster, RasterSource};
pub use sync::{FenceOutcome, FenceStatus, FrameThrottle, GpuFences};
pub use terrain::{FrameStats, Terrain};
