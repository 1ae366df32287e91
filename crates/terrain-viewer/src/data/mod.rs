// src/data/mod.rs
//! Dataset loading for the terrain viewer.
//!
//! This module provides functionality for:
//! - Parsing ESRI ASCII grid elevation models.
//! - Georeferencing plain images through world files.
//! - Generating an analytic dataset when nothing is given on the command line.

pub mod ascii_grid;
pub mod dataset;
pub mod world_file;

pub use self::dataset::Dataset;
pub use self::world_file::WorldFile;
