// src/lib.rs
//! Interactive geometry-clipmap terrain viewer.
//!
//! Loads a DEM and a georeferenced colour image, re-centres both on one
//! shared world origin and renders them through `geoclipmap` on wgpu.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod renderer;
pub mod ui;
