//! Shared world origin for independently georeferenced datasets.
//!
//! Projected coordinates (easting/northing) are routinely in the hundreds of
//! thousands of units, which `f32` cannot hold at sub-metre precision. Every
//! entity of a session subtracts the same `f64` origin before narrowing to
//! `f32`, so the origin is established once and never changes afterwards.

use crate::raster::RasterSource;
use glam::{DVec2, DVec3, Vec3};

/// Axis-aligned world-space extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl GeoBounds {
    pub fn union(&self, other: &GeoBounds) -> GeoBounds {
        GeoBounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> DVec2 {
        0.5 * (self.max - self.min) + self.min
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }
}

/// Affine georeference of a north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub top_left: DVec2,
    pub pixel_scale: DVec2,
    pub cols: u32,
    pub rows: u32,
}

impl GeoTransform {
    pub fn of<R: RasterSource + ?Sized>(raster: &R) -> Self {
        Self {
            top_left: raster.top_left(),
            pixel_scale: raster.pixel_scale(),
            cols: raster.cols(),
            rows: raster.rows(),
        }
    }

    pub fn bottom_right(&self) -> DVec2 {
        self.top_left
            + DVec2::new(
                self.cols as f64 * self.pixel_scale.x,
                -(self.rows as f64) * self.pixel_scale.y,
            )
    }

    pub fn bounds(&self) -> GeoBounds {
        let br = self.bottom_right();
        GeoBounds {
            min: DVec2::new(self.top_left.x.min(br.x), self.top_left.y.min(br.y)),
            max: DVec2::new(self.top_left.x.max(br.x), self.top_left.y.max(br.y)),
        }
    }
}

/// Midpoint of the union of both extents in x/y, `height_bias` in z.
pub fn compute_shared_offset(dem: &GeoBounds, image: &GeoBounds, height_bias: f64) -> DVec3 {
    dem.union(image).center().extend(height_bias)
}

/// Session-owned, set-once world origin.
#[derive(Debug, Clone, Default)]
pub struct WorldOrigin {
    offset: Option<DVec3>,
}

impl WorldOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// An origin fixed up front, e.g. restored from a saved scene.
    pub fn fixed(offset: DVec3) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    /// Computes the origin on the first call; later calls return the
    /// established value untouched, whatever bounds they pass.
    pub fn establish(&mut self, dem: &GeoBounds, image: &GeoBounds, height_bias: f64) -> DVec3 {
        *self.offset.get_or_insert_with(|| {
            let offset = compute_shared_offset(dem, image, height_bias);
            log::info!(
                "World origin established at ({:.3}, {:.3}, {:.3})",
                offset.x,
                offset.y,
                offset.z
            );
            offset
        })
    }

    /// Convenience for the usual DEM + colour image pair.
    pub fn establish_from<D, I>(&mut self, dem: &D, image: &I, height_bias: f64) -> DVec3
    where
        D: RasterSource + ?Sized,
        I: RasterSource + ?Sized,
    {
        self.establish(
            &GeoTransform::of(dem).bounds(),
            &GeoTransform::of(image).bounds(),
            height_bias,
        )
    }

    pub fn get(&self) -> Option<DVec3> {
        self.offset
    }

    /// Re-centres an absolute coordinate; `None` before establishment.
    pub fn to_local(&self, absolute: DVec3) -> Option<Vec3> {
        self.offset.map(|o| (absolute - o).as_vec3())
    }

    pub fn to_local_xy(&self, absolute: DVec2) -> Option<glam::Vec2> {
        self.offset.map(|o| (absolute - o.truncate()).as_vec2())
    }
}
