//! The terrain entity: owns the resident raster samples, the clipmap
//! templates and footprint state, and drives one frame at a time against a
//! [`TerrainBackend`].

use crate::backend::{RasterBuffers, TerrainBackend, TerrainUniforms};
use crate::config::ClipmapConfig;
use crate::error::{RasterError, TerrainError};
use crate::footprint::{CameraView, ClipmapLayout, FootprintEngine, FootprintReport};
use crate::geometry::ClipmapGeometry;
use crate::georef::WorldOrigin;
use crate::instances::InstanceKind;
use crate::raster::{read_window, ColorGrid, ElevationGrid, RasterSource};
use crate::sync::{FenceOutcome, FrameThrottle};
use glam::{DVec3, Vec2};

/// Summary of one rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub fence: FenceOutcome,
    pub footprints: FootprintReport,
    /// Instance slots flushed to the GPU this frame.
    pub instances_flushed: usize,
    /// Instance counts of the four draws, in draw order.
    pub draws: [(InstanceKind, u32); 4],
}

pub struct Terrain<B: TerrainBackend> {
    offset: DVec3,
    geometry: ClipmapGeometry,
    footprints: FootprintEngine,
    elevation: ElevationGrid,
    color: ColorGrid,
    throttle: FrameThrottle,
    fence: Option<B::Fence>,
    vertical_exaggeration: f32,
    alpha: f32,
    frame: u64,
}

impl<B: TerrainBackend> Terrain<B> {
    /// Reads both rasters once, builds the clipmap templates and uploads the
    /// sample buffers. Fails without side effects on the backend when the
    /// session has no world origin.
    pub fn new<D, I>(
        dem: &D,
        image: &I,
        origin: &WorldOrigin,
        config: ClipmapConfig,
        backend: &mut B,
    ) -> Result<Self, TerrainError>
    where
        D: RasterSource + ?Sized,
        I: RasterSource + ?Sized,
    {
        config.validate()?;
        let offset = origin.get().ok_or(TerrainError::MissingWorldOrigin)?;
        require_bands("DEM", dem, 1)?;
        require_bands("image", image, 3)?;

        let elevation = load_elevation(dem, offset)?;
        let color = load_color(image, offset)?;
        let geometry = ClipmapGeometry::new(config.power)?;

        let layout = ClipmapLayout {
            levels: config.levels,
            n: geometry.n,
            m: geometry.m,
            dem_pixel_scale: elevation.pixel_scale,
            dem_grid_offset: elevation.upper_left % elevation.pixel_scale,
        };

        backend.create_raster_buffers(RasterBuffers {
            elevations: &elevation.samples,
            reds: &color.reds,
            greens: &color.greens,
            blues: &color.blues,
        })?;

        log::info!(
            "Terrain: DEM {}x{} @ ({:.3}, {:.3}), image {}x{}, n={} m={} L={}, offset ({:.3}, {:.3}, {:.3})",
            elevation.cols,
            elevation.rows,
            elevation.pixel_scale.x,
            elevation.pixel_scale.y,
            color.cols,
            color.rows,
            geometry.n,
            geometry.m,
            config.levels,
            offset.x,
            offset.y,
            offset.z
        );

        Ok(Self {
            offset,
            geometry,
            footprints: FootprintEngine::new(layout),
            elevation,
            color,
            throttle: FrameThrottle::new(config.sync),
            fence: None,
            vertical_exaggeration: config.vertical_exaggeration,
            alpha: config.alpha.clamp(0.0, 1.0),
            frame: 0,
        })
    }

    /// Replaces the fence waiter (e.g. to drop the backoff sleep in tests).
    pub fn with_throttle(mut self, throttle: FrameThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Runs one frame: wait on the previous fence, place footprints, flush
    /// modified instances and the uniforms, draw, arm a new fence.
    ///
    /// Never fails: sync problems are logged and the frame is drawn regardless.
    pub fn render(&mut self, view: &CameraView, backend: &mut B) -> FrameStats {
        let fence = self.throttle.wait(backend, self.fence.take());

        let footprints = self.footprints.update(view);

        let mut instances_flushed = 0;
        for kind in InstanceKind::ALL {
            let buffer = self.footprints.buffer_mut(kind);
            if let Some(range) = buffer.take_dirty() {
                instances_flushed += range.len();
                backend.flush_instances(kind, range.clone(), &buffer.as_slice()[range]);
            }
        }
        backend.bind_material(&self.uniforms());

        let draws = InstanceKind::ALL.map(|kind| {
            let count = self.footprints.buffer(kind).render_count() as u32;
            backend.draw_instanced(kind, count);
            (kind, count)
        });

        self.fence = Some(backend.insert_fence());
        self.frame += 1;

        FrameStats {
            frame: self.frame,
            fence,
            footprints,
            instances_flushed,
            draws,
        }
    }

    /// Waits out and releases the last frame's fence.
    pub fn shutdown(mut self, backend: &mut B) {
        let outcome = self.throttle.wait(backend, self.fence.take());
        log::debug!("Terrain shut down after {} frames ({:?})", self.frame, outcome);
    }

    pub fn uniforms(&self) -> TerrainUniforms {
        TerrainUniforms {
            dem_upper_left: self.elevation.upper_left.to_array(),
            dem_scale: self.elevation.pixel_scale.to_array(),
            image_upper_left: self.color.upper_left.to_array(),
            image_scale: self.color.pixel_scale.to_array(),
            dem_dims: [self.elevation.cols, self.elevation.rows],
            image_dims: [self.color.cols, self.color.rows],
            vertical_exaggeration: self.vertical_exaggeration,
            alpha: self.alpha,
            dem_no_data: self.elevation.no_data,
            _pad: 0.0,
        }
    }

    pub fn set_vertical_exaggeration(&mut self, value: f32) {
        if value.is_finite() {
            self.vertical_exaggeration = value.max(0.0);
        }
    }

    pub fn vertical_exaggeration(&self) -> f32 {
        self.vertical_exaggeration
    }

    pub fn set_alpha(&mut self, value: f32) {
        if value.is_finite() {
            self.alpha = value.clamp(0.0, 1.0);
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// World-space elevation (sample minus the origin's z) under `world`,
    /// unexaggerated. `None` outside the DEM or on no-data.
    pub fn elevation_at(&self, world: Vec2) -> Option<f32> {
        self.elevation.elevation_at(world)
    }

    pub fn color_at(&self, world: Vec2) -> Option<[f32; 3]> {
        self.color.color_at(world)
    }

    /// Absolute height (source units) under `world`: the stored value with
    /// the origin's z added back.
    pub fn absolute_elevation_at(&self, world: Vec2) -> Option<f64> {
        self.elevation_at(world).map(|h| h as f64 + self.offset.z)
    }

    pub fn world_offset(&self) -> DVec3 {
        self.offset
    }

    pub fn geometry(&self) -> &ClipmapGeometry {
        &self.geometry
    }

    pub fn footprints(&self) -> &FootprintEngine {
        &self.footprints
    }

    pub fn elevation_grid(&self) -> &ElevationGrid {
        &self.elevation
    }

    pub fn color_grid(&self) -> &ColorGrid {
        &self.color
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }
}

fn require_bands<R: RasterSource + ?Sized>(
    which: &'static str,
    raster: &R,
    need: usize,
) -> Result<(), TerrainError> {
    if raster.cols() == 0 || raster.rows() == 0 {
        return Err(RasterError::Empty {
            cols: raster.cols(),
            rows: raster.rows(),
        }
        .into());
    }
    let count = raster.band_count();
    if count < need {
        return Err(TerrainError::MissingBands { which, count, need });
    }
    Ok(())
}

fn full_read<R: RasterSource + ?Sized>(
    raster: &R,
    band: usize,
    offset: f32,
) -> Result<Vec<f32>, RasterError> {
    let (cols, rows) = (raster.cols() as usize, raster.rows() as usize);
    read_window(
        raster,
        band,
        0,
        cols as i64 - 1,
        0,
        rows as i64 - 1,
        cols,
        rows,
        offset,
    )
}

fn upper_left_world<R: RasterSource + ?Sized>(raster: &R, offset: DVec3) -> Vec2 {
    (raster.top_left() - offset.truncate()).as_vec2()
}

fn load_elevation<R: RasterSource + ?Sized>(
    dem: &R,
    offset: DVec3,
) -> Result<ElevationGrid, RasterError> {
    Ok(ElevationGrid {
        upper_left: upper_left_world(dem, offset),
        pixel_scale: dem.pixel_scale().as_vec2(),
        cols: dem.cols(),
        rows: dem.rows(),
        no_data: dem.no_data_value(1)?,
        samples: full_read(dem, 1, offset.z as f32)?,
    })
}

fn load_color<R: RasterSource + ?Sized>(image: &R, offset: DVec3) -> Result<ColorGrid, RasterError> {
    Ok(ColorGrid {
        upper_left: upper_left_world(image, offset),
        pixel_scale: image.pixel_scale().as_vec2(),
        cols: image.cols(),
        rows: image.rows(),
        no_data: [
            image.no_data_value(1)?,
            image.no_data_value(2)?,
            image.no_data_value(3)?,
        ],
        reds: full_read(image, 1, 0.0)?,
        greens: full_read(image, 2, 0.0)?,
        blues: full_read(image, 3, 0.0)?,
    })
}
