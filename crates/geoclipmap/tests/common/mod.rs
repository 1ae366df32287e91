#![allow(dead_code)]

use geoclipmap::{
    BackendError, FenceStatus, GpuFences, InstanceKind, MemoryRaster, RasterBuffers, TerrainBackend,
    TerrainUniforms,
};
use glam::{DVec2, Mat4};
use std::collections::VecDeque;
use std::ops::Range;
use std::time::Duration;

pub const NO_DATA: f32 = -9999.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateRasters { elevations: usize, colors: usize },
    Wait(u32),
    Release(u32),
    InsertFence(u32),
    Flush(InstanceKind, Range<usize>),
    Bind(TerrainUniforms),
    Draw(InstanceKind, u32),
}

/// Backend that records every call and replays scripted fence results.
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
    pub fence_script: VecDeque<FenceStatus>,
    pub elevations: Vec<f32>,
    /// Largest raster buffer accepted, in bytes.
    pub buffer_limit: Option<u64>,
    pub next_fence: u32,
}

impl Recorder {
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }
}

impl GpuFences for Recorder {
    type Fence = u32;

    fn insert_fence(&mut self) -> u32 {
        self.next_fence += 1;
        self.calls.push(Call::InsertFence(self.next_fence));
        self.next_fence
    }

    fn client_wait(&mut self, fence: &u32, _timeout: Duration) -> FenceStatus {
        self.calls.push(Call::Wait(*fence));
        self.fence_script.pop_front().unwrap_or(FenceStatus::Signaled)
    }

    fn release_fence(&mut self, fence: u32) {
        self.calls.push(Call::Release(fence));
    }
}

impl TerrainBackend for Recorder {
    fn create_raster_buffers(&mut self, rasters: RasterBuffers<'_>) -> Result<(), BackendError> {
        if let Some(limit) = self.buffer_limit {
            if let Some(&(what, size)) = rasters.byte_sizes().iter().find(|(_, size)| *size > limit) {
                return Err(BackendError::BufferTooLarge { what, size, limit });
            }
        }
        self.elevations = rasters.elevations.to_vec();
        self.calls.push(Call::CreateRasters {
            elevations: rasters.elevations.len(),
            colors: rasters.reds.len(),
        });
        Ok(())
    }

    fn flush_instances(&mut self, kind: InstanceKind, range: Range<usize>, transforms: &[Mat4]) {
        assert_eq!(range.len(), transforms.len());
        self.calls.push(Call::Flush(kind, range));
    }

    fn bind_material(&mut self, uniforms: &TerrainUniforms) {
        self.calls.push(Call::Bind(*uniforms));
    }

    fn draw_instanced(&mut self, kind: InstanceKind, instance_count: u32) {
        self.calls.push(Call::Draw(kind, instance_count));
    }
}

/// `cols x rows` DEM with pixel scale `scale` and top-left `top_left`.
pub fn dem<F: Fn(u32, u32) -> f32>(
    cols: u32,
    rows: u32,
    top_left: (f64, f64),
    scale: f64,
    f: F,
) -> MemoryRaster {
    MemoryRaster::new(
        cols,
        rows,
        DVec2::new(top_left.0, top_left.1),
        DVec2::splat(scale),
    )
    .with_band_fn(NO_DATA, f)
    .unwrap()
}

/// Three-band image over the same footprint, colour derived from position.
pub fn image(cols: u32, rows: u32, top_left: (f64, f64), scale: f64) -> MemoryRaster {
    MemoryRaster::new(
        cols,
        rows,
        DVec2::new(top_left.0, top_left.1),
        DVec2::splat(scale),
    )
    .with_band_fn(0.0, |c, _| c as f32 / cols as f32)
    .and_then(|r| r.with_band_fn(0.0, |_, row| row as f32 / rows as f32))
    .and_then(|r| r.with_band_fn(0.0, |_, _| 0.5))
    .unwrap()
}
