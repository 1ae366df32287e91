//! What the terrain needs from the graphics layer.

use crate::error::BackendError;
use crate::instances::InstanceKind;
use crate::sync::GpuFences;
use glam::Mat4;
use std::ops::Range;

/// Per-frame material parameters. Must match `TerrainParams` in the
/// viewer's WGSL (std140: vec2 aligned to 8, struct padded to 16).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainUniforms {
    /// World-space top-left corner of the DEM.
    pub dem_upper_left: [f32; 2],
    pub dem_scale: [f32; 2],
    pub image_upper_left: [f32; 2],
    pub image_scale: [f32; 2],
    /// Columns, rows.
    pub dem_dims: [u32; 2],
    pub image_dims: [u32; 2],
    pub vertical_exaggeration: f32,
    pub alpha: f32,
    pub dem_no_data: f32,
    pub _pad: f32,
}

const _: [(); 64] = [(); core::mem::size_of::<TerrainUniforms>()];

/// Whole-dataset sample arrays, uploaded once at construction.
#[derive(Debug, Clone, Copy)]
pub struct RasterBuffers<'a> {
    pub elevations: &'a [f32],
    pub reds: &'a [f32],
    pub greens: &'a [f32],
    pub blues: &'a [f32],
}

impl RasterBuffers<'_> {
    /// Each array with its size in bytes, in binding order.
    pub fn byte_sizes(&self) -> [(&'static str, u64); 4] {
        let bytes = |data: &[f32]| std::mem::size_of_val(data) as u64;
        [
            ("elevations", bytes(self.elevations)),
            ("reds", bytes(self.reds)),
            ("greens", bytes(self.greens)),
            ("blues", bytes(self.blues)),
        ]
    }
}

/// Graphics collaborator of [`crate::terrain::Terrain`].
///
/// Calls arrive in frame order: `client_wait` on the previous fence,
/// `flush_instances` for modified slots, `bind_material`, the four
/// `draw_instanced` calls, then `insert_fence`.
pub trait TerrainBackend: GpuFences {
    /// Fails when the device cannot hold the arrays; the terrain is then
    /// not created.
    fn create_raster_buffers(&mut self, rasters: RasterBuffers<'_>) -> Result<(), BackendError>;

    /// Uploads `transforms` into slots `range` of the instance buffer for `kind`.
    fn flush_instances(&mut self, kind: InstanceKind, range: Range<usize>, transforms: &[Mat4]);

    fn bind_material(&mut self, uniforms: &TerrainUniforms);

    fn draw_instanced(&mut self, kind: InstanceKind, instance_count: u32);
}
