//! Per-frame placement of clipmap footprints around the camera focus.
//!
//! Level 0 is the coarsest ring, level `L - 1` the finest. Each level is a
//! 4x4 arrangement of ring blocks with the inner 2x2 left open for the next
//! finer level, a 2-pixel cross of fix-up strips between the blocks, and an
//! L-shaped trim closing the 1-pixel gap around the finer level.
//!
//! ```text
//!   B B F B B
//!   B . . . B      B  ring block (12 per level)
//!   F . * . F      F  ring fix-up (4 per level)
//!   B . . . B      *  next finer level + interior trim
//!   B B F B B
//! ```

use crate::instances::{InstanceBuffer, InstanceKind};
use glam::{Mat4, Quat, Vec2, Vec3};
use std::f32::consts::FRAC_PI_2;

/// A level collapses when the orbit distance exceeds this many level widths.
pub const COLLAPSE_FACTOR: f32 = 2.5;

/// Ring-block position relative to the level centre, in half level widths.
const LEVEL_OFFSET: [Vec2; 12] = [
    Vec2::new(-1.0, 1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(-1.0, 1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(1.0, -1.0),
];

/// Ring-block position correction, in half block widths.
const BLOCK_OFFSET: [Vec2; 12] = [
    Vec2::new(1.0, -1.0),
    Vec2::new(3.0, -1.0),
    Vec2::new(-3.0, -1.0),
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -3.0),
    Vec2::new(-1.0, -3.0),
    Vec2::new(1.0, 3.0),
    Vec2::new(-1.0, 3.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(3.0, 1.0),
    Vec2::new(-3.0, 1.0),
    Vec2::new(-1.0, 1.0),
];

/// What the footprint update reads from the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub position: Vec3,
    pub forward: Vec3,
    /// Orbit distance from the camera to the point it looks at.
    pub distance_to_center: f32,
}

impl CameraView {
    /// Ground-projected focus point the camera orbits.
    pub fn world_center(&self) -> Vec2 {
        self.focus().truncate()
    }

    /// Point `distance_to_center` along the view direction.
    pub fn focus(&self) -> Vec3 {
        self.position + self.forward * self.distance_to_center
    }
}

/// Snapped dimensions and centre of one level for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelFrame {
    pub level: u32,
    /// World size of one vertex spacing at this level.
    pub pixel_width: Vec2,
    pub level_width: Vec2,
    pub block_width: Vec2,
    pub grid_center: Vec2,
}

impl LevelFrame {
    pub fn compute(layout: &ClipmapLayout, level: u32, world_center: Vec2) -> Self {
        let doublings = (layout.levels - level - 1) as i32;
        let pixel_width = layout.dem_pixel_scale * 2f32.powi(doublings);
        let level_width = pixel_width * (layout.n - 1) as f32;
        let block_width = pixel_width * (layout.m - 1) as f32;

        // Snap to a grid of twice the pixel width so this level's vertices
        // coincide with the next coarser level's.
        let twice = 2.0 * pixel_width;
        let mut center_offset = world_center % twice;
        if center_offset.x < 0.0 {
            center_offset.x += twice.x;
        }
        if center_offset.y < 0.0 {
            center_offset.y += twice.y;
        }
        let grid_center = world_center - center_offset + pixel_width + layout.dem_grid_offset;

        Self {
            level,
            pixel_width,
            level_width,
            block_width,
            grid_center,
        }
    }

    pub fn collapses(&self, distance_to_center: f32) -> bool {
        distance_to_center > COLLAPSE_FACTOR * self.level_width.x
    }

    /// Interior block stretched over the whole level.
    pub fn interior_transform(&self) -> Mat4 {
        placed(self.grid_center, self.level_width, false)
    }

    pub fn ring_block_transform(&self, slot: usize) -> Mat4 {
        let center = self.grid_center
            + LEVEL_OFFSET[slot] * self.level_width / 2.0
            + BLOCK_OFFSET[slot] * self.block_width / 2.0;
        placed(center, self.block_width, false)
    }

    /// Fix-up strips: 0 north, 1 south, 2 west, 3 east.
    pub fn fix_up_transform(&self, side: usize) -> Mat4 {
        let reach = (self.level_width - self.block_width) / 2.0;
        let c = self.grid_center;
        match side {
            0 | 1 => {
                let sign = if side == 0 { 1.0 } else { -1.0 };
                placed(
                    Vec2::new(c.x, c.y + sign * reach.y),
                    Vec2::new(2.0 * self.pixel_width.x, self.block_width.y),
                    false,
                )
            }
            _ => {
                let sign = if side == 3 { 1.0 } else { -1.0 };
                placed(
                    Vec2::new(c.x + sign * reach.x, c.y),
                    Vec2::new(2.0 * self.pixel_width.y, self.block_width.x),
                    true,
                )
            }
        }
    }

    /// Trim strips closing the gap between this level's hole and the finer
    /// level, which sits half a pixel off-centre. Returns (horizontal, vertical).
    pub fn trim_transforms(&self, finer: &LevelFrame, m: u32) -> (Mat4, Mat4) {
        let p = self.pixel_width;
        let hole_half = p * m as f32;
        let c = self.grid_center;
        let gap = |fine: f32, coarse: f32, half: f32, px: f32| {
            if fine > coarse {
                coarse - half + px / 2.0
            } else {
                coarse + half - px / 2.0
            }
        };

        let horizontal = placed(
            Vec2::new(c.x, gap(finer.grid_center.y, c.y, hole_half.y, p.y)),
            Vec2::new(2.0 * hole_half.x, p.y),
            false,
        );
        let vertical = placed(
            Vec2::new(gap(finer.grid_center.x, c.x, hole_half.x, p.x), c.y),
            Vec2::new(2.0 * hole_half.y, p.x),
            true,
        );
        (horizontal, vertical)
    }
}

/// Translate * (optional quarter turn) * scale of a unit template.
fn placed(center: Vec2, size: Vec2, rotated: bool) -> Mat4 {
    let rotation = if rotated {
        Quat::from_rotation_z(FRAC_PI_2)
    } else {
        Quat::IDENTITY
    };
    Mat4::from_scale_rotation_translation(size.extend(1.0), rotation, center.extend(0.0))
}

/// Fixed sizing shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipmapLayout {
    pub levels: u32,
    pub n: u32,
    pub m: u32,
    /// DEM pixel size in world units.
    pub dem_pixel_scale: Vec2,
    /// Sub-pixel alignment of the DEM grid relative to the world origin.
    pub dem_grid_offset: Vec2,
}

/// Outcome of one footprint update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootprintReport {
    pub world_center: Vec2,
    /// Level rendered as a single interior block; finer levels were skipped.
    pub collapsed_level: u32,
    /// Ring levels whose blocks were rewritten this frame.
    pub recomputed: Vec<u32>,
    /// Ring levels left untouched because their snapped centre was unchanged.
    pub cache_hits: u32,
}

pub struct FootprintEngine {
    layout: ClipmapLayout,
    snapped_centers: Vec<Option<Vec2>>,
    trim_keys: Vec<Option<(Vec2, Vec2)>>,
    blocks: InstanceBuffer,
    fix_ups: InstanceBuffer,
    trims: InstanceBuffer,
    interior: InstanceBuffer,
}

impl FootprintEngine {
    pub fn new(layout: ClipmapLayout) -> Self {
        let levels = layout.levels;
        let buffer = |kind: InstanceKind| InstanceBuffer::new(kind, kind.capacity(levels));
        let mut interior = buffer(InstanceKind::InteriorBlock);
        interior.set_render_count(1);
        Self {
            layout,
            snapped_centers: vec![None; levels as usize],
            trim_keys: vec![None; levels as usize],
            blocks: buffer(InstanceKind::RingBlock),
            fix_ups: buffer(InstanceKind::RingFixUp),
            trims: buffer(InstanceKind::InteriorTrim),
            interior,
        }
    }

    pub fn layout(&self) -> &ClipmapLayout {
        &self.layout
    }

    pub fn buffer(&self, kind: InstanceKind) -> &InstanceBuffer {
        match kind {
            InstanceKind::RingBlock => &self.blocks,
            InstanceKind::RingFixUp => &self.fix_ups,
            InstanceKind::InteriorTrim => &self.trims,
            InstanceKind::InteriorBlock => &self.interior,
        }
    }

    pub fn buffer_mut(&mut self, kind: InstanceKind) -> &mut InstanceBuffer {
        match kind {
            InstanceKind::RingBlock => &mut self.blocks,
            InstanceKind::RingFixUp => &mut self.fix_ups,
            InstanceKind::InteriorTrim => &mut self.trims,
            InstanceKind::InteriorBlock => &mut self.interior,
        }
    }

    pub fn snapped_center(&self, level: u32) -> Option<Vec2> {
        self.snapped_centers.get(level as usize).copied().flatten()
    }

    /// Frames of every level for `view`, coarsest first, up to and including
    /// the collapsed one. Pure; does not touch the buffers.
    pub fn plan(&self, view: &CameraView) -> Vec<LevelFrame> {
        let world_center = view.world_center();
        let mut frames = Vec::with_capacity(self.layout.levels as usize);
        for l in 0..self.layout.levels {
            let frame = LevelFrame::compute(&self.layout, l, world_center);
            frames.push(frame);
            if l == self.layout.levels - 1 || frame.collapses(view.distance_to_center) {
                break;
            }
        }
        frames
    }

    pub fn update(&mut self, view: &CameraView) -> FootprintReport {
        let world_center = view.world_center();
        let mut report = FootprintReport {
            world_center,
            ..Default::default()
        };
        let m = self.layout.m;
        let mut coarser: Option<LevelFrame> = None;

        for l in 0..self.layout.levels {
            let frame = LevelFrame::compute(&self.layout, l, world_center);

            if let Some(parent) = coarser {
                self.place_trims(&parent, &frame, m);
            }

            if l == self.layout.levels - 1 || frame.collapses(view.distance_to_center) {
                let transform = frame.interior_transform();
                if self.interior[0] != transform {
                    self.interior.set(0, transform);
                }
                let rings = l as usize;
                self.blocks.set_render_count(12 * rings);
                self.fix_ups.set_render_count(4 * rings);
                self.trims.set_render_count(2 * rings);
                report.collapsed_level = l;
                break;
            }

            coarser = Some(frame);
            if self.snapped_centers[l as usize] == Some(frame.grid_center) {
                report.cache_hits += 1;
                continue;
            }
            self.snapped_centers[l as usize] = Some(frame.grid_center);

            let base = 12 * l as usize;
            for slot in 0..12 {
                self.blocks.set(base + slot, frame.ring_block_transform(slot));
            }
            let base = 4 * l as usize;
            for side in 0..4 {
                self.fix_ups.set(base + side, frame.fix_up_transform(side));
            }
            report.recomputed.push(l);
        }

        log::trace!(
            "footprints: center=({:.1}, {:.1}) collapsed at {} recomputed {:?} hits {}",
            world_center.x,
            world_center.y,
            report.collapsed_level,
            report.recomputed,
            report.cache_hits
        );
        report
    }

    fn place_trims(&mut self, parent: &LevelFrame, finer: &LevelFrame, m: u32) {
        let l = parent.level as usize;
        let key = (parent.grid_center, finer.grid_center);
        if self.trim_keys[l] == Some(key) {
            return;
        }
        self.trim_keys[l] = Some(key);
        let (horizontal, vertical) = parent.trim_transforms(finer, m);
        self.trims.set(2 * l, horizontal);
        self.trims.set(2 * l + 1, vertical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(levels: u32) -> ClipmapLayout {
        // k = 5: n = 31, m = 8.
        ClipmapLayout {
            levels,
            n: 31,
            m: 8,
            dem_pixel_scale: Vec2::splat(1.0),
            dem_grid_offset: Vec2::ZERO,
        }
    }

    fn view(x: f32, y: f32, distance: f32) -> CameraView {
        CameraView {
            position: Vec3::new(x, y, distance),
            forward: Vec3::NEG_Z,
            distance_to_center: distance,
        }
    }

    fn translation(m: &Mat4) -> Vec2 {
        m.w_axis.truncate().truncate()
    }

    #[test]
    fn world_center_projects_along_forward() {
        let v = CameraView {
            position: Vec3::new(10.0, 20.0, 100.0),
            forward: Vec3::new(0.0, 0.6, -0.8),
            distance_to_center: 50.0,
        };
        let c = v.world_center();
        assert!((c - Vec2::new(10.0, 50.0)).length() < 1e-4);
    }

    #[test]
    fn level_widths_halve_towards_finest() {
        let lay = layout(4);
        let f0 = LevelFrame::compute(&lay, 0, Vec2::ZERO);
        let f3 = LevelFrame::compute(&lay, 3, Vec2::ZERO);
        assert_eq!(f0.pixel_width, Vec2::splat(8.0));
        assert_eq!(f0.level_width, Vec2::splat(240.0));
        assert_eq!(f0.block_width, Vec2::splat(56.0));
        assert_eq!(f3.pixel_width, Vec2::splat(1.0));
    }

    #[test]
    fn negative_centers_snap_upwards_from_the_grid() {
        let lay = layout(2);
        let f = LevelFrame::compute(&lay, 1, Vec2::new(-3.5, 2.5));
        // Finest pixel = 1; snap grid = 2. -3.5 mod 2 -> 0.5, 2.5 mod 2 -> 0.5.
        assert_eq!(f.grid_center, Vec2::new(-3.0, 3.0));
    }

    #[test]
    fn ring_blocks_tile_the_annulus() {
        let lay = layout(3);
        let f = LevelFrame::compute(&lay, 0, Vec2::ZERO);
        let c = f.grid_center;
        let b = f.block_width.x;
        let w = f.level_width.x;
        let mut centers: Vec<(i32, i32)> = (0..12)
            .map(|s| {
                let t = translation(&f.ring_block_transform(s)) - c;
                // Column/row index in the 4x4 arrangement.
                let col = ((t.x + w / 2.0 - b / 2.0) / b).round() as i32;
                let row = ((w / 2.0 - b / 2.0 - t.y) / b).round() as i32;
                (col.clamp(0, 3), row.clamp(0, 3))
            })
            .collect();
        centers.sort();
        centers.dedup();
        assert_eq!(centers.len(), 12);
        for (col, row) in centers {
            let inner = (1..=2).contains(&col) && (1..=2).contains(&row);
            assert!(!inner, "block at inner cell ({col}, {row})");
        }
    }

    #[test]
    fn ring_block_edges_meet_with_fix_up_gap() {
        let lay = layout(3);
        let f = LevelFrame::compute(&lay, 0, Vec2::new(7.0, -3.0));
        let c = f.grid_center;
        let half_b = f.block_width.x / 2.0;
        // Top row slots 1 and 2 leave a 2-pixel gap filled by fix-up 0.
        let right_of_1 = translation(&f.ring_block_transform(1)).x + half_b;
        let left_of_2 = translation(&f.ring_block_transform(2)).x - half_b;
        assert!((left_of_2 - right_of_1 - 2.0 * f.pixel_width.x).abs() < 1e-3);
        let fix = translation(&f.fix_up_transform(0));
        assert!((fix.x - c.x).abs() < 1e-3);
        assert!((fix.y - translation(&f.ring_block_transform(1)).y).abs() < 1e-3);
    }

    #[test]
    fn rotated_fix_up_spans_block_along_x() {
        let lay = layout(3);
        let f = LevelFrame::compute(&lay, 0, Vec2::ZERO);
        let t = f.fix_up_transform(2);
        let a = t.transform_point3(Vec3::new(-0.5, -0.5, 0.0));
        let b = t.transform_point3(Vec3::new(0.5, 0.5, 0.0));
        let extent = (b - a).abs();
        assert!((extent.x - f.block_width.x).abs() < 1e-3);
        assert!((extent.y - 2.0 * f.pixel_width.y).abs() < 1e-3);
    }

    #[test]
    fn finer_levels_align_to_coarser_grid() {
        let lay = ClipmapLayout {
            dem_pixel_scale: Vec2::new(2.5, 2.5),
            dem_grid_offset: Vec2::new(0.5, 1.25),
            ..layout(5)
        };
        for &center in &[Vec2::new(13.7, -48.2), Vec2::new(-1000.3, 777.9), Vec2::ZERO] {
            for l in 0..lay.levels - 1 {
                let f = LevelFrame::compute(&lay, l, center);
                let finer = LevelFrame::compute(&lay, l + 1, center);
                let period = 2.0 * finer.pixel_width;
                let r = (f.grid_center - lay.dem_grid_offset) % period;
                for (rem, per) in [(r.x, period.x), (r.y, period.y)] {
                    let rem = rem.abs();
                    assert!(rem < 1e-2 || (per - rem) < 1e-2, "level {l} off grid by {rem}");
                }
                // Finer level is half a coarse pixel off-centre.
                let d = (finer.grid_center - f.grid_center).abs();
                assert!((d - f.pixel_width / 2.0).abs().max_element() < 1e-2);
            }
        }
    }

    #[test]
    fn trims_fill_the_gap_beside_the_finer_level() {
        let lay = layout(3);
        let center = Vec2::new(1.2, 3.4);
        let coarse = LevelFrame::compute(&lay, 0, center);
        let fine = LevelFrame::compute(&lay, 1, center);
        let (h, v) = coarse.trim_transforms(&fine, lay.m);
        let p = coarse.pixel_width;
        let hole_half = p * lay.m as f32;
        let fine_half = fine.level_width / 2.0;

        let vx = translation(&v).x;
        let hy = translation(&h).y;
        // Union of trim and finer level covers the hole exactly.
        let fine_min = fine.grid_center - fine_half;
        let fine_max = fine.grid_center + fine_half;
        let (lo_x, hi_x) = (
            fine_min.x.min(vx - p.x / 2.0),
            fine_max.x.max(vx + p.x / 2.0),
        );
        let (lo_y, hi_y) = (
            fine_min.y.min(hy - p.y / 2.0),
            fine_max.y.max(hy + p.y / 2.0),
        );
        assert!((lo_x - (coarse.grid_center.x - hole_half.x)).abs() < 1e-3);
        assert!((hi_x - (coarse.grid_center.x + hole_half.x)).abs() < 1e-3);
        assert!((lo_y - (coarse.grid_center.y - hole_half.y)).abs() < 1e-3);
        assert!((hi_y - (coarse.grid_center.y + hole_half.y)).abs() < 1e-3);
    }

    #[test]
    fn collapse_truncates_finer_instances() {
        let mut engine = FootprintEngine::new(layout(4));
        // Level widths: 240, 120, 60, 30. 2.5 * 120 = 300 < 350 -> collapse at 1.
        let report = engine.update(&view(0.0, 0.0, 350.0));
        assert_eq!(report.collapsed_level, 1);
        assert_eq!(engine.buffer(InstanceKind::RingBlock).render_count(), 12);
        assert_eq!(engine.buffer(InstanceKind::RingFixUp).render_count(), 4);
        assert_eq!(engine.buffer(InstanceKind::InteriorTrim).render_count(), 2);
        assert_eq!(engine.buffer(InstanceKind::InteriorBlock).render_count(), 1);
        let interior = engine.buffer(InstanceKind::InteriorBlock)[0];
        let scale = interior.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!((scale.x - 120.0).abs() < 1e-3);

        // Zoom in: finest level reached, all rings drawn.
        let report = engine.update(&view(0.0, 0.0, 10.0));
        assert_eq!(report.collapsed_level, 3);
        assert_eq!(engine.buffer(InstanceKind::RingBlock).render_count(), 36);
    }

    #[test]
    fn collapse_is_monotonic_across_levels() {
        let lay = layout(6);
        let engine = FootprintEngine::new(lay);
        for distance in [1.0, 40.0, 75.0, 150.0, 400.0, 2000.0, 1e6] {
            let v = view(3.0, -2.0, distance);
            let mut collapsed = false;
            for l in 0..lay.levels {
                let f = LevelFrame::compute(&lay, l, v.world_center());
                if collapsed {
                    assert!(f.collapses(distance), "level {l} not collapsed at {distance}");
                }
                collapsed |= f.collapses(distance);
            }
            let plan = engine.plan(&v);
            let last = plan.last().unwrap();
            assert!(last.level == lay.levels - 1 || last.collapses(distance));
            assert!(plan[..plan.len() - 1].iter().all(|f| !f.collapses(distance)));
        }
    }

    #[test]
    fn unchanged_camera_hits_cache_and_writes_nothing() {
        let mut engine = FootprintEngine::new(layout(4));
        let v = view(12.3, -4.5, 20.0);
        let first = engine.update(&v);
        assert_eq!(first.recomputed, vec![0, 1, 2]);
        let before: Vec<Vec<Mat4>> = InstanceKind::ALL
            .iter()
            .map(|&k| engine.buffer(k).as_slice().to_vec())
            .collect();
        for k in InstanceKind::ALL {
            engine.buffer_mut(k).take_dirty();
        }

        let second = engine.update(&v);
        assert!(second.recomputed.is_empty());
        assert_eq!(second.cache_hits, 3);
        for (i, &k) in InstanceKind::ALL.iter().enumerate() {
            assert_eq!(engine.buffer(k).as_slice(), before[i].as_slice());
            assert!(!engine.buffer(k).is_dirty(), "{} rewritten", k.label());
        }
    }

    #[test]
    fn small_move_only_rewrites_fine_levels() {
        let mut engine = FootprintEngine::new(layout(4));
        engine.update(&view(0.5, 0.5, 10.0));
        // Snap periods are 16, 8 and 4 for ring levels 0..=2; crossing x = 4
        // only re-snaps level 2.
        let report = engine.update(&view(4.5, 0.5, 10.0));
        assert_eq!(report.recomputed, vec![2]);
        assert_eq!(report.cache_hits, 2);
    }

    #[test]
    fn empty_cache_never_matches_origin_center() {
        let lay = ClipmapLayout {
            dem_grid_offset: Vec2::splat(-2.0),
            ..layout(2)
        };
        let mut engine = FootprintEngine::new(lay);
        // Snapped centre of level 0 is (0, 0): must still be written.
        let report = engine.update(&view(0.0, 0.0, 1.0));
        assert_eq!(report.recomputed, vec![0]);
        assert_eq!(engine.snapped_center(0), Some(Vec2::ZERO));
    }

    #[test]
    fn single_level_draws_only_interior() {
        let mut engine = FootprintEngine::new(layout(1));
        let report = engine.update(&view(0.0, 0.0, 1.0));
        assert_eq!(report.collapsed_level, 0);
        assert_eq!(engine.buffer(InstanceKind::RingBlock).capacity(), 0);
        assert_eq!(engine.buffer(InstanceKind::InteriorBlock).render_count(), 1);
    }
}
