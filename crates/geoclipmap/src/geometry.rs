//! Mesh templates shared by every clipmap level.
//!
//! All templates are unit squares centred on the origin; instance transforms
//! scale them to world size. Only x/y positions are stored, heights come
//! from the elevation buffer on the GPU.

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    pub cols: u32,
    pub rows: u32,
    pub positions: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl GridMesh {
    /// A `cols x rows` vertex grid spanning `[-0.5, 0.5]^2`.
    pub fn new(cols: u32, rows: u32) -> Self {
        let cols = cols.max(2);
        let rows = rows.max(2);
        let mut positions = Vec::with_capacity((cols * rows) as usize);
        for j in 0..rows {
            let y = 0.5 - j as f32 / (rows - 1) as f32;
            for i in 0..cols {
                let x = i as f32 / (cols - 1) as f32 - 0.5;
                positions.push([x, y]);
            }
        }

        let mut indices = Vec::with_capacity(((cols - 1) * (rows - 1) * 6) as usize);
        for j in 0..rows - 1 {
            for i in 0..cols - 1 {
                let tl = j * cols + i;
                let tr = tl + 1;
                let bl = tl + cols;
                let br = bl + 1;
                // Counter-clockwise seen from +z.
                indices.extend_from_slice(&[tl, bl, br, tl, br, tr]);
            }
        }

        Self {
            cols,
            rows,
            positions,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// The four templates for clipmap power `k`.
#[derive(Debug, Clone)]
pub struct ClipmapGeometry {
    /// Vertices per side of a full level, `2^k - 1`.
    pub n: u32,
    /// Vertices per side of a ring block, `(n + 1) / 4`.
    pub m: u32,
    pub interior_block: GridMesh,
    pub block: GridMesh,
    pub ring_fix_up: GridMesh,
    pub interior_trim: GridMesh,
}

impl ClipmapGeometry {
    pub fn new(power: u32) -> Result<Self, ConfigError> {
        if !(3..=14).contains(&power) {
            return Err(ConfigError::Power(power));
        }
        let n = (1u32 << power) - 1;
        let m = (n + 1) / 4;
        Ok(Self {
            n,
            m,
            interior_block: GridMesh::new(n, n),
            block: GridMesh::new(m, m),
            ring_fix_up: GridMesh::new(3, m),
            interior_trim: GridMesh::new(2 * m + 1, 2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_power() {
        let g = ClipmapGeometry::new(8).unwrap();
        assert_eq!(g.n, 255);
        assert_eq!(g.m, 64);
        assert_eq!((g.block.cols, g.block.rows), (64, 64));
        assert_eq!((g.ring_fix_up.cols, g.ring_fix_up.rows), (3, 64));
        assert_eq!((g.interior_trim.cols, g.interior_trim.rows), (129, 2));
        assert_eq!(g.interior_block.vertex_count(), 255 * 255);
    }

    #[test]
    fn four_blocks_and_fix_up_span_a_level() {
        // 4 blocks of (m-1) spacings plus a 2-spacing fix-up equal n-1.
        for k in 3..=12 {
            let g = ClipmapGeometry::new(k).unwrap();
            assert_eq!(4 * (g.m - 1) + 2, g.n - 1);
        }
    }

    #[test]
    fn grid_is_unit_square_with_ccw_triangles() {
        let mesh = GridMesh::new(3, 2);
        assert_eq!(mesh.positions.first(), Some(&[-0.5, 0.5]));
        assert_eq!(mesh.positions.last(), Some(&[0.5, -0.5]));
        assert_eq!(mesh.triangle_count(), 4);
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[tri[i] as usize]);
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn rejects_tiny_power() {
        assert!(ClipmapGeometry::new(2).is_err());
    }
}
