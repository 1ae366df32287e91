//! Keeps the orbit centre riding on the terrain surface.

use glam::Vec3;

pub const FOLLOW_STIFFNESS: f32 = 1000.0;

/// Largest integration step; longer frames are subdivided.
const MAX_STEP: f32 = 1.0 / 240.0;

/// Critically damped spring on the orbit centre's height (unit mass).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainFollow {
    stiffness: f32,
    damping: f32,
    velocity: f32,
}

impl Default for TerrainFollow {
    fn default() -> Self {
        Self::new(FOLLOW_STIFFNESS)
    }
}

impl TerrainFollow {
    pub fn new(stiffness: f32) -> Self {
        Self {
            stiffness,
            damping: 2.0 * stiffness.sqrt(),
            velocity: 0.0,
        }
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Translation to apply to `center` over `dt` seconds, pulling its
    /// height towards `elevation * exaggeration`.
    ///
    /// Returns `None` and leaves the spring untouched when there is no
    /// elevation under the centre.
    pub fn update(
        &mut self,
        dt: f32,
        center: Vec3,
        elevation: Option<f32>,
        exaggeration: f32,
    ) -> Option<Vec3> {
        let target = elevation? * exaggeration;
        if !target.is_finite() || !(dt > 0.0) {
            return None;
        }

        let steps = (dt / MAX_STEP).ceil().max(1.0);
        let h = dt / steps;
        let mut z = center.z;
        for _ in 0..steps as u32 {
            let accel = self.stiffness * (target - z) - self.damping * self.velocity;
            self.velocity += accel * h;
            z += self.velocity * h;
        }
        Some(Vec3::new(0.0, 0.0, z - center.z))
    }

    pub fn reset(&mut self) {
        self.velocity = 0.0;
    }
}
