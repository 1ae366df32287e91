use geoclipmap::CameraView;
use glam::{Mat4, Vec2, Vec3};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

pub const FOV_Y_RAD: f32 = std::f32::consts::FRAC_PI_3;
const MIN_DISTANCE: f32 = 5.0;
const MAX_DISTANCE: f32 = 2_000_000.0;

/// Orbit camera over the local z-up world frame.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    // --- Orbital Parameters (Primary State) ---
    /// World point the camera orbits and looks at.
    pub target: Vec3,
    /// Distance from the camera to the target.
    pub distance_to_center: f32,
    /// Azimuth around +z, measured from north (+y) towards east (+x).
    pub azimuth_rad: f32,
    /// Elevation above the ground plane.
    pub elevation_rad: f32,

    // --- Derived Properties (Updated by `update()`) ---
    position: Vec3,

    pub aspect: f32,
}

impl OrbitCamera {
    pub fn new(target: Vec3, distance_to_center: f32, aspect: f32) -> Self {
        let mut camera = Self {
            target,
            distance_to_center,
            azimuth_rad: 200.0f32.to_radians(),
            elevation_rad: 35.0f32.to_radians(),
            position: Vec3::ZERO,
            aspect,
        };
        camera.update();
        camera
    }

    /// Recalculates the position from the orbital parameters. Call after
    /// changing any of them.
    pub fn update(&mut self) {
        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();
        let offset = Vec3::new(
            self.distance_to_center * cos_el * sin_az,
            self.distance_to_center * cos_el * cos_az,
            self.distance_to_center * sin_el,
        );
        self.position = self.target + offset;
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit vector from the camera towards the target.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Z)
    }

    /// Depth range scales with the orbit so near terrain keeps precision.
    pub fn proj(&self) -> Mat4 {
        let near = (self.distance_to_center * 0.01).max(0.5);
        let far = (self.distance_to_center * 200.0).max(near * 10.0);
        Mat4::perspective_rh(FOV_Y_RAD, self.aspect.max(1e-3), near, far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// What the clipmap placement reads from the camera.
    pub fn terrain_view(&self) -> CameraView {
        CameraView {
            position: self.position,
            forward: self.forward(),
            distance_to_center: self.distance_to_center,
        }
    }

    pub fn translate_target(&mut self, delta: Vec3) {
        self.target += delta;
        self.update();
    }
}

#[derive(Default)]
pub struct CameraController {
    orbiting: bool,
    panning: bool,
    last_mouse: Option<(f64, f64)>,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles window events and updates the camera.
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut OrbitCamera) {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                let pressed = *state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.orbiting = pressed,
                    MouseButton::Right | MouseButton::Middle => self.panning = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor((position.x, position.y), camera);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
                zoom(camera, scroll);
            }
            _ => {}
        }
    }

    fn handle_cursor(&mut self, xy: (f64, f64), camera: &mut OrbitCamera) {
        if let Some(last) = self.last_mouse {
            let dx = (xy.0 - last.0) as f32;
            let dy = (xy.1 - last.1) as f32;
            if self.orbiting {
                orbit(camera, dx, dy);
            } else if self.panning {
                pan(camera, dx, dy);
            }
        }
        self.last_mouse = Some(xy);
    }
}

/// Positive scroll zooms in.
pub fn zoom(camera: &mut OrbitCamera, scroll: f32) {
    camera.distance_to_center =
        (camera.distance_to_center * 1.1f32.powf(-scroll)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    camera.update();
}

pub fn orbit(camera: &mut OrbitCamera, dx: f32, dy: f32) {
    camera.azimuth_rad += dx * 0.005;
    // 1 degree to 89 degrees.
    camera.elevation_rad = (camera.elevation_rad + dy * 0.005)
        .clamp(1.0f32.to_radians(), 89.0f32.to_radians());
    camera.update();
}

/// Drags the ground under the cursor, scaled by the orbit distance.
pub fn pan(camera: &mut OrbitCamera, dx: f32, dy: f32) {
    let (sin_az, cos_az) = camera.azimuth_rad.sin_cos();
    let ahead = -Vec2::new(sin_az, cos_az);
    let right = Vec2::new(-cos_az, sin_az);
    let k = camera.distance_to_center * 0.0015;
    let delta = (-right * dx + ahead * dy) * k;
    camera.translate_target(delta.extend(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn focus_is_the_target() {
        let cam = OrbitCamera::new(Vec3::new(100.0, -50.0, 20.0), 500.0, 1.5);
        let view = cam.terrain_view();
        assert!(close(view.focus(), cam.target));
        assert!((view.world_center() - Vec2::new(100.0, -50.0)).length() < 1e-3);
        assert!(((cam.position() - cam.target).length() - 500.0).abs() < 1e-2);
        assert!(cam.position().z > cam.target.z);
    }

    #[test]
    fn azimuth_zero_looks_south_from_north() {
        let mut cam = OrbitCamera::new(Vec3::ZERO, 10.0, 1.0);
        cam.azimuth_rad = 0.0;
        cam.elevation_rad = 0.0;
        cam.update();
        assert!(close(cam.position(), Vec3::new(0.0, 10.0, 0.0)));
        assert!(close(cam.forward(), Vec3::NEG_Y));
    }

    #[test]
    fn zoom_and_orbit_are_clamped() {
        let mut cam = OrbitCamera::new(Vec3::ZERO, 10.0, 1.0);
        zoom(&mut cam, 100.0);
        assert_eq!(cam.distance_to_center, MIN_DISTANCE);
        orbit(&mut cam, 0.0, 1.0e6);
        assert!((cam.elevation_rad - 89.0f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn pan_keeps_height_and_moves_target() {
        let mut cam = OrbitCamera::new(Vec3::new(0.0, 0.0, 7.0), 1000.0, 1.0);
        pan(&mut cam, 10.0, 0.0);
        assert_eq!(cam.target.z, 7.0);
        assert!(cam.target.truncate().length() > 1.0);
    }

    #[test]
    fn target_projects_to_screen_centre() {
        let cam = OrbitCamera::new(Vec3::new(3.0, 4.0, 5.0), 250.0, 16.0 / 9.0);
        let clip = cam.view_proj() * cam.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}
