//! Fly camera: mouse-drag look, WASD/QE movement, scroll-wheel FOV.

use glam::{Mat4, Quat, Vec3, Vec4};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

const Z_NEAR: f32 = 0.2;
const Z_FAR: f32 = 200.0;

pub struct FlyCamera {
    pub fov_deg: f32,
    pub speed: f32,

    position: Vec3,
    yaw: f32,
    pitch: f32,

    forward: i32,
    left: i32,
    up: i32,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl FlyCamera {
    pub fn new() -> Self {
        Self {
            fov_deg: 60.0,
            speed: 1.0,
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            forward: 0,
            left: 0,
            up: 0,
            dragging: false,
            last_cursor: None,
        }
    }

    /// Feeds a window event into the controller. Returns true if consumed.
    pub fn process_event(&mut self, event: &WindowEvent, window_size: (f32, f32)) -> bool {
        match event {
            WindowEvent::KeyboardInput { event: key, .. } => {
                self.process_key(key.physical_key, key.state == ElementState::Pressed)
            }

            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.dragging = *state == ElementState::Pressed;
                if !self.dragging {
                    self.last_cursor = None;
                }
                true
            }

            WindowEvent::CursorMoved { position, .. } => {
                if self.dragging {
                    if let Some((lx, ly)) = self.last_cursor {
                        let dx = (position.x - lx) as f32 / window_size.0.max(1.0);
                        let dy = (position.y - ly) as f32 / window_size.1.max(1.0);
                        self.yaw += dx;
                        self.pitch -= dy;
                    }
                    self.last_cursor = Some((position.x, position.y));
                    return true;
                }
                false
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.fov_deg = (self.fov_deg - steps * 2.0).clamp(10.0, 150.0);
                true
            }

            _ => false,
        }
    }

    /// Advances position from the held movement keys.
    pub fn update(&mut self, dt: f32) {
        if self.forward == 0 && self.left == 0 && self.up == 0 {
            return;
        }
        // Step through the inverse view so motion is camera-relative.
        let dir = Vec4::new(self.left as f32, self.up as f32, -(self.forward as f32), 0.0)
            .normalize();
        let step = self.view_matrix().inverse() * dir * self.speed * dt;
        self.position += step.truncate();
    }

    pub fn view_matrix(&self) -> Mat4 {
        let rotation = Quat::from_axis_angle(Vec3::X, self.pitch)
            * Quat::from_axis_angle(Vec3::Y, self.yaw);
        Mat4::from_quat(rotation) * Mat4::from_translation(self.position)
    }

    /// Pinhole projection from the window size and FOV.
    ///
    /// +Z-forward convention: clip W is view-space Z (last row `0 0 1 0`),
    /// which is also the depth functional the sort engine extracts.
    pub fn projection_matrix(&self, width: f32, height: f32) -> Mat4 {
        let (fx, fy) = self.focal(width, height);
        let dz = Z_FAR - Z_NEAR;
        Mat4::from_cols(
            Vec4::new(2.0 * fx / width, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -2.0 * fy / height, 0.0, 0.0),
            Vec4::new(0.0, 0.0, Z_FAR / dz, 1.0),
            Vec4::new(0.0, 0.0, -Z_FAR * Z_NEAR / dz, 0.0),
        )
    }

    /// Focal lengths in pixels for the current FOV.
    pub fn focal(&self, width: f32, _height: f32) -> (f32, f32) {
        let f = 0.5 * width / (0.5 * self.fov_deg.to_radians()).tan();
        (f, f)
    }

    /// World-space camera position (for view-dependent color).
    pub fn world_position(&self) -> Vec3 {
        self.view_matrix().inverse().col(3).truncate()
    }

    fn process_key(&mut self, key: PhysicalKey, pressed: bool) -> bool {
        let axis = |held: &mut i32, dir: i32| {
            if pressed {
                *held = dir;
            } else if *held == dir {
                *held = 0;
            }
        };
        match key {
            PhysicalKey::Code(KeyCode::KeyW) => axis(&mut self.forward, 1),
            PhysicalKey::Code(KeyCode::KeyS) => axis(&mut self.forward, -1),
            PhysicalKey::Code(KeyCode::KeyA) => axis(&mut self.left, 1),
            PhysicalKey::Code(KeyCode::KeyD) => axis(&mut self.left, -1),
            PhysicalKey::Code(KeyCode::KeyE) => axis(&mut self.up, 1),
            PhysicalKey::Code(KeyCode::KeyQ) => axis(&mut self.up, -1),
            _ => return false,
        }
        true
    }
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_depth_row_is_view_z() {
        let cam = FlyCamera::new();
        let p = cam.projection_matrix(1280.0, 720.0);
        // Last row (0 0 1 0): clip W equals view-space Z.
        assert_eq!(p.row(3), Vec4::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn identity_pose_looks_down_positive_z() {
        let cam = FlyCamera::new();
        assert_eq!(cam.view_matrix(), Mat4::IDENTITY);
        assert_eq!(cam.world_position(), Vec3::ZERO);
    }

    #[test]
    fn movement_is_camera_relative() {
        let mut cam = FlyCamera::new();
        cam.forward = 1;
        cam.update(1.0);
        // +Z forward convention: W moves along -Z in this parameterization,
        // which the view matrix maps to "into the screen".
        assert!(cam.position.z < 0.0);
        assert_eq!(cam.position.x, 0.0);
    }
}
