use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::config::OrbitOptions;
use crate::controller::input::{InputEvent, MouseButton};
use crate::model::Camera;

const EPS: f32 = 1e-6;

/// Spherical coordinates around the orbit target, Y up.
/// `theta` is measured from +Z toward +X, `phi` from +Y.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    pub phi: f32,
    pub theta: f32,
}

impl Spherical {
    pub fn from_vec(v: Vec3) -> Self {
        let radius = v.length();
        if radius == 0.0 {
            return Self::default();
        }
        Self {
            radius,
            theta: v.x.atan2(v.z),
            phi: (v.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn to_vec(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }

    /// Keep phi off the poles
    pub fn make_safe(&mut self) {
        self.phi = self.phi.max(EPS).min(PI - EPS);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    Rotate,
    Dolly,
    Pan,
}

/// Orbit controller: the camera circles `target` at a clamped distance and
/// polar angle. Input accumulates pending deltas; [`OrbitControls::update`]
/// applies them (eased when damping is enabled) and must run every frame.
pub struct OrbitControls {
    pub options: OrbitOptions,
    pub target: Vec3,
    spherical_delta: Spherical,
    pan_offset: Vec3,
    scale: f32,
    drag: Option<(DragMode, Vec2)>,
}

impl OrbitControls {
    pub fn new(options: OrbitOptions) -> Self {
        Self {
            target: options.target,
            options,
            spherical_delta: Spherical::default(),
            pan_offset: Vec3::ZERO,
            scale: 1.0,
            drag: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.phi -= angle;
    }

    fn dolly_scale(&self) -> f32 {
        0.95f32.powf(self.options.zoom_speed)
    }

    /// Move the camera toward the target
    pub fn dolly_in(&mut self, factor: f32) {
        if self.options.enable_zoom {
            self.scale *= factor;
        }
    }

    /// Move the camera away from the target
    pub fn dolly_out(&mut self, factor: f32) {
        if self.options.enable_zoom {
            self.scale /= factor;
        }
    }

    /// Screen-space pan by a pixel delta
    pub fn pan(&mut self, dx: f32, dy: f32, viewport_height: f32, camera: &Camera) {
        if !self.options.enable_pan {
            return;
        }
        let offset = camera.position - self.target;
        let target_distance = offset.length() * (camera.fov_y / 2.0).tan();
        let height = viewport_height.max(1.0);

        let forward = camera.forward();
        let right = forward.cross(camera.up).try_normalize().unwrap_or(Vec3::X);
        let up = right.cross(forward);

        self.pan_offset -= right * (2.0 * dx * target_distance / height);
        self.pan_offset += up * (2.0 * dy * target_distance / height);
    }

    /// Feed a pointer event; `viewport` is the logical surface size
    pub fn handle_event(&mut self, event: &InputEvent, viewport: Vec2, camera: &Camera) {
        match *event {
            InputEvent::PointerDown { button, x, y } => {
                let mode = match button {
                    MouseButton::Left => DragMode::Rotate,
                    MouseButton::Middle if self.options.enable_zoom => DragMode::Dolly,
                    MouseButton::Right if self.options.enable_pan => DragMode::Pan,
                    _ => return,
                };
                self.drag = Some((mode, Vec2::new(x, y)));
            }
            InputEvent::PointerMove { x, y } => {
                let Some((mode, start)) = self.drag else { return };
                let end = Vec2::new(x, y);
                let delta = end - start;
                let height = viewport.y.max(1.0);
                match mode {
                    DragMode::Rotate => {
                        let d = delta * self.options.rotate_speed;
                        self.rotate_left(2.0 * PI * d.x / height);
                        self.rotate_up(2.0 * PI * d.y / height);
                    }
                    DragMode::Dolly => {
                        if delta.y > 0.0 {
                            self.dolly_out(self.dolly_scale());
                        } else if delta.y < 0.0 {
                            self.dolly_in(self.dolly_scale());
                        }
                    }
                    DragMode::Pan => {
                        let d = delta * self.options.pan_speed;
                        self.pan(d.x, d.y, height, camera);
                    }
                }
                self.drag = Some((mode, end));
            }
            InputEvent::PointerUp { .. } => {
                self.drag = None;
            }
            InputEvent::Wheel { delta_y, .. } => {
                if delta_y < 0.0 {
                    self.dolly_in(self.dolly_scale());
                } else if delta_y > 0.0 {
                    self.dolly_out(self.dolly_scale());
                }
            }
        }
    }

    fn auto_rotation_angle(&self) -> f32 {
        2.0 * PI / 60.0 / 60.0 * self.options.auto_rotate_speed
    }

    /// Apply pending input to the camera. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let mut spherical = Spherical::from_vec(camera.position - self.target);

        if self.options.auto_rotate && self.drag.is_none() {
            self.rotate_left(self.auto_rotation_angle());
        }

        let factor = if self.options.enable_damping {
            self.options.damping_factor
        } else {
            1.0
        };

        spherical.theta += self.spherical_delta.theta * factor;
        spherical.phi += self.spherical_delta.phi * factor;
        spherical.phi = spherical
            .phi
            .max(self.options.min_polar_angle)
            .min(self.options.max_polar_angle);
        spherical.make_safe();

        self.target += self.pan_offset * factor;

        spherical.radius = (spherical.radius * self.scale)
            .max(self.options.min_distance)
            .min(self.options.max_distance);

        let position = self.target + spherical.to_vec();
        let moved = position.distance_squared(camera.position) > EPS;
        camera.position = position;
        camera.set_look_at(self.target);

        if self.options.enable_damping {
            self.spherical_delta.theta *= 1.0 - factor;
            self.spherical_delta.phi *= 1.0 - factor;
            self.pan_offset *= 1.0 - factor;
        } else {
            self.spherical_delta = Spherical::default();
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::controller::input::WheelDeltaMode;

    fn camera() -> Camera {
        Camera::new(&CameraConfig::default(), 800, 600)
    }

    fn undamped() -> OrbitOptions {
        OrbitOptions { enable_damping: false, ..OrbitOptions::default() }
    }

    fn theta_of(camera: &Camera, target: Vec3) -> f32 {
        Spherical::from_vec(camera.position - target).theta
    }

    #[test]
    fn test_spherical_round_trip_keeps_direction() {
        let v = Vec3::new(1.0, 2.0, -3.0);
        assert!((Spherical::from_vec(v).to_vec() - v).length() < 1e-5);
    }

    #[test]
    fn test_update_without_input_keeps_camera() {
        let mut cam = camera();
        let mut orbit = OrbitControls::new(OrbitOptions::default());
        orbit.update(&mut cam);
        assert!((cam.position - Vec3::new(0.0, 4.0, 4.0)).length() < 1e-4);
        assert_eq!(cam.look_at, Vec3::new(0.0, 1.0, 0.0));
        assert!(!orbit.update(&mut cam));
    }

    #[test]
    fn test_distance_clamped_to_max() {
        let mut cam = camera();
        let mut orbit = OrbitControls::new(OrbitOptions::default());
        cam.position = orbit.target + Spherical { radius: 35.0, phi: 1.0, theta: 0.3 }.to_vec();
        orbit.update(&mut cam);
        assert!((cam.position.distance(orbit.target) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_polar_angle_clamped() {
        let mut cam = camera();
        let mut orbit = OrbitControls::new(OrbitOptions::default());
        cam.position = orbit.target + Vec3::new(0.0, 5.0, 0.01);
        orbit.update(&mut cam);
        let phi = Spherical::from_vec(cam.position - orbit.target).phi;
        assert!((phi - 0.5).abs() < 1e-4, "phi = {phi}");

        cam.position = orbit.target + Vec3::new(0.0, -5.0, 0.01);
        orbit.update(&mut cam);
        let phi = Spherical::from_vec(cam.position - orbit.target).phi;
        assert!((phi - 1.5).abs() < 1e-4, "phi = {phi}");
    }

    #[test]
    fn test_damping_eases_rotation() {
        let mut cam = camera();
        let mut orbit = OrbitControls::new(OrbitOptions::default());
        let start = theta_of(&cam, orbit.target);

        orbit.rotate_left(1.0);
        orbit.update(&mut cam);
        let first = theta_of(&cam, orbit.target);
        assert!((first - (start - 0.06)).abs() < 1e-4);

        // Keeps moving without new input, by a decayed amount
        orbit.update(&mut cam);
        let second = theta_of(&cam, orbit.target);
        assert!((second - (first - 0.06 * 0.94)).abs() < 1e-4);
    }

    #[test]
    fn test_drag_rotates_by_viewport_fraction() {
        let mut cam = camera();
        let mut orbit = OrbitControls::new(undamped());
        let viewport = Vec2::new(800.0, 600.0);
        let start = theta_of(&cam, orbit.target);

        orbit.handle_event(&InputEvent::PointerDown { button: MouseButton::Left, x: 100.0, y: 100.0 }, viewport, &cam);
        orbit.handle_event(&InputEvent::PointerMove { x: 150.0, y: 100.0 }, viewport, &cam);
        orbit.handle_event(&InputEvent::PointerUp { button: MouseButton::Left }, viewport, &cam);
        assert!(!orbit.is_dragging());
        orbit.update(&mut cam);

        let expected = start - 2.0 * PI * 50.0 / 600.0;
        assert!((theta_of(&cam, orbit.target) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_wheel_ignored_when_zoom_disabled() {
        let mut cam = camera();
        let viewport = Vec2::new(800.0, 600.0);
        let mut orbit = OrbitControls::new(undamped());
        let before = cam.position.distance(orbit.target);
        orbit.handle_event(&InputEvent::Wheel { delta_y: 120.0, mode: WheelDeltaMode::Pixel }, viewport, &cam);
        orbit.update(&mut cam);
        assert!((cam.position.distance(orbit.target) - before).abs() < 1e-4);

        let mut zooming = OrbitControls::new(OrbitOptions { enable_zoom: true, ..undamped() });
        zooming.handle_event(&InputEvent::Wheel { delta_y: 120.0, mode: WheelDeltaMode::Pixel }, viewport, &cam);
        zooming.update(&mut cam);
        assert!((cam.position.distance(zooming.target) - before / 0.95).abs() < 1e-3);
    }

    #[test]
    fn test_pan_requires_enable_pan() {
        let mut cam = camera();
        let viewport = Vec2::new(800.0, 600.0);
        let mut orbit = OrbitControls::new(undamped());
        orbit.handle_event(&InputEvent::PointerDown { button: MouseButton::Right, x: 0.0, y: 0.0 }, viewport, &cam);
        assert!(!orbit.is_dragging());

        let mut panning = OrbitControls::new(OrbitOptions { enable_pan: true, ..undamped() });
        panning.handle_event(&InputEvent::PointerDown { button: MouseButton::Right, x: 0.0, y: 0.0 }, viewport, &cam);
        panning.handle_event(&InputEvent::PointerMove { x: 40.0, y: 0.0 }, viewport, &cam);
        panning.update(&mut cam);
        // Dragging right moves the target toward -X in view space
        assert!(panning.target.x < 0.0);
        assert!((panning.target.y - 1.0).abs() < 1e-4);
    }
}
