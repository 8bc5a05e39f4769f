use glam::{Quat, Vec2, Vec3};

use crate::config::TrackballOptions;
use crate::controller::input::{InputEvent, MouseButton, WheelDeltaMode};
use crate::model::Camera;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    Rotate,
    Zoom,
    Pan,
}

/// Trackball controller. In the showroom it only zooms (mouse wheel); rotate
/// and pan are available when their `no_*` flags are cleared.
///
/// Movement eases out over several frames unless `static_moving` is set, so
/// [`TrackballControls::update`] has to run every frame.
pub struct TrackballControls {
    pub options: TrackballOptions,
    pub target: Vec3,
    screen_origin: Vec2,
    screen_size: Vec2,
    drag: Option<DragMode>,
    move_prev: Vec2,
    move_curr: Vec2,
    last_axis: Vec3,
    last_angle: f32,
    zoom_start: f32,
    zoom_end: f32,
    pan_start: Vec2,
    pan_end: Vec2,
}

impl TrackballControls {
    pub fn new(options: TrackballOptions, width: u32, height: u32) -> Self {
        Self {
            target: options.target,
            options,
            screen_origin: Vec2::ZERO,
            screen_size: Vec2::new(width as f32, height as f32),
            drag: None,
            move_prev: Vec2::ZERO,
            move_curr: Vec2::ZERO,
            last_axis: Vec3::ZERO,
            last_angle: 0.0,
            zoom_start: 0.0,
            zoom_end: 0.0,
            pan_start: Vec2::ZERO,
            pan_end: Vec2::ZERO,
        }
    }

    /// Screen rectangle the pointer coordinates are relative to
    pub fn set_screen(&mut self, left: f32, top: f32, width: f32, height: f32) {
        self.screen_origin = Vec2::new(left, top);
        self.screen_size = Vec2::new(width.max(1.0), height.max(1.0));
    }

    fn mouse_on_screen(&self, x: f32, y: f32) -> Vec2 {
        (Vec2::new(x, y) - self.screen_origin) / self.screen_size
    }

    fn mouse_on_circle(&self, x: f32, y: f32) -> Vec2 {
        let size = self.screen_size;
        Vec2::new(
            (x - size.x * 0.5 - self.screen_origin.x) / (size.x * 0.5),
            (size.y + 2.0 * (self.screen_origin.y - y)) / size.x,
        )
    }

    pub fn handle_event(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerDown { button, x, y } => {
                let mode = match button {
                    MouseButton::Left if !self.options.no_rotate => DragMode::Rotate,
                    MouseButton::Middle if !self.options.no_zoom => DragMode::Zoom,
                    MouseButton::Right if !self.options.no_pan => DragMode::Pan,
                    _ => return,
                };
                match mode {
                    DragMode::Rotate => {
                        self.move_curr = self.mouse_on_circle(x, y);
                        self.move_prev = self.move_curr;
                    }
                    DragMode::Zoom => {
                        self.zoom_start = self.mouse_on_screen(x, y).y;
                        self.zoom_end = self.zoom_start;
                    }
                    DragMode::Pan => {
                        self.pan_start = self.mouse_on_screen(x, y);
                        self.pan_end = self.pan_start;
                    }
                }
                self.drag = Some(mode);
            }
            InputEvent::PointerMove { x, y } => match self.drag {
                Some(DragMode::Rotate) => {
                    self.move_prev = self.move_curr;
                    self.move_curr = self.mouse_on_circle(x, y);
                }
                Some(DragMode::Zoom) => self.zoom_end = self.mouse_on_screen(x, y).y,
                Some(DragMode::Pan) => self.pan_end = self.mouse_on_screen(x, y),
                None => {}
            },
            InputEvent::PointerUp { .. } => self.drag = None,
            InputEvent::Wheel { delta_y, mode } => {
                if self.options.no_zoom {
                    return;
                }
                let k = match mode {
                    WheelDeltaMode::Page => 0.025,
                    WheelDeltaMode::Line => 0.01,
                    WheelDeltaMode::Pixel => 0.00025,
                };
                self.zoom_start -= delta_y * k;
            }
        }
    }

    fn rotate_camera(&mut self, camera: &mut Camera, eye: &mut Vec3) {
        let dx = self.move_curr.x - self.move_prev.x;
        let dy = self.move_curr.y - self.move_prev.y;
        let mut angle = (dx * dx + dy * dy).sqrt();

        if angle > 0.0 {
            let eye_direction = eye.normalize_or_zero();
            let object_up = camera.up.normalize_or_zero();
            let sideways = object_up.cross(eye_direction).normalize_or_zero();
            let move_direction = object_up * dy + sideways * dx;
            let axis = move_direction.cross(*eye).normalize_or_zero();
            if axis != Vec3::ZERO {
                angle *= self.options.rotate_speed;
                let q = Quat::from_axis_angle(axis, angle);
                *eye = q * *eye;
                camera.up = q * camera.up;
                self.last_axis = axis;
                self.last_angle = angle;
            }
        } else if !self.options.static_moving && self.last_angle != 0.0 {
            self.last_angle *= (1.0 - self.options.dynamic_damping_factor).sqrt();
            let q = Quat::from_axis_angle(self.last_axis, self.last_angle);
            *eye = q * *eye;
            camera.up = q * camera.up;
        }

        self.move_prev = self.move_curr;
    }

    fn zoom_camera(&mut self, eye: &mut Vec3) {
        let factor = 1.0 + (self.zoom_end - self.zoom_start) * self.options.zoom_speed;
        if factor != 1.0 && factor > 0.0 {
            *eye *= factor;
        }

        if self.options.static_moving {
            self.zoom_start = self.zoom_end;
        } else {
            self.zoom_start += (self.zoom_end - self.zoom_start) * self.options.dynamic_damping_factor;
        }
    }

    fn pan_camera(&mut self, camera: &mut Camera, eye: &Vec3) {
        let mut change = self.pan_end - self.pan_start;
        if change.length_squared() == 0.0 {
            return;
        }
        change *= eye.length() * self.options.pan_speed;

        let sideways = eye.cross(camera.up).normalize_or_zero() * change.x;
        let upward = camera.up.normalize_or_zero() * change.y;
        let pan = sideways + upward;
        camera.position += pan;
        self.target += pan;

        if self.options.static_moving {
            self.pan_start = self.pan_end;
        } else {
            self.pan_start += (self.pan_end - self.pan_start) * self.options.dynamic_damping_factor;
        }
    }

    fn check_distances(&mut self, camera: &mut Camera, eye: &mut Vec3) {
        let (min, max) = (self.options.min_distance, self.options.max_distance);
        if eye.length_squared() > max * max {
            *eye = eye.normalize_or_zero() * max;
            camera.position = self.target + *eye;
            self.zoom_start = self.zoom_end;
        }
        if eye.length_squared() < min * min {
            *eye = eye.normalize_or_zero() * min;
            camera.position = self.target + *eye;
            self.zoom_start = self.zoom_end;
        }
    }

    /// Apply pending input to the camera. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let before = camera.position;
        let mut eye = camera.position - self.target;

        if !self.options.no_rotate {
            self.rotate_camera(camera, &mut eye);
        }
        if !self.options.no_zoom {
            self.zoom_camera(&mut eye);
        }
        if !self.options.no_pan {
            self.pan_camera(camera, &eye);
        }

        camera.position = self.target + eye;

        if !self.options.no_zoom || !self.options.no_pan {
            self.check_distances(camera, &mut eye);
        }

        camera.set_look_at(self.target);
        before.distance_squared(camera.position) > EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;

    fn camera() -> Camera {
        Camera::new(&CameraConfig::default(), 800, 600)
    }

    fn wheel(delta_y: f32) -> InputEvent {
        InputEvent::Wheel { delta_y, mode: WheelDeltaMode::Pixel }
    }

    #[test]
    fn test_wheel_zoom_eases_out() {
        let mut cam = camera();
        let mut trackball = TrackballControls::new(TrackballOptions::default(), 800, 600);
        let start = cam.position.length();

        trackball.handle_event(&wheel(100.0));
        assert!(trackball.update(&mut cam));
        let first = cam.position.length();
        assert!((first - start * 1.125).abs() < 1e-4, "got {first}");

        // Remaining zoom carries into the next frame
        trackball.update(&mut cam);
        assert!((cam.position.length() - first * 1.1).abs() < 1e-4);
    }

    #[test]
    fn test_static_moving_zooms_once() {
        let mut cam = camera();
        let options = TrackballOptions { static_moving: true, ..TrackballOptions::default() };
        let mut trackball = TrackballControls::new(options, 800, 600);

        trackball.handle_event(&wheel(-100.0));
        trackball.update(&mut cam);
        let zoomed = cam.position.length();
        assert!(zoomed < Vec3::new(0.0, 4.0, 4.0).length());
        assert!(!trackball.update(&mut cam));
        assert!((cam.position.length() - zoomed).abs() < 1e-5);
    }

    #[test]
    fn test_no_zoom_ignores_wheel() {
        let mut cam = camera();
        let options = TrackballOptions { no_zoom: true, ..TrackballOptions::default() };
        let mut trackball = TrackballControls::new(options, 800, 600);
        let before = cam.position;
        trackball.handle_event(&wheel(500.0));
        assert!(!trackball.update(&mut cam));
        assert_eq!(cam.position, before);
    }

    #[test]
    fn test_rotate_disabled_by_default() {
        let mut cam = camera();
        let mut trackball = TrackballControls::new(TrackballOptions::default(), 800, 600);
        let before = cam.position;
        trackball.handle_event(&InputEvent::PointerDown { button: MouseButton::Left, x: 400.0, y: 300.0 });
        trackball.handle_event(&InputEvent::PointerMove { x: 500.0, y: 300.0 });
        trackball.update(&mut cam);
        assert!((cam.position - before).length() < 1e-6);
    }

    #[test]
    fn test_rotate_preserves_distance() {
        let mut cam = camera();
        let options = TrackballOptions { no_rotate: false, ..TrackballOptions::default() };
        let mut trackball = TrackballControls::new(options, 800, 600);
        let before = cam.position;

        trackball.handle_event(&InputEvent::PointerDown { button: MouseButton::Left, x: 400.0, y: 300.0 });
        trackball.handle_event(&InputEvent::PointerMove { x: 480.0, y: 300.0 });
        assert!(trackball.update(&mut cam));
        assert!((cam.position.length() - before.length()).abs() < 1e-4);
        assert!((cam.position - before).length() > 1e-3);
    }

    #[test]
    fn test_zoom_clamped_to_max_distance() {
        let mut cam = camera();
        let options = TrackballOptions { max_distance: 6.0, ..TrackballOptions::default() };
        let mut trackball = TrackballControls::new(options, 800, 600);
        trackball.handle_event(&wheel(2000.0));
        trackball.update(&mut cam);
        assert!((cam.position.length() - 6.0).abs() < 1e-4);
    }
}
