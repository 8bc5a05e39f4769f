use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Perspective camera shared by the desktop and XR controllers.
///
/// The projection matrix is cached; changing any projection parameter through
/// [`Camera::set_aspect`] marks it dirty until [`Camera::update_projection_matrix`]
/// runs.
pub struct Camera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    projection: Mat4,
    projection_dirty: bool,
}

impl Camera {
    pub fn new(config: &CameraConfig, width: u32, height: u32) -> Self {
        let mut camera = Self {
            position: config.position,
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: config.fov_y_degrees.to_radians(),
            aspect: aspect_ratio(width, height),
            z_near: config.z_near,
            z_far: config.z_far,
            projection: Mat4::IDENTITY,
            projection_dirty: true,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn forward(&self) -> Vec3 {
        (self.look_at - self.position).try_normalize().unwrap_or(Vec3::NEG_Z)
    }

    pub fn set_look_at(&mut self, target: Vec3) {
        self.look_at = target;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
        self.projection_dirty = true;
    }

    pub fn is_projection_dirty(&self) -> bool {
        self.projection_dirty
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far);
        self.projection_dirty = false;
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.look_at, self.up)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view()
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    width as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_camera_uses_config() {
        let cam = Camera::new(&CameraConfig::default(), 800, 600);
        assert_eq!(cam.position, Vec3::new(0.0, 4.0, 4.0));
        assert!((cam.fov_y - 70f32.to_radians()).abs() < 1e-6);
        assert!((cam.aspect - 800.0 / 600.0).abs() < 1e-6);
        assert!(!cam.is_projection_dirty());
    }

    #[test]
    fn test_set_aspect_marks_projection_dirty() {
        let mut cam = Camera::new(&CameraConfig::default(), 800, 600);
        let before = cam.projection();
        cam.set_aspect(1600, 900);
        assert!(cam.is_projection_dirty());
        assert_eq!(cam.projection(), before);

        cam.update_projection_matrix();
        assert!(!cam.is_projection_dirty());
        assert_ne!(cam.projection(), before);
    }

    #[test]
    fn test_forward_points_at_look_at() {
        let mut cam = Camera::new(&CameraConfig::default(), 800, 600);
        cam.position = Vec3::new(0.0, 0.0, 5.0);
        cam.set_look_at(Vec3::ZERO);
        assert!((cam.forward() - Vec3::NEG_Z).length() < 1e-6);
    }
}
