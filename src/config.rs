use glam::Vec3;

/// Default model shipped next to the web build
pub const DEFAULT_MODEL_URL: &str = "public/porsche_911_turbo_s__takeover/scene.gltf";

/// Perspective camera setup
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub position: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 70.0,
            z_near: 0.1,
            z_far: 1000.0,
            position: Vec3::new(0.0, 4.0, 4.0),
        }
    }
}

/// Orbit controller options (primary desktop controller)
#[derive(Debug, Clone)]
pub struct OrbitOptions {
    pub enable_zoom: bool,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_pan: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub auto_rotate: bool,
    /// Full turns per minute at 60 fps
    pub auto_rotate_speed: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub target: Vec3,
}

impl Default for OrbitOptions {
    fn default() -> Self {
        Self {
            enable_zoom: false,
            enable_damping: true,
            damping_factor: 0.06,
            enable_pan: false,
            min_distance: 0.0,
            max_distance: 20.0,
            min_polar_angle: 0.5,
            max_polar_angle: 1.5,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            target: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

/// Trackball controller options. Only zoom is enabled by default; the
/// orbit controller owns rotation.
#[derive(Debug, Clone)]
pub struct TrackballOptions {
    pub no_rotate: bool,
    pub no_pan: bool,
    pub no_zoom: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub static_moving: bool,
    pub dynamic_damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub target: Vec3,
}

impl Default for TrackballOptions {
    fn default() -> Self {
        Self {
            no_rotate: true,
            no_pan: true,
            no_zoom: false,
            rotate_speed: 1.0,
            zoom_speed: 5.0,
            pan_speed: 0.3,
            static_moving: false,
            dynamic_damping_factor: 0.2,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            target: Vec3::ZERO,
        }
    }
}

/// Gamepad mapping for XR controllers
#[derive(Debug, Clone)]
pub struct XrOptions {
    /// Scale applied to thumbstick axes before they move the camera
    pub axis_scale: f32,
}

impl Default for XrOptions {
    fn default() -> Self {
        Self { axis_scale: 0.1 }
    }
}

#[derive(Debug, Clone)]
pub struct GroundConfig {
    pub size: f32,
    pub segments: u32,
    pub color: [f32; 4],
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            size: 20.0,
            segments: 32,
            color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotLightConfig {
    pub color: Vec3,
    pub intensity: f32,
    pub distance: f32,
    pub angle: f32,
    pub penumbra: f32,
    pub decay: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub cast_shadow: bool,
    pub shadow_bias: f32,
}

impl SpotLightConfig {
    fn overhead(intensity: f32, position: Vec3) -> Self {
        Self {
            color: Vec3::ONE,
            intensity,
            distance: 100.0,
            angle: 0.2,
            penumbra: 1.0,
            decay: 2.0,
            position,
            target: Vec3::ZERO,
            cast_shadow: true,
            shadow_bias: -0.0001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmbientLightConfig {
    pub color: Vec3,
    pub intensity: f32,
}

/// Everything the viewer needs to build its scene and controllers
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub model_url: String,
    pub camera: CameraConfig,
    pub orbit: OrbitOptions,
    pub trackball: TrackballOptions,
    pub xr: XrOptions,
    pub ground: GroundConfig,
    pub spot_lights: Vec<SpotLightConfig>,
    pub ambient_lights: Vec<AmbientLightConfig>,
    pub clear_color: [f64; 4],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            camera: CameraConfig::default(),
            orbit: OrbitOptions::default(),
            trackball: TrackballOptions::default(),
            xr: XrOptions::default(),
            ground: GroundConfig::default(),
            spot_lights: vec![
                SpotLightConfig::overhead(3500.0, Vec3::new(0.0, 25.0, 0.0)),
                SpotLightConfig::overhead(4500.0, Vec3::new(0.0, 15.0, 0.0)),
                SpotLightConfig::overhead(4500.0, Vec3::new(5.0, 15.0, 15.0)),
            ],
            ambient_lights: vec![
                AmbientLightConfig { color: Vec3::ONE, intensity: 1.0 },
                AmbientLightConfig { color: Vec3::ONE, intensity: 1.0 },
            ],
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl ViewerConfig {
    /// Defaults with the model path taken from `CAR_VIEWER_MODEL` if set
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::default().with_model(std::env::var("CAR_VIEWER_MODEL").ok())
    }

    /// Override the model URL with an already decoded value, such as the
    /// page's `?model=` parameter. Empty values keep the default.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.model_url = model;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_showroom_setup() {
        let config = ViewerConfig::default();
        assert!(!config.orbit.enable_zoom);
        assert!(!config.orbit.enable_pan);
        assert!(config.orbit.enable_damping);
        assert_eq!(config.orbit.damping_factor, 0.06);
        assert_eq!(config.orbit.max_distance, 20.0);
        assert_eq!(config.orbit.target, Vec3::new(0.0, 1.0, 0.0));
        assert!(config.trackball.no_rotate && config.trackball.no_pan);
        assert!(!config.trackball.no_zoom);
        assert_eq!(config.trackball.zoom_speed, 5.0);
        assert_eq!(config.xr.axis_scale, 0.1);
        assert_eq!(config.spot_lights.len(), 3);
        assert_eq!(config.ambient_lights.len(), 2);
    }

    #[test]
    fn test_model_override() {
        let config = ViewerConfig::default().with_model(Some("cars/my car.glb".into()));
        assert_eq!(config.model_url, "cars/my car.glb");

        let config = ViewerConfig::default().with_model(Some(String::new()));
        assert_eq!(config.model_url, DEFAULT_MODEL_URL);

        let config = ViewerConfig::default().with_model(None);
        assert_eq!(config.model_url, DEFAULT_MODEL_URL);
    }
}
