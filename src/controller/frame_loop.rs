use glam::{Mat4, Vec2, Vec3};

use crate::config::{ViewerConfig, XrOptions};
use crate::controller::input::InputEvent;
use crate::controller::orbit::OrbitControls;
use crate::controller::trackball::TrackballControls;
use crate::controller::xr_input::{ControllerSet, VrInputMapper, XrEvent, XrFrameInput, CONTROLLER_COUNT};
use crate::model::loader::PendingModel;
use crate::model::scene::{build_scene, merge_model, Light, SceneGraph};
use crate::model::Camera;

/// Spot lights the shader has room for
pub const MAX_SPOT_LIGHTS: usize = 4;

/// Draws one frame of the scene
pub trait FrameRenderer {
    fn render(&mut self, scene: &SceneGraph, camera: &Camera);
}

/// Display surface that follows the viewport size
pub trait OutputSurface {
    fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64);
}

/// Logical viewport size plus device pixel ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// All mutable viewer state; shared by the event handlers and the frame loop
pub struct ViewerContext {
    pub camera: Camera,
    pub orbit: OrbitControls,
    pub trackball: TrackballControls,
    pub controllers: ControllerSet,
    pub scene: SceneGraph,
    pub viewport: Viewport,
    pub pending_model: Option<PendingModel>,
}

impl ViewerContext {
    pub fn new(config: &ViewerConfig, width: u32, height: u32, pixel_ratio: f64) -> Self {
        let mut trackball = TrackballControls::new(config.trackball.clone(), width, height);
        trackball.set_screen(0.0, 0.0, width as f32, height as f32);
        Self {
            camera: Camera::new(&config.camera, width, height),
            orbit: OrbitControls::new(config.orbit.clone()),
            trackball,
            controllers: ControllerSet::new(),
            scene: build_scene(config),
            viewport: Viewport { width, height, pixel_ratio },
            pending_model: None,
        }
    }

    /// Route a desktop pointer event to both camera controllers
    pub fn handle_input(&mut self, event: &InputEvent) {
        self.orbit.handle_event(event, self.viewport.size(), &self.camera);
        self.trackball.handle_event(event);
    }

    pub fn handle_xr_event(&mut self, event: XrEvent) {
        self.controllers.handle_event(event);
    }

    /// Merge a finished model load into the scene. Returns true if the model
    /// was added.
    pub fn absorb_pending_model(&mut self) -> bool {
        let Some(pending) = self.pending_model.as_mut() else {
            return false;
        };
        let Some(result) = pending.poll() else {
            return false;
        };
        let url = pending.url().to_string();
        self.pending_model = None;

        match result {
            Ok(model) => {
                tracing::info!(url = %url, meshes = model.mesh_count(), "model loaded");
                self.scene = merge_model(std::mem::take(&mut self.scene), model);
                true
            }
            Err(e) => {
                tracing::error!(url = %url, "failed to load model: {e}");
                false
            }
        }
    }

    fn sync_grips(&mut self, frame: Option<&XrFrameInput>) {
        for index in 0..CONTROLLER_COUNT {
            let pose = frame.and_then(|f| f.grip_pose(index));
            self.controllers.set_grip_pose(index, pose);
            self.scene.set_grip_pose(index, pose);
        }
    }
}

/// Runs one tick per display refresh
pub struct FrameDriver {
    mapper: VrInputMapper,
    frame_count: u64,
}

impl FrameDriver {
    pub fn new(xr: &XrOptions) -> Self {
        Self {
            mapper: VrInputMapper::new(xr.axis_scale),
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance the viewer by one frame and render it. `xr` is the current XR
    /// frame's input, or `None` outside an immersive session.
    pub fn tick(&mut self, ctx: &mut ViewerContext, xr: Option<&XrFrameInput>, renderer: &mut impl FrameRenderer) {
        ctx.absorb_pending_model();

        ctx.orbit.update(&mut ctx.camera);
        ctx.trackball.update(&mut ctx.camera);

        for slot in 0..CONTROLLER_COUNT {
            self.mapper.apply_controller(slot, xr, &mut ctx.camera, &mut ctx.orbit);
        }
        ctx.sync_grips(xr);

        if ctx.camera.is_projection_dirty() {
            ctx.camera.update_projection_matrix();
        }

        renderer.render(&ctx.scene, &ctx.camera);
        self.frame_count += 1;
    }
}

/// Keep camera and output surface in step with the viewport. A zero-sized
/// viewport is ignored. Returns true if anything changed.
pub fn handle_resize(
    ctx: &mut ViewerContext,
    width: u32,
    height: u32,
    pixel_ratio: f64,
    surface: &mut impl OutputSurface,
) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    ctx.viewport = Viewport { width, height, pixel_ratio };
    ctx.camera.set_aspect(width, height);
    ctx.trackball.set_screen(0.0, 0.0, width as f32, height as f32);
    surface.resize(width, height, pixel_ratio);
    tracing::debug!(width, height, pixel_ratio, "viewport resized");
    true
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            eye: camera.position.extend(1.0).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpotLightUniform {
    pub position: [f32; 3],
    pub intensity: f32,
    pub direction: [f32; 3],
    pub distance: f32,
    pub color: [f32; 3],
    pub cos_outer: f32,
    pub cos_inner: f32,
    pub decay: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniform {
    pub ambient: [f32; 3],
    pub spot_count: u32,
    pub spots: [SpotLightUniform; MAX_SPOT_LIGHTS],
}

impl LightingUniform {
    /// Sum the ambient lights and pack up to [`MAX_SPOT_LIGHTS`] spots
    pub fn from_scene(scene: &SceneGraph) -> Self {
        let mut ambient = Vec3::ZERO;
        let mut spots = [SpotLightUniform::default(); MAX_SPOT_LIGHTS];
        let mut count = 0;

        for (light, position) in scene.lights() {
            match light {
                Light::Ambient(a) => ambient += a.color * a.intensity,
                Light::Spot(s) => {
                    if count == MAX_SPOT_LIGHTS {
                        tracing::warn!("more than {MAX_SPOT_LIGHTS} spot lights, extra lights ignored");
                        continue;
                    }
                    let direction = (s.target - position).try_normalize().unwrap_or(Vec3::NEG_Y);
                    spots[count] = SpotLightUniform {
                        position: position.to_array(),
                        intensity: s.intensity,
                        direction: direction.to_array(),
                        distance: s.distance,
                        color: s.color.to_array(),
                        cos_outer: s.angle.cos(),
                        cos_inner: (s.angle * (1.0 - s.penumbra)).cos(),
                        decay: s.decay,
                        _pad: [0.0; 2],
                    };
                    count += 1;
                }
            }
        }

        Self { ambient: ambient.to_array(), spot_count: count as u32, spots }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl ModelUniform {
    pub fn from_world(world: Mat4) -> Self {
        Self {
            model: world.to_cols_array_2d(),
            normal: world.inverse().transpose().to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input::{MouseButton, WheelDeltaMode};
    use crate::controller::xr_input::{Gamepad, XrInputSource};
    use crate::model::loader::LoadError;
    use crate::model::scene::{ModelSubgraph, NodeKind, SceneNode};

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Vec<(Vec3, bool, usize)>,
    }

    impl FrameRenderer for RecordingRenderer {
        fn render(&mut self, scene: &SceneGraph, camera: &Camera) {
            self.frames.push((camera.position, camera.is_projection_dirty(), scene.nodes().len()));
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        sizes: Vec<(u32, u32, f64)>,
    }

    impl OutputSurface for RecordingSurface {
        fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) {
            self.sizes.push((width, height, pixel_ratio));
        }
    }

    fn context() -> ViewerContext {
        ViewerContext::new(&ViewerConfig::default(), 800, 600, 1.0)
    }

    fn driver() -> FrameDriver {
        FrameDriver::new(&XrOptions::default())
    }

    fn car() -> ModelSubgraph {
        ModelSubgraph { root: SceneNode::group("car").with_translation(Vec3::new(1.0, 2.0, 3.0)) }
    }

    #[test]
    fn test_tick_renders_settled_camera() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();

        ctx.camera.set_aspect(1024, 512);
        driver.tick(&mut ctx, None, &mut renderer);

        assert_eq!(driver.frame_count(), 1);
        let (_, dirty, _) = renderer.frames[0];
        assert!(!dirty);
    }

    #[test]
    fn test_idle_ticks_keep_camera_still() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();
        for _ in 0..5 {
            driver.tick(&mut ctx, None, &mut renderer);
        }
        let first = renderer.frames[0].0;
        assert!(renderer.frames.iter().all(|(p, _, _)| (*p - first).length() < 1e-4));
    }

    #[test]
    fn test_xr_input_applied_after_controllers() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();
        driver.tick(&mut ctx, None, &mut renderer);
        let z = ctx.camera.position.z;

        let frame = XrFrameInput {
            sources: vec![XrInputSource {
                controller: 0,
                gamepad: Some(Gamepad { axes: vec![0.0, -1.0, 0.0, 0.0] }),
                grip_pose: None,
            }],
        };
        driver.tick(&mut ctx, Some(&frame), &mut renderer);

        // The mapper's change survives to the rendered frame
        let (rendered, _, _) = renderer.frames[1];
        assert!((rendered.z - (z + 0.1)).abs() < 1e-4, "z = {}", rendered.z);
    }

    #[test]
    fn test_every_gamepad_source_applied_once_per_tick() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();
        driver.tick(&mut ctx, None, &mut renderer);
        let z = ctx.camera.position.z;

        let stick = |controller| XrInputSource {
            controller,
            gamepad: Some(Gamepad { axes: vec![0.0, -1.0, 0.0, 0.0] }),
            grip_pose: None,
        };
        let frame = XrFrameInput {
            sources: vec![XrInputSource { controller: 0, gamepad: None, grip_pose: None }, stick(1), stick(2)],
        };
        driver.tick(&mut ctx, Some(&frame), &mut renderer);

        let dz = ctx.camera.position.z - z;
        assert!((dz - 0.2).abs() < 1e-4, "dz = {dz}");
    }

    #[test]
    fn test_inactive_session_leaves_target() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let target = ctx.orbit.target;
        driver().tick(&mut ctx, None, &mut renderer);
        assert_eq!(ctx.orbit.target, target);
    }

    #[test]
    fn test_completed_load_merged_before_render() {
        let mut ctx = context();
        let nodes = ctx.scene.nodes().len();
        ctx.pending_model = Some(PendingModel::ready("car.gltf", Ok(car())));

        let mut renderer = RecordingRenderer::default();
        driver().tick(&mut ctx, None, &mut renderer);

        assert_eq!(renderer.frames[0].2, nodes + 1);
        assert!(ctx.pending_model.is_none());
        assert_eq!(ctx.scene.find("car").map(|n| n.translation), Some(Vec3::ZERO));
    }

    #[test]
    fn test_failed_load_leaves_scene() {
        let mut ctx = context();
        let nodes = ctx.scene.nodes().len();
        ctx.pending_model = Some(PendingModel::ready("missing.gltf", Err(LoadError::NoScene)));

        let mut renderer = RecordingRenderer::default();
        driver().tick(&mut ctx, None, &mut renderer);

        assert_eq!(ctx.scene.nodes().len(), nodes);
        assert!(ctx.pending_model.is_none());
        assert_eq!(renderer.frames.len(), 1);
    }

    #[test]
    fn test_grip_pose_follows_xr_frame() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();
        let pose = Mat4::from_translation(Vec3::new(0.3, 1.1, -0.2));
        let frame = XrFrameInput {
            sources: vec![XrInputSource { controller: 1, gamepad: None, grip_pose: Some(pose) }],
        };

        driver.tick(&mut ctx, Some(&frame), &mut renderer);
        assert_eq!(ctx.controllers.get(1).and_then(|c| c.grip_pose), Some(pose));
        let grip = ctx.scene.find("controller_grip_1").expect("grip node");
        assert!(grip.visible);
        assert!(matches!(grip.kind, NodeKind::ControllerGrip(1)));

        // Session over: grips hide again
        driver.tick(&mut ctx, None, &mut renderer);
        assert_eq!(ctx.controllers.get(1).and_then(|c| c.grip_pose), None);
        assert!(!ctx.scene.find("controller_grip_1").is_some_and(|n| n.visible));
    }

    #[test]
    fn test_resize_updates_camera_and_surface() {
        let mut ctx = context();
        let mut surface = RecordingSurface::default();
        assert!((ctx.camera.aspect - 800.0 / 600.0).abs() < 1e-3);

        assert!(handle_resize(&mut ctx, 1600, 900, 2.0, &mut surface));
        assert!((ctx.camera.aspect - 1600.0 / 900.0).abs() < 1e-3);
        assert!(ctx.camera.is_projection_dirty());
        assert_eq!(surface.sizes, vec![(1600, 900, 2.0)]);
        assert_eq!(ctx.viewport.size(), Vec2::new(1600.0, 900.0));

        let mut renderer = RecordingRenderer::default();
        driver().tick(&mut ctx, None, &mut renderer);
        assert!(!ctx.camera.is_projection_dirty());
    }

    #[test]
    fn test_zero_size_resize_is_ignored() {
        let mut ctx = context();
        let mut surface = RecordingSurface::default();
        assert!(!handle_resize(&mut ctx, 0, 600, 1.0, &mut surface));
        assert!(!handle_resize(&mut ctx, 800, 0, 1.0, &mut surface));
        assert!(surface.sizes.is_empty());
        assert!(!ctx.camera.is_projection_dirty());
    }

    #[test]
    fn test_wheel_reaches_trackball() {
        let mut ctx = context();
        let mut renderer = RecordingRenderer::default();
        let mut driver = driver();
        driver.tick(&mut ctx, None, &mut renderer);
        let before = ctx.camera.position.distance(ctx.trackball.target);

        ctx.handle_input(&InputEvent::Wheel { delta_y: -100.0, mode: WheelDeltaMode::Pixel });
        driver.tick(&mut ctx, None, &mut renderer);
        assert!(ctx.camera.position.distance(ctx.trackball.target) < before);
    }

    #[test]
    fn test_drag_reaches_orbit() {
        let mut ctx = context();
        ctx.handle_input(&InputEvent::PointerDown { button: MouseButton::Left, x: 10.0, y: 10.0 });
        assert!(ctx.orbit.is_dragging());
        ctx.handle_input(&InputEvent::PointerUp { button: MouseButton::Left });
        assert!(!ctx.orbit.is_dragging());
    }

    #[test]
    fn test_xr_select_events_update_controllers() {
        let mut ctx = context();
        ctx.handle_xr_event(XrEvent::SelectStart(0));
        assert!(ctx.controllers.get(0).is_some_and(|c| c.is_selecting()));
        ctx.handle_xr_event(XrEvent::SelectEnd(0));
        assert!(!ctx.controllers.get(0).is_some_and(|c| c.is_selecting()));
    }

    #[test]
    fn test_lighting_uniform_packs_scene_lights() {
        let ctx = context();
        let lighting = LightingUniform::from_scene(&ctx.scene);
        assert_eq!(lighting.spot_count, 3);
        assert_eq!(lighting.ambient, [2.0, 2.0, 2.0]);

        let spot = lighting.spots[0];
        assert_eq!(spot.position, [0.0, 25.0, 0.0]);
        assert_eq!(spot.intensity, 3500.0);
        assert!((Vec3::from(spot.direction) - Vec3::NEG_Y).length() < 1e-6);
        assert!((spot.cos_outer - 0.2f32.cos()).abs() < 1e-6);
        assert!((spot.cos_inner - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<SpotLightUniform>(), 64);
        assert_eq!(std::mem::size_of::<LightingUniform>(), 16 + 64 * MAX_SPOT_LIGHTS);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
        assert_eq!(std::mem::size_of::<ModelUniform>(), 128);
    }
}
