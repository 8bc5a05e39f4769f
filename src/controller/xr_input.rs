use glam::{Mat4, Vec2};

use crate::controller::orbit::OrbitControls;
use crate::model::Camera;

/// Number of tracked XR controllers
pub const CONTROLLER_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectState {
    #[default]
    Idle,
    Selecting,
}

/// Per-controller state kept between XR frames
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub select: SelectState,
    pub grip_pose: Option<Mat4>,
}

impl ControllerState {
    pub fn select_start(&mut self) {
        self.select = SelectState::Selecting;
    }

    pub fn select_end(&mut self) {
        self.select = SelectState::Idle;
    }

    pub fn is_selecting(&self) -> bool {
        self.select == SelectState::Selecting
    }
}

/// Discrete controller events delivered by the XR session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrEvent {
    SelectStart(usize),
    SelectEnd(usize),
}

#[derive(Debug, Clone, Default)]
pub struct ControllerSet {
    controllers: [ControllerState; CONTROLLER_COUNT],
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&ControllerState> {
        self.controllers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControllerState> {
        self.controllers.iter()
    }

    /// Apply a select event. Returns false for an unknown controller index.
    pub fn handle_event(&mut self, event: XrEvent) -> bool {
        let (index, start) = match event {
            XrEvent::SelectStart(i) => (i, true),
            XrEvent::SelectEnd(i) => (i, false),
        };
        let Some(controller) = self.controllers.get_mut(index) else {
            tracing::debug!(index, "ignoring select event for untracked controller");
            return false;
        };
        if start {
            controller.select_start();
        } else {
            controller.select_end();
        }
        true
    }

    pub fn set_grip_pose(&mut self, index: usize, pose: Option<Mat4>) {
        if let Some(controller) = self.controllers.get_mut(index) {
            controller.grip_pose = pose;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gamepad {
    pub axes: Vec<f32>,
}

/// One input source as seen in a single XR frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrInputSource {
    /// Controller slot this source is bound to
    pub controller: usize,
    pub gamepad: Option<Gamepad>,
    pub grip_pose: Option<Mat4>,
}

/// What the page can offer for immersive VR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrAvailability {
    /// `navigator.xr` is missing (insecure context or no WebXR)
    Missing,
    Unsupported,
    Supported,
}

impl XrAvailability {
    /// `supported` is the answer of `isSessionSupported("immersive-vr")`,
    /// `None` if the query failed
    pub fn from_probe(has_xr: bool, supported: Option<bool>) -> Self {
        match (has_xr, supported) {
            (false, _) => XrAvailability::Missing,
            (true, Some(true)) => XrAvailability::Supported,
            (true, _) => XrAvailability::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self == XrAvailability::Supported
    }

    pub fn button_label(self) -> &'static str {
        match self {
            XrAvailability::Supported => "ENTER VR",
            XrAvailability::Missing | XrAvailability::Unsupported => "VR NOT SUPPORTED",
        }
    }
}

/// Snapshot of all input sources for one XR frame. Only exists while an
/// immersive session is running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrFrameInput {
    pub sources: Vec<XrInputSource>,
}

impl XrFrameInput {
    pub fn sources_for(&self, controller: usize) -> impl Iterator<Item = &XrInputSource> {
        self.sources.iter().filter(move |s| s.controller == controller)
    }

    /// Sources whose gamepads are applied on `slot`'s pass. Sources listed
    /// past the last slot ride along with it, so each gamepad counts once.
    pub fn gamepad_sources_for(&self, slot: usize) -> impl Iterator<Item = &XrInputSource> {
        let last = slot + 1 == CONTROLLER_COUNT;
        self.sources
            .iter()
            .filter(move |s| s.controller == slot || (last && s.controller > slot))
    }

    pub fn grip_pose(&self, controller: usize) -> Option<Mat4> {
        self.sources_for(controller).find_map(|s| s.grip_pose)
    }
}

/// Camera movement derived from one gamepad's thumbstick axes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadDelta {
    pub zoom: f32,
    pub pan: Vec2,
}

impl GamepadDelta {
    /// Axis 1 zooms (pushing forward moves the camera in), axes 2 and 3 pan.
    /// Missing axes read as zero.
    pub fn from_axes(axes: &[f32], scale: f32) -> Self {
        let axis = |i: usize| axes.get(i).copied().unwrap_or(0.0);
        Self {
            zoom: -axis(1) * scale,
            pan: Vec2::new(axis(2) * scale, axis(3) * scale),
        }
    }
}

/// Maps XR gamepad axes onto the camera and orbit target
#[derive(Debug, Clone)]
pub struct VrInputMapper {
    pub axis_scale: f32,
}

impl VrInputMapper {
    pub fn new(axis_scale: f32) -> Self {
        Self { axis_scale }
    }

    /// Apply every source that has a gamepad. Returns how many were applied.
    pub fn apply<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a XrInputSource>,
        camera: &mut Camera,
        orbit: &mut OrbitControls,
    ) -> usize {
        let mut applied = 0;
        for source in sources {
            let Some(gamepad) = &source.gamepad else { continue };
            let delta = GamepadDelta::from_axes(&gamepad.axes, self.axis_scale);

            camera.position.z += delta.zoom;
            orbit.target.x += delta.pan.x;
            orbit.target.y += delta.pan.y;
            orbit.update(camera);
            applied += 1;
        }
        applied
    }

    /// Apply the sources handled on controller `slot`'s pass; no-op without
    /// a session
    pub fn apply_controller(
        &self,
        slot: usize,
        frame: Option<&XrFrameInput>,
        camera: &mut Camera,
        orbit: &mut OrbitControls,
    ) -> usize {
        match frame {
            Some(frame) => self.apply(frame.gamepad_sources_for(slot), camera, orbit),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, OrbitOptions};
    use glam::Vec3;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn setup() -> (Camera, OrbitControls) {
        (Camera::new(&CameraConfig::default(), 800, 600), OrbitControls::new(OrbitOptions::default()))
    }

    fn source(controller: usize, axes: &[f32]) -> XrInputSource {
        XrInputSource {
            controller,
            gamepad: Some(Gamepad { axes: axes.to_vec() }),
            grip_pose: None,
        }
    }

    #[test]
    fn test_select_state_machine() {
        let mut set = ControllerSet::new();
        assert!(set.handle_event(XrEvent::SelectStart(0)));
        assert!(set.get(0).is_some_and(|c| c.is_selecting()));
        assert!(!set.get(1).is_some_and(|c| c.is_selecting()));

        assert!(set.handle_event(XrEvent::SelectEnd(0)));
        assert!(!set.get(0).is_some_and(|c| c.is_selecting()));

        // Ending an idle controller stays idle
        set.handle_event(XrEvent::SelectEnd(1));
        assert_eq!(set.get(1).map(|c| c.select), Some(SelectState::Idle));
    }

    #[test]
    fn test_unknown_controller_is_ignored() {
        let mut set = ControllerSet::new();
        assert!(!set.handle_event(XrEvent::SelectStart(2)));
        assert!(set.iter().all(|c| !c.is_selecting()));
    }

    #[test]
    fn test_delta_from_axes() {
        let delta = GamepadDelta::from_axes(&[0.0, 0.5, -1.0, 0.25], 0.1);
        assert!(approx(delta.zoom, -0.05));
        assert!(approx(delta.pan.x, -0.1));
        assert!(approx(delta.pan.y, 0.025));

        // Short axis arrays read as zero
        assert_eq!(GamepadDelta::from_axes(&[0.3], 0.1), GamepadDelta::default());
    }

    #[test]
    fn test_zero_axes_change_nothing() {
        let (mut cam, mut orbit) = setup();
        orbit.update(&mut cam);
        let (position, target) = (cam.position, orbit.target);

        let mapper = VrInputMapper::new(0.1);
        assert_eq!(mapper.apply([&source(0, &[0.0, 0.0, 0.0, 0.0])], &mut cam, &mut orbit), 1);
        assert!((cam.position - position).length() < 1e-4);
        assert!((orbit.target - target).length() < 1e-6);
    }

    #[test]
    fn test_forward_stick_moves_camera_z() {
        let (mut cam, mut orbit) = setup();
        let z = cam.position.z;
        let mapper = VrInputMapper::new(0.1);
        mapper.apply([&source(0, &[0.0, 1.0, 0.0, 0.0])], &mut cam, &mut orbit);
        assert!(approx(cam.position.z, z - 0.1), "z = {}", cam.position.z);
    }

    #[test]
    fn test_pan_moves_target() {
        let (mut cam, mut orbit) = setup();
        let mapper = VrInputMapper::new(0.1);
        mapper.apply([&source(0, &[0.0, 0.0, 1.0, -1.0])], &mut cam, &mut orbit);
        assert!(approx(orbit.target.x, 0.1));
        assert!(approx(orbit.target.y, 0.9));
        assert!(approx(orbit.target.z, 0.0));
    }

    #[test]
    fn test_two_sources_accumulate() {
        let (mut cam, mut orbit) = setup();
        let z = cam.position.z;
        let frame = XrFrameInput {
            sources: vec![source(0, &[0.0, -1.0, 0.5, 0.0]), source(1, &[0.0, -1.0, 0.5, 0.0])],
        };
        let mapper = VrInputMapper::new(0.1);
        let applied = mapper.apply(&frame.sources, &mut cam, &mut orbit);
        assert_eq!(applied, 2);
        assert!(approx(cam.position.z, z + 0.2), "z = {}", cam.position.z);
        assert!(approx(orbit.target.x, 0.1));
    }

    #[test]
    fn test_source_without_gamepad_is_skipped() {
        let (mut cam, mut orbit) = setup();
        let before = cam.position;
        let bare = XrInputSource { controller: 0, gamepad: None, grip_pose: None };
        let mapper = VrInputMapper::new(0.1);
        assert_eq!(mapper.apply([&bare], &mut cam, &mut orbit), 0);
        assert_eq!(cam.position, before);
    }

    #[test]
    fn test_no_session_no_work() {
        let (mut cam, mut orbit) = setup();
        let before = (cam.position, orbit.target);
        let mapper = VrInputMapper::new(0.1);
        assert_eq!(mapper.apply_controller(0, None, &mut cam, &mut orbit), 0);
        assert_eq!((cam.position, orbit.target), before);
    }

    #[test]
    fn test_controller_slot_selects_its_sources() {
        let (mut cam, mut orbit) = setup();
        let frame = XrFrameInput {
            sources: vec![source(0, &[0.0, 0.0, 1.0, 0.0]), source(1, &[0.0, 0.0, 0.0, 1.0])],
        };
        let mapper = VrInputMapper::new(0.1);
        assert_eq!(mapper.apply_controller(1, Some(&frame), &mut cam, &mut orbit), 1);
        assert!(approx(orbit.target.x, 0.0));
        assert!(approx(orbit.target.y, 1.1));
    }

    #[test]
    fn test_sources_past_last_slot_apply_once() {
        let frame = XrFrameInput {
            sources: vec![
                XrInputSource { controller: 0, gamepad: None, grip_pose: None },
                source(1, &[0.0, -1.0, 0.0, 0.0]),
                source(2, &[0.0, -1.0, 0.0, 0.0]),
                source(3, &[0.0, 0.0, 1.0, 0.0]),
            ],
        };
        assert_eq!(frame.gamepad_sources_for(0).count(), 1);
        let last: Vec<usize> = frame.gamepad_sources_for(1).map(|s| s.controller).collect();
        assert_eq!(last, vec![1, 2, 3]);

        // Grip poses stay bound to their own slot
        assert_eq!(frame.sources_for(1).count(), 1);
    }

    #[test]
    fn test_availability_from_probe() {
        let missing = XrAvailability::from_probe(false, None);
        assert_eq!(missing, XrAvailability::Missing);
        assert_eq!(missing.button_label(), "VR NOT SUPPORTED");

        // A failed support query counts as unsupported
        assert_eq!(XrAvailability::from_probe(true, None), XrAvailability::Unsupported);
        assert_eq!(XrAvailability::from_probe(true, Some(false)).button_label(), "VR NOT SUPPORTED");

        let supported = XrAvailability::from_probe(true, Some(true));
        assert!(supported.is_supported());
        assert_eq!(supported.button_label(), "ENTER VR");
    }

    #[test]
    fn test_grip_pose_lookup() {
        let pose = Mat4::from_translation(Vec3::new(0.1, 1.2, -0.3));
        let frame = XrFrameInput {
            sources: vec![XrInputSource { controller: 1, gamepad: None, grip_pose: Some(pose) }],
        };
        assert_eq!(frame.grip_pose(1), Some(pose));
        assert_eq!(frame.grip_pose(0), None);
    }
}
