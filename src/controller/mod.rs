// CONTROLLER: Input, camera control, and the frame loop
pub mod input;
pub mod orbit;
pub mod trackball;
pub mod xr_input;
pub mod frame_loop;

pub use input::{InputEvent, MouseButton, WheelDeltaMode};
pub use orbit::OrbitControls;
pub use trackball::TrackballControls;
pub use xr_input::{
    ControllerSet, VrInputMapper, XrAvailability, XrEvent, XrFrameInput, XrInputSource, CONTROLLER_COUNT,
};
pub use frame_loop::{
    handle_resize, CameraUniform, FrameDriver, FrameRenderer, LightingUniform, ModelUniform, OutputSurface,
    ViewerContext, Viewport,
};
