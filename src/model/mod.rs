// MODEL: Scene data and the camera
pub mod camera;
pub mod loader;
pub mod scene;

pub use camera::Camera;
pub use loader::{spawn_load, LoadError, PendingModel};
pub use scene::{build_scene, merge_model, ModelSubgraph, SceneGraph, SceneNode};
