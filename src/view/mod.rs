// VIEW: Rendering and graphics
pub mod render;
pub mod gpu_init;
#[cfg(target_arch = "wasm32")]
pub mod xr_web;

pub use render::RenderState;
pub use gpu_init::GpuContext;
