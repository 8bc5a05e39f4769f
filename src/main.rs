use std::sync::Arc;

use winit::{
    dpi::PhysicalSize,
    event::*,
    event_loop::EventLoop,
    window::Window,
};

// Import from the library crate
use car_viewer::{config, controller, logging, model, view};

use config::ViewerConfig;
use controller::{handle_resize, FrameDriver, InputEvent, MouseButton, ViewerContext, WheelDeltaMode};
use model::spawn_load;
use view::{GpuContext, RenderState};

struct App {
    window: Arc<Window>,
    renderer: RenderState,
    ctx: ViewerContext,
    driver: FrameDriver,
    /// Last cursor position in logical pixels
    cursor: (f32, f32),
}

impl App {
    async fn new(window: Arc<Window>, config: ViewerConfig) -> Result<Self, car_viewer::error::ViewerError> {
        let size = window.inner_size();
        let scale = window.scale_factor();
        let logical = size.to_logical::<f64>(scale);

        let gpu = GpuContext::new_native(window.clone(), size.width, size.height).await?;
        let renderer = RenderState::new(gpu, config.clear_color);

        let mut ctx = ViewerContext::new(&config, logical.width as u32, logical.height as u32, scale);
        ctx.pending_model = Some(spawn_load(&config.model_url));

        Ok(Self {
            window,
            renderer,
            ctx,
            driver: FrameDriver::new(&config.xr),
            cursor: (0.0, 0.0),
        })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let scale = self.window.scale_factor();
        let logical = new_size.to_logical::<f64>(scale);
        handle_resize(
            &mut self.ctx,
            logical.width.round() as u32,
            logical.height.round() as u32,
            scale,
            &mut self.renderer,
        );
    }

    /// Translate a window event into viewer input. Returns true if consumed.
    fn input(&mut self, event: &WindowEvent) -> bool {
        let input = match event {
            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    winit::event::MouseButton::Left => MouseButton::Left,
                    winit::event::MouseButton::Middle => MouseButton::Middle,
                    winit::event::MouseButton::Right => MouseButton::Right,
                    _ => return false,
                };
                match state {
                    ElementState::Pressed => InputEvent::PointerDown { button, x: self.cursor.0, y: self.cursor.1 },
                    ElementState::Released => InputEvent::PointerUp { button },
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(self.window.scale_factor());
                self.cursor = (logical.x, logical.y);
                InputEvent::PointerMove { x: logical.x, y: logical.y }
            }
            // winit reports scrolling up as positive, the DOM as negative
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(_, y) => InputEvent::Wheel { delta_y: -y, mode: WheelDeltaMode::Line },
                MouseScrollDelta::PixelDelta(p) => {
                    let logical = p.to_logical::<f32>(self.window.scale_factor());
                    InputEvent::Wheel { delta_y: -logical.y, mode: WheelDeltaMode::Pixel }
                }
            },
            _ => return false,
        };
        self.ctx.handle_input(&input);
        true
    }

    fn update(&mut self) {
        self.driver.tick(&mut self.ctx, None, &mut self.renderer);
    }
}

fn main() {
    logging::init("info");
    let config = ViewerConfig::from_env();

    let event_loop = EventLoop::new().expect("failed to create event loop");
    let window_attributes = Window::default_attributes()
        .with_title("Car Viewer")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
    let window = Arc::new(event_loop.create_window(window_attributes).expect("failed to create window"));

    let mut app = match pollster::block_on(App::new(window.clone(), config)) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("failed to initialize GPU: {e}");
            std::process::exit(1);
        }
    };

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { ref event, window_id } if window_id == app.window.id() => {
                if !app.input(event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(physical_size) => app.resize(*physical_size),
                        WindowEvent::ScaleFactorChanged { .. } => app.resize(app.window.inner_size()),
                        WindowEvent::RedrawRequested => app.update(),
                        _ => {}
                    }
                }
            }
            Event::AboutToWait => {
                app.window.request_redraw();
            }
            _ => {}
        })
        .expect("event loop failed");
}
