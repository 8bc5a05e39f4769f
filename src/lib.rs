// Re-export all public modules so they can be used from main.rs
pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// MVC Architecture
pub mod model;
pub mod view;
pub mod controller;

#[cfg(target_arch = "wasm32")]
pub use web::start;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{prelude::wasm_bindgen, JsCast, JsValue};
    use web_sys::{Document, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

    use crate::config::ViewerConfig;
    use crate::controller::input::{wasm as web_input, InputEvent};
    use crate::controller::{handle_resize, FrameDriver, OutputSurface, ViewerContext, XrFrameInput};
    use crate::logging;
    use crate::model::spawn_load;
    use crate::view::render::{physical_size, RenderState};
    use crate::view::xr_web::{XrHost, XrTick};
    use crate::view::GpuContext;

    #[wasm_bindgen(start)]
    pub async fn start() -> Result<(), JsValue> {
        logging::init("info");

        let window = web_sys::window().ok_or(js_error("no global `window`"))?;
        let search = window.location().search().unwrap_or_default();
        let model = web_sys::UrlSearchParams::new_with_str(&search)?.get("model");
        let config = ViewerConfig::default().with_model(model);

        let (document, canvas) = init_canvas(&window)?;
        setup_app(&window, &document, &canvas, config).await
    }

    /// Main application setup for WASM
    async fn setup_app(
        window: &Window,
        document: &Document,
        canvas: &HtmlCanvasElement,
        config: ViewerConfig,
    ) -> Result<(), JsValue> {
        let (width, height, pixel_ratio) = viewport_size(window);
        let (physical_w, physical_h) = physical_size(width, height, pixel_ratio);
        size_canvas(canvas, width, height, pixel_ratio);

        let gpu = GpuContext::new(canvas, physical_w, physical_h).await?;
        let renderer = Rc::new(RefCell::new(RenderState::new(gpu, config.clear_color)));

        let ctx = Rc::new(RefCell::new(ViewerContext::new(&config, width, height, pixel_ratio)));
        ctx.borrow_mut().pending_model = Some(spawn_load(&config.model_url));

        let driver = Rc::new(RefCell::new(FrameDriver::new(&config.xr)));
        let tick: XrTick = {
            let ctx = ctx.clone();
            let renderer = renderer.clone();
            Rc::new(RefCell::new(move |xr: Option<&XrFrameInput>| {
                driver
                    .borrow_mut()
                    .tick(&mut ctx.borrow_mut(), xr, &mut *renderer.borrow_mut());
            }))
        };

        setup_input_listeners(window, canvas, ctx.clone(), renderer)?;
        // Without XR the desktop viewer still runs
        let xr_host = XrHost::install(document, ctx, tick.clone())
            .map_err(|e| tracing::warn!("WebXR unavailable: {e:?}"))
            .ok();

        // Desktop loop; the XR session drives frames while presenting
        let f = RcCellCallback::new(window.clone(), move || {
            if xr_host.as_ref().is_some_and(|host| host.is_presenting()) {
                return;
            }
            let mut tick = tick.borrow_mut();
            (&mut *tick)(None);
        });
        f.start();

        Ok(())
    }

    /// Canvas that keeps its backing store in step with the renderer
    struct CanvasSurface<'a> {
        canvas: &'a HtmlCanvasElement,
        renderer: &'a mut RenderState,
    }

    impl OutputSurface for CanvasSurface<'_> {
        fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) {
            size_canvas(self.canvas, width, height, pixel_ratio);
            self.renderer.resize(width, height, pixel_ratio);
        }
    }

    fn size_canvas(canvas: &HtmlCanvasElement, width: u32, height: u32, pixel_ratio: f64) {
        let (w, h) = physical_size(width, height, pixel_ratio);
        canvas.set_width(w);
        canvas.set_height(h);
        let style = canvas.style();
        let _ = style.set_property("width", &format!("{width}px"));
        let _ = style.set_property("height", &format!("{height}px"));
    }

    fn viewport_size(window: &Window) -> (u32, u32, f64) {
        let dim = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0) as u32;
        (dim(window.inner_width()), dim(window.inner_height()), window.device_pixel_ratio())
    }

    fn route_input(ctx: &Rc<RefCell<ViewerContext>>, event: InputEvent) {
        ctx.borrow_mut().handle_input(&event);
    }

    /// Pointer, wheel and resize listeners
    fn setup_input_listeners(
        window: &Window,
        canvas: &HtmlCanvasElement,
        ctx: Rc<RefCell<ViewerContext>>,
        renderer: Rc<RefCell<RenderState>>,
    ) -> Result<(), JsValue> {
        // Mouse down
        {
            let ctx = ctx.clone();
            let mousedown = Closure::wrap(Box::new(move |e: MouseEvent| {
                if let Some(input) = web_input::mouse_down_to_input(&e) {
                    route_input(&ctx, input);
                }
                e.prevent_default();
            }) as Box<dyn FnMut(MouseEvent)>);
            canvas.add_event_listener_with_callback("mousedown", mousedown.as_ref().unchecked_ref())?;
            mousedown.forget();
        }

        // Mouse move, tracked on the window so drags survive leaving the canvas
        {
            let ctx = ctx.clone();
            let mousemove = Closure::wrap(Box::new(move |e: MouseEvent| {
                route_input(&ctx, web_input::mouse_move_to_input(&e));
            }) as Box<dyn FnMut(MouseEvent)>);
            window.add_event_listener_with_callback("mousemove", mousemove.as_ref().unchecked_ref())?;
            mousemove.forget();
        }

        // Mouse up
        {
            let ctx = ctx.clone();
            let mouseup = Closure::wrap(Box::new(move |e: MouseEvent| {
                if let Some(input) = web_input::mouse_up_to_input(&e) {
                    route_input(&ctx, input);
                }
            }) as Box<dyn FnMut(MouseEvent)>);
            window.add_event_listener_with_callback("mouseup", mouseup.as_ref().unchecked_ref())?;
            mouseup.forget();
        }

        // Context menu prevention
        {
            let contextmenu = Closure::wrap(Box::new(move |e: MouseEvent| {
                e.prevent_default();
            }) as Box<dyn FnMut(MouseEvent)>);
            canvas.add_event_listener_with_callback("contextmenu", contextmenu.as_ref().unchecked_ref())?;
            contextmenu.forget();
        }

        // Mouse wheel
        {
            let ctx = ctx.clone();
            let wheel = Closure::wrap(Box::new(move |e: WheelEvent| {
                route_input(&ctx, web_input::wheel_to_input(&e));
                e.prevent_default();
            }) as Box<dyn FnMut(WheelEvent)>);
            canvas.add_event_listener_with_callback("wheel", wheel.as_ref().unchecked_ref())?;
            wheel.forget();
        }

        // Window resize, applied immediately
        {
            let window_for_size = window.clone();
            let canvas = canvas.clone();
            let resize = Closure::wrap(Box::new(move || {
                let (width, height, pixel_ratio) = viewport_size(&window_for_size);
                let mut renderer = renderer.borrow_mut();
                let mut surface = CanvasSurface { canvas: &canvas, renderer: &mut *renderer };
                handle_resize(&mut ctx.borrow_mut(), width, height, pixel_ratio, &mut surface);
            }) as Box<dyn FnMut()>);
            window.add_event_listener_with_callback("resize", resize.as_ref().unchecked_ref())?;
            resize.forget();
        }

        Ok(())
    }

    fn init_canvas(window: &Window) -> Result<(Document, HtmlCanvasElement), JsValue> {
        let document = window.document().ok_or(js_error("no document on window"))?;
        let body = document.body().ok_or(js_error("no body on document"))?;
        let _ = body.style().set_property("margin", "0");
        let _ = body.style().set_property("overflow", "hidden");

        let canvas_el = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| js_error("failed to create canvas"))?;
        let _ = canvas_el.style().set_property("display", "block");
        body.append_child(&canvas_el)?;
        Ok((document, canvas_el))
    }

    fn js_error<E: Into<String>>(msg: E) -> JsValue {
        JsValue::from_str(&msg.into())
    }

    /// Self-rescheduling `requestAnimationFrame` callback
    struct RcCellCallback {
        inner: Rc<RefCell<Box<dyn FnMut()>>>,
        window: Window,
    }

    impl RcCellCallback {
        fn new(window: Window, f: impl FnMut() + 'static) -> Self {
            Self {
                inner: Rc::new(RefCell::new(Box::new(f))),
                window,
            }
        }

        fn start(self) {
            let inner = self.inner.clone();
            let window = self.window.clone();

            let callback = Rc::new(RefCell::new(None::<Closure<dyn FnMut()>>));
            let callback_clone = callback.clone();

            *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
                inner.borrow_mut().as_mut()();

                // Recursively schedule next frame
                if let Some(cb) = callback_clone.borrow().as_ref() {
                    if let Err(e) = window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                        tracing::error!("requestAnimationFrame failed: {e:?}");
                    }
                }
            }) as Box<dyn FnMut()>));

            if let Some(cb) = callback.borrow().as_ref() {
                if let Err(e) = self.window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                    tracing::error!("requestAnimationFrame failed: {e:?}");
                }
            }

            // Leak the closure to keep it alive
            std::mem::forget(callback);
        }
    }
}
