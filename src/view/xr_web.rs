//! WebXR host: the VR button, the immersive session lifecycle, select events
//! and the per-XR-frame input snapshot.
//!
//! wgpu cannot draw into the XR compositor layer, so the session gets a base
//! layer from a separate xr-compatible WebGL2 context. That is enough for the
//! session to deliver frames (input sources and grip poses); the scene itself
//! keeps rendering to the page canvas.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Mat4;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, HtmlButtonElement, HtmlCanvasElement, WebGl2RenderingContext, XrFrame, XrInputSourceEvent,
    XrReferenceSpace, XrReferenceSpaceType, XrRenderStateInit, XrSession, XrSessionMode, XrWebGlLayer,
};

use crate::controller::xr_input::{Gamepad, XrAvailability, XrEvent, XrFrameInput, XrInputSource};
use crate::controller::ViewerContext;

/// Frame callback shared with the desktop loop; `Some` while in VR
pub type XrTick = Rc<RefCell<dyn FnMut(Option<&XrFrameInput>)>>;

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64, XrFrame)>>>>;

/// A running session and the JS callbacks registered on it. The callbacks
/// are released together with the session.
struct ActiveSession {
    session: XrSession,
    space: XrReferenceSpace,
    _select: Vec<Closure<dyn FnMut(XrInputSourceEvent)>>,
    _on_end: Closure<dyn FnMut()>,
    _frame: FrameCallback,
}

pub struct XrHost {
    active: RefCell<Option<ActiveSession>>,
    gl: WebGl2RenderingContext,
    button: HtmlButtonElement,
    ctx: Rc<RefCell<ViewerContext>>,
    tick: XrTick,
}

fn style_button(button: &HtmlButtonElement) -> Result<(), JsValue> {
    let style = button.style();
    for (key, value) in [
        ("position", "absolute"),
        ("bottom", "20px"),
        ("left", "calc(50% - 75px)"),
        ("width", "150px"),
        ("padding", "12px 6px"),
        ("border", "1px solid #fff"),
        ("border-radius", "4px"),
        ("background", "rgba(0,0,0,0.1)"),
        ("color", "#fff"),
        ("font", "normal 13px sans-serif"),
        ("text-align", "center"),
        ("opacity", "0.5"),
        ("outline", "none"),
        ("z-index", "999"),
        ("cursor", "pointer"),
    ] {
        style.set_property(key, value)?;
    }
    Ok(())
}

/// Offscreen WebGL2 context created xr-compatible from the start
fn create_xr_gl(document: &Document) -> Result<WebGl2RenderingContext, JsValue> {
    let canvas = document.create_element("canvas")?.dyn_into::<HtmlCanvasElement>()?;
    let options = js_sys::Object::new();
    js_sys::Reflect::set(&options, &"xrCompatible".into(), &JsValue::TRUE)?;
    canvas
        .get_context_with_context_options("webgl2", &options)?
        .ok_or_else(|| JsValue::from_str("webgl2 unavailable for XR layer"))?
        .dyn_into::<WebGl2RenderingContext>()
        .map_err(|_| JsValue::from_str("unexpected XR layer context type"))
}

fn pose_matrix(values: &[f32]) -> Option<Mat4> {
    let cols: [f32; 16] = values.try_into().ok()?;
    Some(Mat4::from_cols_array(&cols))
}

/// Read gamepad axes and grip poses of every input source. A source's index
/// in the session's list is its controller slot.
fn frame_input(frame: &XrFrame, session: &XrSession, space: &XrReferenceSpace) -> XrFrameInput {
    let sources = session.input_sources();
    let mut out = Vec::with_capacity(sources.length() as usize);
    for i in 0..sources.length() {
        let Some(source) = sources.get(i) else { continue };
        let gamepad = source.gamepad().map(|pad| Gamepad {
            axes: pad.axes().iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect(),
        });
        let grip_pose = source
            .grip_space()
            .and_then(|grip| frame.get_pose(&grip, space))
            .and_then(|pose| pose_matrix(&pose.transform().matrix()));
        out.push(XrInputSource { controller: i as usize, gamepad, grip_pose });
    }
    XrFrameInput { sources: out }
}

fn source_index(session: &XrSession, event: &XrInputSourceEvent) -> Option<usize> {
    let target = event.input_source();
    let sources = session.input_sources();
    (0..sources.length())
        .find(|&i| sources.get(i).is_some_and(|s| js_sys::Object::is(&s, &target)))
        .map(|i| i as usize)
}

impl XrHost {
    /// Append the VR button and wire it up once support is known
    pub fn install(
        document: &Document,
        ctx: Rc<RefCell<ViewerContext>>,
        tick: XrTick,
    ) -> Result<Rc<Self>, JsValue> {
        let gl = create_xr_gl(document)?;
        let button = document.create_element("button")?.dyn_into::<HtmlButtonElement>()?;
        style_button(&button)?;
        button.set_text_content(Some("ENTER VR"));
        button.set_disabled(true);
        document
            .body()
            .ok_or_else(|| JsValue::from_str("no body on document"))?
            .append_child(&button)?;

        let host = Rc::new(Self {
            active: RefCell::new(None),
            gl,
            button,
            ctx,
            tick,
        });

        let probe = host.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let availability = probe.probe_support().await;
            tracing::info!(?availability, "immersive-vr support");
            probe.button.set_text_content(Some(availability.button_label()));
            if availability.is_supported() {
                probe.button.set_disabled(false);
                if let Err(e) = probe.wire_button() {
                    tracing::warn!("failed to wire VR button: {e:?}");
                }
            }
        });

        Ok(host)
    }

    pub fn is_presenting(&self) -> bool {
        self.active.borrow().is_some()
    }

    async fn probe_support(&self) -> XrAvailability {
        let Some(window) = web_sys::window() else {
            return XrAvailability::Missing;
        };
        let navigator = window.navigator();
        // `navigator.xr` is absent in insecure contexts and most desktop browsers
        if !js_sys::Reflect::has(&navigator, &JsValue::from_str("xr")).unwrap_or(false) {
            return XrAvailability::from_probe(false, None);
        }
        let supported = match JsFuture::from(navigator.xr().is_session_supported(XrSessionMode::ImmersiveVr)).await {
            Ok(v) => v.as_bool(),
            Err(e) => {
                tracing::debug!("isSessionSupported failed: {e:?}");
                None
            }
        };
        XrAvailability::from_probe(true, supported)
    }

    fn wire_button(self: &Rc<Self>) -> Result<(), JsValue> {
        let host = self.clone();
        let click = Closure::wrap(Box::new(move || {
            if let Some(active) = host.active.borrow().as_ref() {
                let _ = active.session.end();
                return;
            }
            // Keep the request inside the click's user activation
            let host = host.clone();
            let _ = wasm_bindgen_futures::future_to_promise(async move {
                if let Err(e) = host.start_session().await {
                    tracing::error!("failed to start VR session: {e:?}");
                }
                Ok(JsValue::UNDEFINED)
            });
        }) as Box<dyn FnMut()>);
        self.button.add_event_listener_with_callback("click", click.as_ref().unchecked_ref())?;
        click.forget();
        Ok(())
    }

    async fn start_session(self: &Rc<Self>) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global `window`"))?;
        let xr = window.navigator().xr();
        let session: XrSession = JsFuture::from(xr.request_session(XrSessionMode::ImmersiveVr))
            .await?
            .dyn_into()?;

        let layer = XrWebGlLayer::new_with_web_gl2_rendering_context(&session, &self.gl)?;
        let state = XrRenderStateInit::new();
        state.set_base_layer(Some(&layer));
        session.update_render_state_with_state(&state);

        let space: XrReferenceSpace = JsFuture::from(session.request_reference_space(XrReferenceSpaceType::Local))
            .await?
            .dyn_into()?;

        let (select, on_end) = self.listen_session_events(&session)?;
        let frame = self.frame_callback();
        if let Some(cb) = frame.borrow().as_ref() {
            session.request_animation_frame(cb.as_ref().unchecked_ref());
        }
        *self.active.borrow_mut() = Some(ActiveSession {
            session,
            space,
            _select: select,
            _on_end: on_end,
            _frame: frame,
        });
        self.button.set_text_content(Some("EXIT VR"));
        tracing::info!("VR session started");
        Ok(())
    }

    fn listen_session_events(
        self: &Rc<Self>,
        session: &XrSession,
    ) -> Result<(Vec<Closure<dyn FnMut(XrInputSourceEvent)>>, Closure<dyn FnMut()>), JsValue> {
        let mut select = Vec::with_capacity(2);
        for (name, start) in [("selectstart", true), ("selectend", false)] {
            let host = self.clone();
            let session_for_lookup = session.clone();
            let listener = Closure::wrap(Box::new(move |e: XrInputSourceEvent| {
                let Some(index) = source_index(&session_for_lookup, &e) else {
                    tracing::debug!("select event from unknown input source");
                    return;
                };
                let event = if start { XrEvent::SelectStart(index) } else { XrEvent::SelectEnd(index) };
                host.ctx.borrow_mut().handle_xr_event(event);
            }) as Box<dyn FnMut(XrInputSourceEvent)>);
            session.add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())?;
            select.push(listener);
        }

        let host = self.clone();
        let on_end = Closure::wrap(Box::new(move || {
            let ended = host.active.borrow_mut().take();
            host.button.set_text_content(Some("ENTER VR"));
            tracing::info!("VR session ended");
            // This closure is owned by `ended`; release it once it has returned
            wasm_bindgen_futures::spawn_local(async move { drop(ended) });
        }) as Box<dyn FnMut()>);
        session.add_event_listener_with_callback("end", on_end.as_ref().unchecked_ref())?;
        Ok((select, on_end))
    }

    /// Session frame callback that drives the shared tick and reschedules
    /// itself while the session is active
    fn frame_callback(self: &Rc<Self>) -> FrameCallback {
        let callback: FrameCallback = Rc::new(RefCell::new(None));
        let weak = Rc::downgrade(&callback);
        let host = self.clone();

        *callback.borrow_mut() = Some(Closure::wrap(Box::new(move |_time: f64, frame: XrFrame| {
            let input = {
                let active = host.active.borrow();
                let Some(active) = active.as_ref() else { return };
                frame_input(&frame, &active.session, &active.space)
            };
            {
                let mut tick = host.tick.borrow_mut();
                (&mut *tick)(Some(&input));
            }

            if let Some(callback) = weak.upgrade() {
                if let Some(cb) = callback.borrow().as_ref() {
                    frame.session().request_animation_frame(cb.as_ref().unchecked_ref());
                }
            }
        }) as Box<dyn FnMut(f64, XrFrame)>));

        callback
    }
}
