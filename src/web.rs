//! Browser binding: canvas surfaces, `requestAnimationFrame`, resize
//! observation, and the JS-facing `TypingRenderer` class.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, JSON};
use log::{debug, error, info, warn};
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CanvasRenderingContext2d, Element, Event, HtmlCanvasElement, ResizeObserver, Window};

use crate::config::EngineSettings;
use crate::engine::{Clock, Engine, FrameHost};
use crate::error::{EngineError, js_value_to_string};
use crate::logging;
use crate::state::GameStatePatch;
use crate::surface::{Surface, Viewport};

fn window() -> Result<Window, EngineError> {
    web_sys::window().ok_or_else(|| EngineError::ContextUnavailable("missing window".to_string()))
}

fn draw_error(err: JsValue) -> EngineError {
    EngineError::Draw(js_value_to_string(&err))
}

fn js_to_json(value: &JsValue) -> Result<String, EngineError> {
    JSON::stringify(value)
        .map(String::from)
        .map_err(|err| EngineError::InvalidState(js_value_to_string(&err)))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, EngineError> {
    let json =
        serde_json::to_string(value).map_err(|err| EngineError::InvalidState(err.to_string()))?;
    JSON::parse(&json).map_err(|err| EngineError::InvalidState(js_value_to_string(&err)))
}

fn parse_patch(value: &JsValue) -> Result<GameStatePatch, EngineError> {
    if value.is_undefined() || value.is_null() {
        return Ok(GameStatePatch::default());
    }
    GameStatePatch::from_json(&js_to_json(value)?)
}

pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, EngineError> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| EngineError::ContextUnavailable(js_value_to_string(&err)))?
            .ok_or_else(|| EngineError::ContextUnavailable("canvas has no 2d context".to_string()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| EngineError::ContextUnavailable("unexpected context type".to_string()))?;
        Ok(Self { canvas, context })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl Surface for CanvasSurface {
    fn create_offscreen(&self) -> Result<Self, EngineError> {
        let document = self
            .canvas
            .owner_document()
            .ok_or_else(|| EngineError::ContextUnavailable("canvas has no document".to_string()))?;
        let canvas = document
            .create_element("canvas")
            .map_err(|err| EngineError::ContextUnavailable(js_value_to_string(&err)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| EngineError::ContextUnavailable("offscreen canvas".to_string()))?;
        Self::new(canvas)
    }

    fn set_layout_size(&mut self, logical_width: f64, logical_height: f64) {
        let style = self.canvas.style();
        let _ = style.set_property("width", &format!("{}px", logical_width));
        let _ = style.set_property("height", &format!("{}px", logical_height));
    }

    fn resize(&mut self, physical_width: u32, physical_height: u32) {
        self.canvas.set_width(physical_width);
        self.canvas.set_height(physical_height);
    }

    fn physical_size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn set_scale(&mut self, scale: f64) -> Result<(), EngineError> {
        self.context
            .set_transform(scale, 0.0, 0.0, scale, 0.0, 0.0)
            .map_err(draw_error)?;
        self.context.set_text_align("left");
        self.context.set_text_baseline("middle");
        Ok(())
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str) {
        self.context.set_fill_style_str(color);
        self.context.fill_rect(x, y, width, height);
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str, line_width: f64) {
        self.context.set_stroke_style_str(color);
        self.context.set_line_width(line_width);
        self.context.stroke_rect(x, y, width, height);
    }

    fn set_font(&mut self, font: &str) {
        self.context.set_font(font);
    }

    fn measure_text(&mut self, text: &str) -> Result<f64, EngineError> {
        self.context
            .measure_text(text)
            .map(|metrics| metrics.width())
            .map_err(draw_error)
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), EngineError> {
        self.context.set_fill_style_str(color);
        self.context.fill_text(text, x, y).map_err(draw_error)
    }

    fn blit_from(&mut self, source: &Self) -> Result<(), EngineError> {
        // Copy in device pixels; the logical scale would enlarge the frame.
        self.context.save();
        let copied = self
            .context
            .set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
            .and_then(|()| {
                self.context
                    .draw_image_with_html_canvas_element(&source.canvas, 0.0, 0.0)
            });
        self.context.restore();
        copied.map_err(draw_error)
    }
}

/// `performance.now()`, falling back to wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now(&self) -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

pub struct RafHost {
    callback: FrameCallback,
    handle: Option<i32>,
}

impl RafHost {
    fn new(callback: FrameCallback) -> Self {
        Self {
            callback,
            handle: None,
        }
    }
}

impl FrameHost for RafHost {
    fn request_frame(&mut self) -> Result<(), EngineError> {
        let callback = self.callback.borrow();
        let Some(cb) = callback.as_ref() else {
            return Err(EngineError::Destroyed);
        };
        let handle = window()?
            .request_animation_frame(cb.as_ref().unchecked_ref())
            .map_err(|err| EngineError::Schedule(js_value_to_string(&err)))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn cancel_frame(&mut self) {
        if let (Some(handle), Some(win)) = (self.handle.take(), web_sys::window()) {
            let _ = win.cancel_animation_frame(handle);
        }
    }
}

type WebEngine = Engine<CanvasSurface, BrowserClock, RafHost>;

struct Observers {
    window: Window,
    on_window_resize: Option<Closure<dyn FnMut(Event)>>,
    resize_observer: Option<ResizeObserver>,
    _on_container_resize: Option<Closure<dyn FnMut(Array)>>,
}

impl Observers {
    fn detach(self) {
        if let Some(listener) = self.on_window_resize.as_ref() {
            let _ = self
                .window
                .remove_event_listener_with_callback("resize", listener.as_ref().unchecked_ref());
        }
        if let Some(observer) = self.resize_observer.as_ref() {
            observer.disconnect();
        }
    }
}

fn container_size(container: Option<&Element>) -> Option<(f64, f64)> {
    let el = container?;
    let (width, height) = (el.client_width(), el.client_height());
    (width > 0 && height > 0).then(|| (f64::from(width), f64::from(height)))
}

fn initial_viewport(settings: &EngineSettings, win: &Window, container: Option<&Element>) -> Viewport {
    let mut viewport = settings.viewport(win.device_pixel_ratio());
    if settings.fit_to_container {
        if let Some((width, height)) = container_size(container) {
            viewport.logical_width = width;
            viewport.logical_height = height;
        }
    }
    viewport
}

fn attach_observers(
    win: &Window,
    engine: &Rc<RefCell<WebEngine>>,
    container: Option<Element>,
    fit_to_container: bool,
) -> Observers {
    let handler: Rc<dyn Fn()> = {
        let engine = Rc::downgrade(engine);
        let win = win.clone();
        let container = container.clone();
        Rc::new(move || {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let mut engine = engine.borrow_mut();
            let current = engine.geometry();
            let (width, height) = fit_to_container
                .then(|| container_size(container.as_ref()))
                .flatten()
                .unwrap_or((current.logical_width, current.logical_height));
            let viewport = Viewport {
                logical_width: width,
                logical_height: height,
                device_pixel_ratio: win.device_pixel_ratio(),
            };
            if let Err(err) = engine.handle_resize(viewport) {
                warn!("resize failed: {err}");
            }
        })
    };

    let mut resize_observer = None;
    let mut on_container_resize = None;
    if fit_to_container {
        match container.as_ref() {
            Some(el) => {
                let handler = Rc::clone(&handler);
                let cb = Closure::wrap(Box::new(move |_entries: Array| handler())
                    as Box<dyn FnMut(Array)>);
                match ResizeObserver::new(cb.as_ref().unchecked_ref()) {
                    Ok(observer) => {
                        observer.observe(el);
                        resize_observer = Some(observer);
                        on_container_resize = Some(cb);
                    }
                    Err(err) => warn!(
                        "ResizeObserver unavailable, using window resize only: {}",
                        js_value_to_string(&err)
                    ),
                }
            }
            None => warn!("canvas has no container; using window resize only"),
        }
    }

    let on_window_resize = {
        let handler = Rc::clone(&handler);
        let cb = Closure::wrap(Box::new(move |_event: Event| handler()) as Box<dyn FnMut(Event)>);
        match win.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref()) {
            Ok(()) => Some(cb),
            Err(err) => {
                warn!("window resize listener not attached: {}", js_value_to_string(&err));
                None
            }
        }
    };

    Observers {
        window: win.clone(),
        on_window_resize,
        resize_observer,
        _on_container_resize: on_container_resize,
    }
}

/// Calls a JS listener after the current engine borrow has been released.
fn call_later(listener: &Function, args: Vec<JsValue>) {
    let listener = listener.clone();
    spawn_local(async move {
        let args: Array = args.into_iter().collect();
        if let Err(err) = listener.apply(&JsValue::NULL, &args) {
            warn!("listener threw: {}", js_value_to_string(&err));
        }
    });
}

#[wasm_bindgen]
pub struct TypingRenderer {
    settings: EngineSettings,
    engine: Option<Rc<RefCell<WebEngine>>>,
    frame_callback: FrameCallback,
    observers: Option<Observers>,
}

impl TypingRenderer {
    fn engine(&self) -> Result<&Rc<RefCell<WebEngine>>, EngineError> {
        self.engine.as_ref().ok_or(EngineError::Destroyed)
    }

    fn with_engine(&self, f: impl FnOnce(&mut WebEngine)) {
        if let Some(engine) = self.engine.as_ref() {
            f(&mut engine.borrow_mut());
        }
    }
}

#[wasm_bindgen]
impl TypingRenderer {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<TypingRenderer, JsValue> {
        let settings = if options.is_undefined() || options.is_null() {
            EngineSettings::default()
        } else {
            EngineSettings::from_json(&js_to_json(&options)?)?
        };
        logging::init(logging::parse_level(&settings.log_level));

        Ok(Self {
            settings,
            engine: None,
            frame_callback: Rc::new(RefCell::new(None)),
            observers: None,
        })
    }

    pub fn initialize(
        self,
        surface: JsValue,
        initial_state: JsValue,
    ) -> Result<TypingRenderer, JsValue> {
        let mut this = self;
        this.destroy();

        let canvas = surface.dyn_into::<HtmlCanvasElement>().map_err(|value| {
            let err = EngineError::InvalidSurface(format!(
                "expected an HTMLCanvasElement, got {}",
                js_value_to_string(&value)
            ));
            error!("{err}");
            err
        })?;
        let initial_state = parse_patch(&initial_state)?;

        let win = window()?;
        let container = canvas.parent_element();
        let viewport = initial_viewport(&this.settings, &win, container.as_ref());
        let surface = CanvasSurface::new(canvas)?;
        let host = RafHost::new(Rc::clone(&this.frame_callback));

        let engine = Engine::initialize(
            this.settings.clone(),
            surface,
            viewport,
            BrowserClock,
            host,
            initial_state,
        )
        .inspect_err(|err| error!("initialize failed: {err}"))?;
        let engine = Rc::new(RefCell::new(engine));

        let weak = Rc::downgrade(&engine);
        *this.frame_callback.borrow_mut() = Some(Closure::wrap(Box::new(move |_ts: f64| {
            if let Some(engine) = weak.upgrade() {
                engine.borrow_mut().tick();
            }
        }) as Box<dyn FnMut(f64)>));

        this.observers = Some(attach_observers(
            &win,
            &engine,
            container,
            this.settings.fit_to_container,
        ));
        this.engine = Some(engine);
        info!("renderer attached");
        Ok(this)
    }

    #[wasm_bindgen(js_name = startAnimation)]
    pub fn start_animation(&self) {
        self.with_engine(|engine| engine.start_animation());
    }

    #[wasm_bindgen(js_name = stopAnimation)]
    pub fn stop_animation(&self) {
        self.with_engine(|engine| engine.stop_animation());
    }

    /// Merges a partial game state. Malformed input is logged and ignored.
    #[wasm_bindgen(js_name = updateGameState)]
    pub fn update_game_state(&self, partial_state: JsValue) {
        match parse_patch(&partial_state) {
            Ok(patch) => self.with_engine(|engine| engine.update_game_state(patch)),
            Err(err) => warn!("ignoring state update: {err}"),
        }
    }

    #[wasm_bindgen(js_name = recordKeypress)]
    pub fn record_keypress(&self) -> f64 {
        match self.engine.as_ref() {
            Some(engine) => engine.borrow_mut().record_keypress(),
            None => BrowserClock.now(),
        }
    }

    #[wasm_bindgen(js_name = handleKeyInput)]
    pub fn handle_key_input(&self, key: String, is_correct: bool) {
        self.with_engine(|engine| engine.handle_key_input(&key, is_correct));
    }

    #[wasm_bindgen(js_name = resetInputState)]
    pub fn reset_input_state(&self) {
        self.with_engine(|engine| engine.reset_input_state());
    }

    #[wasm_bindgen(js_name = resetErrorState)]
    pub fn reset_error_state(&self) {
        self.with_engine(|engine| engine.reset_error_state());
    }

    pub fn render(&self, force_immediate: Option<bool>) {
        self.with_engine(|engine| engine.render(force_immediate.unwrap_or(false)));
    }

    #[wasm_bindgen(js_name = setCanvasSize)]
    pub fn set_canvas_size(&self, width: f64, height: f64) -> Result<(), JsValue> {
        self.engine()?.borrow_mut().set_canvas_size(width, height)?;
        Ok(())
    }

    /// `listener(width, height)` runs after each applied resize.
    #[wasm_bindgen(js_name = onResize)]
    pub fn on_resize(&self, listener: Function) -> Result<(), JsValue> {
        self.engine()?.borrow_mut().on_resize(move |width, height| {
            call_later(&listener, vec![JsValue::from_f64(width), JsValue::from_f64(height)]);
        });
        Ok(())
    }

    /// `listener({nextKey, lastPressedKey, isError})` runs when any of those change.
    #[wasm_bindgen(js_name = onKeyboardSignal)]
    pub fn on_keyboard_signal(&self, listener: Function) -> Result<(), JsValue> {
        self.engine()?.borrow_mut().on_keyboard_signal(move |signal| match to_js(signal) {
            Ok(value) => call_later(&listener, vec![value]),
            Err(err) => warn!("keyboard signal not delivered: {err}"),
        });
        Ok(())
    }

    #[wasm_bindgen(js_name = keyboardSignal)]
    pub fn keyboard_signal(&self) -> Result<JsValue, JsValue> {
        let signal = self.engine()?.borrow().keyboard_signal();
        Ok(to_js(&signal)?)
    }

    #[wasm_bindgen(js_name = getPerformanceMetrics)]
    pub fn get_performance_metrics(&self) -> Result<JsValue, JsValue> {
        let metrics = self.engine()?.borrow().performance_metrics();
        Ok(to_js(&metrics)?)
    }

    #[wasm_bindgen(js_name = metricsJson)]
    pub fn metrics_json(&self) -> String {
        self.engine
            .as_ref()
            .map(|engine| engine.borrow().performance_metrics().to_json())
            .unwrap_or_else(|| "{}".to_string())
    }

    #[wasm_bindgen(js_name = resetPerformanceMetrics)]
    pub fn reset_performance_metrics(&self) {
        self.with_engine(|engine| engine.reset_performance_metrics());
    }

    pub fn destroy(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.borrow_mut().destroy();
        }
        if let Some(observers) = self.observers.take() {
            observers.detach();
            debug!("observers detached");
        }
        self.frame_callback.borrow_mut().take();
    }
}

impl Drop for TypingRenderer {
    fn drop(&mut self) {
        self.destroy();
    }
}
