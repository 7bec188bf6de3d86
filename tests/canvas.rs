use js_sys::JSON;
use typeline_canvas::surface::Surface;
use typeline_canvas::web::CanvasSurface;
use typeline_canvas::{SurfaceGeometry, TypingRenderer, Viewport};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;
use web_sys::HtmlCanvasElement;

wasm_bindgen_test_configure!(run_in_browser);

fn attached_canvas() -> HtmlCanvasElement {
    let window = web_sys::window().expect("no window");
    let document = window.document().expect("no document");
    let canvas = document
        .create_element("canvas")
        .expect("create canvas")
        .dyn_into::<HtmlCanvasElement>()
        .expect("canvas element");
    document
        .body()
        .expect("body")
        .append_child(&canvas)
        .expect("append canvas");
    canvas
}

fn options(json: &str) -> JsValue {
    JSON::parse(json).expect("options json")
}

#[wasm_bindgen_test]
fn canvas_2d_context_available() {
    let mut surface = CanvasSurface::new(attached_canvas()).expect("2d surface");
    surface.resize(64, 32);
    surface.set_scale(2.0).expect("scale");
    surface.fill_rect(0.0, 0.0, 10.0, 10.0, "#fff");
    assert_eq!(surface.physical_size(), (64, 32));
    assert!(surface.measure_text("neko").expect("measure") > 0.0);
}

#[wasm_bindgen_test]
fn offscreen_matches_and_blits() {
    let mut visible = CanvasSurface::new(attached_canvas()).expect("2d surface");
    let mut offscreen = visible.create_offscreen().expect("offscreen");
    visible.resize(40, 20);
    offscreen.resize(40, 20);
    offscreen.fill_text("a", 1.0, 10.0, "#fff").expect("text");
    visible.blit_from(&offscreen).expect("blit");
    assert_eq!(visible.physical_size(), offscreen.physical_size());
    assert_eq!(offscreen.canvas().width(), 40);
    assert!(offscreen.canvas().parent_element().is_none());
}

#[wasm_bindgen_test]
fn renderer_sizes_buffer_for_device_pixel_ratio() {
    let canvas = attached_canvas();
    let renderer = TypingRenderer::new(options(r#"{"width":200,"height":100,"buffered":false}"#))
        .expect("settings")
        .initialize(canvas.clone().into(), JsValue::UNDEFINED)
        .expect("initialize");

    let dpr = web_sys::window().expect("no window").device_pixel_ratio();
    let expected = SurfaceGeometry::compute(
        Viewport {
            logical_width: 200.0,
            logical_height: 100.0,
            device_pixel_ratio: dpr,
        },
        2.5,
        4096,
    );
    assert_eq!(canvas.width(), expected.physical_width);
    assert_eq!(canvas.height(), expected.physical_height);
    assert_eq!(canvas.style().get_property_value("width").unwrap(), "200px");

    renderer.set_canvas_size(120.0, 60.0).expect("resize");
    assert_eq!(canvas.style().get_property_value("height").unwrap(), "60px");
}

#[wasm_bindgen_test]
fn renderer_rejects_non_canvas_surface() {
    let renderer = TypingRenderer::new(JsValue::UNDEFINED).expect("settings");
    assert!(renderer.initialize(JsValue::from_str("not a canvas"), JsValue::UNDEFINED).is_err());
}

#[wasm_bindgen_test]
fn invalid_settings_are_rejected() {
    assert!(TypingRenderer::new(options(r#"{"width":-5}"#)).is_err());
}

#[wasm_bindgen_test]
fn malformed_state_update_is_ignored() {
    let renderer = TypingRenderer::new(JsValue::UNDEFINED)
        .expect("settings")
        .initialize(
            attached_canvas().into(),
            options(r#"{"targetText":"neko","nextKey":"n"}"#),
        )
        .expect("initialize");

    renderer.update_game_state(JsValue::from_f64(3.0));
    let signal = renderer.keyboard_signal().expect("signal");
    let next = js_sys::Reflect::get(&signal, &JsValue::from_str("nextKey")).expect("nextKey");
    assert_eq!(next.as_string().as_deref(), Some("n"));
}

#[wasm_bindgen_test]
fn destroy_is_idempotent() {
    let mut renderer = TypingRenderer::new(JsValue::UNDEFINED)
        .expect("settings")
        .initialize(attached_canvas().into(), JsValue::UNDEFINED)
        .expect("initialize");
    renderer.start_animation();
    renderer.destroy();
    renderer.destroy();

    renderer.start_animation();
    renderer.render(Some(true));
    assert!(renderer.set_canvas_size(10.0, 10.0).is_err());
    assert_eq!(renderer.metrics_json(), "{}");
}
