#![cfg(target_arch = "wasm32")]

use marbling::color::{Palette, Rgb};
use marbling::pointer::CanvasGeometry;
use marbling::settings::{self, Mode, SketchFilter};
use marbling::{query_has_flag, Environment, TouchPoint};

use gloo_utils::format::JsValueSerdeExt;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{HtmlCanvasElement, Window};

#[wasm_bindgen]
pub struct Marbling {
    canvas: HtmlCanvasElement,
    logical_width: u32,
    logical_height: u32,
    pixel_ratio: f64,
    instance: marbling::Marbling,
}

#[wasm_bindgen]
impl Marbling {
    #[wasm_bindgen(constructor)]
    pub fn new(settings_object: &JsValue) -> Result<Marbling, JsValue> {
        if let Err(err) = console_log::init_with_level(log::Level::Debug) {
            web_sys::console::warn_1(&JsValue::from_str(&err.to_string()));
        }

        let (canvas, gl, logical_width, logical_height, physical_width, physical_height, pixel_ratio) =
            get_rendering_context("canvas")?;

        let settings: settings::Settings = if settings_object.is_undefined() {
            Default::default()
        } else {
            settings_object.into_serde().map_err(to_js_error)?
        };

        let instance = marbling::Marbling::new(
            &Rc::new(gl),
            physical_width,
            physical_height,
            &Rc::new(settings),
            detect_environment(&window()),
        )
        .map_err(to_js_error)?;

        let mut marbling = Self {
            canvas,
            logical_width,
            logical_height,
            pixel_ratio,
            instance,
        };
        marbling.sync_canvas_geometry();

        Ok(marbling)
    }

    #[wasm_bindgen(setter)]
    pub fn set_settings(&mut self, settings_object: &JsValue) -> Result<(), JsValue> {
        let settings: settings::Settings = settings_object.into_serde().map_err(to_js_error)?;
        self.instance.update(&Rc::new(settings));
        Ok(())
    }

    #[wasm_bindgen(getter)]
    pub fn settings(&self) -> Result<JsValue, JsValue> {
        JsValue::from_serde(self.instance.settings().as_ref()).map_err(to_js_error)
    }

    pub fn animate(&mut self, timestamp: f64) {
        self.instance.animate(timestamp);
    }

    pub fn resize(&mut self, logical_width: u32, logical_height: u32) {
        if (self.logical_width, self.logical_height) != (logical_width, logical_height) {
            let (physical_width, physical_height) =
                physical_from_logical_size(logical_width, logical_height, self.pixel_ratio);

            self.canvas.set_width(physical_width);
            self.canvas.set_height(physical_height);
            self.instance.resize(physical_width, physical_height);

            self.logical_width = logical_width;
            self.logical_height = logical_height;
        }

        self.sync_canvas_geometry();
    }

    #[wasm_bindgen(js_name = mouseDown)]
    pub fn mouse_down(&mut self, client_x: f32, client_y: f32) {
        self.sync_canvas_geometry();
        self.instance.mouse_down(client_x, client_y);
    }

    #[wasm_bindgen(js_name = mouseMove)]
    pub fn mouse_move(&mut self, client_x: f32, client_y: f32) {
        self.instance.mouse_move(client_x, client_y);
    }

    #[wasm_bindgen(js_name = mouseUp)]
    pub fn mouse_up(&mut self) {
        self.instance.mouse_up();
    }

    // Expects an array of `{ id, clientX, clientY }`.
    #[wasm_bindgen(js_name = touchStart)]
    pub fn touch_start(&mut self, touches: &JsValue) -> Result<(), JsValue> {
        self.sync_canvas_geometry();
        self.instance.touch_start(&read_touches(touches)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = touchMove)]
    pub fn touch_move(&mut self, touches: &JsValue) -> Result<(), JsValue> {
        self.instance.touch_move(&read_touches(touches)?);
        Ok(())
    }

    // Expects an array of touch ids.
    #[wasm_bindgen(js_name = touchEnd)]
    pub fn touch_end(&mut self, ids: &JsValue) -> Result<(), JsValue> {
        let ids: Vec<i64> = ids.into_serde().map_err(to_js_error)?;
        self.instance.touch_end(&ids);
        Ok(())
    }

    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&mut self, mode: &JsValue) -> Result<(), JsValue> {
        let mode: Mode = mode.into_serde().map_err(to_js_error)?;
        self.instance.set_mode(mode);
        Ok(())
    }

    #[wasm_bindgen(js_name = toggleMode)]
    pub fn toggle_mode(&mut self) {
        self.instance.toggle_mode();
    }

    #[wasm_bindgen(js_name = setColor)]
    pub fn set_color(&mut self, hex: &str) -> Result<(), JsValue> {
        let color = Rgb::from_hex(hex).map_err(to_js_error)?;
        self.instance.set_fore_color(color);
        Ok(())
    }

    #[wasm_bindgen(js_name = setBackground)]
    pub fn set_background(&mut self, hex: &str) -> Result<(), JsValue> {
        let color = Rgb::from_hex(hex).map_err(to_js_error)?;
        self.instance.set_back_color(color);
        Ok(())
    }

    #[wasm_bindgen(js_name = setPalette)]
    pub fn set_palette(&mut self, palette: &JsValue) -> Result<(), JsValue> {
        let palette: Palette = palette.into_serde().map_err(to_js_error)?;
        self.instance.set_palette(palette);
        Ok(())
    }

    #[wasm_bindgen(js_name = setBrushRadius)]
    pub fn set_brush_radius(&mut self, radius: f32) {
        self.instance.set_brush_radius(radius);
    }

    #[wasm_bindgen(js_name = setColorful)]
    pub fn set_colorful(&mut self, colorful: bool) {
        self.instance.set_colorful(colorful);
    }

    #[wasm_bindgen(js_name = setSketch)]
    pub fn set_sketch(&mut self, sketch: &JsValue) -> Result<(), JsValue> {
        let sketch: SketchFilter = sketch.into_serde().map_err(to_js_error)?;
        self.instance.set_sketch(sketch);
        Ok(())
    }

    #[wasm_bindgen(js_name = randomSplats)]
    pub fn random_splats(&mut self) {
        self.instance.request_random_splats();
    }

    pub fn splat(&mut self, count: u32) {
        self.instance.request_splats(count);
    }

    // Renders a PNG and hands it to the browser as a download.
    pub fn capture(&mut self) -> Result<(), JsValue> {
        let capture = self
            .instance
            .capture(js_sys::Date::now())
            .map_err(to_js_error)?;
        download(&capture.png, &capture.filename)
    }

    // The callback receives every event as `{ type, ... }`.
    #[wasm_bindgen(js_name = onEvent)]
    pub fn on_event(&mut self, callback: js_sys::Function) {
        self.instance.subscribe(move |event| {
            let result = JsValue::from_serde(event)
                .map_err(to_js_error)
                .and_then(|value| callback.call1(&JsValue::NULL, &value));

            if let Err(err) = result {
                log::error!("Event callback failed: {:?}", err);
            }
        });
    }

    fn sync_canvas_geometry(&mut self) {
        let rect = self.canvas.get_bounding_client_rect();
        self.instance.set_canvas_geometry(CanvasGeometry {
            client_left: rect.left() as f32,
            client_top: rect.top() as f32,
            css_width: rect.width() as f32,
            css_height: rect.height() as f32,
            device_width: self.canvas.width(),
            device_height: self.canvas.height(),
        });
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsTouch {
    id: i64,
    client_x: f32,
    client_y: f32,
}

fn read_touches(touches: &JsValue) -> Result<Vec<TouchPoint>, JsValue> {
    let touches: Vec<JsTouch> = touches.into_serde().map_err(to_js_error)?;

    Ok(touches
        .into_iter()
        .map(|touch| TouchPoint {
            id: touch.id,
            client_x: touch.client_x,
            client_y: touch.client_y,
        })
        .collect())
}

fn to_js_error<E: ToString>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// `?hires` skips the quality trade-offs for phones and unfiltered floats.
fn detect_environment(window: &Window) -> Environment {
    let mobile = window
        .navigator()
        .user_agent()
        .map(|agent| {
            let agent = agent.to_lowercase();
            agent.contains("mobi") || agent.contains("android")
        })
        .unwrap_or(false);

    let force_high_res = window
        .location()
        .search()
        .map(|query| query_has_flag(&query, "hires"))
        .unwrap_or(false);

    Environment {
        mobile,
        force_high_res,
    }
}

fn download(png: &[u8], filename: &str) -> Result<(), JsValue> {
    let bytes = js_sys::Uint8Array::from(png);
    let parts = js_sys::Array::of1(&bytes);
    let options = web_sys::BlobPropertyBag::new();
    options.set_type("image/png");
    let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;

    let document = window()
        .document()
        .ok_or_else(|| JsValue::from_str("Cannot find the document"))?;
    let anchor = document
        .create_element("a")?
        .dyn_into::<web_sys::HtmlAnchorElement>()?;
    anchor.set_href(&url);
    anchor.set_download(filename);
    anchor.click();

    web_sys::Url::revoke_object_url(&url)
}

pub fn get_rendering_context(
    element_id: &str,
) -> Result<(HtmlCanvasElement, glow::Context, u32, u32, u32, u32, f64), JsValue> {
    use web_sys::WebGl2RenderingContext as GL;

    set_panic_hook();

    let window = window();
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Cannot find the document"))?;
    let html_canvas = document.get_element_by_id(element_id).ok_or_else(|| {
        JsValue::from_str(&format!("Cannot find a canvas with id `{}`", element_id))
    })?;
    let canvas: HtmlCanvasElement = html_canvas.dyn_into::<HtmlCanvasElement>()?;

    let pixel_ratio: f64 = window.device_pixel_ratio();
    let logical_width = canvas.client_width() as u32;
    let logical_height = canvas.client_height() as u32;
    let (physical_width, physical_height) =
        physical_from_logical_size(logical_width, logical_height, pixel_ratio);
    canvas.set_width(physical_width);
    canvas.set_height(physical_height);

    let options = JsValue::from_serde(&ContextOptions {
        // The page shows through wherever there's no ink.
        alpha: true,
        depth: false,
        stencil: false,
        desynchronized: false,
        antialias: false,
        fail_if_major_performance_caveat: false,
        power_preference: "default",
        premultiplied_alpha: true,
        preserve_drawing_buffer: false,
    })
    .map_err(to_js_error)?;

    let gl = match canvas.get_context_with_context_options("webgl2", &options) {
        Ok(Some(gl)) => gl.dyn_into::<GL>()?,
        _ => return Err(JsValue::from_str("Can’t create the WebGL2 rendering context")),
    };

    // The half-float extensions are probed later; requesting them enables
    // them.
    gl.get_extension("EXT_color_buffer_float")?;
    gl.get_extension("EXT_color_buffer_half_float")?;
    gl.get_extension("OES_texture_float_linear")?;
    gl.get_extension("OES_texture_half_float_linear")?;

    gl.disable(GL::BLEND);
    gl.disable(GL::DEPTH_TEST);

    Ok((
        canvas,
        glow::Context::from_webgl2_context(gl),
        logical_width,
        logical_height,
        physical_width,
        physical_height,
        pixel_ratio,
    ))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub desynchronized: bool,
    pub antialias: bool,
    pub fail_if_major_performance_caveat: bool,
    pub power_preference: &'static str,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
}

pub fn window() -> Window {
    web_sys::window().expect("The global `window` doesn’t exist")
}

// https://github.com/rustwasm/console_error_panic_hook#readme
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn physical_from_logical_size(
    logical_width: u32,
    logical_height: u32,
    pixel_ratio: f64,
) -> (u32, u32) {
    (
        (pixel_ratio * f64::from(logical_width)) as u32,
        (pixel_ratio * f64::from(logical_height)) as u32,
    )
}
