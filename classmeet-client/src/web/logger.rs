use wasm_bindgen::JsValue;
use web_sys::console;

/// Browser console output. `tracing` has no subscriber in the page, so the
/// user-facing messages go through here.
pub struct Logger;

impl Logger {
    pub fn info(msg: &str) {
        console::log_1(&format!("[classmeet] {}", msg).into());
    }

    pub fn warn(msg: &str) {
        console::warn_1(&format!("[classmeet] {}", msg).into());
    }

    pub fn error(context: &str, err: &JsValue) {
        console::error_2(&format!("[classmeet] {}", context).into(), err);
    }
}

/// Best-effort readable text for a thrown JS value.
pub fn describe(err: &JsValue) -> String {
    if let Some(text) = err.as_string() {
        return text;
    }
    for key in ["message", "name"] {
        if let Some(text) = js_sys::Reflect::get(err, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_string())
        {
            return text;
        }
    }
    format!("{:?}", err)
}
