// Logging backend for the console_log!/console_warn! macros: the browser
// console on wasm32, tracing everywhere else.

#[cfg(target_arch = "wasm32")]
mod browser {
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = console)]
        pub fn log(s: &str);
    }

    pub fn warn(s: &str) {
        web_sys::console::warn_1(&JsValue::from_str(s));
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::{log, warn};

#[cfg(not(target_arch = "wasm32"))]
pub fn log(s: &str) {
    tracing::debug!("{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn warn(s: &str) {
    tracing::warn!("{}", s);
}
