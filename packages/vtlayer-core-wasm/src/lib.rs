use wasm_bindgen::prelude::*;

// Logging backend
pub mod console;
// Crate error taxonomy
pub mod error;
// Tile addressing, coordinate conversion and fetching
pub mod vectortile;
// Vector tile decoding
pub mod mvt_parser;
// Decoded features and GeoJSON output
pub mod geojson_features;
// Filter predicates
pub mod filter;
pub mod color;
// Domains and scales for visual channels
pub mod scale;
// Layer configuration
pub mod config;
// Viewport generations
pub mod cancellation;
// Tile pipeline orchestration
pub mod pipeline;
// JS surface
mod bindings;

pub use bindings::{decode_tile_js, MvtTileLayer};
pub use error::{Error, Result};
pub use filter::{passes_filters, FilterSpec, Predicate};
pub use geojson_features::{FeatureCollection, GeoFeature, GeometryType, Properties};
pub use mvt_parser::decode_tile;
pub use pipeline::{ChannelEncoding, TilePipeline, ViewportSnapshot};
pub use scale::{build_scale, compute_domain, Domain, OutputValue, Scale, ScaleKind};
pub use vectortile::TileAddress;

#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[wasm_bindgen]
extern "C" {
    // JavaScript function to fetch data from URL
    #[wasm_bindgen(js_namespace = wasmJsHelpers, catch)]
    pub fn fetch(url: &str) -> std::result::Result<js_sys::Promise, JsValue>;
}

#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::console::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => ($crate::console::warn(&format!($($t)*)))
}

use std::sync::Once;
static INIT: Once = Once::new();

#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("vtlayer module initialized");
    });
}
