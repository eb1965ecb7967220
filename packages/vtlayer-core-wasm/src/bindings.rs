use std::rc::Rc;

use js_sys::{Function, Promise};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::config::LayerConfig;
use crate::filter::FilterSpec;
use crate::geojson_features::FeatureCollection;
use crate::mvt_parser::decode_tile;
use crate::pipeline::TilePipeline;
use crate::vectortile::{fetch_tile_bytes, TileAddress};

// Plain JS objects rather than Maps for everything handed back.
fn to_js(value: &serde_json::Value) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(JsValue::from)
}

/// A vector tile layer driven from JavaScript.
#[wasm_bindgen]
pub struct MvtTileLayer {
    pipeline: Rc<TilePipeline>,
}

#[wasm_bindgen]
impl MvtTileLayer {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<MvtTileLayer, JsValue> {
        let config: LayerConfig = serde_wasm_bindgen::from_value(config)?;
        let pipeline = TilePipeline::new(config)?;
        Ok(MvtTileLayer {
            pipeline: Rc::new(pipeline),
        })
    }

    /// Start a new viewport over the tiles covering the box at `zoom` and
    /// return the (partial) snapshot.
    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(
        &self,
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        zoom: u8,
    ) -> Result<JsValue, JsValue> {
        let tiles = self.pipeline.viewport_for_bounds(west, south, east, north, zoom)?;
        self.pipeline.set_viewport(tiles);
        self.snapshot()
    }

    /// Resolves to the tile's filtered features as GeoJSON.
    #[wasm_bindgen(js_name = loadTile)]
    pub fn load_tile(&self, z: u8, x: u32, y: u32) -> Promise {
        let pipeline = Rc::clone(&self.pipeline);
        future_to_promise(async move {
            let features = pipeline
                .load_tile(TileAddress::new(z, x, y), fetch_tile_bytes)
                .await;
            to_js(&FeatureCollection::new(features).to_geojson())
        })
    }

    /// Resolves to the snapshot once every requested tile has been tried.
    #[wasm_bindgen(js_name = loadViewport)]
    pub fn load_viewport(&self) -> Promise {
        let pipeline = Rc::clone(&self.pipeline);
        future_to_promise(async move {
            let snapshot = pipeline.load_viewport(fetch_tile_bytes).await;
            to_js(&snapshot.to_geojson())
        })
    }

    #[wasm_bindgen(js_name = setFilters)]
    pub fn set_filters(&self, filters: JsValue) -> Result<JsValue, JsValue> {
        let filters: Vec<FilterSpec> = serde_wasm_bindgen::from_value(filters)?;
        let snapshot = self.pipeline.set_filters(filters);
        to_js(&snapshot.to_geojson())
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_js(&self.pipeline.snapshot().to_geojson())
    }

    /// Call `callback` with every published snapshot.
    pub fn subscribe(&self, callback: Function) {
        self.pipeline.subscribe(move |snapshot| {
            let delivered = to_js(&snapshot.to_geojson())
                .and_then(|value| callback.call1(&JsValue::NULL, &value));
            if let Err(err) = delivered {
                crate::console_warn!("snapshot listener failed: {:?}", err);
            }
        });
    }
}

/// Decode one tile payload into a GeoJSON FeatureCollection.
#[wasm_bindgen(js_name = decodeTile)]
pub fn decode_tile_js(z: u8, x: u32, y: u32, bytes: &[u8]) -> Result<JsValue, JsValue> {
    let features = decode_tile(TileAddress::new(z, x, y), bytes)?;
    to_js(&FeatureCollection::new(features).to_geojson())
}
