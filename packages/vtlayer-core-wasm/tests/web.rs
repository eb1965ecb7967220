//! Browser tests for the JS surface. Run with `wasm-pack test --headless`.

#![cfg(target_arch = "wasm32")]

use geozero::mvt::{tile, Message, Tile};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

use vtlayer_core_wasm::{decode_tile_js, MvtTileLayer};

wasm_bindgen_test_configure!(run_in_browser);

fn single_point_tile() -> Vec<u8> {
    let layer = tile::Layer {
        version: 2,
        name: "places".to_string(),
        features: vec![tile::Feature {
            id: Some(1),
            tags: vec![0, 0],
            r#type: Some(1),
            geometry: vec![9, 4096, 4096],
            ..Default::default()
        }],
        keys: vec!["Population".to_string()],
        values: vec![tile::Value {
            int_value: Some(500),
            ..Default::default()
        }],
        extent: Some(4096),
        ..Default::default()
    };
    Tile {
        layers: vec![layer],
    }
    .encode_to_vec()
}

#[wasm_bindgen_test]
fn decode_tile_returns_a_plain_feature_collection() {
    let value = decode_tile_js(13, 100, 200, &single_point_tile()).unwrap();
    let kind = js_sys::Reflect::get(&value, &JsValue::from_str("type")).unwrap();
    assert_eq!(kind.as_string().as_deref(), Some("FeatureCollection"));

    let features = js_sys::Reflect::get(&value, &JsValue::from_str("features")).unwrap();
    assert_eq!(js_sys::Array::from(&features).length(), 1);
}

#[wasm_bindgen_test]
fn decode_tile_rejects_garbage() {
    assert!(decode_tile_js(13, 100, 200, &[0xFF, 0xFF, 0xFF, 0x01]).is_err());
}

#[wasm_bindgen_test]
fn layer_rejects_invalid_config() {
    let config = js_sys::JSON::parse(r#"{"dataSourceId": "", "tiles": {"baseUrl": "x"}}"#).unwrap();
    assert!(MvtTileLayer::new(config).is_err());
}

#[wasm_bindgen_test]
fn empty_viewport_snapshot_is_settled() {
    let config = js_sys::JSON::parse(
        r#"{"dataId": "ds1", "tiles": {"baseUrl": "http://localhost"}, "minZoom": 13}"#,
    )
    .unwrap();
    let layer = MvtTileLayer::new(config).unwrap();

    // below minZoom, nothing is requested
    let snapshot = layer.set_viewport(-1.0, -1.0, 1.0, 1.0, 3).unwrap();
    let settled = js_sys::Reflect::get(&snapshot, &JsValue::from_str("settled")).unwrap();
    assert_eq!(settled.as_bool(), Some(true));
}
