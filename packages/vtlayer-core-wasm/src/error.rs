use thiserror::Error;
use wasm_bindgen::JsValue;

use crate::vectortile::TileAddress;

/// Errors produced by the tile pipeline.
///
/// Per-tile variants (`FetchFailure`, `Decode`, `Superseded`) are contained by
/// the orchestrator and degrade to an empty tile. Configuration variants are
/// returned from constructors and must be fixed by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("failed to fetch tile from {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("failed to decode tile {address}: {reason}")]
    Decode { address: TileAddress, reason: String },

    #[error("scale type {0} not supported")]
    UnsupportedScaleKind(String),

    #[error("scale output range must contain at least one value")]
    EmptyOutputRange,

    #[error("invalid layer config: {0}")]
    InvalidConfig(String),

    #[error("viewport at zoom {zoom} needs {tiles} tiles, limit is {limit}")]
    ViewportTooLarge { zoom: u8, tiles: u64, limit: usize },

    #[error("viewport generation {generation} was superseded")]
    Superseded { generation: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for JsValue {
    fn from(err: Error) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
