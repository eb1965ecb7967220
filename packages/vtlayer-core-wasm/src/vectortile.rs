use std::f64::consts::PI;
use std::fmt;
use std::ops::RangeInclusive;

use geo_types::{coord, Rect};
use js_sys::Uint8Array;
use serde::{Deserialize, Serialize};
use wasm_bindgen_futures::JsFuture;

use crate::error::{Error, Result};

pub const DEFAULT_EXTENT: u32 = 4096;

pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Address of a tile in the quad-tree tiling scheme.
///
/// Ordering is (zoom, column, row); the orchestrator relies on it as the
/// stable aggregation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    #[serde(alias = "z")]
    pub zoom: u8,
    #[serde(alias = "x")]
    pub column: u32,
    #[serde(alias = "y")]
    pub row: u32,
}

impl TileAddress {
    pub const fn new(zoom: u8, column: u32, row: u32) -> Self {
        Self { zoom, column, row }
    }

    pub fn tiles_per_edge(&self) -> u64 {
        1u64 << self.zoom.min(32)
    }

    pub fn is_valid(&self) -> bool {
        self.zoom <= 32
            && (self.column as u64) < self.tiles_per_edge()
            && (self.row as u64) < self.tiles_per_edge()
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.column, self.row)
    }

    /// Convert a tile-local coordinate into (lng, lat) degrees.
    pub fn tile_to_lng_lat(&self, x: f64, y: f64, extent: u32) -> (f64, f64) {
        let extent = extent as f64;
        let size = extent * self.tiles_per_edge() as f64;
        let x0 = extent * self.column as f64;
        let y0 = extent * self.row as f64;

        let lng = (x + x0) * 360.0 / size - 180.0;
        let y2 = 180.0 - (y + y0) * 360.0 / size;
        let lat = 360.0 / PI * (y2 * PI / 180.0).exp().atan() - 90.0;

        (lng, lat)
    }

    pub fn bounds(&self) -> Rect<f64> {
        let n = self.tiles_per_edge() as f64;
        let west = column_to_lng(self.column as f64, n);
        let east = column_to_lng(self.column as f64 + 1.0, n);
        let north = row_to_lat(self.row as f64, n);
        let south = row_to_lat(self.row as f64 + 1.0, n);

        Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north })
    }

    /// Tiles at `zoom` covering a lng/lat box, row-major.
    ///
    /// `west > east` means the box crosses the antimeridian. Fails with
    /// `ViewportTooLarge` before allocating when more than `max_tiles`
    /// addresses would be produced.
    pub fn covering(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        zoom: u8,
        max_tiles: usize,
    ) -> Result<Vec<TileAddress>> {
        let first_column = lng_to_column(west, zoom);
        let last_column = lng_to_column(east, zoom);
        let columns: Vec<RangeInclusive<u32>> = if west <= east {
            vec![first_column..=last_column]
        } else if first_column <= last_column {
            // wrapped spans overlap: the whole width
            vec![0..=last_index(zoom)]
        } else {
            vec![first_column..=last_index(zoom), 0..=last_column]
        };

        // Note: rows grow southwards, so the north edge gives the first row
        let first_row = lat_to_row(north.max(south), zoom);
        let last_row = lat_to_row(north.min(south), zoom);

        let width: u64 = columns
            .iter()
            .map(|span| (*span.end() - *span.start()) as u64 + 1)
            .sum();
        let count = width * ((last_row - first_row) as u64 + 1);
        if count > max_tiles as u64 {
            return Err(Error::ViewportTooLarge {
                zoom,
                tiles: count,
                limit: max_tiles,
            });
        }

        let mut tiles = Vec::with_capacity(count as usize);
        for row in first_row..=last_row {
            for span in &columns {
                tiles.extend(span.clone().map(|column| TileAddress::new(zoom, column, row)));
            }
        }
        Ok(tiles)
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

fn column_to_lng(column: f64, n: f64) -> f64 {
    column / n * 360.0 - 180.0
}

fn row_to_lat(row: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * row / n)).sinh().atan().to_degrees()
}

fn last_index(zoom: u8) -> u32 {
    ((1u64 << zoom.min(32)) - 1).min(u32::MAX as u64) as u32
}

fn lng_to_column(lng: f64, zoom: u8) -> u32 {
    let n = (1u64 << zoom.min(32)) as f64;
    let x = ((lng.clamp(-180.0, 180.0) + 180.0) / 360.0 * n).floor();
    (x.max(0.0) as u32).min(last_index(zoom))
}

fn lat_to_row(lat: f64, zoom: u8) -> u32 {
    let n = (1u64 << zoom.min(32)) as f64;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();
    (y.max(0.0) as u32).min(last_index(zoom))
}

pub fn tile_url(base_url: &str, address: &TileAddress, extension: &str) -> String {
    format!(
        "{}/{}/{}/{}.{}",
        base_url.trim_end_matches('/'),
        address.zoom,
        address.column,
        address.row,
        extension
    )
}

/// Fetch tile bytes through the host's `wasmJsHelpers.fetch` promise.
///
/// The promise is expected to resolve to an `ArrayBuffer` or `Uint8Array`.
pub async fn fetch_tile_bytes(url: String) -> Result<Vec<u8>> {
    let promise = crate::fetch(&url).map_err(|e| Error::FetchFailure {
        url: url.clone(),
        reason: format!("{:?}", e),
    })?;
    let response = JsFuture::from(promise).await.map_err(|e| Error::FetchFailure {
        url: url.clone(),
        reason: format!("{:?}", e),
    })?;

    if response.is_null() || response.is_undefined() {
        return Err(Error::FetchFailure {
            url,
            reason: "empty response".to_string(),
        });
    }

    Ok(Uint8Array::new(&response).to_vec())
}
