// Tile pipeline orchestration: fetch, decode, filter and encode the tiles of
// one viewport, and publish the merged result as an immutable snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};

use crate::cancellation::{GenerationCounter, ViewportToken};
use crate::config::{Channel, LayerConfig, VisualChannel};
use crate::error::Result;
use crate::filter::{filter_features, FilterSpec};
use crate::geojson_features::{FeatureCollection, GeoFeature};
use crate::mvt_parser::decode_tile;
use crate::scale::{build_scale, compute_domain, Domain, OutputValue, Scale, ScaleKind};
use crate::vectortile::TileAddress;
use crate::{console_log, console_warn};

pub type Listener = Arc<dyn Fn(&Arc<ViewportSnapshot>)>;

/// Scale resolved for one visual channel over the current aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEncoding {
    pub channel: Channel,
    pub field: Option<String>,
    /// `None` when the configured kind was not recognised.
    pub kind: Option<ScaleKind>,
    pub domain: Domain,
    pub scale: Scale,
    pub null_value: OutputValue,
}

impl ChannelEncoding {
    /// Build the encoding for `channel` over every feature in `features`.
    pub fn build(channel: &VisualChannel, features: &FeatureCollection) -> Self {
        let range = channel.output_range();
        let null_value = channel.null_value();
        let fallback = Scale::constant(range.first().copied().unwrap_or(null_value));

        let kind = match ScaleKind::from_str(&channel.scale) {
            Ok(kind) => Some(kind),
            Err(err) => {
                console_warn!("{} channel: {}, using a constant", channel.channel.name(), err);
                None
            }
        };

        let (domain, scale) = match (kind, channel.field_name()) {
            (Some(kind), Some(field)) => {
                let domain = compute_domain(features.iter().filter_map(|f| f.property(field)), kind);
                let scale = build_scale(&domain, range).unwrap_or(fallback);
                (domain, scale)
            }
            _ => (Domain::Default, fallback),
        };

        ChannelEncoding {
            channel: channel.channel,
            field: channel.field_name().map(str::to_string),
            kind,
            domain,
            scale,
            null_value,
        }
    }

    pub fn value_for(&self, feature: &GeoFeature) -> OutputValue {
        let Some(field) = &self.field else {
            return self.scale.apply(&Value::Null).unwrap_or(self.null_value);
        };
        feature
            .property(field)
            .filter(|value| !value.is_null())
            .and_then(|value| self.scale.apply(value))
            .unwrap_or(self.null_value)
    }

    fn describe(&self) -> Value {
        json!({
            "channel": self.channel.name(),
            "field": self.field,
            "scale": self.kind.map(|k| k.to_string()),
            "domain": self.domain.to_json(),
        })
    }
}

fn output_json(value: OutputValue) -> Value {
    match value {
        OutputValue::Color(c) => json!([c.r, c.g, c.b, c.a]),
        OutputValue::Number(n) => json!(n),
    }
}

/// Immutable view of one viewport: the merged features plus the encodings
/// derived from them. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportSnapshot {
    pub generation: u64,
    /// Increases with every publish, across generations.
    pub revision: u64,
    pub tiles_requested: usize,
    pub tiles_loaded: usize,
    pub features: FeatureCollection,
    pub encodings: Vec<ChannelEncoding>,
}

impl ViewportSnapshot {
    /// Every requested tile has been loaded. An empty settled snapshot means
    /// "no matching data", an empty unsettled one "no data yet".
    pub fn is_settled(&self) -> bool {
        self.tiles_loaded >= self.tiles_requested
    }

    pub fn encoding(&self, channel: Channel) -> Option<&ChannelEncoding> {
        self.encodings.iter().find(|e| e.channel == channel)
    }

    pub fn channel_value(&self, index: usize, channel: Channel) -> Option<OutputValue> {
        let feature = self.features.features().get(index)?;
        Some(self.encoding(channel)?.value_for(feature))
    }

    /// GeoJSON for the rendering host. Each feature carries its channel
    /// values under `encoding`.
    pub fn to_geojson(&self) -> Value {
        let mut collection = self.features.to_geojson_with(|feature, _| {
            let mut value = feature.to_geojson();
            if !self.encodings.is_empty() {
                let encoded: Map<String, Value> = self
                    .encodings
                    .iter()
                    .map(|e| (e.channel.name().to_string(), output_json(e.value_for(feature))))
                    .collect();
                value["encoding"] = Value::Object(encoded);
            }
            value
        });
        collection["generation"] = json!(self.generation);
        collection["revision"] = json!(self.revision);
        collection["tilesRequested"] = json!(self.tiles_requested);
        collection["tilesLoaded"] = json!(self.tiles_loaded);
        collection["settled"] = json!(self.is_settled());
        collection["encodings"] =
            Value::Array(self.encodings.iter().map(ChannelEncoding::describe).collect());
        collection
    }
}

struct LoadedTile {
    /// Every decoded feature of the kept layers, so filters can change
    /// without a refetch.
    decoded: Vec<GeoFeature>,
    passing: Vec<GeoFeature>,
}

struct ViewportState {
    token: ViewportToken,
    requested: BTreeSet<TileAddress>,
    loaded: BTreeMap<TileAddress, LoadedTile>,
    filters: Vec<FilterSpec>,
    revision: u64,
}

/// Merge per-tile feature lists in tile-address order.
pub fn aggregate<'a, I>(tile_results: I) -> FeatureCollection
where
    I: IntoIterator<Item = (&'a TileAddress, &'a [GeoFeature])>,
{
    let mut tiles: Vec<(&TileAddress, &[GeoFeature])> = tile_results.into_iter().collect();
    tiles.sort_by_key(|(address, _)| **address);
    FeatureCollection::new(
        tiles
            .into_iter()
            .flat_map(|(_, features)| features.iter().cloned())
            .collect(),
    )
}

/// Orchestrates the tiles of one layer's viewport.
///
/// Tile loads for a viewport run as independent futures. Results are merged
/// in address order and only if their viewport is still current.
pub struct TilePipeline {
    config: LayerConfig,
    generations: GenerationCounter,
    state: Mutex<ViewportState>,
    snapshot: RwLock<Arc<ViewportSnapshot>>,
    listeners: RwLock<Vec<Listener>>,
}

impl TilePipeline {
    pub fn new(config: LayerConfig) -> Result<Self> {
        config.validate()?;
        let generations = GenerationCounter::new();
        let state = ViewportState {
            token: generations.token(),
            requested: BTreeSet::new(),
            loaded: BTreeMap::new(),
            filters: config.filters.clone(),
            revision: 0,
        };
        Ok(Self {
            config,
            generations,
            state: Mutex::new(state),
            snapshot: RwLock::new(Arc::new(ViewportSnapshot::default())),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<ViewportSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn current_token(&self) -> ViewportToken {
        self.state.lock().token.clone()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&Arc<ViewportSnapshot>) + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Tiles covering a lng/lat box at `zoom`, capped at the configured
    /// `maxTiles`. `west > east` crosses the antimeridian.
    pub fn viewport_for_bounds(
        &self,
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        zoom: u8,
    ) -> Result<Vec<TileAddress>> {
        TileAddress::covering(west, south, east, north, zoom, self.config.max_tiles)
    }

    /// Start a new viewport generation over `tiles`.
    ///
    /// Tiles outside the layer's zoom range or the tile grid are not
    /// requested. Loaded tiles still in view are kept; in-flight loads of
    /// the previous generation will be discarded.
    pub fn set_viewport(&self, tiles: Vec<TileAddress>) -> ViewportToken {
        let token = self.generations.advance();
        let snapshot = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.token = token.clone();
            state.requested = tiles
                .into_iter()
                .filter(|t| t.is_valid() && self.config.accepts_zoom(t.zoom))
                .collect();
            let requested = &state.requested;
            state.loaded.retain(|address, _| requested.contains(address));
            self.publish(state)
        };
        console_log!(
            "viewport generation {}: {} tiles requested",
            token.generation(),
            snapshot.tiles_requested
        );
        self.notify(&snapshot);
        token
    }

    /// Fetch, decode and filter one tile.
    ///
    /// `fetch` receives the templated tile URL. Fetch and decode failures
    /// are logged and yield no features. The tile is merged only when it
    /// belongs to the viewport that was current when the load started.
    pub async fn load_tile<F, Fut>(&self, address: TileAddress, fetch: F) -> Vec<GeoFeature>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let token = self.current_token();
        let url = self.config.tiles.url_for(&address);

        let bytes = match fetch(url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                console_warn!("{}", err);
                Vec::new()
            }
        };

        if let Err(err) = token.ensure_current() {
            console_log!("dropping tile {}: {}", address, err);
            return Vec::new();
        }

        let decoded: Vec<GeoFeature> = match decode_tile(address, &bytes) {
            Ok(features) => features
                .into_iter()
                .filter(|f| self.config.accepts_layer(&f.layer))
                .collect(),
            Err(err) => {
                console_warn!("{}", err);
                Vec::new()
            }
        };

        let filters = self.state.lock().filters.clone();
        let passing = filter_features(&decoded, &self.config.data_source_id, &filters);

        let merged = {
            let mut state = self.state.lock();
            // the viewport or the filters may have moved while decoding
            if let Err(err) = token.ensure_current() {
                console_log!("dropping tile {}: {}", address, err);
                return Vec::new();
            }
            if !state.requested.contains(&address) {
                return passing;
            }
            let passing = if state.filters == filters {
                passing
            } else {
                filter_features(&decoded, &self.config.data_source_id, &state.filters)
            };
            state.loaded.insert(
                address,
                LoadedTile {
                    decoded,
                    passing: passing.clone(),
                },
            );
            (self.publish(&mut state), passing)
        };
        let (snapshot, passing) = merged;
        self.notify(&snapshot);
        passing
    }

    pub async fn load_viewport<F, Fut>(&self, fetch: F) -> Arc<ViewportSnapshot>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let pending: Vec<TileAddress> = {
            let state = self.state.lock();
            state
                .requested
                .iter()
                .filter(|address| !state.loaded.contains_key(address))
                .copied()
                .collect()
        };
        join_all(pending.into_iter().map(|address| self.load_tile(address, &fetch))).await;
        self.snapshot()
    }

    /// Rebuild and publish the aggregate from the currently loaded tiles.
    pub fn on_viewport_tiles_changed(&self) -> Arc<ViewportSnapshot> {
        let snapshot = {
            let mut state = self.state.lock();
            self.publish(&mut state)
        };
        self.notify(&snapshot);
        snapshot
    }

    /// Replace the filter set and re-filter the loaded tiles without
    /// refetching them.
    pub fn set_filters(&self, filters: Vec<FilterSpec>) -> Arc<ViewportSnapshot> {
        let snapshot = {
            let mut state = self.state.lock();
            for tile in state.loaded.values_mut() {
                tile.passing = filter_features(&tile.decoded, &self.config.data_source_id, &filters);
            }
            state.filters = filters;
            self.publish(&mut state)
        };
        self.notify(&snapshot);
        snapshot
    }

    // Called with the state lock held so snapshots swap in revision order.
    fn publish(&self, state: &mut ViewportState) -> Arc<ViewportSnapshot> {
        state.revision += 1;

        let features = aggregate(
            state
                .loaded
                .iter()
                .map(|(address, tile)| (address, tile.passing.as_slice())),
        );
        let encodings = self
            .config
            .channels
            .iter()
            .map(|channel| ChannelEncoding::build(channel, &features))
            .collect();

        let snapshot = Arc::new(ViewportSnapshot {
            generation: state.token.generation(),
            revision: state.revision,
            tiles_requested: state.requested.len(),
            tiles_loaded: state.loaded.len(),
            features,
            encodings,
        });
        *self.snapshot.write() = Arc::clone(&snapshot);
        snapshot
    }

    // Listeners run outside every lock so they may call back into the pipeline.
    fn notify(&self, snapshot: &Arc<ViewportSnapshot>) {
        console_log!(
            "revision {}: {} features from {}/{} tiles",
            snapshot.revision,
            snapshot.features.len(),
            snapshot.tiles_loaded,
            snapshot.tiles_requested
        );
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(snapshot);
        }
    }
}
