use serde::{Deserialize, Serialize};

use crate::color::{Rgba, DEFAULT_COLOR_RANGE};
use crate::error::{Error, Result};
use crate::filter::FilterSpec;
use crate::scale::OutputValue;
use crate::vectortile::{tile_url, TileAddress};

const DEFAULT_MAX_ZOOM: u8 = 22;
const DEFAULT_MAX_TILES: usize = 1024;
const DEFAULT_SCALE: &str = "quantile";
const DEFAULT_RADIUS_RANGE: [f64; 2] = [0.0, 50.0];
const DEFAULT_HEIGHT_RANGE: [f64; 2] = [0.0, 500.0];

/// Configuration of one vector tile layer, as handed over by the JS host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    #[serde(alias = "dataId")]
    pub data_source_id: String,
    pub tiles: TileSourceConfig,
    /// Tile layers to keep. Empty keeps every layer.
    #[serde(default)]
    pub source_layers: Vec<String>,
    #[serde(default)]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    /// Upper bound on the tiles a single viewport may cover.
    #[serde(default = "default_max_tiles")]
    pub max_tiles: usize,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub channels: Vec<VisualChannel>,
}

fn default_max_zoom() -> u8 {
    DEFAULT_MAX_ZOOM
}

fn default_max_tiles() -> usize {
    DEFAULT_MAX_TILES
}

impl LayerConfig {
    pub fn new(data_source_id: &str, base_url: &str) -> Self {
        Self {
            data_source_id: data_source_id.to_string(),
            tiles: TileSourceConfig {
                base_url: base_url.to_string(),
                format: TileFormat::default(),
                access_token: None,
            },
            source_layers: Vec::new(),
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_tiles: DEFAULT_MAX_TILES,
            filters: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: LayerConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_source_id.trim().is_empty() {
            return Err(Error::InvalidConfig("dataSourceId must not be empty".to_string()));
        }
        if self.tiles.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("tiles.baseUrl must not be empty".to_string()));
        }
        if self.min_zoom > self.max_zoom {
            return Err(Error::InvalidConfig(format!(
                "minZoom {} exceeds maxZoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_tiles == 0 {
            return Err(Error::InvalidConfig("maxTiles must be positive".to_string()));
        }
        self.channels.iter().try_for_each(VisualChannel::validate)
    }

    pub fn accepts_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
    }

    pub fn accepts_layer(&self, layer: &str) -> bool {
        self.source_layers.is_empty() || self.source_layers.iter().any(|l| l == layer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    #[default]
    Pbf,
    Mvt,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Pbf => "pbf",
            TileFormat::Mvt => "mvt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub format: TileFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl TileSourceConfig {
    pub fn url_for(&self, address: &TileAddress) -> String {
        let url = tile_url(&self.base_url, address, self.format.extension());
        match &self.access_token {
            Some(token) => format!("{}?access_token={}", url, token),
            None => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Color,
    StrokeColor,
    Radius,
    Height,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Color => "color",
            Channel::StrokeColor => "strokeColor",
            Channel::Radius => "radius",
            Channel::Height => "height",
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Channel::Color | Channel::StrokeColor)
    }

    pub fn default_range(&self) -> Vec<OutputValue> {
        match self {
            Channel::Color | Channel::StrokeColor => {
                DEFAULT_COLOR_RANGE.iter().copied().map(OutputValue::Color).collect()
            }
            Channel::Radius => DEFAULT_RADIUS_RANGE.iter().copied().map(OutputValue::Number).collect(),
            Channel::Height => DEFAULT_HEIGHT_RANGE.iter().copied().map(OutputValue::Number).collect(),
        }
    }

    pub fn default_null_value(&self) -> OutputValue {
        if self.is_color() {
            OutputValue::Color(Rgba::TRANSPARENT)
        } else {
            OutputValue::Number(0.0)
        }
    }
}

/// Mapping of one feature property onto a visual channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualChannel {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Scale kind name; parsed when the encoding is built so an unknown
    /// kind degrades to a constant instead of rejecting the layer.
    #[serde(default = "default_scale")]
    pub scale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<OutputValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_value: Option<OutputValue>,
}

fn default_scale() -> String {
    DEFAULT_SCALE.to_string()
}

impl VisualChannel {
    pub fn new(channel: Channel, field: Option<&str>, scale: &str) -> Self {
        Self {
            channel,
            field: field.map(str::to_string),
            scale: scale.to_string(),
            range: None,
            null_value: None,
        }
    }

    pub fn with_range(mut self, range: Vec<OutputValue>) -> Self {
        self.range = Some(range);
        self
    }

    /// Property the channel reads. Height falls back to the feature's own
    /// `height` property.
    pub fn field_name(&self) -> Option<&str> {
        match (&self.field, self.channel) {
            (Some(field), _) => Some(field.as_str()),
            (None, Channel::Height) => Some("height"),
            (None, _) => None,
        }
    }

    pub fn output_range(&self) -> Vec<OutputValue> {
        self.range
            .clone()
            .unwrap_or_else(|| self.channel.default_range())
    }

    pub fn null_value(&self) -> OutputValue {
        self.null_value
            .unwrap_or_else(|| self.channel.default_null_value())
    }

    pub fn validate(&self) -> Result<()> {
        let range = match &self.range {
            Some(range) if range.is_empty() => return Err(Error::EmptyOutputRange),
            Some(range) => range,
            None => return Ok(()),
        };
        let wants_color = self.channel.is_color();
        if range.iter().any(|v| v.as_color().is_some() != wants_color) {
            return Err(Error::InvalidConfig(format!(
                "{} range must contain only {}",
                self.channel.name(),
                if wants_color { "colors" } else { "numbers" }
            )));
        }
        Ok(())
    }
}
