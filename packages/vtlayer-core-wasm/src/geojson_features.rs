use std::collections::BTreeMap;

use geo::BoundingRect;
use geo_types::{Coord, Geometry, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type Properties = BTreeMap<String, Value>;

/// Geometry type as declared by the vector tile feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    Unknown,
}

impl GeometryType {
    pub fn from_mvt(value: i32) -> Self {
        match value {
            1 => GeometryType::Point,
            2 => GeometryType::LineString,
            3 => GeometryType::Polygon,
            _ => GeometryType::Unknown,
        }
    }
}

/// A decoded feature in lng/lat space.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub id: Option<u64>,
    pub layer: String,
    pub geometry_type: GeometryType,
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl GeoFeature {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    pub fn to_geojson(&self) -> Value {
        let mut feature = json!({
            "type": "Feature",
            "geometry": geometry_to_geojson(&self.geometry),
            "properties": self.properties,
        });
        if let Some(id) = self.id {
            feature["id"] = json!(id);
        }
        feature
    }
}

/// Ordered, immutable collection of features for one viewport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    features: Vec<GeoFeature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<GeoFeature>) -> Self {
        Self { features }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GeoFeature> {
        self.features.iter()
    }

    pub fn features(&self) -> &[GeoFeature] {
        &self.features
    }

    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(GeoFeature::bounding_rect)
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
    }

    /// GeoJSON `FeatureCollection` tagged with the CRS84 CRS.
    pub fn to_geojson(&self) -> Value {
        self.to_geojson_with(|feature, _| feature.to_geojson())
    }

    /// Like `to_geojson`, with a custom per-feature serializer that also
    /// receives the feature index.
    pub fn to_geojson_with<F>(&self, mut feature_json: F) -> Value
    where
        F: FnMut(&GeoFeature, usize) -> Value,
    {
        let features: Vec<Value> = self
            .features
            .iter()
            .enumerate()
            .map(|(idx, feature)| feature_json(feature, idx))
            .collect();

        let mut collection = json!({
            "type": "FeatureCollection",
            "features": features,
            "crs": {
                "type": "name",
                "properties": "urn:ogc:def:crs:OGC:1.3:CRS84"
            },
        });
        if let Some(rect) = self.bbox() {
            collection["bbox"] = json!([rect.min().x, rect.min().y, rect.max().x, rect.max().y]);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a GeoFeature;
    type IntoIter = std::slice::Iter<'a, GeoFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

fn position(coord: &Coord<f64>) -> Value {
    json!([coord.x, coord.y])
}

fn line_positions(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(position).collect())
}

fn polygon_positions(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![line_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(line_positions));
    Value::Array(rings)
}

/// GeoJSON geometry object. Empty collections serialize as `null`.
pub fn geometry_to_geojson(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(point) => json!({
            "type": "Point",
            "coordinates": position(&point.0),
        }),
        Geometry::MultiPoint(points) => json!({
            "type": "MultiPoint",
            "coordinates": points.iter().map(|p| position(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::LineString(line) => json!({
            "type": "LineString",
            "coordinates": line_positions(line),
        }),
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(line_positions).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(polygon),
        }),
        Geometry::MultiPolygon(polygons) => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(polygon_positions).collect::<Vec<_>>(),
        }),
        Geometry::GeometryCollection(collection) if collection.0.is_empty() => Value::Null,
        Geometry::GeometryCollection(collection) => json!({
            "type": "GeometryCollection",
            "geometries": collection.0.iter().map(geometry_to_geojson).collect::<Vec<_>>(),
        }),
        Geometry::Line(line) => json!({
            "type": "LineString",
            "coordinates": [position(&line.start), position(&line.end)],
        }),
        Geometry::Rect(rect) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(&rect.to_polygon()),
        }),
        Geometry::Triangle(triangle) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(&triangle.to_polygon()),
        }),
    }
}
