use std::io::Read;

use flate2::read::GzDecoder;
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geozero::mvt::tile;
use geozero::mvt::{Message, Tile};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geojson_features::{GeoFeature, GeometryType, Properties};
use crate::vectortile::{TileAddress, DEFAULT_EXTENT};

// Geometry command ids
const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

pub type LocalPath = Vec<(i64, i64)>;

/// Decode a vector tile payload into lng/lat features.
///
/// Every feature of every layer is returned, in layer then feature order.
/// The returned features own all their data; nothing borrows `bytes`.
pub fn decode_tile(address: TileAddress, bytes: &[u8]) -> Result<Vec<GeoFeature>> {
    let decode_error = |reason: String| Error::Decode { address, reason };

    let data = decompress_gzip(bytes).map_err(decode_error)?;
    let tile = Tile::decode(data.as_slice()).map_err(|e| decode_error(e.to_string()))?;

    let mut features = Vec::new();
    for layer in &tile.layers {
        let extent = layer.extent.unwrap_or(DEFAULT_EXTENT);
        if extent == 0 {
            return Err(decode_error(format!("layer '{}' has zero extent", layer.name)));
        }

        for (idx, feature) in layer.features.iter().enumerate() {
            let geometry_type = GeometryType::from_mvt(feature.r#type.unwrap_or(0));
            let paths = decode_geometry(&feature.geometry, geometry_type).map_err(|reason| {
                decode_error(format!("layer '{}' feature {}: {}", layer.name, idx, reason))
            })?;
            let properties = decode_properties(layer, feature).map_err(|reason| {
                decode_error(format!("layer '{}' feature {}: {}", layer.name, idx, reason))
            })?;

            let project = |&(x, y): &(i64, i64)| {
                let (lng, lat) = address.tile_to_lng_lat(x as f64, y as f64, extent);
                Coord { x: lng, y: lat }
            };

            features.push(GeoFeature {
                id: feature.id,
                layer: layer.name.clone(),
                geometry_type,
                geometry: build_geometry(geometry_type, &paths, project),
                properties,
            });
        }
    }

    Ok(features)
}

// Function to detect if data is gzipped (checking for gzip magic number)
fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

fn decompress_gzip(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    if !is_gzipped(data) {
        return Ok(data.to_vec());
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| format!("error decompressing gzip data: {}", e))?;
    Ok(decompressed)
}

fn zigzag(value: u32) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn read_delta(commands: &[u32], cursor: &mut usize) -> std::result::Result<(i64, i64), String> {
    match commands.get(*cursor..*cursor + 2) {
        Some(&[dx, dy]) => {
            *cursor += 2;
            Ok((zigzag(dx), zigzag(dy)))
        }
        _ => Err(format!("truncated command parameters at {}", *cursor)),
    }
}

/// Decode a geometry command stream into paths of tile-local coordinates.
///
/// Each MoveTo starts a new path. ClosePath repeats the path's first
/// coordinate so rings come out closed.
pub fn decode_geometry(
    commands: &[u32],
    geometry_type: GeometryType,
) -> std::result::Result<Vec<LocalPath>, String> {
    let mut paths: Vec<LocalPath> = Vec::new();
    let (mut x, mut y) = (0i64, 0i64);
    let mut cursor = 0;

    while cursor < commands.len() {
        let command = commands[cursor];
        let id = command & 0x7;
        let count = (command >> 3) as usize;
        cursor += 1;

        match id {
            MOVE_TO => {
                if count == 0 {
                    return Err("MoveTo with zero count".to_string());
                }
                if count > 1 && geometry_type != GeometryType::Point {
                    return Err(format!("MoveTo with count {} outside a point geometry", count));
                }
                for _ in 0..count {
                    let (dx, dy) = read_delta(commands, &mut cursor)?;
                    x += dx;
                    y += dy;
                    paths.push(vec![(x, y)]);
                }
            }
            LINE_TO => {
                if geometry_type == GeometryType::Point {
                    return Err("LineTo in a point geometry".to_string());
                }
                let path = paths
                    .last_mut()
                    .ok_or_else(|| "LineTo before MoveTo".to_string())?;
                for _ in 0..count {
                    let (dx, dy) = read_delta(commands, &mut cursor)?;
                    x += dx;
                    y += dy;
                    path.push((x, y));
                }
            }
            CLOSE_PATH => {
                if count != 1 {
                    return Err(format!("ClosePath with count {}", count));
                }
                let path = paths
                    .last_mut()
                    .ok_or_else(|| "ClosePath before MoveTo".to_string())?;
                if let Some(&first) = path.first() {
                    path.push(first);
                }
            }
            other => return Err(format!("unknown geometry command {}", other)),
        }
    }

    Ok(paths)
}

// Shoelace sum over a tile-local ring (y grows downwards).
fn signed_area(ring: &[(i64, i64)]) -> f64 {
    let mut sum = 0.0;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[j];
        sum += ((x2 - x1) as f64) * ((y1 + y2) as f64);
        j = i;
    }
    sum
}

/// Group rings into polygons: the first non-degenerate ring fixes the
/// exterior winding, rings with the opposite winding are holes of the
/// preceding exterior. Zero-area rings are dropped.
pub fn classify_rings(rings: &[LocalPath]) -> Vec<Vec<&LocalPath>> {
    if rings.len() <= 1 {
        return vec![rings.iter().collect()];
    }

    let mut polygons: Vec<Vec<&LocalPath>> = Vec::new();
    let mut exterior_is_negative: Option<bool> = None;

    for ring in rings {
        let area = signed_area(ring);
        if area == 0.0 {
            continue;
        }
        let negative = area < 0.0;
        let exterior = *exterior_is_negative.get_or_insert(negative);
        match polygons.last_mut() {
            Some(polygon) if negative != exterior => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }

    polygons
}

fn build_geometry<F>(geometry_type: GeometryType, paths: &[LocalPath], project: F) -> Geometry<f64>
where
    F: Fn(&(i64, i64)) -> Coord<f64> + Copy,
{
    let line = |path: &LocalPath| LineString::new(path.iter().map(project).collect());

    match geometry_type {
        GeometryType::Point => {
            let mut points: Vec<Point<f64>> = paths
                .iter()
                .flat_map(|path| path.iter().map(project).map(Point::from))
                .collect();
            match points.len() {
                0 => empty_geometry(),
                1 => Geometry::Point(points.remove(0)),
                _ => Geometry::MultiPoint(MultiPoint::new(points)),
            }
        }
        GeometryType::LineString => {
            let mut lines: Vec<LineString<f64>> = paths.iter().map(line).collect();
            match lines.len() {
                0 => empty_geometry(),
                1 => Geometry::LineString(lines.remove(0)),
                _ => Geometry::MultiLineString(MultiLineString::new(lines)),
            }
        }
        GeometryType::Polygon => {
            let mut polygons: Vec<Polygon<f64>> = classify_rings(paths)
                .into_iter()
                .filter_map(|rings| {
                    let (exterior, holes) = rings.split_first()?;
                    Some(Polygon::new(
                        line(*exterior),
                        holes.iter().map(|ring| line(*ring)).collect(),
                    ))
                })
                .collect();
            match polygons.len() {
                0 => empty_geometry(),
                1 => Geometry::Polygon(polygons.remove(0)),
                _ => Geometry::MultiPolygon(MultiPolygon::new(polygons)),
            }
        }
        GeometryType::Unknown => empty_geometry(),
    }
}

fn empty_geometry() -> Geometry<f64> {
    Geometry::GeometryCollection(GeometryCollection(Vec::new()))
}

fn decode_properties(
    layer: &tile::Layer,
    feature: &tile::Feature,
) -> std::result::Result<Properties, String> {
    if feature.tags.len() % 2 != 0 {
        return Err(format!("odd number of tags ({})", feature.tags.len()));
    }

    let mut properties = Properties::new();
    for pair in feature.tags.chunks_exact(2) {
        let key = layer
            .keys
            .get(pair[0] as usize)
            .ok_or_else(|| format!("key index {} out of range", pair[0]))?;
        let value = layer
            .values
            .get(pair[1] as usize)
            .ok_or_else(|| format!("value index {} out of range", pair[1]))?;
        properties.insert(key.clone(), tile_value_to_json(value));
    }
    Ok(properties)
}

/// Convert a tile value into a JSON scalar. Non-finite floats become null.
fn tile_value_to_json(value: &tile::Value) -> Value {
    if let Some(s) = &value.string_value {
        Value::String(s.clone())
    } else if let Some(f) = value.float_value {
        serde_json::Number::from_f64(f as f64).map_or(Value::Null, Value::Number)
    } else if let Some(d) = value.double_value {
        serde_json::Number::from_f64(d).map_or(Value::Null, Value::Number)
    } else if let Some(i) = value.int_value {
        Value::from(i)
    } else if let Some(u) = value.uint_value {
        Value::from(u)
    } else if let Some(s) = value.sint_value {
        Value::from(s)
    } else if let Some(b) = value.bool_value {
        Value::Bool(b)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(id: u32, count: u32) -> u32 {
        (id & 0x7) | (count << 3)
    }

    fn zz(v: i64) -> u32 {
        ((v << 1) ^ (v >> 63)) as u32
    }

    // Square ring whose MoveTo is relative to the current cursor. Reversed
    // squares wind the other way.
    fn square(dx: i64, dy: i64, side: i64, reversed: bool) -> Vec<u32> {
        let steps = if reversed {
            [(0, side), (side, 0), (0, -side)]
        } else {
            [(side, 0), (0, side), (-side, 0)]
        };
        let mut commands = vec![command(MOVE_TO, 1), zz(dx), zz(dy), command(LINE_TO, 3)];
        for (x, y) in steps {
            commands.push(zz(x));
            commands.push(zz(y));
        }
        commands.push(command(CLOSE_PATH, 1));
        commands
    }

    #[test]
    fn zigzag_round_trips_small_values() {
        for v in [-3i64, -1, 0, 1, 2, 4095] {
            assert_eq!(zigzag(zz(v)), v);
        }
    }

    #[test]
    fn decodes_multi_point() {
        let commands = vec![command(MOVE_TO, 2), zz(5), zz(7), zz(3), zz(2)];
        let paths = decode_geometry(&commands, GeometryType::Point).unwrap();
        assert_eq!(paths, vec![vec![(5, 7)], vec![(8, 9)]]);
    }

    #[test]
    fn decodes_line_with_relative_cursor() {
        let commands = vec![
            command(MOVE_TO, 1),
            zz(2),
            zz(2),
            command(LINE_TO, 2),
            zz(0),
            zz(8),
            zz(8),
            zz(0),
        ];
        let paths = decode_geometry(&commands, GeometryType::LineString).unwrap();
        assert_eq!(paths, vec![vec![(2, 2), (2, 10), (10, 10)]]);
    }

    #[test]
    fn close_path_closes_ring() {
        let paths = decode_geometry(&square(0, 0, 10, false), GeometryType::Polygon).unwrap();
        assert_eq!(paths[0].first(), paths[0].last());
        assert_eq!(paths[0].len(), 5);
    }

    #[test]
    fn rejects_malformed_streams() {
        // truncated parameters
        assert!(decode_geometry(&[command(MOVE_TO, 1), zz(1)], GeometryType::Point).is_err());
        // LineTo without a current path
        assert!(decode_geometry(&[command(LINE_TO, 1), 0, 0], GeometryType::LineString).is_err());
        // unknown command id
        assert!(decode_geometry(&[command(3, 1), 0, 0], GeometryType::Point).is_err());
        // multi-point MoveTo in a line
        assert!(
            decode_geometry(&[command(MOVE_TO, 2), 0, 0, 2, 2], GeometryType::LineString).is_err()
        );
    }

    #[test]
    fn holes_attach_to_preceding_exterior() {
        // exterior (0,0)-(100,100) leaves the cursor at (0, 100)
        let mut commands = square(0, 0, 100, false);
        // hole starting at (20, 20), cursor ends at (40, 20)
        commands.extend(square(20, -80, 20, true));
        // second exterior starting at (100, 100)
        commands.extend(square(60, 80, 50, false));

        let paths = decode_geometry(&commands, GeometryType::Polygon).unwrap();
        assert_eq!(paths.len(), 3);

        let polygons = classify_rings(&paths);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].len(), 2);
        assert_eq!(polygons[1].len(), 1);
    }

    #[test]
    fn geometry_kinds_follow_path_counts() {
        let address = TileAddress::new(0, 0, 0);
        let project = |&(x, y): &(i64, i64)| {
            let (lng, lat) = address.tile_to_lng_lat(x as f64, y as f64, DEFAULT_EXTENT);
            Coord { x: lng, y: lat }
        };

        let one = decode_geometry(&square(0, 0, 10, false), GeometryType::Polygon).unwrap();
        assert!(matches!(
            build_geometry(GeometryType::Polygon, &one, project),
            Geometry::Polygon(_)
        ));

        let mut two_commands = square(0, 0, 10, false);
        two_commands.extend(square(20, 20, 10, false));
        let two = decode_geometry(&two_commands, GeometryType::Polygon).unwrap();
        assert!(matches!(
            build_geometry(GeometryType::Polygon, &two, project),
            Geometry::MultiPolygon(_)
        ));

        assert!(matches!(
            build_geometry(GeometryType::Unknown, &two, project),
            Geometry::GeometryCollection(_)
        ));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let address = TileAddress::new(13, 100, 200);
        match decode_tile(address, &[0xFF, 0xFF, 0xFF, 0x01]) {
            Err(Error::Decode { address: at, .. }) => assert_eq!(at, address),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn empty_payload_has_no_features() {
        let features = decode_tile(TileAddress::new(1, 0, 0), &[]).unwrap();
        assert!(features.is_empty());
    }
}
