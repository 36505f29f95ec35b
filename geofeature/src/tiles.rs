//! Slippy-map tile addressing and tiled layers.
use crate::engine::{self, BBox};
use crate::input::Input;
use crate::options::SerializerOptions;
use crate::projection::{self, Projector, SphericalMercator, WGS84};
use crate::result::{Error, Result};
use crate::serializer::Serializer;
use crate::types::{GeometryType, SpatialGeometry};
use crate::view::GeoJsonResponse;
use crate::TILE_SRID;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::str::FromStr;

/// Zoom levels above this are never looked up for a simplification tolerance
const MAX_ZOOM: u32 = 32;

/// A tile address in the standard Web Mercator tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Result<Self> {
        if z >= MAX_ZOOM {
            return Err(Error::InvalidTileRequest(format!("zoom {} is out of range", z)));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(Error::InvalidTileRequest(format!(
                "tile {}/{} does not exist at zoom {}",
                x, y, z
            )));
        }
        Ok(TileCoord { z, x, y })
    }

    /// Parse positional `z`, `x`, `y` request arguments.
    pub fn from_args(args: &[&str]) -> Result<Self> {
        match args {
            [z, x, y, ..] => TileCoord::new(parse_arg("z", z)?, parse_arg("x", x)?, parse_arg("y", y)?),
            _ => Err(Error::InvalidTileRequest(format!(
                "expected z, x and y, got {} arguments",
                args.len()
            ))),
        }
    }

    /// The tile extent in degrees, `[minx, miny, maxx, maxy]`, spanning the
    /// north-west corner of this tile to that of `(x+1, y+1)`.
    pub fn bbox(&self) -> BBox {
        // x, y < 2^z <= 2^31, so the neighbours stay in range
        let (west, north) = nw_corner(self.x, self.y, self.z);
        let (east, south) = nw_corner(self.x + 1, self.y + 1, self.z);
        [west, south, east, north]
    }
}

fn parse_arg(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidTileRequest(format!("{} must be a non-negative integer, got {:?}", name, value)))
}

/// `"z/x/y"`, as found in tile URLs
impl FromStr for TileCoord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim_matches('/').split('/').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidTileRequest(format!("{:?} is not z/x/y", s)));
        }
        TileCoord::from_args(&parts)
    }
}

/// Longitude and latitude, in degrees, of the north-west corner of tile `x`, `y`.
///
/// `x` and `y` may equal `2^z` to address the far edges of the map.
pub fn nw_corner(x: u32, y: u32, z: u32) -> (f64, f64) {
    let n = 2f64.powi(z as i32);
    let lon = f64::from(x) / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * f64::from(y) / n)).sinh().atan().to_degrees();
    (lon, lat)
}

/// The extent of tile `z/x/y`; fails for addresses that do not exist at that zoom.
pub fn tile_bbox(z: u32, x: u32, y: u32) -> Result<BBox> {
    Ok(TileCoord::new(z, x, y)?.bbox())
}

/// The tolerance for `zoom`: its own entry, or the nearest deeper zoom that has one.
pub fn simplification_for(simplifications: &BTreeMap<u32, f64>, zoom: u32) -> Option<f64> {
    if zoom > MAX_ZOOM {
        return None;
    }
    simplifications.range(zoom..=MAX_ZOOM).next().map(|(_, t)| *t)
}

fn default_tile_srid() -> i32 {
    TILE_SRID
}

fn default_true() -> bool {
    true
}

/// Serves records one map tile at a time.
///
/// Only records intersecting the tile are kept, non-point geometries are
/// clipped to the tile unless `trim_to_boundary` is off, and the collection
/// carries the tile extent as its bbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TiledLayer {
    pub options: SerializerOptions,
    #[serde(default = "default_tile_srid")]
    pub tile_srid: i32,
    #[serde(default = "default_true")]
    pub trim_to_boundary: bool,
    /// Simplification tolerance by zoom level
    pub simplifications: BTreeMap<u32, f64>,
}

impl Default for TiledLayer {
    fn default() -> Self {
        TiledLayer {
            options: SerializerOptions::default(),
            tile_srid: TILE_SRID,
            trim_to_boundary: true,
            simplifications: BTreeMap::new(),
        }
    }
}

impl TiledLayer {
    pub fn new(options: SerializerOptions) -> Self {
        TiledLayer {
            options,
            ..Default::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The `FeatureCollection` of one tile.
    pub fn collection<'a, I>(&self, tile: &TileCoord, records: I) -> Result<Value>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        self.collection_with_projector(tile, records, &SphericalMercator)
    }

    pub fn collection_with_projector<'a, I>(
        &self,
        tile: &TileCoord,
        records: I,
        projector: &dyn Projector,
    ) -> Result<Value>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        if self.tile_srid != TILE_SRID {
            return Err(Error::Configuration(format!(
                "tiles in EPSG:{} are not supported, only EPSG:{}",
                self.tile_srid, TILE_SRID
            )));
        }
        let bbox = tile.bbox();
        let mut options = self.options.clone();
        options.simplify = simplification_for(&self.simplifications, tile.z);
        options.bbox = Some(bbox);
        tracing::debug!(z = tile.z, x = tile.x, y = tile.y, ?bbox, simplify = ?options.simplify, "serving tile");

        let trim = self.trim_to_boundary;
        let filter = move |g: &mut SpatialGeometry, projector: &dyn Projector| -> Result<bool> {
            projection::transform(g, WGS84, projector)?;
            if !engine::intersects_bbox(&g.geometry, &bbox) {
                return Ok(false);
            }
            let is_point = matches!(
                g.geometry_type(),
                GeometryType::Point | GeometryType::MultiPoint
            );
            if trim && !is_point {
                match engine::clip_to_bbox(&g.geometry, &bbox) {
                    Some(clipped) => g.geometry = clipped,
                    None => return Ok(false),
                }
            }
            Ok(true)
        };
        Serializer::with_projector(options, projector).collection_filtered(records, Some(&filter))
    }

    /// Serialize one tile as GeoJSON text.
    pub fn serialize<'a, I>(&self, tile: &TileCoord, records: I) -> Result<String>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        let collection = self.collection(tile, records)?;
        Ok(crate::format::to_string_with_precision(
            &collection,
            self.options.precision,
        )?)
    }

    /// Answer a tile request given its raw `z`, `x`, `y` arguments.
    pub fn render<'a, I>(&self, args: &[&str], records: I) -> Result<GeoJsonResponse>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        let tile = TileCoord::from_args(args)?;
        Ok(GeoJsonResponse::new(self.serialize(&tile, records)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn world_tile_corner() {
        let (lon, lat) = nw_corner(0, 0, 0);
        assert!(close(lon, -180.0));
        assert!(close(lat, 85.0511287798066));
    }

    #[test]
    fn center_of_the_map() {
        let (lon, lat) = nw_corner(8, 8, 4);
        assert!(close(lon, 0.0));
        assert!(close(lat, 0.0));
    }

    #[test]
    fn nw_longitude_formula() {
        for z in 0..6u32 {
            for x in 0..(1u32 << z) {
                let lon = tile_bbox(z, x, 0).unwrap()[0];
                assert!(close(lon, f64::from(x) / 2f64.powi(z as i32) * 360.0 - 180.0));
            }
        }
    }

    #[test]
    fn bbox_of_tile() {
        let bbox = tile_bbox(8, 128, 127).unwrap();
        assert!(close(bbox[0], 0.0));
        assert!(close(bbox[1], 0.0));
        assert!(close(bbox[2], 1.40625));
        assert!(close(bbox[3], 1.4061088354351565));
    }

    #[test]
    fn edge_tiles_do_not_overflow() {
        let last = (1u32 << 31) - 1;
        let bbox = tile_bbox(31, last, last).unwrap();
        assert!(close(bbox[2], 180.0));
        assert!(bbox[1] < bbox[3]);
        for (z, x, y) in [(31, u32::MAX, 0), (0, 0, u32::MAX), (32, 0, 0), (u32::MAX, 0, 0)] {
            assert!(matches!(tile_bbox(z, x, y), Err(Error::InvalidTileRequest(_))));
        }
    }

    #[test]
    fn simplification_lookup() {
        let mut s = BTreeMap::new();
        s.insert(6, 100.0);
        assert_eq!(simplification_for(&s, 6), Some(100.0));
        assert_eq!(simplification_for(&s, 2), Some(100.0));
        assert_eq!(simplification_for(&s, 7), None);
        assert_eq!(simplification_for(&BTreeMap::new(), 4), None);

        let mut s = BTreeMap::new();
        s.insert(3, 100.0);
        s.insert(6, 200.0);
        assert_eq!(simplification_for(&s, 4), Some(200.0));
        assert_eq!(simplification_for(&s, 3), Some(100.0));
    }

    #[test]
    fn tile_arguments() {
        assert_eq!(TileCoord::from_args(&["4", "8", "7"]).unwrap(), TileCoord { z: 4, x: 8, y: 7 });
        assert_eq!("4/8/7".parse::<TileCoord>().unwrap(), TileCoord { z: 4, x: 8, y: 7 });
        for bad in [&["4", "x", "7"][..], &["4", "8"][..], &["-1", "0", "0"][..], &["2", "4", "0"][..]] {
            assert!(matches!(TileCoord::from_args(bad), Err(Error::InvalidTileRequest(_))));
        }
    }

    #[test]
    fn only_mercator_tiles() {
        let layer = TiledLayer {
            tile_srid: 2154,
            ..Default::default()
        };
        let tile = TileCoord::new(0, 0, 0).unwrap();
        let err = layer.collection(&tile, Vec::<Input>::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn layer_from_json() {
        let layer = TiledLayer::from_json(
            r#"{"simplifications": {"6": 100}, "trim_to_boundary": false, "options": {"srid": 3857}}"#,
        )
        .unwrap();
        assert_eq!(layer.simplifications.get(&6), Some(&100.0));
        assert!(!layer.trim_to_boundary);
        assert_eq!(layer.tile_srid, TILE_SRID);
        assert_eq!(layer.options.srid, 3857);
    }
}
