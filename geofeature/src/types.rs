use crate::result::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// A single coordinate. `z` is present for 3D geometries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y, z: None }
    }

    pub fn new_z(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z: Some(z) }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Position::new(x, y)
    }
}

impl From<(f64, f64, f64)> for Position {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Position::new_z(x, y, z)
    }
}

/// The seven GeoJSON geometry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    pub const ALL: [GeometryType; 7] = [
        GeometryType::Point,
        GeometryType::LineString,
        GeometryType::Polygon,
        GeometryType::MultiPoint,
        GeometryType::MultiLineString,
        GeometryType::MultiPolygon,
        GeometryType::GeometryCollection,
    ];

    /// The name used by GeoJSON for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
        }
    }

    /// Case-insensitive lookup, accepts both GeoJSON and WKT spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        GeometryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    pub(crate) fn wkb_code(&self) -> u32 {
        match self {
            GeometryType::Point => 1,
            GeometryType::LineString => 2,
            GeometryType::Polygon => 3,
            GeometryType::MultiPoint => 4,
            GeometryType::MultiLineString => 5,
            GeometryType::MultiPolygon => 6,
            GeometryType::GeometryCollection => 7,
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Ring = Vec<Position>;

/// A geometry with optional Z values on every position.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// `None` is the empty point
    Point(Option<Position>),
    LineString(Vec<Position>),
    Polygon(Vec<Ring>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Ring>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// True when any position carries a Z value
    pub fn has_z(&self) -> bool {
        let mut z = false;
        self.for_each_position(&mut |p| z |= p.z.is_some());
        z
    }

    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.for_each_position(&mut |_| empty = false);
        empty
    }

    pub fn for_each_position(&self, f: &mut impl FnMut(&Position)) {
        match self {
            Geometry::Point(p) => p.iter().for_each(|p| f(p)),
            Geometry::LineString(ps) | Geometry::MultiPoint(ps) => ps.iter().for_each(|p| f(p)),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().for_each(|p| f(p))
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(|p| f(p)),
            Geometry::GeometryCollection(geoms) => {
                for g in geoms {
                    g.for_each_position(f)
                }
            }
        }
    }

    pub fn try_for_each_position_mut(
        &mut self,
        f: &mut impl FnMut(&mut Position) -> Result<()>,
    ) -> Result<()> {
        match self {
            Geometry::Point(p) => p.iter_mut().try_for_each(|p| f(p)),
            Geometry::LineString(ps) | Geometry::MultiPoint(ps) => {
                ps.iter_mut().try_for_each(|p| f(p))
            }
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter_mut().flatten().try_for_each(|p| f(p))
            }
            Geometry::MultiPolygon(polys) => polys
                .iter_mut()
                .flatten()
                .flatten()
                .try_for_each(|p| f(p)),
            Geometry::GeometryCollection(geoms) => {
                geoms.iter_mut().try_for_each(|g| g.try_for_each_position_mut(f))
            }
        }
    }

    /// Drop the Z value of every position
    pub fn force_2d(&mut self) {
        let _ = self.try_for_each_position_mut(&mut |p| {
            p.z = None;
            Ok(())
        });
    }

    /// Encode as a GeoJSON geometry object
    pub fn to_geojson(&self) -> Value {
        Value::Object(geojson::JsonObject::from(&geojson::Geometry::new(
            geojson::Value::from(self),
        )))
    }

    /// Decode a GeoJSON geometry object
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let geometry = geojson::Geometry::from_json_value(value.clone())
            .map_err(|e| Error::decode(e.to_string()))?;
        Geometry::try_from(&geometry.value)
    }
}

fn geojson_position(p: &Position) -> geojson::Position {
    match p.z {
        Some(z) => vec![p.x, p.y, z],
        None => vec![p.x, p.y],
    }
}

fn geojson_line(ps: &[Position]) -> Vec<geojson::Position> {
    ps.iter().map(geojson_position).collect()
}

fn geojson_rings(rings: &[Ring]) -> Vec<Vec<geojson::Position>> {
    rings.iter().map(|r| geojson_line(r)).collect()
}

impl From<&Geometry> for geojson::Value {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(Some(p)) => geojson::Value::Point(geojson_position(p)),
            Geometry::Point(None) => geojson::Value::Point(Vec::new()),
            Geometry::LineString(ps) => geojson::Value::LineString(geojson_line(ps)),
            Geometry::Polygon(rings) => geojson::Value::Polygon(geojson_rings(rings)),
            Geometry::MultiPoint(ps) => geojson::Value::MultiPoint(geojson_line(ps)),
            Geometry::MultiLineString(lines) => {
                geojson::Value::MultiLineString(geojson_rings(lines))
            }
            Geometry::MultiPolygon(polys) => {
                geojson::Value::MultiPolygon(polys.iter().map(|p| geojson_rings(p)).collect())
            }
            Geometry::GeometryCollection(geoms) => geojson::Value::GeometryCollection(
                geoms
                    .iter()
                    .map(|g| geojson::Geometry::new(g.into()))
                    .collect(),
            ),
        }
    }
}

fn position(p: &[f64]) -> Result<Position> {
    match p {
        [x, y] => Ok(Position::new(*x, *y)),
        // measures beyond Z are dropped
        [x, y, z, ..] => Ok(Position::new_z(*x, *y, *z)),
        _ => Err(Error::decode("a position needs at least two numbers")),
    }
}

fn positions(ps: &[geojson::Position]) -> Result<Vec<Position>> {
    ps.iter().map(|p| position(p)).collect()
}

fn rings(rs: &[Vec<geojson::Position>]) -> Result<Vec<Ring>> {
    rs.iter().map(|r| positions(r)).collect()
}

impl TryFrom<&geojson::Value> for Geometry {
    type Error = Error;

    fn try_from(value: &geojson::Value) -> Result<Self> {
        Ok(match value {
            geojson::Value::Point(p) if p.is_empty() => Geometry::Point(None),
            geojson::Value::Point(p) => Geometry::Point(Some(position(p)?)),
            geojson::Value::LineString(ps) => Geometry::LineString(positions(ps)?),
            geojson::Value::MultiPoint(ps) => Geometry::MultiPoint(positions(ps)?),
            geojson::Value::Polygon(rs) => Geometry::Polygon(rings(rs)?),
            geojson::Value::MultiLineString(rs) => Geometry::MultiLineString(rings(rs)?),
            geojson::Value::MultiPolygon(polys) => Geometry::MultiPolygon(
                polys.iter().map(|p| rings(p)).collect::<Result<_>>()?,
            ),
            geojson::Value::GeometryCollection(geoms) => Geometry::GeometryCollection(
                geoms
                    .iter()
                    .map(|g| Geometry::try_from(&g.value))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

/// A geometry tagged with the spatial reference it is expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGeometry {
    pub srid: Option<i32>,
    pub geometry: Geometry,
}

impl SpatialGeometry {
    pub fn new(geometry: Geometry, srid: i32) -> Self {
        SpatialGeometry {
            srid: Some(srid),
            geometry,
        }
    }

    pub fn without_srid(geometry: Geometry) -> Self {
        SpatialGeometry {
            srid: None,
            geometry,
        }
    }

    pub fn point(x: f64, y: f64, srid: i32) -> Self {
        SpatialGeometry::new(Geometry::Point(Some(Position::new(x, y))), srid)
    }

    pub fn line_string(coords: &[(f64, f64)], srid: i32) -> Self {
        SpatialGeometry::new(
            Geometry::LineString(coords.iter().copied().map(Position::from).collect()),
            srid,
        )
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry.geometry_type()
    }
}

/// A GeoJSON geometry stored as-is, the way a JSON column would hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonField(pub Value);

impl GeoJsonField {
    pub fn new(value: Value) -> Self {
        GeoJsonField(value)
    }

    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::from_geojson(&self.0)
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }
}

impl From<Value> for GeoJsonField {
    fn from(value: Value) -> Self {
        GeoJsonField(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn geojson_point_keeps_z() {
        let g = Geometry::from_geojson(&json!({"type": "Point", "coordinates": [1, 2, 3]})).unwrap();
        assert_eq!(g, Geometry::Point(Some(Position::new_z(1.0, 2.0, 3.0))));
        assert!(g.has_z());
        assert_eq!(g.to_geojson(), json!({"type": "Point", "coordinates": [1.0, 2.0, 3.0]}));
    }

    #[test]
    fn force_2d_drops_z_in_collections() {
        let mut g = Geometry::GeometryCollection(vec![
            Geometry::LineString(vec![Position::new_z(3.0, 4.0, 5.0), Position::new_z(6.0, 7.0, 8.0)]),
            Geometry::Point(Some(Position::new_z(1.0, 2.0, 3.0))),
        ]);
        g.force_2d();
        assert_eq!(
            g.to_geojson(),
            json!({"type": "GeometryCollection", "geometries": [
                {"type": "LineString", "coordinates": [[3.0, 4.0], [6.0, 7.0]]},
                {"type": "Point", "coordinates": [1.0, 2.0]},
            ]})
        );
    }

    #[test]
    fn unknown_geojson_type_is_rejected() {
        let err = Geometry::from_geojson(&json!({"type": "FeatureCollection", "features": []}));
        assert!(matches!(err, Err(Error::GeomDecode(_))));
    }

    #[test]
    fn malformed_positions_are_rejected() {
        for bad in [
            json!({"type": "Point", "coordinates": [1]}),
            json!({"type": "LineString", "coordinates": [[0, 0], ["a", 1]]}),
            json!({"type": "Polygon"}),
            json!([0, 0]),
        ] {
            assert!(matches!(Geometry::from_geojson(&bad), Err(Error::GeomDecode(_))), "{}", bad);
        }
    }

    #[test]
    fn empty_point_and_nested_collection() {
        let value = json!({"type": "GeometryCollection", "geometries": [
            {"type": "Point", "coordinates": []},
            {"type": "GeometryCollection", "geometries": [
                {"type": "MultiPoint", "coordinates": [[1.0, 2.0, 3.0]]},
            ]},
        ]});
        let g = Geometry::from_geojson(&value).unwrap();
        assert_eq!(
            g,
            Geometry::GeometryCollection(vec![
                Geometry::Point(None),
                Geometry::GeometryCollection(vec![Geometry::MultiPoint(vec![Position::new_z(
                    1.0, 2.0, 3.0
                )])]),
            ])
        );
        assert_eq!(g.to_geojson(), value);
    }

    #[test]
    fn multipolygon_from_geojson() {
        let g = Geometry::from_geojson(&json!({
            "type": "MultiPolygon",
            "coordinates": [[[[0, 0], [1, 1], [0, 2], [0, 0]]]]
        }))
        .unwrap();
        assert_eq!(g.geometry_type(), GeometryType::MultiPolygon);
        let mut count = 0;
        g.for_each_position(&mut |_| count += 1);
        assert_eq!(count, 4);
    }
}
