//! Reading and writing (extended) well-known text through the `wkt` crate.
//!
//! The extended form prefixes the geometry with its spatial reference,
//! `SRID=4326;POINT (1 2)`. M values are read and discarded.
use crate::result::{Error, Result};
use crate::types::{Geometry, Position, Ring, SpatialGeometry};
use std::str::FromStr;
use wkt::types::{
    Coord, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon,
};
use wkt::Wkt;

type WktGeometry = wkt::Geometry<f64>;

/// Parse WKT or EWKT. Plain WKT yields a geometry without SRID.
pub fn parse_ewkt(input: &str) -> Result<SpatialGeometry> {
    let input = input.trim();
    let (srid, body) = match input.split_once(';') {
        Some((prefix, body)) if prefix.trim().to_uppercase().starts_with("SRID=") => {
            let srid = prefix.trim()[5..]
                .trim()
                .parse::<i32>()
                .map_err(|_| Error::decode(format!("invalid SRID in {}", prefix)))?;
            (Some(srid), body)
        }
        _ => (None, input),
    };
    let parsed = Wkt::<f64>::from_str(body.trim())
        .map_err(|e| Error::decode(format!("invalid WKT {:?}: {}", body, e)))?;
    Ok(SpatialGeometry {
        srid,
        geometry: from_wkt(&parsed.item),
    })
}

/// Write a geometry as WKT, tagged `Z` when it has Z values.
pub fn to_wkt(geometry: &Geometry) -> String {
    into_wkt(geometry).to_string()
}

/// Write as EWKT when the geometry has an SRID, plain WKT otherwise.
pub fn to_ewkt(geometry: &SpatialGeometry) -> String {
    match geometry.srid {
        Some(srid) => format!("SRID={};{}", srid, to_wkt(&geometry.geometry)),
        None => to_wkt(&geometry.geometry),
    }
}

fn position(c: &Coord<f64>) -> Position {
    Position { x: c.x, y: c.y, z: c.z }
}

fn line(ls: &LineString<f64>) -> Vec<Position> {
    ls.0.iter().map(position).collect()
}

fn rings(p: &Polygon<f64>) -> Vec<Ring> {
    p.0.iter().map(line).collect()
}

fn from_wkt(geometry: &WktGeometry) -> Geometry {
    match geometry {
        WktGeometry::Point(p) => Geometry::Point(p.0.as_ref().map(position)),
        WktGeometry::LineString(ls) => Geometry::LineString(line(ls)),
        WktGeometry::Polygon(p) => Geometry::Polygon(rings(p)),
        // empty members have no position to keep
        WktGeometry::MultiPoint(mp) => {
            Geometry::MultiPoint(mp.0.iter().filter_map(|p| p.0.as_ref()).map(position).collect())
        }
        WktGeometry::MultiLineString(mls) => Geometry::MultiLineString(mls.0.iter().map(line).collect()),
        WktGeometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.0.iter().map(rings).collect()),
        WktGeometry::GeometryCollection(gc) => {
            Geometry::GeometryCollection(gc.0.iter().map(from_wkt).collect())
        }
    }
}

fn coord(p: &Position) -> Coord<f64> {
    Coord {
        x: p.x,
        y: p.y,
        z: p.z,
        m: None,
    }
}

fn wkt_line(ps: &[Position]) -> LineString<f64> {
    LineString(ps.iter().map(coord).collect())
}

fn wkt_polygon(rings: &[Ring]) -> Polygon<f64> {
    Polygon(rings.iter().map(|r| wkt_line(r)).collect())
}

fn into_wkt(geometry: &Geometry) -> WktGeometry {
    match geometry {
        Geometry::Point(p) => WktGeometry::Point(Point(p.as_ref().map(coord))),
        Geometry::LineString(ps) => WktGeometry::LineString(wkt_line(ps)),
        Geometry::Polygon(rings) => WktGeometry::Polygon(wkt_polygon(rings)),
        Geometry::MultiPoint(ps) => {
            WktGeometry::MultiPoint(MultiPoint(ps.iter().map(|p| Point(Some(coord(p)))).collect()))
        }
        Geometry::MultiLineString(lines) => {
            WktGeometry::MultiLineString(MultiLineString(lines.iter().map(|l| wkt_line(l)).collect()))
        }
        Geometry::MultiPolygon(polys) => {
            WktGeometry::MultiPolygon(MultiPolygon(polys.iter().map(|p| wkt_polygon(p)).collect()))
        }
        Geometry::GeometryCollection(geoms) => {
            WktGeometry::GeometryCollection(GeometryCollection(geoms.iter().map(into_wkt).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeometryType;

    fn reparsed(g: &Geometry) -> Geometry {
        parse_ewkt(&to_wkt(g)).unwrap().geometry
    }

    #[test]
    fn ewkt_point() {
        let g = parse_ewkt("SRID=2154;POINT (1 1)").unwrap();
        assert_eq!(g.srid, Some(2154));
        assert_eq!(g.geometry, Geometry::Point(Some(Position::new(1.0, 1.0))));
        assert_eq!(parse_ewkt("srid=3857;POINT (1 1)").unwrap().srid, Some(3857));
        assert!(parse_ewkt("SRID=abc;POINT (1 1)").is_err());
    }

    #[test]
    fn z_values_are_kept() {
        let g = parse_ewkt("POINT Z (1 2 3)").unwrap();
        assert_eq!(g.geometry, Geometry::Point(Some(Position::new_z(1.0, 2.0, 3.0))));
        assert_eq!(reparsed(&g.geometry), g.geometry);

        let zm = parse_ewkt("POINT ZM (1 2 3 4)").unwrap();
        assert_eq!(zm.geometry, g.geometry);
    }

    #[test]
    fn polygon_and_collection() {
        let g = parse_ewkt("POLYGON ((0 0,1 1,0 2,0 0))").unwrap().geometry;
        assert_eq!(g.geometry_type(), GeometryType::Polygon);
        assert!(to_wkt(&g).starts_with("POLYGON"));
        assert_eq!(reparsed(&g), g);

        let c = parse_ewkt("GEOMETRYCOLLECTION (POINT (1 2), LINESTRING (3 4, 5 6))").unwrap();
        match &c.geometry {
            Geometry::GeometryCollection(members) => assert_eq!(members.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(reparsed(&c.geometry), c.geometry);
    }

    #[test]
    fn multipoint() {
        let g = parse_ewkt("MULTIPOINT ((1 2), (3 4))").unwrap().geometry;
        assert_eq!(
            g,
            Geometry::MultiPoint(vec![Position::new(1.0, 2.0), Position::new(3.0, 4.0)])
        );
    }

    #[test]
    fn empty_geometries() {
        assert_eq!(parse_ewkt("POINT EMPTY").unwrap().geometry, Geometry::Point(None));
        let empty = Geometry::LineString(Vec::new());
        assert!(to_wkt(&empty).ends_with("EMPTY"));
        assert_eq!(reparsed(&empty), empty);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_ewkt("not a geometry").is_err());
        assert!(parse_ewkt("LINESTRING (0 0, 1)").is_err());
    }

    #[test]
    fn ewkt_writer() {
        let g = SpatialGeometry::line_string(&[(0.0, 0.0), (1.5, 1.0)], 4326);
        let text = to_ewkt(&g);
        assert!(text.starts_with("SRID=4326;LINESTRING"), "{}", text);
        assert_eq!(parse_ewkt(&text).unwrap(), g);
        assert!(!to_ewkt(&SpatialGeometry::without_srid(g.geometry)).starts_with("SRID"));
    }
}
