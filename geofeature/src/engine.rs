//! Geometry operations delegated to the `geo` crate.
//!
//! `geo` works on 2D coordinates. Simplification keeps Z values because it
//! only selects which of the original positions survive; clipping produces
//! new vertices and therefore returns 2D geometries.
use crate::types::{Geometry, Position, Ring};
use geo::{BooleanOps, BoundingRect, Contains, Intersects, SimplifyIdx};
use geo_types::{coord, Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon, Rect};

/// `[minx, miny, maxx, maxy]`
pub type BBox = [f64; 4];

fn to_coord(p: &Position) -> Coord<f64> {
    coord! { x: p.x, y: p.y }
}

fn to_line(ps: &[Position]) -> LineString<f64> {
    LineString::new(ps.iter().map(to_coord).collect())
}

fn to_polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        to_line(exterior),
        interiors.iter().map(|r| to_line(r)).collect(),
    ))
}

/// Convert to a `geo_types` geometry, dropping Z. Empty geometries have no equivalent.
pub fn to_geo(geometry: &Geometry) -> Option<geo_types::Geometry<f64>> {
    if geometry.is_empty() {
        return None;
    }
    Some(match geometry {
        Geometry::Point(p) => geo_types::Geometry::Point(Point::from(to_coord(p.as_ref()?))),
        Geometry::LineString(ps) => geo_types::Geometry::LineString(to_line(ps)),
        Geometry::Polygon(rings) => geo_types::Geometry::Polygon(to_polygon(rings)?),
        Geometry::MultiPoint(ps) => geo_types::Geometry::MultiPoint(
            ps.iter().map(|p| Point::from(to_coord(p))).collect(),
        ),
        Geometry::MultiLineString(lines) => geo_types::Geometry::MultiLineString(
            MultiLineString::new(lines.iter().map(|l| to_line(l)).collect()),
        ),
        Geometry::MultiPolygon(polys) => geo_types::Geometry::MultiPolygon(MultiPolygon::new(
            polys.iter().filter_map(|p| to_polygon(p)).collect(),
        )),
        Geometry::GeometryCollection(geoms) => geo_types::Geometry::GeometryCollection(
            geoms.iter().filter_map(to_geo).collect(),
        ),
    })
}

fn from_line(ls: &LineString<f64>) -> Vec<Position> {
    ls.coords().map(|c| Position::new(c.x, c.y)).collect()
}

fn from_polygon(poly: &Polygon<f64>) -> Vec<Ring> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .map(from_line)
        .collect()
}

/// Convert back from `geo_types`. Lines, rectangles and triangles become their GeoJSON equivalents.
pub fn from_geo(geometry: &geo_types::Geometry<f64>) -> Geometry {
    match geometry {
        geo_types::Geometry::Point(p) => Geometry::Point(Some(Position::new(p.x(), p.y()))),
        geo_types::Geometry::Line(l) => Geometry::LineString(vec![
            Position::new(l.start.x, l.start.y),
            Position::new(l.end.x, l.end.y),
        ]),
        geo_types::Geometry::LineString(ls) => Geometry::LineString(from_line(ls)),
        geo_types::Geometry::Polygon(p) => Geometry::Polygon(from_polygon(p)),
        geo_types::Geometry::MultiPoint(mp) => Geometry::MultiPoint(
            mp.iter().map(|p| Position::new(p.x(), p.y())).collect(),
        ),
        geo_types::Geometry::MultiLineString(mls) => {
            Geometry::MultiLineString(mls.iter().map(from_line).collect())
        }
        geo_types::Geometry::MultiPolygon(mp) => {
            Geometry::MultiPolygon(mp.iter().map(from_polygon).collect())
        }
        geo_types::Geometry::GeometryCollection(gc) => {
            Geometry::GeometryCollection(gc.iter().map(from_geo).collect())
        }
        geo_types::Geometry::Rect(r) => Geometry::Polygon(from_polygon(&r.to_polygon())),
        geo_types::Geometry::Triangle(t) => Geometry::Polygon(from_polygon(&t.to_polygon())),
    }
}

fn simplify_line(ps: &mut Vec<Position>, tolerance: f64, min_len: usize) {
    let keep = to_line(ps).simplify_idx(&tolerance);
    if keep.len() < min_len || keep.len() == ps.len() {
        return;
    }
    let kept: Vec<Position> = keep.into_iter().map(|i| ps[i]).collect();
    *ps = kept;
}

// every hole inside the shell, and no two holes overlapping
fn rings_nest(rings: &[Ring]) -> bool {
    let Some((exterior, interiors)) = rings.split_first() else {
        return true;
    };
    let shell = Polygon::new(to_line(exterior), vec![]);
    let holes: Vec<Polygon<f64>> = interiors
        .iter()
        .map(|r| Polygon::new(to_line(r), vec![]))
        .collect();
    holes.iter().all(|h| shell.contains(h.exterior()))
        && holes
            .iter()
            .enumerate()
            .all(|(i, h)| holes[i + 1..].iter().all(|other| !h.intersects(other)))
}

fn simplify_polygon(rings: &mut Vec<Ring>, tolerance: f64) {
    let original = rings.clone();
    for ring in rings.iter_mut() {
        simplify_line(ring, tolerance, 4)
    }
    if rings_nest(rings) {
        return;
    }
    rings[0] = original[0].clone();
    if !rings_nest(rings) {
        *rings = original;
    }
}

/// Douglas-Peucker simplification applied per line and per ring.
///
/// Rings are never reduced below four positions. A polygon whose simplified
/// rings would no longer nest keeps its original shell, and if that is not
/// enough, all of its original rings.
pub fn simplify(geometry: &mut Geometry, tolerance: f64) {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => {}
        Geometry::LineString(ps) => simplify_line(ps, tolerance, 2),
        Geometry::MultiLineString(lines) => {
            for ps in lines {
                simplify_line(ps, tolerance, 2)
            }
        }
        Geometry::Polygon(rings) => simplify_polygon(rings, tolerance),
        Geometry::MultiPolygon(polys) => {
            for rings in polys {
                simplify_polygon(rings, tolerance)
            }
        }
        Geometry::GeometryCollection(geoms) => {
            for g in geoms {
                simplify(g, tolerance)
            }
        }
    }
}

/// The 2D extent of a geometry, `None` when it is empty.
pub fn bounding_box(geometry: &Geometry) -> Option<BBox> {
    let rect = to_geo(geometry)?.bounding_rect()?;
    Some([rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

fn bbox_polygon(bbox: &BBox) -> Polygon<f64> {
    Rect::new(coord! { x: bbox[0], y: bbox[1] }, coord! { x: bbox[2], y: bbox[3] }).to_polygon()
}

/// Whether the geometry touches or overlaps the box.
pub fn intersects_bbox(geometry: &Geometry, bbox: &BBox) -> bool {
    match to_geo(geometry) {
        Some(g) => g.intersects(&bbox_polygon(bbox)),
        None => false,
    }
}

/// Intersect a geometry with a box. Points are returned unchanged; `None`
/// means nothing of the geometry lies inside the box.
pub fn clip_to_bbox(geometry: &Geometry, bbox: &BBox) -> Option<Geometry> {
    let window = bbox_polygon(bbox);
    let clipped = match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => return Some(geometry.clone()),
        Geometry::LineString(ps) => {
            let mls = window.clip(&MultiLineString::new(vec![to_line(ps)]), false);
            single_line(mls)
        }
        Geometry::MultiLineString(lines) => {
            let mls = window.clip(
                &MultiLineString::new(lines.iter().map(|l| to_line(l)).collect()),
                false,
            );
            Geometry::MultiLineString(mls.iter().map(from_line).collect())
        }
        Geometry::Polygon(rings) => {
            let mp = to_polygon(rings)?.intersection(&window);
            single_polygon(mp)
        }
        Geometry::MultiPolygon(polys) => {
            let mp = MultiPolygon::new(polys.iter().filter_map(|p| to_polygon(p)).collect())
                .intersection(&MultiPolygon::new(vec![window]));
            Geometry::MultiPolygon(mp.iter().map(from_polygon).collect())
        }
        Geometry::GeometryCollection(geoms) => Geometry::GeometryCollection(
            geoms
                .iter()
                .filter(|g| intersects_bbox(g, bbox))
                .filter_map(|g| clip_to_bbox(g, bbox))
                .collect(),
        ),
    };
    if clipped.is_empty() {
        None
    } else {
        Some(clipped)
    }
}

fn single_line(mls: MultiLineString<f64>) -> Geometry {
    match mls.0.as_slice() {
        [only] => Geometry::LineString(from_line(only)),
        _ => Geometry::MultiLineString(mls.iter().map(from_line).collect()),
    }
}

fn single_polygon(mp: MultiPolygon<f64>) -> Geometry {
    match mp.0.as_slice() {
        [only] => Geometry::Polygon(from_polygon(only)),
        _ => Geometry::MultiPolygon(mp.iter().map(from_polygon).collect()),
    }
}
