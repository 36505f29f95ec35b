//! Reprojection between spatial reference systems.
//!
//! Reprojection is an injected capability: the encoder holds a
//! `&dyn Projector` and asks it to move positions between SRIDs. The
//! built-in [`SphericalMercator`] covers WGS 84 and Web Mercator; callers
//! with a full projection library plug in their own implementation.
use crate::result::{Error, Result};
use crate::types::{Position, SpatialGeometry};
use std::f64::consts::PI;

/// WGS 84 geodetic
pub const WGS84: i32 = 4326;
/// WGS 84 / Pseudo-Mercator
pub const WEB_MERCATOR: i32 = 3857;
/// Legacy code for Web Mercator still found in older data
pub const GOOGLE_MERCATOR: i32 = 900913;

const EARTH_RADIUS: f64 = 6_378_137.0;

pub trait Projector {
    /// Move one position from `from` to `to`. Z values are left untouched.
    fn project(&self, from: i32, to: i32, position: &mut Position) -> Result<()>;

    /// Whether a transform between the two systems is available.
    fn supports(&self, from: i32, to: i32) -> bool;
}

/// Transforms between EPSG:4326 and spherical Web Mercator (EPSG:3857 / 900913).
#[derive(Debug, Default, Clone, Copy)]
pub struct SphericalMercator;

fn normalize(srid: i32) -> i32 {
    if srid == GOOGLE_MERCATOR {
        WEB_MERCATOR
    } else {
        srid
    }
}

impl SphericalMercator {
    pub fn to_mercator(lon: f64, lat: f64) -> (f64, f64) {
        let x = lon.to_radians() * EARTH_RADIUS;
        let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
        (x, y)
    }

    pub fn to_lon_lat(x: f64, y: f64) -> (f64, f64) {
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

impl Projector for SphericalMercator {
    fn project(&self, from: i32, to: i32, position: &mut Position) -> Result<()> {
        let (x, y) = match (normalize(from), normalize(to)) {
            (a, b) if a == b => return Ok(()),
            (WGS84, WEB_MERCATOR) => Self::to_mercator(position.x, position.y),
            (WEB_MERCATOR, WGS84) => Self::to_lon_lat(position.x, position.y),
            _ => return Err(unsupported(from, to)),
        };
        position.x = x;
        position.y = y;
        Ok(())
    }

    fn supports(&self, from: i32, to: i32) -> bool {
        matches!(
            (normalize(from), normalize(to)),
            (WGS84, WEB_MERCATOR) | (WEB_MERCATOR, WGS84)
        ) || normalize(from) == normalize(to)
    }
}

fn unsupported(from: i32, to: i32) -> Error {
    Error::Configuration(format!(
        "no projection available from EPSG:{} to EPSG:{}",
        from, to
    ))
}

/// Reproject a geometry in place when its SRID differs from `target`.
///
/// Geometries without an SRID are assumed to already be in `target`.
pub fn transform(
    geometry: &mut SpatialGeometry,
    target: i32,
    projector: &dyn Projector,
) -> Result<()> {
    let source = match geometry.srid {
        Some(srid) if srid != target => srid,
        _ => {
            geometry.srid = Some(target);
            return Ok(());
        }
    };
    if !projector.supports(source, target) {
        return Err(unsupported(source, target));
    }
    geometry
        .geometry
        .try_for_each_position_mut(&mut |p| projector.project(source, target, p))?;
    geometry.srid = Some(target);
    Ok(())
}
