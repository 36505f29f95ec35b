//! Rendering features inline, e.g. into a page that hands them to a map widget.
use crate::format::to_string_with_precision;
use crate::input::Input;
use crate::options::{PropertySelection, SerializerOptions};
use crate::projection::{self, SphericalMercator};
use crate::result::{Error, Result};
use crate::serializer::Serializer;
use crate::types::SpatialGeometry;
use crate::DEFAULT_SRID;
use serde_json::json;

/// What the display filter is asked to render.
#[derive(Debug, Clone, Copy)]
pub enum DisplaySource<'a> {
    Null,
    Geometry(&'a SpatialGeometry),
    Record(Input<'a>),
    Records(&'a [Input<'a>]),
}

struct FilterArgs {
    properties: Vec<String>,
    geometry_field: Option<String>,
    srid: i32,
}

// "<properties>:<geometry_field>:<srid>", every part optional
fn parse_args(arg: &str) -> Result<FilterArgs> {
    let mut parts = arg.splitn(3, ':');
    let properties = parts
        .next()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();
    let geometry_field = match parts.next().map(str::trim) {
        Some(f) if !f.is_empty() => Some(f.to_owned()),
        _ => None,
    };
    let srid = match parts.next().map(str::trim) {
        Some(s) if !s.is_empty() => s
            .parse()
            .map_err(|_| Error::Configuration(format!("{:?} is not an SRID", s)))?,
        _ => DEFAULT_SRID,
    };
    Ok(FilterArgs {
        properties,
        geometry_field,
        srid,
    })
}

/// Render a geometry, a record or a list of records as GeoJSON text.
///
/// A bare geometry becomes a single `Feature` without properties; records
/// become a `FeatureCollection` holding only the listed properties.
pub fn geojson_feature(source: DisplaySource<'_>, arg: &str) -> Result<String> {
    let args = parse_args(arg)?;
    let records = match source {
        DisplaySource::Null => return Ok("null".to_owned()),
        DisplaySource::Geometry(g) => {
            let mut g = g.clone();
            projection::transform(&mut g, args.srid, &SphericalMercator)?;
            let feature = json!({
                "type": "Feature",
                "properties": {},
                "geometry": g.geometry.to_geojson(),
            });
            return Ok(to_string_with_precision(&feature, None)?);
        }
        DisplaySource::Record(r) => vec![r],
        DisplaySource::Records(rs) => rs.to_vec(),
    };
    let options = SerializerOptions {
        properties: PropertySelection::Only(args.properties),
        geometry_field: args.geometry_field,
        srid: args.srid,
        with_modelname: false,
        ..Default::default()
    };
    Serializer::new(options).serialize(records)
}
