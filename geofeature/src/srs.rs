use serde::Deserialize;
use serde_json::{json, Value};

/// Represents a spatial reference system as it appears in the GeoPackage [specification](https://www.geopackage.org/spec130/#gpkg_spatial_ref_sys_cols)
pub struct SpatialRefSys<'a> {
    pub name: &'a str,
    pub id: i64,
    pub organization: &'a str,
    pub organization_coordsys_id: i64,
    pub definition: &'a str,
    pub description: &'a str,
}

pub mod defaults {
    use super::SpatialRefSys;
    pub const WGS84: SpatialRefSys = SpatialRefSys {
        name: "WGS 84 geodetic",
        id: 4326,
        organization: "EPSG",
        organization_coordsys_id: 4326,
        definition: "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]",
        description: "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
    };
    pub const WEB_MERCATOR: SpatialRefSys = SpatialRefSys {
        name: "WGS 84 / Pseudo-Mercator",
        id: 3857,
        organization: "EPSG",
        organization_coordsys_id: 3857,
        definition: "PROJCS[\"WGS 84 / Pseudo-Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]],PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],AXIS[\"X\",EAST],AXIS[\"Y\",NORTH],AUTHORITY[\"EPSG\",\"3857\"]]",
        description: "spherical Mercator used by web map tiles",
    };
    pub const GEOGRAPHIC: SpatialRefSys = SpatialRefSys {
        name: "undefined geographic SRS",
        id: 0,
        organization: "NONE",
        organization_coordsys_id: 0,
        definition: "undefined",
        description: "undefined geographic coordinate reference system",
    };
    pub const CARTESIAN: SpatialRefSys = SpatialRefSys {
        name: "undefined cartesian SRS",
        id: -1,
        organization: "NONE",
        organization_coordsys_id: -1,
        definition: "undefined",
        description: "undefined cartesian coordinate reference system",
    };
}

/// How the `crs` member of a feature collection names its reference system.
///
/// Any unrecognised value read from configuration falls back to `Link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrsType {
    Name,
    #[default]
    #[serde(other)]
    Link,
}

impl CrsType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "name" => CrsType::Name,
            _ => CrsType::Link,
        }
    }
}

/// Build the `crs` member for an EPSG code.
pub fn crs_descriptor(srid: i32, crs_type: CrsType) -> Value {
    match crs_type {
        CrsType::Name => json!({
            "type": "name",
            "properties": {"name": format!("EPSG:{}", srid)},
        }),
        CrsType::Link => json!({
            "type": "link",
            "properties": {
                "href": format!("http://spatialreference.org/ref/epsg/{}/", srid),
                "type": "proj4",
            },
        }),
    }
}
