//! Serialize geographic records into GeoJSON feature collections and back.
//!
//! Records come from structs deriving [`GeoModel`], JSON mappings, or layer
//! rows read from a [`GeoPackage`]. The [`Serializer`] turns them into a
//! `FeatureCollection`, optionally simplifying, reprojecting and clipping
//! geometries on the way; the [`Deserializer`] turns GeoJSON back into
//! field values for a registered model type.
extern crate self as geofeature;

pub mod deserializer;
pub mod engine;
pub mod format;
pub mod geopackage;
pub mod gpkg_wkb;
pub mod input;
pub mod model;
pub mod options;
pub mod projection;
mod result;
pub mod serializer;
pub mod srs;
pub mod template;
pub mod tiles;
pub mod types;
pub mod validation;
pub mod view;
pub mod wkt;

#[doc(inline)]
pub use geofeature_derive::GeoModel;

#[doc(hidden)]
pub use serde_json;

pub use deserializer::{DeserializedObject, Deserializer};
pub use geopackage::{GeoPackage, LayerRow};
pub use input::Input;
pub use model::{Attribute, GeoModel, ModelMeta, ModelType, Registry, Related, RelatedSet, ToAttribute};
pub use options::{PrimaryKey, PropertySelection, SerializerOptions};
pub use projection::{Projector, SphericalMercator};
pub use result::{Error, Result};
pub use serializer::Serializer;
pub use tiles::{TileCoord, TiledLayer};
pub use types::{GeoJsonField, Geometry, GeometryType, Position, SpatialGeometry};
pub use view::{GeoJsonLayer, GeoJsonResponse};

/// The SRID features are written in unless another one is requested
pub const DEFAULT_SRID: i32 = 4326;

/// Map tiles are always addressed in spherical Mercator
pub const TILE_SRID: i32 = 3857;
