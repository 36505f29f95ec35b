//! The feature-collection encoder.
use crate::engine;
use crate::geopackage::hex_string;
use crate::format::to_string_with_precision;
use crate::gpkg_wkb::{parse_binary, parse_hex_wkb};
use crate::input::Input;
use crate::model::Attribute;
use crate::options::{PrimaryKey, PropertySelection, SerializerOptions};
use crate::projection::{self, Projector, SphericalMercator, WGS84};
use crate::result::{Error, Result};
use crate::srs::crs_descriptor;
use crate::types::{Geometry, SpatialGeometry};
use crate::wkt::parse_ewkt;
use serde_json::{json, Map, Value};
use std::io::Write;

const FALLBACK_GEOMETRY_FIELDS: [&str; 2] = ["geom", "the_geom"];

/// Decides, once a record's geometry is resolved, whether the record is kept.
///
/// May rewrite the geometry in place, e.g. to clip it.
pub(crate) type GeometryFilter<'f> = dyn Fn(&mut SpatialGeometry, &dyn Projector) -> Result<bool> + 'f;

/// Turns records into GeoJSON.
///
/// ```
/// use geofeature::{Input, Serializer, SerializerOptions};
/// use serde_json::json;
///
/// let record = json!({"name": "Paris", "geom": "SRID=4326;POINT (2.35 48.85)"});
/// let options = SerializerOptions { precision: Some(2), crs: false, ..Default::default() };
/// let text = Serializer::new(options)
///     .serialize([Input::Mapping(record.as_object().unwrap())])
///     .unwrap();
/// assert!(text.contains("[2.35,48.85]"));
/// ```
pub struct Serializer<'p> {
    options: SerializerOptions,
    projector: &'p dyn Projector,
}

impl Serializer<'static> {
    /// A serializer reprojecting with the built-in spherical Mercator transforms
    pub fn new(options: SerializerOptions) -> Self {
        Serializer {
            options,
            projector: &SphericalMercator,
        }
    }
}

impl<'p> Serializer<'p> {
    pub fn with_projector(options: SerializerOptions, projector: &'p dyn Projector) -> Self {
        Serializer { options, projector }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Encode the records as a `FeatureCollection` document.
    pub fn serialize<'a, I>(&self, records: I) -> Result<String>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        let collection = self.collection(records)?;
        Ok(to_string_with_precision(&collection, self.options.precision)?)
    }

    /// Like [`serialize`](Self::serialize), writing to `writer` only once every record has been encoded.
    pub fn serialize_to_writer<'a, I, W>(&self, records: I, writer: &mut W) -> Result<()>
    where
        I: IntoIterator<Item = Input<'a>>,
        W: Write + ?Sized,
    {
        let text = self.serialize(records)?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Encode one record as a single `Feature` document.
    pub fn serialize_feature(&self, record: Input<'_>) -> Result<String> {
        let feature = self.feature(&record, None)?.unwrap_or(Value::Null);
        Ok(to_string_with_precision(&feature, self.options.precision)?)
    }

    /// Build the `FeatureCollection` value
    pub fn collection<'a, I>(&self, records: I) -> Result<Value>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        self.collection_filtered(records, None)
    }

    pub(crate) fn collection_filtered<'a, I>(
        &self,
        records: I,
        filter: Option<&GeometryFilter<'_>>,
    ) -> Result<Value>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        let mut features = Vec::new();
        for record in records {
            if let Some(feature) = self.feature(&record, filter)? {
                features.push(feature);
            }
        }
        tracing::debug!(features = features.len(), srid = self.options.srid, "serialized collection");

        let mut collection = Map::new();
        collection.insert("type".into(), "FeatureCollection".into());
        if self.options.crs {
            collection.insert(
                "crs".into(),
                crs_descriptor(self.options.srid, self.options.crs_type),
            );
        }
        if let Some(bbox) = self.options.bbox {
            collection.insert("bbox".into(), json!(bbox));
        }
        collection.insert("features".into(), Value::Array(features));
        Ok(Value::Object(collection))
    }

    /// Build one `Feature` value; `None` when the filter dropped the record.
    pub(crate) fn feature(
        &self,
        record: &Input<'_>,
        filter: Option<&GeometryFilter<'_>>,
    ) -> Result<Option<Value>> {
        let field = self.geometry_field(record)?;
        let (mut geometry, source) = match self.resolve_geometry(record, &field)? {
            Some((g, source)) => (Some(g), source),
            None => (None, None),
        };
        // GeoJSON stored on the record is written back untouched unless something rewrites it
        let source = source.filter(|_| filter.is_none() && self.keeps_geojson());

        if let Some(filter) = filter {
            let keep = match geometry.as_mut() {
                Some(g) => filter(g, self.projector)?,
                None => false,
            };
            if !keep {
                return Ok(None);
            }
        }

        let mut bbox = None;
        if let Some(g) = geometry.as_mut() {
            self.prepare_geometry(g)?;
            if self.options.bbox_auto {
                bbox = engine::bounding_box(&g.geometry);
            }
        }

        let mut feature = Map::new();
        feature.insert("type".into(), "Feature".into());
        if let Some(id) = self.feature_id(record) {
            feature.insert("id".into(), id);
        }
        feature.insert(
            "properties".into(),
            Value::Object(self.properties(record, &field)),
        );
        feature.insert(
            "geometry".into(),
            match (geometry, source) {
                (Some(_), Some(source)) => source,
                (Some(g), None) => g.geometry.to_geojson(),
                (None, _) => Value::Null,
            },
        );
        if let Some(bbox) = bbox {
            feature.insert("bbox".into(), json!(bbox));
        }
        Ok(Some(Value::Object(feature)))
    }

    fn geometry_field(&self, record: &Input<'_>) -> Result<String> {
        if let Some(field) = &self.options.geometry_field {
            return Ok(field.clone());
        }
        if let Some(field) = record.declared_geometry_field() {
            return Ok(field.to_owned());
        }
        for field in FALLBACK_GEOMETRY_FIELDS {
            if record.attribute(field).is_some() {
                tracing::warn!(field, "no geometry field configured, using fallback");
                return Ok(field.to_owned());
            }
        }
        Err(Error::Serialization("no geometry field found".into()))
    }

    /// The record's geometry as a structured value, `None` for a null geometry.
    ///
    /// A GeoJSON value is also handed back as found on the record.
    fn resolve_geometry(
        &self,
        record: &Input<'_>,
        field: &str,
    ) -> Result<Option<(SpatialGeometry, Option<Value>)>> {
        let attribute = record
            .attribute(field)
            .ok_or_else(|| Error::Serialization("no geometry field found".into()))?;
        let unparseable = |value: &dyn std::fmt::Debug, cause: Error| {
            Error::Serialization(format!(
                "unable to parse geometry field {} with value {:?}: {}",
                field, value, cause
            ))
        };
        let resolved = match attribute {
            Attribute::Geometry(g) => g,
            Attribute::Value(Value::Null) => None,
            Attribute::Value(Value::String(text)) => {
                let parsed = if looks_like_hex(&text) {
                    parse_hex_wkb(&text)
                } else {
                    parse_ewkt(&text)
                };
                Some(parsed.map_err(|e| unparseable(&text, e))?)
            }
            // GeoJSON is WGS 84 by definition
            Attribute::Value(obj @ Value::Object(_)) => {
                let g = Geometry::from_geojson(&obj).map_err(|e| unparseable(&obj, e))?;
                return Ok(Some((SpatialGeometry::new(g, WGS84), Some(obj))));
            }
            Attribute::Binary(bytes) => {
                Some(parse_binary(&bytes).map_err(|e| unparseable(&bytes.len(), e))?)
            }
            Attribute::Value(other) => {
                return Err(unparseable(&other, Error::UnsupportedGeometryType))
            }
            Attribute::ToOne(_) | Attribute::ToMany(_) => {
                return Err(Error::Serialization(format!(
                    "geometry field {} is a relation",
                    field
                )))
            }
        };
        Ok(resolved.map(|g| (g, None)))
    }

    /// Whether `prepare_geometry` leaves a WGS 84 geometry as it is
    fn keeps_geojson(&self) -> bool {
        !self.options.force2d && self.options.simplify.is_none() && self.options.srid == WGS84
    }

    /// force-2D, simplification, then reprojection, always in that order.
    fn prepare_geometry(&self, geometry: &mut SpatialGeometry) -> Result<()> {
        if self.options.force2d {
            geometry.geometry.force_2d();
        }
        if let Some(tolerance) = self.options.simplify {
            engine::simplify(&mut geometry.geometry, tolerance);
        }
        projection::transform(geometry, self.options.srid, self.projector)
    }

    fn feature_id(&self, record: &Input<'_>) -> Option<Value> {
        let id = match &self.options.primary_key {
            Some(PrimaryKey::Selector(select)) => select(record),
            Some(PrimaryKey::Attribute(name)) => self.property(record, name),
            None => record.pk(),
        };
        id.filter(|v| !v.is_null())
    }

    fn properties(&self, record: &Input<'_>, geometry_field: &str) -> Map<String, Value> {
        let mut properties = Map::new();
        match &self.options.properties {
            PropertySelection::All => {
                for name in record.attribute_names() {
                    if name == geometry_field {
                        continue;
                    }
                    if let Some(Attribute::Value(v)) = record.attribute(name) {
                        properties.insert(name.to_owned(), v);
                    }
                }
            }
            PropertySelection::Only(names) => {
                for name in names.iter().filter(|n| *n != geometry_field) {
                    if let Some(v) = self.property(record, name) {
                        properties.insert(name.clone(), v);
                    }
                }
            }
            PropertySelection::Rename(names) => {
                for (name, output) in names.iter().filter(|(n, _)| *n != geometry_field) {
                    if let Some(v) = self.property(record, name) {
                        properties.insert(output.clone(), v);
                    }
                }
            }
        }
        if self.options.with_modelname {
            if let Some(model) = record.model_name() {
                properties.insert("model".into(), model.into());
            }
        }
        properties
    }

    /// Resolve one named property, `None` when the record has no such attribute.
    fn property(&self, record: &Input<'_>, name: &str) -> Option<Value> {
        if name.contains('.') {
            if let Some(v) = record.dotted_attribute(name) {
                return Some(v);
            }
        }
        let natural = self.options.use_natural_keys;
        Some(match record.attribute(name)? {
            Attribute::Value(v) => v,
            Attribute::Binary(b) => Value::from(hex_string(&b)),
            Attribute::Geometry(g) => g.map_or(Value::Null, |g| g.geometry.to_geojson()),
            Attribute::ToOne(r) => r.map_or(Value::Null, |r| r.key(natural)),
            Attribute::ToMany(rs) => Value::Array(rs.iter().map(|r| r.key(natural)).collect()),
        })
    }
}

fn looks_like_hex(text: &str) -> bool {
    // shortest WKB is an empty geometry collection: 9 bytes
    text.len() >= 18 && text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit())
}
