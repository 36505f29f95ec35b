//! The feature-collection decoder.
use crate::model::{GeometryStorage, ModelMeta, Registry};
use crate::result::{Error, Result};
use crate::types::Geometry;
use crate::wkt::to_wkt;
use serde_json::{Map, Value};

/// Field values recovered from one feature, ready to be assigned to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeserializedObject {
    pub model: &'static str,
    pub pk: Option<Value>,
    /// Known concrete fields only, the primary key excluded
    pub fields: Map<String, Value>,
}

/// Turns GeoJSON text back into field values for registered model types.
pub struct Deserializer<'r> {
    registry: &'r Registry,
    model_name: Option<String>,
}

impl<'r> Deserializer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Deserializer {
            registry,
            model_name: None,
        }
    }

    /// Decode every feature as this type, whatever its `model` property says.
    pub fn model_name(mut self, name: &str) -> Self {
        self.model_name = Some(name.to_owned());
        self
    }

    /// Decode a `FeatureCollection` or a single `Feature`.
    ///
    /// Fails as a whole on the first bad feature.
    pub fn deserialize(&self, text: &str) -> Result<Vec<DeserializedObject>> {
        serde_json::from_str::<Value>(text)
            .map_err(Error::from)
            .and_then(|doc| self.deserialize_value(&doc))
            .map_err(Error::into_deserialization)
    }

    pub fn deserialize_value(&self, doc: &Value) -> Result<Vec<DeserializedObject>> {
        let objects = match doc.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => doc
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::decode("FeatureCollection without features"))?
                .iter()
                .map(|f| self.feature(f))
                .collect::<Result<Vec<_>>>(),
            Some("Feature") => self.feature(doc).map(|o| vec![o]),
            other => Err(Error::decode(format!(
                "expected a Feature or a FeatureCollection, found {:?}",
                other
            ))),
        }
        .map_err(Error::into_deserialization)?;
        tracing::debug!(objects = objects.len(), "deserialized features");
        Ok(objects)
    }

    fn feature(&self, feature: &Value) -> Result<DeserializedObject> {
        let empty = Map::new();
        let properties = feature
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let name = match &self.model_name {
            Some(name) => name.as_str(),
            None => properties
                .get("model")
                .and_then(Value::as_str)
                .ok_or(Error::MissingModel)?,
        };
        let meta = self.registry.get(name)?;

        let geometry_field = meta.geometry_field();
        let mut fields: Map<String, Value> = properties
            .iter()
            .filter(|(k, _)| meta.has_field(k))
            .filter(|(k, _)| Some(k.as_str()) != geometry_field && Some(k.as_str()) != meta.pk_field)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some((field, value)) = geometry_value(meta, feature.get("geometry"))? {
            fields.insert(field.to_owned(), value);
        }

        let pk = feature
            .get("id")
            .filter(|v| !v.is_null())
            .or_else(|| properties.get("id").filter(|v| !v.is_null()))
            .cloned();

        Ok(DeserializedObject {
            model: meta.name,
            pk,
            fields,
        })
    }
}

/// The geometry in the representation the model's geometry field stores.
fn geometry_value(
    meta: &ModelMeta,
    geometry: Option<&Value>,
) -> Result<Option<(&'static str, Value)>> {
    let (field, storage) = match &meta.geometry {
        Some(g) => (g.name, g.storage),
        None if meta.has_field("geom") => ("geom", GeometryStorage::Wkt),
        None => return Ok(None),
    };
    let value = match geometry {
        None | Some(Value::Null) => Value::Null,
        Some(raw) if storage == GeometryStorage::GeoJson => raw.clone(),
        Some(raw) => Value::String(to_wkt(&Geometry::from_geojson(raw)?)),
    };
    Ok(Some((field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeometryFieldMeta;
    use serde_json::json;

    static ROUTE: ModelMeta = ModelMeta {
        name: "app.route",
        fields: &["id", "name", "geom"],
        computed: &["upper_name"],
        geometry: Some(GeometryFieldMeta {
            name: "geom",
            geometry_type: None,
            has_z: false,
            storage: GeometryStorage::Wkt,
        }),
        pk_field: Some("id"),
    };

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register_meta(&ROUTE);
        r
    }

    #[test]
    fn collection_to_wkt() {
        let registry = registry();
        let text = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": 4,
                "properties": {"model": "app.route", "name": "green", "upper_name": "GREEN"},
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
            }],
        })
        .to_string();
        let mut objects = Deserializer::new(&registry).deserialize(&text).unwrap();
        assert_eq!(objects.len(), 1);
        let wkt = objects[0].fields.remove("geom").unwrap();
        assert_eq!(
            crate::wkt::parse_ewkt(wkt.as_str().unwrap()).unwrap().geometry,
            Geometry::LineString(vec![(0.0, 0.0).into(), (1.0, 1.0).into()])
        );
        assert_eq!(
            objects,
            vec![DeserializedObject {
                model: "app.route",
                pk: Some(json!(4)),
                fields: json!({"name": "green"}).as_object().unwrap().clone(),
            }]
        );
    }

    #[test]
    fn pk_falls_back_to_id_property() {
        let registry = registry();
        let text = r#"{"type": "Feature", "properties": {"id": 9, "name": "x"}, "geometry": null}"#;
        let objects = Deserializer::new(&registry)
            .model_name("app.route")
            .deserialize(text)
            .unwrap();
        assert_eq!(objects[0].pk, Some(json!(9)));
        assert_eq!(objects[0].fields["geom"], Value::Null);
        assert!(!objects[0].fields.contains_key("id"));
    }

    #[test]
    fn missing_model_is_a_deserialization_error() {
        let registry = registry();
        let text = r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "properties": {}, "geometry": null}]}"#;
        match Deserializer::new(&registry).deserialize(text) {
            Err(Error::Deserialization(cause)) => assert!(matches!(*cause, Error::MissingModel)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_model_and_bad_json() {
        let registry = registry();
        let text = r#"{"type": "Feature", "properties": {"model": "app.trail"}, "geometry": null}"#;
        assert!(matches!(
            Deserializer::new(&registry).deserialize(text),
            Err(Error::Deserialization(_))
        ));
        match Deserializer::new(&registry).deserialize("{not json") {
            Err(Error::Deserialization(cause)) => assert!(matches!(*cause, Error::Json(_))),
            other => panic!("unexpected {:?}", other),
        }
    }
}
