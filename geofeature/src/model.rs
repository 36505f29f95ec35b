use crate::result::{Error, Result};
use crate::types::{GeoJsonField, GeometryType, SpatialGeometry};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How a model's geometry field keeps its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryStorage {
    /// A structured geometry, exchanged as WKT
    Wkt,
    /// A GeoJSON object stored as-is
    GeoJson,
}

#[derive(Debug)]
pub struct GeometryFieldMeta {
    pub name: &'static str,
    /// `None` accepts any geometry type
    pub geometry_type: Option<GeometryType>,
    pub has_z: bool,
    pub storage: GeometryStorage,
}

/// Static description of a model type, produced by `#[derive(GeoModel)]`.
#[derive(Debug)]
pub struct ModelMeta {
    /// The type name written to the `model` property, e.g. `"app.route"`
    pub name: &'static str,
    /// Concrete fields in declaration order, including the geometry field
    pub fields: &'static [&'static str],
    /// Computed attributes that are readable but never deserialized
    pub computed: &'static [&'static str],
    pub geometry: Option<GeometryFieldMeta>,
    pub pk_field: Option<&'static str>,
}

impl ModelMeta {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(&name)
    }

    pub fn geometry_field(&self) -> Option<&'static str> {
        self.geometry.as_ref().map(|g| g.name)
    }
}

/// The key of a related record, as seen from the record pointing at it.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub pk: Value,
    pub natural_key: Option<Value>,
    /// Scalar attributes of the related record, for `relation.attribute` lookups
    pub fields: Map<String, Value>,
}

impl Related {
    pub fn new(pk: impl Into<Value>) -> Self {
        Related {
            pk: pk.into(),
            natural_key: None,
            fields: Map::new(),
        }
    }

    pub fn with_natural_key(mut self, key: impl Into<Value>) -> Self {
        self.natural_key = Some(key.into());
        self
    }

    /// Snapshot a loaded record: its primary key, natural key and scalar fields.
    pub fn of<M: GeoModel + ?Sized>(model: &M) -> Self {
        let mut fields = Map::new();
        for name in model.meta().fields {
            if let Some(Attribute::Value(v)) = model.attribute(name) {
                fields.insert((*name).to_owned(), v);
            }
        }
        Related {
            pk: model.pk().unwrap_or(Value::Null),
            natural_key: model.natural_key(),
            fields,
        }
    }

    /// The value written for this relation
    pub fn key(&self, use_natural_keys: bool) -> Value {
        match (&self.natural_key, use_natural_keys) {
            (Some(nk), true) => nk.clone(),
            (None, true) => {
                tracing::warn!(pk = %self.pk, "related record has no natural key, using primary key");
                self.pk.clone()
            }
            _ => self.pk.clone(),
        }
    }
}

/// A to-many or reverse relation, in the order the related records were loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedSet(pub Vec<Related>);

/// A single attribute value read from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Value(Value),
    /// Raw bytes, e.g. a GeoPackage geometry blob or (E)WKB
    Binary(Vec<u8>),
    Geometry(Option<SpatialGeometry>),
    ToOne(Option<Related>),
    ToMany(Vec<Related>),
}

impl Attribute {
    pub fn is_relation(&self) -> bool {
        matches!(self, Attribute::ToOne(_) | Attribute::ToMany(_))
    }
}

/// Conversion from a field value into an [`Attribute`].
pub trait ToAttribute {
    fn to_attribute(&self) -> Attribute;

    /// What an absent (`None`) value of this type reads as
    fn null_attribute() -> Attribute
    where
        Self: Sized,
    {
        Attribute::Value(Value::Null)
    }
}

macro_rules! to_attribute_json {
    ($($t:ty),*) => {
       $(
            impl ToAttribute for $t {
                #[inline]
                fn to_attribute(&self) -> Attribute {
                    Attribute::Value(Value::from(self.clone()))
                }
            }
       )*
    };
}

to_attribute_json! {i64, i32, i16, i8, u32, u16, u8, f64, f32, bool, String}

impl ToAttribute for &str {
    fn to_attribute(&self) -> Attribute {
        Attribute::Value(Value::from(*self))
    }
}

impl ToAttribute for Value {
    fn to_attribute(&self) -> Attribute {
        Attribute::Value(self.clone())
    }
}

impl ToAttribute for SpatialGeometry {
    fn to_attribute(&self) -> Attribute {
        Attribute::Geometry(Some(self.clone()))
    }

    fn null_attribute() -> Attribute {
        Attribute::Geometry(None)
    }
}

impl ToAttribute for GeoJsonField {
    fn to_attribute(&self) -> Attribute {
        Attribute::Value(self.0.clone())
    }
}

impl ToAttribute for Related {
    fn to_attribute(&self) -> Attribute {
        Attribute::ToOne(Some(self.clone()))
    }

    fn null_attribute() -> Attribute {
        Attribute::ToOne(None)
    }
}

impl ToAttribute for RelatedSet {
    fn to_attribute(&self) -> Attribute {
        Attribute::ToMany(self.0.clone())
    }
}

impl<T: ToAttribute> ToAttribute for Option<T> {
    fn to_attribute(&self) -> Attribute {
        match self {
            Some(v) => v.to_attribute(),
            None => T::null_attribute(),
        }
    }
}

/// A trait that gives the encoder uniform access to a typed record.
///
/// Usually implemented with `#[derive(GeoModel)]`.
pub trait GeoModel {
    fn meta(&self) -> &'static ModelMeta;

    /// The record's own primary key, if it has one
    fn pk(&self) -> Option<Value>;

    /// A human-meaningful identifier used in place of the primary key for relations
    fn natural_key(&self) -> Option<Value> {
        None
    }

    /// Read a field or computed attribute by name. `None` when no such attribute exists.
    fn attribute(&self, name: &str) -> Option<Attribute>;
}

/// Static access to a model's description, for registering it with a [`Registry`].
pub trait ModelType {
    fn model_meta() -> &'static ModelMeta;
}

/// Maps type names found in GeoJSON `model` properties to model descriptions.
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<&'static str, &'static ModelMeta>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register<M: ModelType>(&mut self) -> &mut Self {
        let meta = M::model_meta();
        self.models.insert(meta.name, meta);
        self
    }

    pub fn register_meta(&mut self, meta: &'static ModelMeta) -> &mut Self {
        self.models.insert(meta.name, meta);
        self
    }

    /// Case-insensitive, like the `app.model` labels it stores.
    pub fn get(&self, name: &str) -> Result<&'static ModelMeta> {
        self.models
            .get(name)
            .or_else(|| {
                self.models
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .copied()
            .ok_or_else(|| Error::UnknownModel(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static META: ModelMeta = ModelMeta {
        name: "app.route",
        fields: &["id", "name", "geom"],
        computed: &[],
        geometry: None,
        pk_field: Some("id"),
    };

    #[test]
    fn registry_lookup_ignores_case() {
        let mut registry = Registry::new();
        registry.register_meta(&META);
        assert_eq!(registry.get("App.Route").unwrap().name, "app.route");
        assert!(matches!(registry.get("app.trail"), Err(Error::UnknownModel(_))));
    }

    #[test]
    fn related_key_prefers_natural_key() {
        let r = Related::new(1).with_natural_key("C1");
        assert_eq!(r.key(true), json!("C1"));
        assert_eq!(r.key(false), json!(1));
        assert_eq!(Related::new(2).key(true), json!(2));
    }

    #[test]
    fn absent_values() {
        assert_eq!(None::<Related>.to_attribute(), Attribute::ToOne(None));
        assert_eq!(None::<SpatialGeometry>.to_attribute(), Attribute::Geometry(None));
        assert_eq!(None::<i64>.to_attribute(), Attribute::Value(Value::Null));
        assert_eq!(Some(3i32).to_attribute(), Attribute::Value(json!(3)));
    }
}
