use crate::geopackage::LayerRow;
use crate::model::{Attribute, GeoModel};
use serde_json::{Map, Value};

/// One record handed to the encoder.
///
/// The variant is picked once per record; the encoder only ever talks to the
/// uniform accessors below.
#[derive(Clone, Copy)]
pub enum Input<'a> {
    /// A typed record, usually one deriving `GeoModel`
    Model(&'a dyn GeoModel),
    /// A plain JSON object
    Mapping(&'a Map<String, Value>),
    /// A row read from a GeoPackage layer
    Row(&'a LayerRow),
}

impl<'a> Input<'a> {
    pub fn model<M: GeoModel>(record: &'a M) -> Self {
        Input::Model(record)
    }

    /// Wrap a slice of typed records
    pub fn models<M: GeoModel>(records: &'a [M]) -> Vec<Input<'a>> {
        records.iter().map(|r| Input::Model(r as &dyn GeoModel)).collect()
    }

    /// The originating type name written as the `model` property
    pub fn model_name(&self) -> Option<&'a str> {
        match *self {
            Input::Model(m) => Some(m.meta().name),
            Input::Mapping(_) => None,
            Input::Row(r) => Some(r.layer.as_str()),
        }
    }

    /// The record's own primary key
    pub fn pk(&self) -> Option<Value> {
        match *self {
            Input::Model(m) => m.pk(),
            Input::Mapping(_) => None,
            Input::Row(r) => Some(Value::from(r.fid)),
        }
    }

    /// The geometry field declared by the record's type, if it declares one
    pub fn declared_geometry_field(&self) -> Option<&'a str> {
        match *self {
            Input::Model(m) => m.meta().geometry_field(),
            Input::Mapping(_) => None,
            Input::Row(r) => r.geometry_column.as_deref(),
        }
    }

    /// Names of the record's own attributes, in declaration order.
    ///
    /// Computed attributes are not listed; they are only reachable by name.
    pub fn attribute_names(&self) -> Vec<&'a str> {
        match *self {
            Input::Model(m) => m.meta().fields.to_vec(),
            Input::Mapping(map) => map.keys().map(String::as_str).collect(),
            Input::Row(r) => r.values.iter().map(|(k, _)| k.as_str()).collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        match *self {
            Input::Model(m) => m.attribute(name),
            Input::Mapping(map) => map.get(name).cloned().map(Attribute::Value),
            Input::Row(r) => r.attribute(name),
        }
    }

    /// Follow a `relation.attribute` path one level deep.
    pub fn dotted_attribute(&self, path: &str) -> Option<Value> {
        let (relation, attr) = path.split_once('.')?;
        match *self {
            Input::Mapping(map) => map.get(relation)?.get(attr).cloned(),
            _ => match self.attribute(relation)? {
                Attribute::ToOne(Some(related)) => match related.fields.get(attr) {
                    Some(v) => Some(v.clone()),
                    None if attr == "pk" => Some(related.pk),
                    None => None,
                },
                Attribute::ToOne(None) => Some(Value::Null),
                _ => None,
            },
        }
    }
}

impl<'a> std::fmt::Debug for Input<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Input::Model(m) => f.debug_tuple("Model").field(&m.meta().name).finish(),
            Input::Mapping(map) => f.debug_tuple("Mapping").field(map).finish(),
            Input::Row(r) => f.debug_tuple("Row").field(r).finish(),
        }
    }
}
