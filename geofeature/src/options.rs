use crate::engine::BBox;
use crate::input::Input;
use crate::result::Result;
use crate::srs::CrsType;
use crate::DEFAULT_SRID;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which attributes end up in a feature's `properties`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertySelection {
    /// Every scalar attribute except the geometry
    #[default]
    All,
    /// Only the named attributes that resolve on the record
    Only(Vec<String>),
    /// Like `Only`, keyed by attribute name, with the values as output names
    Rename(BTreeMap<String, String>),
}

impl<S: Into<String>> FromIterator<S> for PropertySelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PropertySelection::Only(iter.into_iter().map(Into::into).collect())
    }
}

type Selector = dyn Fn(&Input<'_>) -> Option<Value> + Send + Sync;

/// How a feature's `id` is chosen.
#[derive(Clone)]
pub enum PrimaryKey {
    /// Read the named attribute
    Attribute(String),
    /// Compute the id from the whole record
    Selector(Arc<Selector>),
}

impl PrimaryKey {
    pub fn selector<F>(f: F) -> Self
    where
        F: Fn(&Input<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        PrimaryKey::Selector(Arc::new(f))
    }
}

impl fmt::Debug for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            PrimaryKey::Selector(_) => f.write_str("Selector(..)"),
        }
    }
}

// only the attribute form can come from configuration
impl<'de> Deserialize<'de> for PrimaryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(PrimaryKey::Attribute)
    }
}

fn default_srid() -> i32 {
    DEFAULT_SRID
}

fn default_true() -> bool {
    true
}

/// Options recognised by the [`Serializer`](crate::Serializer).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    pub properties: PropertySelection,
    /// Attribute holding the geometry. Falls back to the model's declared
    /// geometry field, then `geom`, then `the_geom`.
    pub geometry_field: Option<String>,
    /// Target SRID every geometry is reprojected to
    #[serde(default = "default_srid")]
    pub srid: i32,
    /// Decimal digits written for every float
    pub precision: Option<usize>,
    /// Simplification tolerance, in the units of the source geometry
    pub simplify: Option<f64>,
    pub force2d: bool,
    /// Explicit collection bbox
    pub bbox: Option<BBox>,
    /// Attach each feature's own extent as its bbox
    pub bbox_auto: bool,
    #[serde(default = "default_true")]
    pub crs: bool,
    pub crs_type: CrsType,
    pub use_natural_keys: bool,
    #[serde(default = "default_true")]
    pub with_modelname: bool,
    pub primary_key: Option<PrimaryKey>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            properties: PropertySelection::All,
            geometry_field: None,
            srid: DEFAULT_SRID,
            precision: None,
            simplify: None,
            force2d: false,
            bbox: None,
            bbox_auto: false,
            crs: true,
            crs_type: CrsType::Link,
            use_natural_keys: false,
            with_modelname: true,
            primary_key: None,
        }
    }
}

impl SerializerOptions {
    /// Load options from a JSON object, e.g. a configuration file section.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
