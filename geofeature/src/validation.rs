use crate::model::{GeometryStorage, ModelMeta};
use crate::result::{Error, Result};
use crate::types::{GeoJsonField, GeometryType};
use serde_json::Value;

/// Checks that a GeoJSON value declares the geometry type a field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoJsonValidator {
    /// `None` is the generic `GEOMETRY` constraint
    expected: Option<GeometryType>,
}

impl GeoJsonValidator {
    /// Accept any of the seven geometry types
    pub fn any() -> Self {
        GeoJsonValidator { expected: None }
    }

    pub fn new(expected: GeometryType) -> Self {
        GeoJsonValidator {
            expected: Some(expected),
        }
    }

    /// Build from a constraint name such as `"GEOMETRY"` or `"LINESTRING"`.
    pub fn from_name(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("GEOMETRY") {
            return Ok(GeoJsonValidator::any());
        }
        GeometryType::from_name(name)
            .map(GeoJsonValidator::new)
            .ok_or_else(|| Error::Configuration(format!("{} is not a geometry type", name)))
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        let declared = value.get("type").and_then(Value::as_str).unwrap_or("");
        match self.expected {
            None if GeometryType::ALL.iter().any(|t| t.as_str() == declared) => Ok(()),
            None => Err(Error::Validation(format!(
                "{} is not a valid GeoJSON geometry type",
                declared
            ))),
            Some(t) if t.as_str().eq_ignore_ascii_case(declared) => Ok(()),
            Some(_) => Err(Error::Validation(format!(
                "{} does not match geometry type",
                declared
            ))),
        }
    }

    /// The validator for a model's GeoJSON geometry field, if it stores one.
    pub fn for_model(meta: &ModelMeta) -> Option<Self> {
        let field = meta.geometry.as_ref()?;
        if field.storage != GeometryStorage::GeoJson {
            return None;
        }
        Some(GeoJsonValidator {
            expected: field.geometry_type,
        })
    }
}

impl GeoJsonField {
    /// Validate against a field's declared type
    pub fn validate(&self, validator: &GeoJsonValidator) -> Result<()> {
        validator.validate(&self.0)
    }
}
