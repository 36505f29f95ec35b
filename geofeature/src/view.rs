//! Layer endpoints producing GeoJSON response bodies.
use crate::input::Input;
use crate::options::SerializerOptions;
use crate::result::Result;
use crate::serializer::Serializer;
use serde::Deserialize;

pub const GEOJSON_CONTENT_TYPE: &str = "application/geo+json";

/// A serialized layer, ready to hand to whatever HTTP stack serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoJsonResponse {
    pub content_type: &'static str,
    pub body: String,
}

impl GeoJsonResponse {
    pub fn new(body: String) -> Self {
        GeoJsonResponse {
            content_type: GEOJSON_CONTENT_TYPE,
            body,
        }
    }
}

/// Serves a whole record source as one `FeatureCollection`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GeoJsonLayer {
    pub options: SerializerOptions,
}

impl GeoJsonLayer {
    pub fn new(options: SerializerOptions) -> Self {
        GeoJsonLayer { options }
    }

    pub fn render<'a, I>(&self, records: I) -> Result<GeoJsonResponse>
    where
        I: IntoIterator<Item = Input<'a>>,
    {
        let body = Serializer::new(self.options.clone()).serialize(records)?;
        Ok(GeoJsonResponse::new(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn layer_response() {
        let layer: GeoJsonLayer = serde_json::from_str(r#"{"properties": ["name"], "crs": false}"#).unwrap();
        let record = json!({"name": "a", "kind": "b", "geom": "POINT (1 2)"});
        let response = layer.render([Input::Mapping(record.as_object().unwrap())]).unwrap();
        assert_eq!(response.content_type, "application/geo+json");
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["features"][0]["properties"], json!({"name": "a"}));
        assert!(body.get("crs").is_none());
    }
}
