use geofeature::template::{geojson_feature, DisplaySource};
use geofeature::validation::GeoJsonValidator;
use geofeature::{
    Deserializer, Error, GeoJsonField, GeoModel, Input, ModelType, PropertySelection, Registry,
    Related, RelatedSet, Serializer, SerializerOptions, SpatialGeometry,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

#[derive(GeoModel)]
#[model_name = "transit.operator"]
#[natural_key = "code"]
struct Operator {
    id: i64,
    code: String,
    name: String,
}

#[derive(GeoModel)]
#[model_name = "transit.route"]
#[computed(upper_name)]
struct Route {
    id: i64,
    name: String,
    operator: Option<Related>,
    stops: RelatedSet,
    #[geom_field("LineString")]
    geom: Option<SpatialGeometry>,
}

impl Route {
    fn upper_name(&self) -> String {
        self.name.to_uppercase()
    }
}

#[derive(GeoModel)]
#[model_name = "cadastre.parcel"]
struct Parcel {
    id: i64,
    owner: String,
    #[geom_field("Polygon")]
    shape: GeoJsonField,
}

fn metro() -> Operator {
    Operator {
        id: 1,
        code: "C1".into(),
        name: "Metro".into(),
    }
}

fn red_line(operator: Option<&Operator>) -> Route {
    Route {
        id: 10,
        name: "Red line".into(),
        operator: operator.map(Related::of),
        stops: RelatedSet(vec![
            Related::new(1).with_natural_key("S1"),
            Related::new(2).with_natural_key("S2"),
        ]),
        geom: Some(SpatialGeometry::line_string(&[(0.0, 0.0), (1.0, 1.0)], 4326)),
    }
}

fn no_crs() -> SerializerOptions {
    SerializerOptions {
        crs: false,
        ..Default::default()
    }
}

#[test]
fn derived_metadata() {
    let meta = Route::model_meta();
    assert_eq!(meta.name, "transit.route");
    assert_eq!(meta.fields, &["id", "name", "operator", "stops", "geom"]);
    assert_eq!(meta.computed, &["upper_name"]);
    assert_eq!(meta.geometry_field(), Some("geom"));
    assert_eq!(meta.pk_field, Some("id"));

    let op = metro();
    assert_eq!(op.pk(), Some(json!(1)));
    assert_eq!(op.natural_key(), Some(json!("C1")));
    assert!(op.attribute("nope").is_none());
}

#[test]
fn all_properties_skip_relations() {
    let op = metro();
    let route = red_line(Some(&op));
    let out = Serializer::new(no_crs()).collection([Input::model(&route)]).unwrap();
    assert_eq!(
        out,
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": 10,
                "properties": {"id": 10, "name": "Red line", "model": "transit.route"},
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
            }],
        })
    );
}

#[test]
fn selected_relations_and_computed() {
    let op = metro();
    let route = red_line(Some(&op));
    let options = SerializerOptions {
        properties: ["operator", "stops", "operator.name", "upper_name"].into_iter().collect(),
        with_modelname: false,
        ..no_crs()
    };
    let out = Serializer::new(options).collection([Input::model(&route)]).unwrap();
    assert_eq!(
        out["features"][0]["properties"],
        json!({"operator": 1, "stops": [1, 2], "operator.name": "Metro", "upper_name": "RED LINE"})
    );
}

#[test]
fn natural_keys() {
    let op = metro();
    let route = red_line(Some(&op));
    let options = SerializerOptions {
        properties: PropertySelection::Only(vec!["operator".into(), "stops".into()]),
        use_natural_keys: true,
        with_modelname: false,
        ..no_crs()
    };
    let out = Serializer::new(options).collection([Input::model(&route)]).unwrap();
    assert_eq!(
        out["features"][0]["properties"],
        json!({"operator": "C1", "stops": ["S1", "S2"]})
    );
}

#[test]
fn missing_relation_is_null() {
    let route = red_line(None);
    let options = SerializerOptions {
        properties: ["operator", "operator.name"].into_iter().collect(),
        ..no_crs()
    };
    let out = Serializer::new(options).collection([Input::model(&route)]).unwrap();
    assert_eq!(
        out["features"][0]["properties"],
        json!({"operator": null, "operator.name": null, "model": "transit.route"})
    );
}

#[test]
fn renamed_properties() {
    let route = red_line(None);
    let options = SerializerOptions {
        properties: PropertySelection::Rename(
            [("name".to_owned(), "label".to_owned())].into_iter().collect(),
        ),
        with_modelname: false,
        ..no_crs()
    };
    let out = Serializer::new(options).collection([Input::model(&route)]).unwrap();
    assert_eq!(out["features"][0]["properties"], json!({"label": "Red line"}));
}

#[test]
fn models_keep_input_order() {
    let routes = vec![
        red_line(None),
        Route {
            id: 11,
            name: "Blue line".into(),
            operator: None,
            stops: RelatedSet::default(),
            geom: None,
        },
    ];
    let out = Serializer::new(no_crs()).collection(Input::models(&routes)).unwrap();
    let ids: Vec<&Value> = out["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| &f["id"])
        .collect();
    assert_eq!(ids, vec![&json!(10), &json!(11)]);
    assert_eq!(out["features"][1]["geometry"], Value::Null);
}

#[test]
fn geojson_field_round_trip() {
    let polygon = json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
    });
    let parcel = Parcel {
        id: 7,
        owner: "Ann".into(),
        shape: GeoJsonField::new(polygon.clone()),
    };
    let text = Serializer::new(SerializerOptions::default())
        .serialize([Input::model(&parcel)])
        .unwrap();

    let mut registry = Registry::new();
    registry.register::<Parcel>().register::<Route>();
    let objects = Deserializer::new(&registry).deserialize(&text).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].model, "cadastre.parcel");
    assert_eq!(objects[0].pk, Some(json!(7)));
    assert_eq!(
        Value::Object(objects[0].fields.clone()),
        json!({"owner": "Ann", "shape": polygon})
    );

    let validator = GeoJsonValidator::for_model(Parcel::model_meta()).unwrap();
    assert!(GeoJsonField::new(objects[0].fields["shape"].clone())
        .validate(&validator)
        .is_ok());
    assert!(matches!(
        validator.validate(&json!({"type": "Point", "coordinates": [0.0, 0.0]})),
        Err(Error::Validation(_))
    ));
}

#[test]
fn geojson_field_keeps_integer_coordinates() {
    let polygon = json!({
        "type": "Polygon",
        "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 0]]],
        "bbox": [0, 0, 4, 4],
    });
    let parcel = Parcel {
        id: 8,
        owner: "Bo".into(),
        shape: GeoJsonField::new(polygon.clone()),
    };
    let text = Serializer::new(no_crs())
        .serialize([Input::model(&parcel)])
        .unwrap();
    assert!(text.contains(r#""coordinates":[[[0,0],[4,0],[4,4],[0,0]]]"#), "{}", text);

    let mut registry = Registry::new();
    registry.register::<Parcel>();
    let objects = Deserializer::new(&registry).deserialize(&text).unwrap();
    assert_eq!(objects[0].fields["shape"], polygon);
}

#[test]
fn display_filter_uses_the_declared_geometry_field() {
    let parcel = Parcel {
        id: 9,
        owner: "Cy".into(),
        shape: GeoJsonField::new(json!({"type": "Point", "coordinates": [1, 2]})),
    };
    let text = geojson_feature(DisplaySource::Record(Input::model(&parcel)), "owner").unwrap();
    let out: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(out["features"][0]["properties"], json!({"owner": "Cy"}));
    assert_eq!(out["features"][0]["geometry"]["coordinates"], json!([1, 2]));
}

#[test]
fn wkt_models_decode_to_wkt() {
    let route = red_line(None);
    let text = Serializer::new(SerializerOptions::default())
        .serialize([Input::model(&route)])
        .unwrap();
    let mut registry = Registry::new();
    registry.register::<Route>();
    let objects = Deserializer::new(&registry).deserialize(&text).unwrap();
    let wkt = objects[0].fields["geom"].as_str().unwrap();
    assert_eq!(
        geofeature::wkt::parse_ewkt(wkt).unwrap(),
        SpatialGeometry::without_srid(red_line(None).geom.unwrap().geometry)
    );
    assert_eq!(objects[0].fields["name"], json!("Red line"));
    assert!(!objects[0].fields.contains_key("model"));
    assert!(!objects[0].fields.contains_key("id"));
}

#[test]
fn decode_with_explicit_model_name() {
    let mut registry = Registry::new();
    registry.register::<Route>();
    let text = r#"{"type": "Feature", "id": 3, "properties": {"name": "Green"}, "geometry": null}"#;
    let objects = Deserializer::new(&registry)
        .model_name("transit.route")
        .deserialize(text)
        .unwrap();
    assert_eq!(objects[0].pk, Some(json!(3)));
    assert_eq!(objects[0].fields["geom"], Value::Null);

    let err = Deserializer::new(&registry).deserialize(text).unwrap_err();
    assert!(matches!(err, Error::Deserialization(_)));
}
