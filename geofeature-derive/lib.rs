use lazy_static::lazy_static;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use std::collections::HashMap;
use syn::{
    parse2, Attribute, DeriveInput, Field, GenericArgument, Ident, Lit, Meta, MetaNameValue,
    NestedMeta, Type, TypePath,
};

lazy_static! {
    // declared type name -> (GeoJSON geometry type, has Z)
    static ref GEO_TYPES: HashMap<&'static str, (Option<&'static str>, bool)> = {
        let mut m = HashMap::new();
        m.insert("GEOMETRY", (None, false));
        m.insert("POINT", (Some("Point"), false));
        m.insert("LINESTRING", (Some("LineString"), false));
        m.insert("POLYGON", (Some("Polygon"), false));
        m.insert("MULTIPOINT", (Some("MultiPoint"), false));
        m.insert("MULTILINESTRING", (Some("MultiLineString"), false));
        m.insert("MULTIPOLYGON", (Some("MultiPolygon"), false));
        m.insert("GEOMETRYCOLLECTION", (Some("GeometryCollection"), false));
        m.insert("GEOMETRYZ", (None, true));
        m.insert("POINTZ", (Some("Point"), true));
        m.insert("LINESTRINGZ", (Some("LineString"), true));
        m.insert("POLYGONZ", (Some("Polygon"), true));
        m.insert("MULTIPOINTZ", (Some("MultiPoint"), true));
        m.insert("MULTILINESTRINGZ", (Some("MultiLineString"), true));
        m.insert("MULTIPOLYGONZ", (Some("MultiPolygon"), true));
        m.insert("GEOMETRYCOLLECTIONZ", (Some("GeometryCollection"), true));
        m
    };
}

/// A macro for deriving an implementation of `GeoModel` and `ModelType` for a struct
///
/// The model_name attribute sets the type name written to the `model` property and looked up
/// when deserializing. It defaults to the struct name in lowercase.
///
/// The geom_field attribute can only be used on one field. An optional geometry type constrains
/// the field; a trailing Z marks it as three dimensional. Fields of type `GeoJsonField` store
/// their geometry as GeoJSON, every other geometry field is exchanged as WKT.
///
/// The primary key is the field marked with primary_key, or the field named `id`.
///
/// The natural_key attribute names a field or a `&self` method returning the natural key, and
/// computed lists `&self` methods that can be selected as properties.
/// # Usage
/// ```ignore
/// use geofeature::{GeoModel, Related, SpatialGeometry};
///
/// #[derive(GeoModel)]
/// #[model_name = "transit.route"]
/// #[natural_key = "code"]
/// #[computed(upper_name)]
/// struct Route {
///     id: i64,
///     code: String,
///     name: String,
///     operator: Option<Related>,
///     #[geom_field("LineString")]
///     geom: SpatialGeometry,
/// }
///
/// impl Route {
///     fn upper_name(&self) -> String {
///         self.name.to_uppercase()
///     }
/// }
/// ```
#[proc_macro_derive(
    GeoModel,
    attributes(model_name, natural_key, computed, geom_field, primary_key)
)]
pub fn derive_geo_model(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let inner_input = proc_macro2::TokenStream::from(input);
    proc_macro::TokenStream::from(derive_geo_model_inner(inner_input))
}

fn derive_geo_model_inner(input: proc_macro2::TokenStream) -> proc_macro2::TokenStream {
    let ast = parse2::<DeriveInput>(input).expect("GeoModel derive expected a struct");

    let name = &ast.ident;
    let model_name = get_str_attr(&ast.attrs, "model_name")
        .unwrap_or_else(|| name.to_string().to_lowercase());
    let natural_key = get_str_attr(&ast.attrs, "natural_key");
    let computed = get_computed(&ast.attrs);

    let fields = match &ast.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(fields) => fields.named.iter(),
            _ => panic!("GeoModel derive expected named fields"),
        },
        _ => panic!("GeoModel derive expected a struct"),
    }
    .collect::<Vec<&Field>>();

    impl_model(name, &fields, model_name, natural_key, computed, &ast.generics)
}

fn get_meta_attr(attrs: &[Attribute], name: &str) -> Option<Meta> {
    let mut temp = attrs
        .iter()
        .filter_map(|attr| attr.parse_meta().ok())
        .filter(|i| match i.path().get_ident() {
            Some(i) => i == name,
            None => false,
        })
        .collect::<Vec<Meta>>();
    temp.pop()
}

fn get_str_attr(attrs: &[Attribute], name: &str) -> Option<String> {
    get_meta_attr(attrs, name).map(|meta| match meta {
        Meta::NameValue(MetaNameValue {
            lit: Lit::Str(ls), ..
        }) => ls.value(),
        _ => panic!("{} expects a string value, e.g. #[{} = \"...\"]", name, name),
    })
}

fn get_computed(attrs: &[Attribute]) -> Vec<Ident> {
    match get_meta_attr(attrs, "computed") {
        Some(Meta::List(l)) => l
            .nested
            .iter()
            .map(|n| match n {
                NestedMeta::Meta(Meta::Path(p)) => p
                    .get_ident()
                    .cloned()
                    .expect("computed expects method names"),
                _ => panic!("computed expects method names"),
            })
            .collect(),
        Some(_) => panic!("computed expects a list of method names, e.g. #[computed(area)]"),
        None => Vec::new(),
    }
}

fn has_attr(field: &Field, name: &str) -> bool {
    field.attrs.iter().any(|a| a.path.is_ident(name))
}

#[derive(Debug, Clone)]
struct GeomInfo {
    geom_type: Option<&'static str>,
    has_z: bool,
    geojson: bool,
}

#[derive(Debug)]
struct FieldInfo {
    ident: Ident,
    geom_info: Option<GeomInfo>,
    primary_key: bool,
}

// the final type name, looking through Option
fn get_path_type_name(p: &TypePath) -> String {
    let final_segment = p
        .path
        .segments
        .last()
        .expect("GeoModel derive found an empty type path");
    if final_segment.ident == "Option" {
        if let syn::PathArguments::AngleBracketed(a) = &final_segment.arguments {
            if let Some(GenericArgument::Type(Type::Path(inner))) = a.args.first() {
                return get_path_type_name(inner);
            }
        }
    }
    final_segment.ident.to_string()
}

fn get_geom_field_info(field: &Field) -> Option<GeomInfo> {
    if !has_attr(field, "geom_field") {
        return None;
    }
    let declared = match get_meta_attr(&field.attrs, "geom_field") {
        Some(Meta::List(l)) => match l.nested.first() {
            Some(NestedMeta::Lit(Lit::Str(ls))) => ls.value(),
            _ => panic!("geom_field expects a geometry type name, e.g. #[geom_field(\"Point\")]"),
        },
        _ => String::from("GEOMETRY"),
    };
    let upper_name = declared.to_uppercase();
    let (geom_type, has_z) = *GEO_TYPES
        .get(upper_name.as_str())
        .unwrap_or_else(|| panic!("{} is not a supported geometry type", declared));
    let geojson = match &field.ty {
        Type::Path(tp) => get_path_type_name(tp) == "GeoJsonField",
        _ => false,
    };
    Some(GeomInfo {
        geom_type,
        has_z,
        geojson,
    })
}

fn impl_model(
    name: &Ident,
    fields: &[&Field],
    model_name: String,
    natural_key: Option<String>,
    computed: Vec<Ident>,
    generics: &syn::Generics,
) -> TokenStream {
    let field_infos: Vec<FieldInfo> = fields
        .iter()
        .map(|f| FieldInfo {
            ident: f.ident.clone().expect("Expected named field"),
            geom_info: get_geom_field_info(f),
            primary_key: has_attr(f, "primary_key"),
        })
        .collect();

    let geom_fields: Vec<&FieldInfo> = field_infos
        .iter()
        .filter(|f| f.geom_info.is_some())
        .collect();
    assert!(
        geom_fields.len() <= 1,
        "Found {} geometry fields, 1 is the maximum allowed amount",
        geom_fields.len()
    );
    let geometry_meta = match geom_fields.first() {
        Some(f) => {
            let info = f.geom_info.clone().expect("filtered on geom_info");
            let field_name = f.ident.to_string();
            let geom_type = match info.geom_type {
                Some(t) => {
                    let t = Ident::new(t, Span::call_site());
                    quote!(Some(geofeature::GeometryType::#t))
                }
                None => quote!(None),
            };
            let has_z = info.has_z;
            let storage = if info.geojson {
                quote!(geofeature::model::GeometryStorage::GeoJson)
            } else {
                quote!(geofeature::model::GeometryStorage::Wkt)
            };
            quote!(Some(geofeature::model::GeometryFieldMeta {
                name: #field_name,
                geometry_type: #geom_type,
                has_z: #has_z,
                storage: #storage,
            }))
        }
        None => quote!(None),
    };

    let pk_fields: Vec<&FieldInfo> = field_infos.iter().filter(|f| f.primary_key).collect();
    assert!(
        pk_fields.len() <= 1,
        "Found {} primary key fields, 1 is the maximum allowed amount",
        pk_fields.len()
    );
    let pk_ident = pk_fields
        .first()
        .map(|f| f.ident.clone())
        .or_else(|| field_infos.iter().find(|f| f.ident == "id").map(|f| f.ident.clone()));
    let (pk_meta, pk_body) = match &pk_ident {
        Some(ident) => {
            let pk_name = ident.to_string();
            (quote!(Some(#pk_name)), non_null(quote!(&self.#ident)))
        }
        None => (quote!(None), quote!(None)),
    };

    let natural_key_body = match natural_key {
        Some(nk) => {
            let ident = Ident::new(&nk, Span::call_site());
            if field_infos.iter().any(|f| f.ident == nk) {
                non_null(quote!(&self.#ident))
            } else {
                non_null(quote!(&self.#ident()))
            }
        }
        None => quote!(None),
    };

    let field_idents: Vec<&Ident> = field_infos.iter().map(|f| &f.ident).collect();
    let field_names: Vec<String> = field_infos.iter().map(|f| f.ident.to_string()).collect();
    let computed_names: Vec<String> = computed.iter().map(|c| c.to_string()).collect();

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    quote!(
        impl #impl_generics geofeature::ModelType for #name #ty_generics #where_clause {
            fn model_meta() -> &'static geofeature::ModelMeta {
                static META: geofeature::ModelMeta = geofeature::ModelMeta {
                    name: #model_name,
                    fields: &[#(#field_names),*],
                    computed: &[#(#computed_names),*],
                    geometry: #geometry_meta,
                    pk_field: #pk_meta,
                };
                &META
            }
        }

        impl #impl_generics geofeature::GeoModel for #name #ty_generics #where_clause {
            #[inline]
            fn meta(&self) -> &'static geofeature::ModelMeta {
                <Self as geofeature::ModelType>::model_meta()
            }

            fn pk(&self) -> Option<geofeature::serde_json::Value> {
                #pk_body
            }

            fn natural_key(&self) -> Option<geofeature::serde_json::Value> {
                #natural_key_body
            }

            fn attribute(&self, name: &str) -> Option<geofeature::Attribute> {
                match name {
                    #(#field_names => Some(geofeature::ToAttribute::to_attribute(&self.#field_idents)),)*
                    #(#computed_names => Some(geofeature::ToAttribute::to_attribute(&self.#computed())),)*
                    _ => None,
                }
            }
        }
    )
}

// the scalar value of an expression, None when it is null or not a scalar
fn non_null(expr: TokenStream) -> TokenStream {
    quote!(
        match geofeature::ToAttribute::to_attribute(#expr) {
            geofeature::Attribute::Value(v) if !v.is_null() => Some(v),
            _ => None,
        }
    )
}
