//! GeoPackage feature layers as a record source.
use crate::gpkg_wkb::GeoPackageBinary;
use crate::model::Attribute;
use crate::result::{Error, Result};
use crate::srs::{defaults::*, SpatialRefSys};
use crate::types::{GeometryType, SpatialGeometry};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, DatabaseName, OpenFlags};
use serde_json::Value;
use std::path::Path;

const APPLICATION_ID: i32 = 0x47504B47;
const USER_VERSION: i32 = 10300;

const CREATE_SPATIAL_REF_SYS_TABLE: &str = "CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
)";

const CREATE_CONTENTS_TABLE: &str = "CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
)";

const CREATE_GEOMETRY_COLUMNS_TABLE: &str = "CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT uk_gc_table_name UNIQUE (table_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
)";

/// A GeoPackage, upon creation, the necessary tables for feature layers are created,
/// and validation is performed upon opening.
pub struct GeoPackage {
    /// The underlying rusqlite connection for the GeoPackage
    ///
    /// Access is provided here to allow a user to do what is necessary for their specific use case,
    /// but extra care should be taken if using this for write operations, since the
    /// integrity of the GeoPackage could be compromised.
    pub conn: Connection,
}

/// SQLite storage class of a layer's attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Blob => "BLOB",
        }
    }
}

/// Everything needed to register a feature layer.
#[derive(Debug, Clone)]
pub struct LayerDefinition {
    pub name: String,
    pub geometry_column: String,
    pub geometry_type: GeometryType,
    pub srid: i32,
    pub has_z: bool,
    pub columns: Vec<(String, ColumnType)>,
    pub description: String,
}

impl LayerDefinition {
    pub fn new(name: &str, geometry_type: GeometryType, srid: i32) -> Self {
        LayerDefinition {
            name: name.to_owned(),
            geometry_column: "geom".to_owned(),
            geometry_type,
            srid,
            has_z: false,
            columns: Vec::new(),
            description: String::new(),
        }
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push((name.to_owned(), column_type));
        self
    }
}

/// One feature read from a layer. The fid is the record's primary key and
/// the layer name its type name.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRow {
    pub layer: String,
    pub fid: i64,
    /// Every column except the fid, in table order
    pub values: Vec<(String, SqlValue)>,
    pub geometry_column: Option<String>,
}

impl LayerRow {
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        if name == "fid" {
            return Some(Attribute::Value(Value::from(self.fid)));
        }
        let value = self.get(name)?;
        let is_geometry = self.geometry_column.as_deref() == Some(name);
        Some(match value {
            SqlValue::Null => Attribute::Value(Value::Null),
            SqlValue::Integer(i) => Attribute::Value(Value::from(*i)),
            SqlValue::Real(f) => Attribute::Value(Value::from(*f)),
            SqlValue::Text(s) => Attribute::Value(Value::from(s.as_str())),
            SqlValue::Blob(b) if is_geometry => Attribute::Binary(b.clone()),
            SqlValue::Blob(b) => Attribute::Value(Value::from(hex_string(b))),
        })
    }
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl GeoPackage {
    /// Creates an empty geopackage with the following metadata tables:
    /// * gpkg_spatial_ref_sys
    /// * gpkg_contents
    /// * gpkg_geometry_columns
    ///
    /// # Examples
    /// ```no_run
    /// # use geofeature::GeoPackage;
    /// let gp = GeoPackage::create("./test.gpkg").unwrap();
    /// ```
    pub fn create<P: AsRef<Path>>(path: P) -> Result<GeoPackage> {
        let conn = Connection::open(path)?;
        let gpkg = GeoPackage { conn };
        gpkg.conn
            .pragma_update(Some(DatabaseName::Main), "application_id", APPLICATION_ID)?;
        gpkg.conn
            .pragma_update(Some(DatabaseName::Main), "user_version", USER_VERSION)?;
        gpkg.conn.execute(CREATE_SPATIAL_REF_SYS_TABLE, [])?;
        gpkg.new_srs(&WGS84)?;
        gpkg.new_srs(&WEB_MERCATOR)?;
        gpkg.new_srs(&CARTESIAN)?;
        gpkg.new_srs(&GEOGRAPHIC)?;
        gpkg.conn.execute(CREATE_CONTENTS_TABLE, [])?;
        gpkg.conn.execute(CREATE_GEOMETRY_COLUMNS_TABLE, [])?;
        Ok(gpkg)
    }

    fn new_srs(&self, srs: &SpatialRefSys) -> Result<()> {
        const STMT: &str = "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
        self.conn.execute(
            STMT,
            params![
                srs.name,
                srs.id,
                srs.organization,
                srs.organization_coordsys_id,
                srs.definition,
                srs.description,
            ],
        )?;
        Ok(())
    }

    /// Open a geopackage, doing validation of the GeoPackage internals to ensure that operation will work correctly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<GeoPackage> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let application_id: i32 =
            conn.query_row("SELECT * FROM pragma_application_id()", [], |row| {
                row.get(0)
            })?;
        if application_id != APPLICATION_ID {
            return Err(Error::InvalidGeoPackage);
        }
        let user_version: i32 =
            conn.query_row("SELECT * FROM pragma_user_version()", [], |row| row.get(0))?;
        tracing::debug!(user_version, "opening GeoPackage");
        let integrity_check: String =
            conn.query_row("SELECT * FROM pragma_integrity_check()", [], |row| {
                row.get(0)
            })?;
        if integrity_check != "ok" {
            return Err(Error::InvalidGeoPackage);
        }
        // use a block to force a drop of stmt and release the borrow
        // so that we can move conn
        {
            let mut stmt = conn.prepare("SELECT * FROM pragma_foreign_key_check()")?;
            let mut rows = stmt.query([])?;
            if rows.next()?.is_some() {
                return Err(Error::InvalidGeoPackage);
            }
        }
        Ok(GeoPackage { conn })
    }

    /// Close the geopackage
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::SQLite(e))
    }

    /// Creates a feature table and registers it in `gpkg_contents` and `gpkg_geometry_columns`.
    pub fn create_layer(&self, layer: &LayerDefinition) -> Result<()> {
        let mut columns = vec![
            "fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL".to_owned(),
            format!(
                "{} {}",
                quote_ident(&layer.geometry_column),
                layer.geometry_type.as_str().to_uppercase()
            ),
        ];
        columns.extend(
            layer
                .columns
                .iter()
                .map(|(name, t)| format!("{} {}", quote_ident(name), t.sql())),
        );
        self.conn.execute(
            &format!(
                "CREATE TABLE {} ({})",
                quote_ident(&layer.name),
                columns.join(", ")
            ),
            [],
        )?;
        self.conn.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, description, srs_id) VALUES (?1, 'features', ?1, ?2, ?3)",
            params![layer.name, layer.description, layer.srid],
        )?;
        self.conn.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                layer.name,
                layer.geometry_column,
                layer.geometry_type.as_str().to_uppercase(),
                layer.srid,
                layer.has_z as i32,
            ],
        )?;
        tracing::debug!(layer = %layer.name, "created feature layer");
        Ok(())
    }

    /// Names of every feature layer, in registration order
    pub fn layers(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn geometry_column(&self, layer: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1")?;
        let mut rows = stmt.query([layer])?;
        let column = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(column)
    }

    /// Insert one feature and return its fid. The geometry is stored as a GeoPackage blob.
    pub fn insert_feature(
        &self,
        layer: &str,
        geometry: Option<&SpatialGeometry>,
        values: &[(&str, SqlValue)],
    ) -> Result<i64> {
        let geometry_column = self
            .geometry_column(layer)?
            .ok_or_else(|| Error::UnknownModel(layer.to_owned()))?;
        let blob = match geometry {
            Some(g) => SqlValue::Blob(g.to_gpkg_blob()?),
            None => SqlValue::Null,
        };
        let names = std::iter::once(geometry_column.as_str())
            .chain(values.iter().map(|(k, _)| *k))
            .map(quote_ident)
            .collect::<Vec<_>>();
        let placeholders = (1..=names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(layer),
            names.join(", "),
            placeholders.join(", ")
        );
        let params = std::iter::once(&blob).chain(values.iter().map(|(_, v)| v));
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Read every feature of a layer, ordered by fid.
    pub fn read_layer(&self, layer: &str) -> Result<Vec<LayerRow>> {
        let geometry_column = self.geometry_column(layer)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY fid", quote_ident(layer)))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let fid_idx = names
            .iter()
            .position(|n| n == "fid")
            .ok_or(Error::InvalidGeoPackage)?;
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(names.len() - 1);
                for (i, name) in names.iter().enumerate() {
                    if i != fid_idx {
                        values.push((name.clone(), row.get::<_, SqlValue>(i)?));
                    }
                }
                Ok(LayerRow {
                    layer: layer.to_owned(),
                    fid: row.get(fid_idx)?,
                    values,
                    geometry_column: geometry_column.clone(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tracing::debug!(layer, rows = rows.len(), "read feature layer");
        Ok(rows)
    }
}
