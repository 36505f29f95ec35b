/// The result returned by many methods within the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record could not be turned into a feature. Aborts the whole serialize call.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The GeoJSON input could not be turned into records. Wraps the original cause.
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] Box<Error>),
    /// A GeoJSON value does not match the geometry type a field expects.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A capability required by the requested operation is not available.
    #[error("Improperly configured: {0}")]
    Configuration(String),
    #[error("Invalid tile request: {0}")]
    InvalidTileRequest(String),
    #[error("Error decoding geometry: {0}")]
    GeomDecode(String),
    #[error("Error encoding geometry")]
    GeomEncode,
    #[error("Unsupported geometry type")]
    UnsupportedGeometryType,
    #[error("Unknown model {0}")]
    UnknownModel(String),
    #[error("Feature has no model property and no model name was given")]
    MissingModel,
    #[error("Error when accessing the SQLite database")]
    SQLite(#[from] rusqlite::Error),
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("GeoPackage failed validation check when opening")]
    InvalidGeoPackage,
}

impl From<wkb::WKBReadError> for Error {
    fn from(e: wkb::WKBReadError) -> Self {
        Error::GeomDecode(format!("{:?}", e))
    }
}

impl From<wkb::WKBWriteError> for Error {
    fn from(_: wkb::WKBWriteError) -> Self {
        Error::GeomEncode
    }
}

impl Error {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::GeomDecode(msg.into())
    }

    /// Wrap any error as the cause of a failed deserialization, without nesting twice.
    pub(crate) fn into_deserialization(self) -> Self {
        match self {
            e @ Error::Deserialization(_) => e,
            e => Error::Deserialization(Box::new(e)),
        }
    }
}
