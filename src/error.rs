// error.rs — error types for configuration, markers, loading and the viewer API

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot parse angle \"{0}\"")]
    InvalidAngle(String),
    #[error("unknown speed unit \"{0}\"")]
    UnknownSpeedUnit(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkerError {
    #[error("marker has no id")]
    MissingId,
    #[error("marker \"{0}\": missing image or html content")]
    MissingContent(String),
    #[error("marker \"{0}\": missing coordinates (longitude/latitude, x/y, polygon or circle)")]
    MissingCoordinates(String),
    #[error("marker \"{id}\": polygon needs at least 3 vertices, got {count}")]
    PolygonTooShort { id: String, count: usize },
    #[error("marker \"{0}\": polygon coordinate list has odd length")]
    PolygonOddLength(String),
    #[error("marker \"{0}\": coordinates are not finite")]
    NonFinite(String),
    #[error("marker \"{0}\" already exists")]
    DuplicateId(String),
    #[error("no marker with id \"{0}\"")]
    UnknownId(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("cannot open {source_id}: {reason}")]
    Open { source_id: String, reason: String },
    #[error("cannot decode {source_id}: {reason}")]
    Decode { source_id: String, reason: String },
    #[error("loader for {0} went away")]
    Disconnected(String),
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("animation target is not finite: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
