use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallejeroError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
    #[error("Geocoding error: {0}")]
    GeocodeError(#[from] callejero_osm::GeocodeError),
    #[error("Resolve error: {0}")]
    ResolveError(#[from] crate::resolve::ResolveError),
    #[error("Import error: {0}")]
    ImportError(#[from] callejero_osm::ImportError),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CallejeroError>;
