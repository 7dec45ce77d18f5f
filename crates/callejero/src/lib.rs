//! Callejero - Street Address to Map Geometry
//!
//! Callejero resolves a partially-filled location descriptor (country,
//! region, city, street, house number, cross-street) into map geometry: a
//! street centerline, an address point or a street corner. It talks to two
//! public OpenStreetMap services, a structured spatial backend (Overpass) and
//! a free-text search backend (Nominatim), and keeps an owned scene of map
//! layers in step with the descriptor.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use callejero::{LocationDescriptor, MapSession};
//!
//! # async fn demo() -> Result<(), callejero::error::CallejeroError> {
//! let mut session = MapSession::builder().build()?;
//!
//! // A street alone renders its centerline
//! let street = LocationDescriptor::new("Uruguay")
//!     .with_region("Montevideo")
//!     .with_street("18 de Julio");
//! session.update(street.clone()).await;
//! assert!(session.scene().has_line());
//!
//! // Adding a house number switches to a point marker
//! session.update(street.with_house_number("1234")).await;
//! if let Some(center) = session.center_hint() {
//!     println!("Centered on {} at zoom {}", center.coordinate, center.zoom);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Resolution precedence
//!
//! 1. House number without cross-street: a point from free-text search.
//! 2. Cross-street: the corner, found from street topology, with a
//!    free-text `street y cross` fallback.
//! 3. Street only: the street's line geometry, no fallback.
//! 4. No street: a point for the city, region or country.
//!
//! Failures never panic or propagate as errors to the scene: the location
//! layers are left empty and a short advisory is available from
//! [`ResolveError::advisory`].
//!
//! # Rate limits
//!
//! Both services are shared public infrastructure. Bulk work such as
//! [`osm::StreetImporter`] serializes its requests with at least one second
//! between them, and the corner search spaces its reverse lookups.
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

pub mod config;
mod core;
pub mod error;
pub mod intersection;
pub mod resolve;
pub mod scene;
pub mod transform;

pub use crate::core::{
    ApplyOutcome, CompletedResolution, MapSession, MapSessionBuilder, PendingResolution,
    ResolutionListener,
};

pub use callejero_osm as osm;
pub use callejero_osm::{Bounds, Coordinate, GeocodingBackend, HttpGeocodingClient, LocationDescriptor};
pub use config::{ResolverConfig, ResolverConfigBuilder, ZoomLevels};
pub use intersection::{Corner, IntersectionResolver};
pub use resolve::{
    CenterHint, GeometryResolver, PointSource, Resolution, ResolveError, ResolvedGeometry,
    ResolvedPoint,
};
pub use scene::{Feature, LayerId, SceneGraph, SceneLayer, SceneRenderer, Viewport};
pub use transform::{Hemisphere, MobileUnitPosition, UnitLocation, to_geographic, to_projected};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Callejero library.
///
/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG` when set, by
/// `level` otherwise. Safe to call more than once; only the first call has
/// an effect.
///
/// # Examples
///
/// ```rust
/// use callejero::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), callejero::error::CallejeroError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::CallejeroError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("hyper_util=warn".parse()?)
            .add_directive("reqwest=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    })
}
