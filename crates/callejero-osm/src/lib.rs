//! OpenStreetMap backend plumbing for the `callejero` geometry resolver.
//!
//! Two public services are spoken to:
//! - the structured spatial backend (Overpass), queried with area-scoped
//!   way/node topology queries and answering with `elements`;
//! - the free-text backend (Nominatim), answering address searches and
//!   reverse (coordinate to address) lookups.
//!
//! Query strings are built by the pure [`query`] module, the HTTP side lives
//! in [`backend`], and the paced bulk import used to seed street directories
//! lives in [`import`].

pub mod backend;
pub mod descriptor;
pub mod geo;
pub mod import;
pub mod query;

mod error {
    use thiserror::Error;

    /// Failure modes of a single backend call.
    ///
    /// `NotFound` and `Unavailable` are expected outcomes: the resolver falls
    /// through on either of them instead of surfacing an error to the caller.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum GeocodeError {
        #[error("no usable results")]
        NotFound,
        #[error("{backend} unavailable: {reason}")]
        Unavailable {
            backend: &'static str,
            reason: String,
        },
        #[error("{backend} returned an undecodable response: {reason}")]
        Decode {
            backend: &'static str,
            reason: String,
        },
        #[error("Invalid backend URL: {0}")]
        InvalidUrl(String),
    }

    impl GeocodeError {
        /// Whether the failure is transient (worth a user-visible advisory).
        #[must_use]
        pub const fn is_transient(&self) -> bool {
            matches!(self, Self::Unavailable { .. })
        }
    }

    #[derive(Error, Debug)]
    pub enum ImportError {
        #[error("Region and country are both required for an import")]
        MissingScope,
        #[error("Listing failed: {0}")]
        Listing(#[from] GeocodeError),
        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }

    pub type Result<T> = std::result::Result<T, GeocodeError>;
}

pub use backend::{
    AddressDetails, FreeTextHit, GeocodingBackend, HttpGeocodingClient, HttpSettings,
    LocalityListing, NearbyWay, PlaceKind, ReverseHit, StreetListing, StreetNode,
};
pub use descriptor::{LocationDescriptor, names_match, normalize_name};
pub use error::{GeocodeError, ImportError, Result};
pub use geo::{Bounds, Coordinate, haversine_distance};
pub use import::{ImportReport, ImportedLocality, ImportedStreet, LocalityImporter, StreetImporter};
pub use query::{FreeTextQuery, QueryBuilder};
