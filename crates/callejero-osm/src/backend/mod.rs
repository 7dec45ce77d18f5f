//! Backend seam and the HTTP client for the two public geocoding services.
//!
//! [`GeocodingBackend`] is the interface the resolver consumes. Every call
//! issues exactly one request; empty result sets and failed requests come
//! back as [`GeocodeError`] values so callers can fall through. Nothing here
//! retries, and nothing here paces requests: pacing is the caller's job (see
//! [`crate::import`]).

mod nominatim;
mod overpass;

use std::{collections::BTreeMap, time::Duration};

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    Coordinate, GeocodeError, LocationDescriptor, Result,
    query::{FreeTextQuery, QueryBuilder, reverse_url},
};

/// What kind of object a free-text hit is, as far as point selection cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    /// A single OSM node.
    Node,
    /// A named place (locality, neighbourhood, ...).
    Place,
    /// A house / building address.
    House,
    /// A linear way match (street, river, ...).
    Way,
    /// An area or relation match.
    Area,
    Other(String),
}

impl PlaceKind {
    /// Classify a hit from its `osm_type`, `class` and `type` attributes.
    #[must_use]
    pub fn classify(osm_type: &str, class: &str, place_type: &str) -> Self {
        match (osm_type, class, place_type) {
            ("node", _, _) => Self::Node,
            (_, _, "house") => Self::House,
            (_, "place", _) => Self::Place,
            ("way", _, _) => Self::Way,
            ("relation", _, _) => Self::Area,
            (other, _, _) => Self::Other(other.to_string()),
        }
    }

    /// Node, place and house hits can be rendered as a point marker;
    /// way and area matches cannot.
    #[must_use]
    pub const fn is_point_like(&self) -> bool {
        matches!(self, Self::Node | Self::Place | Self::House)
    }
}

/// Structured address as returned by the free-text backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetails {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub neighbourhood: Option<String>,
    #[serde(default)]
    pub hamlet: Option<String>,
    #[serde(default)]
    pub road: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
}

impl AddressDetails {
    /// City, town or village, in that order.
    #[must_use]
    pub fn city_like(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
    }

    /// The most specific locality name available, down to hamlet level.
    #[must_use]
    pub fn locality(&self) -> Option<&str> {
        self.city_like()
            .or(self.suburb.as_deref())
            .or(self.neighbourhood.as_deref())
            .or(self.hamlet.as_deref())
    }

    /// Road names touching the looked-up point. A corner may be reported as
    /// a comma- or semicolon-separated list.
    #[must_use]
    pub fn road_names(&self) -> Vec<&str> {
        self.road
            .as_deref()
            .map(|road| {
                road.split([',', ';'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The descriptor this address fills in. The first road is the street;
    /// the cross-street is never known here.
    #[must_use]
    pub fn to_descriptor(&self) -> LocationDescriptor {
        LocationDescriptor::new(self.country.clone().unwrap_or_default())
            .with_region(self.state.clone().unwrap_or_default())
            .with_city(self.city_like().unwrap_or_default())
            .with_street(self.road_names().first().copied().unwrap_or_default())
            .with_house_number(self.house_number.clone().unwrap_or_default())
    }
}

/// One free-text search candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeTextHit {
    pub coordinate: Coordinate,
    pub kind: PlaceKind,
    pub display_name: String,
    pub address: AddressDetails,
}

/// Result of a reverse (coordinate to address) lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseHit {
    pub coordinate: Coordinate,
    pub display_name: String,
    pub address: AddressDetails,
}

/// A topology node belonging to a street's ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetNode {
    pub id: i64,
    pub coordinate: Coordinate,
    pub tags: BTreeMap<String, String>,
}

/// A named way near a point, with its node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyWay {
    pub id: i64,
    pub name: String,
    pub nodes: Vec<i64>,
}

/// A street name listed for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetListing {
    pub name: String,
    pub old_name: Option<String>,
}

/// A populated place listed for a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityListing {
    pub name: String,
    pub place: String,
    pub coordinate: Coordinate,
}

/// The operations the resolver and importers need from the two backends.
///
/// Implemented over HTTP by [`HttpGeocodingClient`]; tests implement it with
/// scripted responses.
pub trait GeocodingBackend: Send + Sync {
    /// Structured query: every way named exactly like the descriptor's street
    /// in its innermost area, one coordinate sequence per way.
    fn resolve_line(
        &self,
        descriptor: &LocationDescriptor,
    ) -> impl Future<Output = Result<Vec<Vec<Coordinate>>>> + Send;

    /// Free-text search, candidates in backend rank order.
    fn resolve_free_text(
        &self,
        query: &FreeTextQuery,
    ) -> impl Future<Output = Result<Vec<FreeTextHit>>> + Send;

    /// Nodes of `street`'s ways within `radius_m` of `near`. `NotFound` when
    /// the street has no ways in the descriptor's scope.
    fn street_nodes_near(
        &self,
        scope: &LocationDescriptor,
        street: &str,
        near: Coordinate,
        radius_m: u32,
    ) -> impl Future<Output = Result<Vec<StreetNode>>> + Send;

    /// Reverse lookup of a coordinate.
    fn reverse(&self, coordinate: Coordinate) -> impl Future<Output = Result<ReverseHit>> + Send;

    /// Named highway ways within `radius_m` of `near`.
    fn highways_near(
        &self,
        near: Coordinate,
        radius_m: u32,
    ) -> impl Future<Output = Result<Vec<NearbyWay>>> + Send;

    /// All named highways of a region.
    fn region_streets(
        &self,
        country: &str,
        region: &str,
    ) -> impl Future<Output = Result<Vec<StreetListing>>> + Send;

    /// All cities, towns and villages of a region.
    fn region_localities(
        &self,
        country: &str,
        region: &str,
    ) -> impl Future<Output = Result<Vec<LocalityListing>>> + Send;
}

/// Connection settings for [`HttpGeocodingClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub overpass_url: Url,
    pub nominatim_url: Url,
    /// Sent with every request; the free-text backend's usage policy requires one.
    pub user_agent: String,
    pub timeout: Duration,
}

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("callejero/", env!("CARGO_PKG_VERSION"));

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            overpass_url: Url::parse(DEFAULT_OVERPASS_URL).expect("default URL should parse"),
            nominatim_url: Url::parse(DEFAULT_NOMINATIM_URL).expect("default URL should parse"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`GeocodingBackend`] over HTTP: POSTs structured queries to Overpass and
/// GETs search/reverse URLs from Nominatim.
#[derive(Debug, Clone)]
pub struct HttpGeocodingClient {
    client: Client,
    settings: HttpSettings,
    queries: QueryBuilder,
}

impl HttpGeocodingClient {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GeocodeError::Unavailable {
                backend: "http",
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            settings,
            queries: QueryBuilder::default(),
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    fn unavailable(backend: &'static str, error: &reqwest::Error) -> GeocodeError {
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else {
            error.to_string()
        };
        warn!(backend, %reason, "Backend request failed");
        GeocodeError::Unavailable { backend, reason }
    }

    async fn read_body(backend: &'static str, response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            warn!(backend, %status, "Backend answered with an error status");
            return Err(GeocodeError::Unavailable {
                backend,
                reason: format!("HTTP {status}"),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::unavailable(backend, &e))?;
        Ok(body.to_vec())
    }

    #[instrument(level = "debug", skip(self, query), fields(bytes = query.len()))]
    async fn structured(&self, query: String) -> Result<overpass::OverpassResponseDto> {
        let backend = overpass::BACKEND;
        let response = self
            .client
            .post(self.settings.overpass_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(query)
            .send()
            .await
            .map_err(|e| Self::unavailable(backend, &e))?;
        let body = Self::read_body(backend, response).await?;
        overpass::decode(&body)
    }

    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn free_text_get(&self, url: Url) -> Result<Vec<u8>> {
        let backend = nominatim::BACKEND;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::unavailable(backend, &e))?;
        Self::read_body(backend, response).await
    }
}

impl GeocodingBackend for HttpGeocodingClient {
    #[instrument(level = "debug", skip(self), fields(descriptor = %descriptor))]
    async fn resolve_line(&self, descriptor: &LocationDescriptor) -> Result<Vec<Vec<Coordinate>>> {
        let Some(query) = self.queries.street_ways(descriptor) else {
            debug!("Descriptor lacks country, region or street for a structured query");
            return Err(GeocodeError::NotFound);
        };
        self.structured(query).await?.into_lines()
    }

    #[instrument(level = "debug", skip(self), fields(q = %query.text, limit = query.limit))]
    async fn resolve_free_text(&self, query: &FreeTextQuery) -> Result<Vec<FreeTextHit>> {
        let url = query.to_url(&self.settings.nominatim_url)?;
        let body = self.free_text_get(url).await?;
        nominatim::decode_search(&body)
    }

    #[instrument(level = "debug", skip(self, scope), fields(near = %near))]
    async fn street_nodes_near(
        &self,
        scope: &LocationDescriptor,
        street: &str,
        near: Coordinate,
        radius_m: u32,
    ) -> Result<Vec<StreetNode>> {
        let query = self.queries.street_nodes_near(scope, street, near, radius_m);
        self.structured(query).await?.into_street_nodes()
    }

    #[instrument(level = "debug", skip(self), fields(coordinate = %coordinate))]
    async fn reverse(&self, coordinate: Coordinate) -> Result<ReverseHit> {
        let url = reverse_url(&self.settings.nominatim_url, coordinate)?;
        let body = self.free_text_get(url).await?;
        nominatim::decode_reverse(&body)
    }

    #[instrument(level = "debug", skip(self), fields(near = %near))]
    async fn highways_near(&self, near: Coordinate, radius_m: u32) -> Result<Vec<NearbyWay>> {
        let query = self.queries.highways_near(near, radius_m);
        Ok(self.structured(query).await?.into_nearby_ways())
    }

    #[instrument(level = "debug", skip(self))]
    async fn region_streets(&self, country: &str, region: &str) -> Result<Vec<StreetListing>> {
        let query = self.queries.region_streets(country, region);
        Ok(self.structured(query).await?.into_street_listings())
    }

    #[instrument(level = "debug", skip(self))]
    async fn region_localities(
        &self,
        country: &str,
        region: &str,
    ) -> Result<Vec<LocalityListing>> {
        let query = self.queries.region_localities(country, region);
        Ok(self.structured(query).await?.into_locality_listings())
    }
}
