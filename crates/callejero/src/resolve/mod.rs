//! Descriptor → geometry decision policy.
//!
//! Every call starts from scratch with the full descriptor. The branch taken
//! depends only on which facets are set:
//!
//! | house number | cross-street | street | result                              |
//! |--------------|--------------|--------|-------------------------------------|
//! | set          | unset        | set    | `Point` from free text (first node, place or house hit) |
//! | any          | set          | set    | `Point` at the corner, free-text corner query as fallback |
//! | unset        | unset        | set    | `Line` from the structured query, no fallback |
//! | any          | any          | unset  | `Point` for the administrative chain |

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{ResolverConfig, ZoomLevels},
    intersection::IntersectionResolver,
    osm::{
        Bounds, Coordinate, FreeTextHit, FreeTextQuery, GeocodeError, GeocodingBackend,
        LocationDescriptor, QueryBuilder, query::SINGLE_RESULT,
    },
};

/// Where a resolved point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PointSource {
    /// Free-text match of street and house number.
    HouseNumber,
    /// Corner confirmed from street topology.
    Intersection,
    /// Free-text match of the `street y cross` phrasing.
    CornerText,
    /// Centroid of a city, region or country.
    Administrative,
    /// Single hit of a free-text candidate search.
    Candidate,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedPoint {
    pub coordinate: Coordinate,
    pub source: PointSource,
    /// Backend display name, when there is one.
    pub label: Option<String>,
}

/// Renderable result of one resolution. Exactly one variant, never a line
/// and a point together.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolvedGeometry {
    /// One coordinate sequence per matched way segment.
    Line(Vec<Vec<Coordinate>>),
    Point(ResolvedPoint),
    /// Several free-text candidates.
    MultiPoint(Vec<Coordinate>),
}

impl ResolvedGeometry {
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Self::Line(lines) => Bounds::from_coordinates(lines.iter().flatten()),
            Self::Point(point) => Some(Bounds::point(point.coordinate)),
            Self::MultiPoint(points) => Bounds::from_coordinates(points),
        }
    }

    fn coordinate_count(&self) -> usize {
        match self {
            Self::Line(lines) => lines.iter().map(Vec::len).sum(),
            Self::Point(_) => 1,
            Self::MultiPoint(points) => points.len(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Point(_) => "point",
            Self::MultiPoint(_) => "multipoint",
        }
    }
}

/// Map center and zoom for a resolved geometry. `fit` carries the bounding
/// box when the view should be fitted rather than centered.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CenterHint {
    pub coordinate: Coordinate,
    pub zoom: u8,
    pub fit: Option<Bounds>,
}

impl CenterHint {
    /// Bounding-box fit for lines and multi-points with at least two
    /// coordinates, a fixed zoom on the point otherwise.
    #[must_use]
    pub fn for_geometry(geometry: &ResolvedGeometry, zoom: u8) -> Option<Self> {
        let bounds = geometry.bounds()?;
        let fit = (geometry.coordinate_count() >= 2).then_some(bounds);
        Some(Self {
            coordinate: bounds.center(),
            zoom,
            fit,
        })
    }
}

/// A geometry together with the view it should be shown with.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    pub geometry: ResolvedGeometry,
    pub center: CenterHint,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Descriptor has nothing to resolve")]
    EmptyDescriptor,
    #[error("No geometry found for {0}")]
    NoGeometry(String),
    #[error("Geocoding service unavailable: {0}")]
    Unavailable(GeocodeError),
    #[error("Backend error: {0}")]
    Backend(GeocodeError),
}

impl ResolveError {
    fn from_backend(error: GeocodeError, subject: &impl fmt::Display) -> Self {
        match error {
            GeocodeError::NotFound | GeocodeError::Decode { .. } => {
                Self::NoGeometry(subject.to_string())
            }
            e @ GeocodeError::Unavailable { .. } => Self::Unavailable(e),
            e @ GeocodeError::InvalidUrl(_) => Self::Backend(e),
        }
    }

    /// Message shown to the user when the scene is left empty.
    #[must_use]
    pub const fn advisory(&self) -> &'static str {
        match self {
            Self::EmptyDescriptor => "enter a location to search",
            Self::NoGeometry(_) => "no geometry found",
            Self::Unavailable(_) | Self::Backend(_) => "service temporarily unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Which precedence branch a descriptor falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    HouseNumber,
    Intersection,
    StreetLine,
    Administrative,
}

impl Branch {
    /// `None` when the descriptor has no facet at all.
    #[must_use]
    pub fn of(descriptor: &LocationDescriptor) -> Option<Self> {
        match (
            descriptor.street(),
            descriptor.house_number(),
            descriptor.cross_street(),
        ) {
            (Some(_), Some(_), None) => Some(Self::HouseNumber),
            (Some(_), _, Some(_)) => Some(Self::Intersection),
            (Some(_), None, None) => Some(Self::StreetLine),
            (None, ..) if !descriptor.admin_chain().is_empty() => Some(Self::Administrative),
            (None, ..) => None,
        }
    }
}

pub struct GeometryResolver<B> {
    backend: Arc<B>,
    corners: IntersectionResolver<B>,
    zoom: ZoomLevels,
}

impl<B> fmt::Debug for GeometryResolver<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryResolver")
            .field("zoom", &self.zoom)
            .finish_non_exhaustive()
    }
}

impl<B: GeocodingBackend> GeometryResolver<B> {
    pub fn new(backend: Arc<B>, config: &ResolverConfig) -> Self {
        let corners = IntersectionResolver::new(
            Arc::clone(&backend),
            config.corner_radius_m,
            config.reverse_lookup_delay,
        );
        Self {
            backend,
            corners,
            zoom: config.zoom,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve a descriptor into geometry and its view.
    #[instrument(name = "Resolve descriptor", skip(self, descriptor), fields(descriptor = %descriptor), level = "info")]
    pub async fn resolve(&self, descriptor: &LocationDescriptor) -> Result<Resolution> {
        let branch = Branch::of(descriptor).ok_or(ResolveError::EmptyDescriptor)?;
        debug!(?branch, "Precedence branch chosen");

        let (geometry, zoom) = match branch {
            Branch::HouseNumber => (self.house_number(descriptor).await?, self.zoom.house),
            Branch::Intersection => (self.intersection(descriptor).await?, self.zoom.house),
            Branch::StreetLine => (self.street_line(descriptor).await?, self.zoom.street),
            Branch::Administrative => (
                self.administrative(descriptor).await?,
                self.administrative_zoom(descriptor),
            ),
        };

        let center = CenterHint::for_geometry(&geometry, zoom)
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        info!(kind = geometry.kind(), zoom, "Descriptor resolved");
        Ok(Resolution { geometry, center })
    }

    /// Free-text candidate search. One hit is a `Point`, several are a
    /// `MultiPoint` fitted by their bounding box.
    #[instrument(name = "Candidate search", skip(self), level = "info")]
    pub async fn search(&self, text: &str, limit: u8) -> Result<Resolution> {
        if text.trim().is_empty() {
            return Err(ResolveError::EmptyDescriptor);
        }
        let hits = self
            .backend
            .resolve_free_text(&FreeTextQuery::new(text.trim(), limit))
            .await
            .map_err(|e| ResolveError::from_backend(e, &text))?;

        let geometry = match hits.as_slice() {
            [single] => ResolvedGeometry::Point(ResolvedPoint {
                coordinate: single.coordinate,
                source: PointSource::Candidate,
                label: Some(single.display_name.clone()),
            }),
            _ => ResolvedGeometry::MultiPoint(hits.iter().map(|h| h.coordinate).collect()),
        };
        let center = CenterHint::for_geometry(&geometry, self.zoom.house)
            .ok_or_else(|| ResolveError::NoGeometry(text.to_string()))?;
        debug!(candidates = hits.len(), "Candidates found");
        Ok(Resolution { geometry, center })
    }

    async fn free_text(
        &self,
        query: &FreeTextQuery,
        descriptor: &LocationDescriptor,
    ) -> Result<Vec<FreeTextHit>> {
        self.backend.resolve_free_text(query).await.map_err(|e| {
            if e.is_transient() {
                warn!(error = %e, q = %query.text, "Free-text lookup failed");
            }
            ResolveError::from_backend(e, descriptor)
        })
    }

    async fn house_number(&self, descriptor: &LocationDescriptor) -> Result<ResolvedGeometry> {
        let query = QueryBuilder::free_text_query(descriptor)
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        let hits = self.free_text(&query, descriptor).await?;
        if hits.len() > 1 {
            debug!(candidates = hits.len(), "Several candidates, taking the first point-like hit");
        }
        let hit = hits
            .into_iter()
            .find(|hit| hit.kind.is_point_like())
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        Ok(point(hit, PointSource::HouseNumber))
    }

    async fn intersection(&self, descriptor: &LocationDescriptor) -> Result<ResolvedGeometry> {
        let (Some(street), Some(cross)) = (descriptor.street(), descriptor.cross_street()) else {
            return Err(ResolveError::NoGeometry(descriptor.to_string()));
        };

        match self.corner(descriptor, street, cross).await {
            Ok(coordinate) => {
                return Ok(ResolvedGeometry::Point(ResolvedPoint {
                    coordinate,
                    source: PointSource::Intersection,
                    label: Some(format!("{street} y {cross}")),
                }));
            }
            Err(e) => debug!(error = %e, "Corner search failed, trying the corner phrasing"),
        }

        let query = QueryBuilder::corner_text(descriptor)
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        let hit = self
            .free_text(&query, descriptor)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        Ok(point(hit, PointSource::CornerText))
    }

    /// Approximate the street's location with a free-text lookup, then
    /// search the corner around it.
    async fn corner(
        &self,
        descriptor: &LocationDescriptor,
        street: &str,
        cross: &str,
    ) -> std::result::Result<Coordinate, GeocodeError> {
        let street_only = LocationDescriptor::new(descriptor.country().unwrap_or_default())
            .with_region(descriptor.region().unwrap_or_default())
            .with_city(descriptor.city().unwrap_or_default())
            .with_street(street);
        let text = QueryBuilder::free_text(&street_only).ok_or(GeocodeError::NotFound)?;
        let near = self
            .backend
            .resolve_free_text(&FreeTextQuery::new(text, SINGLE_RESULT))
            .await?
            .first()
            .map(|hit| hit.coordinate)
            .ok_or(GeocodeError::NotFound)?;

        let corner = self.corners.find_corner(descriptor, street, cross, near).await?;
        Ok(corner.coordinate)
    }

    async fn street_line(&self, descriptor: &LocationDescriptor) -> Result<ResolvedGeometry> {
        match self.backend.resolve_line(descriptor).await {
            Ok(lines) => {
                debug!(ways = lines.len(), "Street geometry found");
                Ok(ResolvedGeometry::Line(lines))
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "Structured street query failed");
                }
                Err(ResolveError::from_backend(e, descriptor))
            }
        }
    }

    async fn administrative(&self, descriptor: &LocationDescriptor) -> Result<ResolvedGeometry> {
        let text = descriptor.admin_chain().join(", ");
        let query = FreeTextQuery::new(text, SINGLE_RESULT);
        let hit = self
            .free_text(&query, descriptor)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NoGeometry(descriptor.to_string()))?;
        Ok(point(hit, PointSource::Administrative))
    }

    fn administrative_zoom(&self, descriptor: &LocationDescriptor) -> u8 {
        if descriptor.city().is_some() {
            self.zoom.city
        } else if descriptor.region().is_some() {
            self.zoom.region
        } else {
            self.zoom.country
        }
    }
}

fn point(hit: FreeTextHit, source: PointSource) -> ResolvedGeometry {
    ResolvedGeometry::Point(ResolvedPoint {
        coordinate: hit.coordinate,
        source,
        label: Some(hit.display_name).filter(|s| !s.is_empty()),
    })
}
