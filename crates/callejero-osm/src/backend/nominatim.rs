//! Free-text search / reverse-geocoding backend (Nominatim) response decoding.

use serde::Deserialize;
use tracing::trace;

use super::{AddressDetails, FreeTextHit, PlaceKind, ReverseHit};
use crate::{Coordinate, GeocodeError, Result};

pub(super) const BACKEND: &str = "nominatim";

#[derive(Debug, Deserialize)]
pub(super) struct PlaceDto {
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
    #[serde(default)]
    osm_type: Option<String>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default, rename = "type")]
    place_type: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: AddressDetails,
    /// Set by the reverse endpoint when nothing could be geocoded.
    #[serde(default)]
    error: Option<String>,
}

impl PlaceDto {
    fn coordinate(&self) -> Option<Coordinate> {
        let lat = self.lat.as_deref()?.trim().parse().ok()?;
        let lon = self.lon.as_deref()?.trim().parse().ok()?;
        let coordinate = Coordinate::new(lat, lon);
        coordinate.is_valid().then_some(coordinate)
    }

    fn kind(&self) -> PlaceKind {
        PlaceKind::classify(
            self.osm_type.as_deref().unwrap_or_default(),
            self.class.as_deref().unwrap_or_default(),
            self.place_type.as_deref().unwrap_or_default(),
        )
    }

    fn into_hit(self) -> Option<FreeTextHit> {
        let coordinate = self.coordinate()?;
        let kind = self.kind();
        Some(FreeTextHit {
            coordinate,
            kind,
            display_name: self.display_name.unwrap_or_default(),
            address: self.address,
        })
    }
}

fn decode_error(e: &serde_json::Error) -> GeocodeError {
    GeocodeError::Decode {
        backend: BACKEND,
        reason: e.to_string(),
    }
}

/// Decode a search response. Entries without a usable coordinate are
/// skipped; an empty list is `NotFound`.
pub(super) fn decode_search(body: &[u8]) -> Result<Vec<FreeTextHit>> {
    let places: Vec<PlaceDto> = serde_json::from_slice(body).map_err(|e| decode_error(&e))?;
    let total = places.len();
    let hits: Vec<_> = places.into_iter().filter_map(PlaceDto::into_hit).collect();
    trace!(total, usable = hits.len(), "Decoded free-text results");
    if hits.is_empty() {
        Err(GeocodeError::NotFound)
    } else {
        Ok(hits)
    }
}

/// Decode a reverse response; the backend's `error` payload is `NotFound`.
pub(super) fn decode_reverse(body: &[u8]) -> Result<ReverseHit> {
    let place: PlaceDto = serde_json::from_slice(body).map_err(|e| decode_error(&e))?;
    if let Some(error) = &place.error {
        trace!(error, "Reverse lookup found nothing");
        return Err(GeocodeError::NotFound);
    }
    let coordinate = place.coordinate().ok_or(GeocodeError::NotFound)?;
    Ok(ReverseHit {
        coordinate,
        display_name: place.display_name.unwrap_or_default(),
        address: place.address,
    })
}
