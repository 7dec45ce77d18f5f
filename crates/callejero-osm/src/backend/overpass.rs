//! Structured spatial backend (Overpass) response decoding.
//!
//! Responses are decoded into transport DTOs first, then mapped into the
//! backend-neutral records in one pass.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, trace};

use super::{LocalityListing, NearbyWay, StreetListing, StreetNode};
use crate::{Coordinate, GeocodeError, Result};

pub(super) const BACKEND: &str = "overpass";

#[derive(Debug, Deserialize)]
pub(super) struct OverpassResponseDto {
    #[serde(default)]
    pub(super) elements: Vec<OverpassElementDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OverpassElementDto {
    #[serde(rename = "type")]
    pub(super) element_type: String,
    pub(super) id: i64,
    pub(super) lat: Option<f64>,
    pub(super) lon: Option<f64>,
    #[serde(default)]
    pub(super) geometry: Option<Vec<Option<OverpassPointDto>>>,
    #[serde(default)]
    pub(super) nodes: Option<Vec<i64>>,
    #[serde(default)]
    pub(super) tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OverpassPointDto {
    pub(super) lat: f64,
    pub(super) lon: f64,
}

impl OverpassElementDto {
    fn is_way(&self) -> bool {
        self.element_type == "way"
    }

    fn is_node(&self) -> bool {
        self.element_type == "node"
    }

    fn coordinate(&self) -> Option<Coordinate> {
        let coordinate = Coordinate::new(self.lat?, self.lon?);
        coordinate.is_valid().then_some(coordinate)
    }

    fn name(&self) -> Option<&str> {
        self.tags.get("name").map(String::as_str)
    }

    /// Way geometry as an ordered coordinate sequence. Overpass emits `null`
    /// for vertices outside the bounding box, those are skipped.
    fn line(&self) -> Option<Vec<Coordinate>> {
        let line: Vec<Coordinate> = self
            .geometry
            .as_ref()?
            .iter()
            .flatten()
            .map(|p| Coordinate::new(p.lat, p.lon))
            .filter(Coordinate::is_valid)
            .collect();
        (line.len() >= 2).then_some(line)
    }
}

pub(super) fn decode(body: &[u8]) -> Result<OverpassResponseDto> {
    serde_json::from_slice(body).map_err(|e| GeocodeError::Decode {
        backend: BACKEND,
        reason: e.to_string(),
    })
}

impl OverpassResponseDto {
    /// One coordinate sequence per matched way segment.
    pub(super) fn into_lines(self) -> Result<Vec<Vec<Coordinate>>> {
        let lines: Vec<_> = self
            .elements
            .iter()
            .filter(|el| el.is_way())
            .filter_map(OverpassElementDto::line)
            .collect();
        debug!(ways = lines.len(), "Decoded street geometry");
        if lines.is_empty() {
            Err(GeocodeError::NotFound)
        } else {
            Ok(lines)
        }
    }

    /// Candidate nodes of a street. `NotFound` when the street's ways are absent.
    pub(super) fn into_street_nodes(self) -> Result<Vec<StreetNode>> {
        let way_count = self.elements.iter().filter(|el| el.is_way()).count();
        if way_count == 0 {
            debug!("Street has no ways in scope");
            return Err(GeocodeError::NotFound);
        }
        let nodes: Vec<_> = self
            .elements
            .into_iter()
            .filter(OverpassElementDto::is_node)
            .filter_map(|el| {
                let coordinate = el.coordinate()?;
                Some(StreetNode {
                    id: el.id,
                    coordinate,
                    tags: el.tags,
                })
            })
            .collect();
        trace!(way_count, nodes = nodes.len(), "Decoded street nodes");
        Ok(nodes)
    }

    pub(super) fn into_nearby_ways(self) -> Vec<NearbyWay> {
        self.elements
            .into_iter()
            .filter(OverpassElementDto::is_way)
            .filter_map(|el| {
                let name = el.name()?.to_string();
                Some(NearbyWay {
                    id: el.id,
                    name,
                    nodes: el.nodes.unwrap_or_default(),
                })
            })
            .collect()
    }

    pub(super) fn into_street_listings(self) -> Vec<StreetListing> {
        self.elements
            .into_iter()
            .filter(OverpassElementDto::is_way)
            .filter_map(|mut el| {
                let name = el.tags.remove("name")?;
                Some(StreetListing {
                    name,
                    old_name: el.tags.remove("old_name"),
                })
            })
            .collect()
    }

    pub(super) fn into_locality_listings(self) -> Vec<LocalityListing> {
        self.elements
            .into_iter()
            .filter(OverpassElementDto::is_node)
            .filter_map(|el| {
                let coordinate = el.coordinate()?;
                let name = el.name()?.to_string();
                Some(LocalityListing {
                    name,
                    place: el.tags.get("place").cloned().unwrap_or_default(),
                    coordinate,
                })
            })
            .collect()
    }
}
