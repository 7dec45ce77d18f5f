//! Street corner search from raw topology.
//!
//! The structured backend supplies the nodes of street A's ways near an
//! approximate location; the free-text backend's reverse lookup tells which
//! roads touch each node. A node touched by street B is a corner.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, pin_mut, stream};
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

use crate::osm::{
    Coordinate, GeocodeError, GeocodingBackend, LocationDescriptor, StreetNode, names_match,
};

/// A confirmed corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Corner {
    pub node_id: i64,
    pub coordinate: Coordinate,
    /// Distance to the approximate location the search started from, meters.
    pub distance_m: f64,
}

#[derive(Debug)]
pub struct IntersectionResolver<B> {
    backend: Arc<B>,
    radius_m: u32,
    lookup_delay: Duration,
}

impl<B> Clone for IntersectionResolver<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            radius_m: self.radius_m,
            lookup_delay: self.lookup_delay,
        }
    }
}

impl<B: GeocodingBackend> IntersectionResolver<B> {
    pub const fn new(backend: Arc<B>, radius_m: u32, lookup_delay: Duration) -> Self {
        Self {
            backend,
            radius_m,
            lookup_delay,
        }
    }

    #[must_use]
    pub const fn radius_m(&self) -> u32 {
        self.radius_m
    }

    /// Find where `street_b` meets `street_a` near `near`.
    ///
    /// `scope` limits the lookup of `street_a` to its country and region.
    /// Candidates are confirmed nearest first with one reverse lookup each,
    /// spaced by the configured delay, so the first confirmed node is the
    /// nearest corner. When `street_a` has no ways in scope the search stops
    /// with `NotFound`; the radius is never widened.
    #[instrument(name = "Find corner", skip(self, scope), level = "debug", fields(radius_m = self.radius_m))]
    pub async fn find_corner(
        &self,
        scope: &LocationDescriptor,
        street_a: &str,
        street_b: &str,
        near: Coordinate,
    ) -> Result<Corner, GeocodeError> {
        let nodes = self
            .backend
            .street_nodes_near(scope, street_a, near, self.radius_m)
            .await?;

        let candidates: Vec<(StreetNode, f64)> = nodes
            .into_iter()
            .unique_by(|node| node.id)
            .map(|node| {
                let distance = node.coordinate.distance_to(&near);
                (node, distance)
            })
            .filter(|(_, distance)| *distance <= f64::from(self.radius_m))
            .sorted_by(|a, b| a.1.total_cmp(&b.1))
            .collect();
        debug!(candidates = candidates.len(), "Candidate nodes within radius");

        let lookups = stream::iter(candidates.into_iter().enumerate()).then(
            |(index, (node, distance))| async move {
                if index > 0 && !self.lookup_delay.is_zero() {
                    tokio::time::sleep(self.lookup_delay).await;
                }
                let outcome = self.backend.reverse(node.coordinate).await;
                (node, distance, outcome)
            },
        );
        pin_mut!(lookups);

        let mut last_transient = None;
        while let Some((node, distance, outcome)) = lookups.next().await {
            match outcome {
                Ok(hit) => {
                    let roads = hit.address.road_names();
                    if roads.iter().any(|road| names_match(road, street_b)) {
                        info!(node = node.id, distance_m = distance, "Corner confirmed");
                        return Ok(Corner {
                            node_id: node.id,
                            coordinate: node.coordinate,
                            distance_m: distance,
                        });
                    }
                    debug!(node = node.id, ?roads, "Node is not on the cross street");
                }
                Err(e) if e.is_transient() => {
                    warn!(node = node.id, error = %e, "Reverse lookup failed");
                    last_transient = Some(e);
                }
                Err(e) => debug!(node = node.id, error = %e, "Reverse lookup found nothing"),
            }
        }

        Err(last_transient.unwrap_or(GeocodeError::NotFound))
    }
}
