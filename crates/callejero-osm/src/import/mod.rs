//! Paced bulk import of a region's street directory and localities.
//!
//! The free-text backend's usage policy allows roughly one request per
//! second, so enrichment requests are issued strictly one after another with
//! a configurable delay between them. Individual failures never abort a run:
//! the affected entry is recorded with locality `"Error"` and no coordinate.
//! A street the backend does not know is not a failure; it is recorded as
//! `"Desconocido"`, also without a coordinate.

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    Coordinate, GeocodeError, GeocodingBackend, ImportError,
    query::{FreeTextQuery, SINGLE_RESULT},
};

/// Default spacing between consecutive free-text requests.
pub const DEFAULT_PACING: Duration = Duration::from_millis(1000);
/// Locality recorded when the street is unknown or its hit has no
/// populated-place field.
pub const UNKNOWN_LOCALITY: &str = "Desconocido";
/// Locality recorded when the enrichment request itself failed.
pub const FAILED_LOCALITY: &str = "Error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedStreet {
    pub name: String,
    pub old_name: Option<String>,
    pub locality: String,
    pub coordinate: Option<Coordinate>,
}

impl ImportedStreet {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.locality == FAILED_LOCALITY && self.coordinate.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedLocality {
    pub name: String,
    pub place: String,
    pub coordinate: Coordinate,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport<T> {
    pub country: String,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failures: usize,
    pub items: Vec<T>,
}

impl<T: Serialize> ImportReport<T> {
    pub fn to_json(&self) -> Result<String, ImportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ImportError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!(path = ?path, items = self.items.len(), "Import report saved");
        Ok(())
    }
}

fn check_scope(country: &str, region: &str) -> Result<(), ImportError> {
    if country.trim().is_empty() || region.trim().is_empty() {
        return Err(ImportError::MissingScope);
    }
    Ok(())
}

#[cfg(feature = "progress")]
fn progress_bar(len: usize, message: String) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
            .expect("Progress bar template")
            .progress_chars("█░"),
    );
    pb.set_message(message);
    pb
}

/// Lists every named street of a region and geolocates each one.
#[derive(Debug)]
pub struct StreetImporter<'a, B> {
    backend: &'a B,
    pacing: Duration,
}

impl<'a, B: GeocodingBackend> StreetImporter<'a, B> {
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self {
            backend,
            pacing: DEFAULT_PACING,
        }
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run the import. Only the initial listing can fail the whole run.
    #[instrument(name = "Import streets", skip(self), level = "info")]
    pub async fn run(
        &self,
        country: &str,
        region: &str,
    ) -> Result<ImportReport<ImportedStreet>, ImportError> {
        check_scope(country, region)?;
        let started_at = Utc::now();

        let listings = self.backend.region_streets(country, region).await?;
        let listings: Vec<_> = listings
            .into_iter()
            .unique_by(|listing| listing.name.clone())
            .collect();
        info!(streets = listings.len(), "Listed region streets");

        #[cfg(feature = "progress")]
        let pb = progress_bar(listings.len(), format!("Importing streets of {region}"));

        let mut items = Vec::with_capacity(listings.len());
        let mut failures = 0;
        for (index, listing) in listings.into_iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let query = FreeTextQuery::new(
                format!("{}, {region}, {country}", listing.name),
                SINGLE_RESULT,
            );
            let item = match self.backend.resolve_free_text(&query).await {
                Ok(hits) => {
                    let hit = hits.into_iter().next();
                    let locality = hit
                        .as_ref()
                        .and_then(|h| h.address.locality())
                        .unwrap_or(UNKNOWN_LOCALITY)
                        .to_string();
                    debug!(street = %listing.name, %locality, "Street located");
                    ImportedStreet {
                        name: listing.name,
                        old_name: listing.old_name,
                        locality,
                        coordinate: hit.map(|h| h.coordinate),
                    }
                }
                Err(GeocodeError::NotFound) => {
                    debug!(street = %listing.name, "Street not known to the free-text backend");
                    ImportedStreet {
                        name: listing.name,
                        old_name: listing.old_name,
                        locality: UNKNOWN_LOCALITY.to_string(),
                        coordinate: None,
                    }
                }
                Err(e) => {
                    warn!(street = %listing.name, error = %e, "Street lookup failed");
                    failures += 1;
                    ImportedStreet {
                        name: listing.name,
                        old_name: listing.old_name,
                        locality: FAILED_LOCALITY.to_string(),
                        coordinate: None,
                    }
                }
            };
            items.push(item);

            #[cfg(feature = "progress")]
            pb.inc(1);
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        info!(imported = items.len(), failures, "Street import finished");
        Ok(ImportReport {
            country: country.to_string(),
            region: region.to_string(),
            started_at,
            finished_at: Utc::now(),
            failures,
            items,
        })
    }
}

/// Lists the cities, towns and villages of a region in a single request.
#[derive(Debug)]
pub struct LocalityImporter<'a, B> {
    backend: &'a B,
}

impl<'a, B: GeocodingBackend> LocalityImporter<'a, B> {
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    #[instrument(name = "Import localities", skip(self), level = "info")]
    pub async fn run(
        &self,
        country: &str,
        region: &str,
    ) -> Result<ImportReport<ImportedLocality>, ImportError> {
        check_scope(country, region)?;
        let started_at = Utc::now();

        let items: Vec<_> = self
            .backend
            .region_localities(country, region)
            .await?
            .into_iter()
            .unique_by(|listing| listing.name.clone())
            .map(|listing| ImportedLocality {
                name: listing.name,
                place: listing.place,
                coordinate: listing.coordinate,
            })
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect();
        info!(localities = items.len(), "Locality import finished");

        Ok(ImportReport {
            country: country.to_string(),
            region: region.to_string(),
            started_at,
            finished_at: Utc::now(),
            failures: 0,
            items,
        })
    }
}
