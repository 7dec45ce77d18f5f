//! Query construction for both backend dialects.
//!
//! Nothing here touches the network: every function produces a query body
//! (structured dialect) or a URL (free-text dialect) and can be tested on its
//! own.

use std::fmt::Write as _;

use reqwest::Url;

use crate::{Coordinate, GeocodeError, LocationDescriptor, Result};

/// Result limit when a free-text query is expected to pin down one place.
pub const SINGLE_RESULT: u8 = 1;
/// Result limit when several candidates must be inspected before picking one.
pub const AMBIGUOUS_RESULTS: u8 = 5;

/// Escape a value for use inside a double-quoted structured-query string.
fn quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A free-text search request: the address string plus the result cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeTextQuery {
    pub text: String,
    pub limit: u8,
}

impl FreeTextQuery {
    #[must_use]
    pub fn new(text: impl Into<String>, limit: u8) -> Self {
        Self {
            text: text.into(),
            limit: limit.max(1),
        }
    }

    /// Full search URL against a free-text backend rooted at `base`.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        let mut url = join(base, "search")?;
        url.query_pairs_mut()
            .append_pair("q", &self.text)
            .append_pair("format", "json")
            .append_pair("addressdetails", "1")
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }
}

fn join(base: &Url, endpoint: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(endpoint)
        .map_err(|e| GeocodeError::InvalidUrl(format!("{base}{endpoint}: {e}")))
}

/// Reverse-lookup URL for `coordinate` against a free-text backend rooted at `base`.
pub fn reverse_url(base: &Url, coordinate: Coordinate) -> Result<Url> {
    let mut url = join(base, "reverse")?;
    url.query_pairs_mut()
        .append_pair("lat", &coordinate.lat.to_string())
        .append_pair("lon", &coordinate.lon.to_string())
        .append_pair("format", "json")
        .append_pair("addressdetails", "1");
    Ok(url)
}

/// Builds structured spatial queries and free-text search strings.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    /// Server-side timeout requested in the structured query header, in seconds.
    pub server_timeout_secs: u32,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            server_timeout_secs: 25,
        }
    }
}

impl QueryBuilder {
    fn header(&self) -> String {
        format!("[out:json][timeout:{}];\n", self.server_timeout_secs)
    }

    /// Area chain `country → region → city?`, leaving the innermost area in `.searchArea`.
    ///
    /// Returns `None` unless both country and region are set.
    fn area_chain(descriptor: &LocationDescriptor) -> Option<String> {
        let country = descriptor.country()?;
        let region = descriptor.region()?;

        let mut q = String::new();
        let _ = writeln!(
            q,
            "area[\"name\"=\"{}\"][\"admin_level\"=\"2\"]->.countryArea;",
            quoted(country)
        );
        match descriptor.city() {
            Some(city) => {
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"=\"4\"](area.countryArea)->.regionArea;",
                    quoted(region)
                );
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"~\"^([5-9]|10)$\"](area.regionArea)->.searchArea;",
                    quoted(city)
                );
            }
            None => {
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"=\"4\"](area.countryArea)->.searchArea;",
                    quoted(region)
                );
            }
        }
        Some(q)
    }

    /// Ways whose name is exactly the descriptor's street (anchored and
    /// case-sensitive) inside the innermost administrative area, with full
    /// line geometry.
    ///
    /// Returns `None` when country, region or street is missing.
    ///
    /// ```rust
    /// use callejero_osm::{LocationDescriptor, QueryBuilder};
    ///
    /// let descriptor = LocationDescriptor::new("Uruguay")
    ///     .with_region("Montevideo")
    ///     .with_street("18 de Julio");
    /// let query = QueryBuilder::default().street_ways(&descriptor).unwrap();
    /// assert!(query.contains(r#"way["name"~"^18 de Julio$"](area.searchArea);"#));
    /// assert!(query.ends_with("out geom;\n"));
    /// ```
    #[must_use]
    pub fn street_ways(&self, descriptor: &LocationDescriptor) -> Option<String> {
        let street = descriptor.street()?;
        let mut q = self.header();
        q.push_str(&Self::area_chain(descriptor)?);
        let _ = writeln!(
            q,
            "way[\"name\"~\"^{}$\"](area.searchArea);",
            quoted(&regex::escape(street))
        );
        q.push_str("out geom;\n");
        Some(q)
    }

    /// Topology nodes of `street`'s ways within `radius_m` of `near`.
    ///
    /// The ways themselves are emitted first (ids only) so an empty way set can
    /// be told apart from "ways exist but no node is close enough". The ways
    /// are scoped to the region when known, otherwise to the country.
    #[must_use]
    pub fn street_nodes_near(
        &self,
        descriptor: &LocationDescriptor,
        street: &str,
        near: Coordinate,
        radius_m: u32,
    ) -> String {
        let mut q = self.header();
        let scope = match (descriptor.country(), descriptor.region()) {
            (Some(country), Some(region)) => {
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"=\"2\"]->.countryArea;",
                    quoted(country)
                );
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"=\"4\"](area.countryArea)->.searchArea;",
                    quoted(region)
                );
                "(area.searchArea)"
            }
            (Some(country), None) => {
                let _ = writeln!(
                    q,
                    "area[\"name\"=\"{}\"][\"admin_level\"=\"2\"]->.searchArea;",
                    quoted(country)
                );
                "(area.searchArea)"
            }
            _ => "",
        };
        let _ = writeln!(q, "way[\"name\"=\"{}\"]{scope}->.mainStreet;", quoted(street));
        q.push_str(".mainStreet out ids;\n");
        let _ = writeln!(
            q,
            "node(w.mainStreet)(around:{radius_m},{},{});",
            near.lat, near.lon
        );
        q.push_str("out;\n");
        q
    }

    /// Named highway ways passing within `radius_m` of `near`, with their node lists.
    #[must_use]
    pub fn highways_near(&self, near: Coordinate, radius_m: u32) -> String {
        let mut q = self.header();
        let _ = writeln!(
            q,
            "way(around:{radius_m},{},{})[\"highway\"][\"name\"];",
            near.lat, near.lon
        );
        q.push_str("out body;\n");
        q
    }

    /// Every named highway of a region, tags only (bulk import listing).
    #[must_use]
    pub fn region_streets(&self, country: &str, region: &str) -> String {
        let descriptor = LocationDescriptor::new(country).with_region(region);
        let mut q = self.header();
        q.push_str(&Self::area_chain(&descriptor).unwrap_or_default());
        q.push_str("way[\"highway\"][\"name\"](area.searchArea);\n");
        q.push_str("out tags;\n");
        q
    }

    /// Populated places (city, town, village) of a region.
    #[must_use]
    pub fn region_localities(&self, country: &str, region: &str) -> String {
        let descriptor = LocationDescriptor::new(country).with_region(region);
        let mut q = self.header();
        q.push_str(&Self::area_chain(&descriptor).unwrap_or_default());
        q.push_str("node[\"place\"~\"^(city|town|village)$\"](area.searchArea);\n");
        q.push_str("out;\n");
        q
    }

    /// Free-text address string: `street [#number] [y cross], city, region, country`.
    ///
    /// Only present facets are written. House number and cross-street are
    /// qualifiers of the street segment and are dropped when no street is set.
    ///
    /// ```rust
    /// use callejero_osm::{LocationDescriptor, QueryBuilder};
    ///
    /// let descriptor = LocationDescriptor::new("Uruguay")
    ///     .with_region("Montevideo")
    ///     .with_street("18 de Julio")
    ///     .with_house_number("1234");
    /// assert_eq!(
    ///     QueryBuilder::free_text(&descriptor).unwrap(),
    ///     "18 de Julio #1234, Montevideo, Uruguay"
    /// );
    /// ```
    #[must_use]
    pub fn free_text(descriptor: &LocationDescriptor) -> Option<String> {
        let mut segments = Vec::new();
        if let Some(street) = descriptor.street() {
            let mut segment = street.to_string();
            if let Some(number) = descriptor.house_number() {
                let _ = write!(segment, " #{number}");
            }
            if let Some(cross) = descriptor.cross_street() {
                let _ = write!(segment, " y {cross}");
            }
            segments.push(segment);
        }
        segments.extend(descriptor.admin_chain().into_iter().map(str::to_string));

        if segments.is_empty() {
            None
        } else {
            Some(segments.join(", "))
        }
    }

    /// Free-text query with the result cap chosen from the descriptor: a
    /// house number yields several candidates to choose from, everything
    /// else expects a single hit.
    #[must_use]
    pub fn free_text_query(descriptor: &LocationDescriptor) -> Option<FreeTextQuery> {
        let limit = if descriptor.house_number().is_some() && descriptor.cross_street().is_none() {
            AMBIGUOUS_RESULTS
        } else {
            SINGLE_RESULT
        };
        Self::free_text(descriptor).map(|text| FreeTextQuery::new(text, limit))
    }

    /// The corner phrasing `street y cross, city, region, country`, ignoring any house number.
    #[must_use]
    pub fn corner_text(descriptor: &LocationDescriptor) -> Option<FreeTextQuery> {
        let street = descriptor.street()?;
        let cross = descriptor.cross_street()?;
        let corner = LocationDescriptor::new(descriptor.country().unwrap_or_default())
            .with_region(descriptor.region().unwrap_or_default())
            .with_city(descriptor.city().unwrap_or_default())
            .with_street(street)
            .with_cross_street(cross);
        Self::free_text(&corner).map(|text| FreeTextQuery::new(text, SINGLE_RESULT))
    }
}
