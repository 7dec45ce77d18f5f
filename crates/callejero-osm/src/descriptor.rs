//! The hierarchical, partially-filled location input.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A partially-filled location: country, administrative division, city,
/// street, house number and cross-street.
///
/// Every field except `country` may be unset. An empty (or whitespace-only)
/// string and an absent value mean the same thing, and the accessors never
/// hand out an empty string. A descriptor is an immutable value: a newer one
/// supersedes the previous one wholesale.
///
/// # Examples
///
/// ```rust
/// use callejero_osm::LocationDescriptor;
///
/// let descriptor = LocationDescriptor::new("Uruguay")
///     .with_region("Montevideo")
///     .with_street("18 de Julio")
///     .with_house_number("");
///
/// assert_eq!(descriptor.street(), Some("18 de Julio"));
/// assert_eq!(descriptor.house_number(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawDescriptor")]
pub struct LocationDescriptor {
    country: String,
    region: Option<String>,
    city: Option<String>,
    street: Option<String>,
    house_number: Option<String>,
    cross_street: Option<String>,
}

/// Wire shape of a descriptor; normalized through the setters on the way in.
#[derive(Deserialize)]
struct RawDescriptor {
    country: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    cross_street: Option<String>,
}

impl From<RawDescriptor> for LocationDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        Self {
            country: facet(raw.country).unwrap_or_default(),
            region: raw.region.and_then(facet),
            city: raw.city.and_then(facet),
            street: raw.street.and_then(facet),
            house_number: raw.house_number.and_then(facet),
            cross_street: raw.cross_street.and_then(facet),
        }
    }
}

fn facet(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.trim().is_empty())
}

impl LocationDescriptor {
    #[must_use]
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: facet(country).unwrap_or_default(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = facet(region);
        self
    }

    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = facet(city);
        self
    }

    #[must_use]
    pub fn with_street(mut self, street: impl Into<String>) -> Self {
        self.street = facet(street);
        self
    }

    #[must_use]
    pub fn with_house_number(mut self, house_number: impl Into<String>) -> Self {
        self.house_number = facet(house_number);
        self
    }

    #[must_use]
    pub fn with_cross_street(mut self, cross_street: impl Into<String>) -> Self {
        self.cross_street = facet(cross_street);
        self
    }

    /// The country, or `None` when it was left blank.
    #[must_use]
    pub fn country(&self) -> Option<&str> {
        Some(self.country.as_str()).filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        present(self.region.as_ref())
    }

    #[must_use]
    pub fn city(&self) -> Option<&str> {
        present(self.city.as_ref())
    }

    #[must_use]
    pub fn street(&self) -> Option<&str> {
        present(self.street.as_ref())
    }

    #[must_use]
    pub fn house_number(&self) -> Option<&str> {
        present(self.house_number.as_ref())
    }

    #[must_use]
    pub fn cross_street(&self) -> Option<&str> {
        present(self.cross_street.as_ref())
    }

    /// The administrative names that are set, smallest first: city, region, country.
    #[must_use]
    pub fn admin_chain(&self) -> Vec<&str> {
        [self.city(), self.region(), self.country()]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(street) = self.street() {
            parts.push(format!("street: {street}"));
        }
        if let Some(number) = self.house_number() {
            parts.push(format!("number: {number}"));
        }
        if let Some(cross) = self.cross_street() {
            parts.push(format!("corner: {cross}"));
        }
        if let Some(city) = self.city() {
            parts.push(format!("city: {city}"));
        }
        if let Some(region) = self.region() {
            parts.push(format!("region: {region}"));
        }
        if let Some(country) = self.country() {
            parts.push(format!("country: {country}"));
        }

        if parts.is_empty() {
            write!(f, "LocationDescriptor {{ Empty }}")
        } else {
            write!(f, "LocationDescriptor {{ {} }}", parts.join(", "))
        }
    }
}

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex should compile"));

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Normalize a street or place name for comparison: lowercase, Latin
/// diacritics folded, and every run of punctuation or whitespace collapsed
/// into a single space.
///
/// ```rust
/// use callejero_osm::normalize_name;
///
/// assert_eq!(normalize_name("  Av. Gral. Rivera "), "av gral rivera");
/// assert_eq!(normalize_name("Bulevar José Batlle y Ordóñez"), "bulevar jose batlle y ordonez");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.to_lowercase().chars().map(fold_diacritic).collect();
    NON_ALNUM.replace_all(&folded, " ").trim().to_string()
}

/// Case- and diacritic-insensitive name equality.
#[must_use]
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}
