use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::{
    osm::{
        GeocodingBackend, HttpSettings, StreetImporter,
        backend::{DEFAULT_NOMINATIM_URL, DEFAULT_OVERPASS_URL, DEFAULT_USER_AGENT},
    },
    transform::ProjectedEnvelope,
};

/// Smallest spacing allowed between consecutive requests of a batch.
pub const MIN_PACING: Duration = Duration::from_millis(1000);
pub const MIN_CORNER_RADIUS_M: u32 = 150;
pub const MAX_CORNER_RADIUS_M: u32 = 500;

pub const OVERPASS_URL_ENV: &str = "CALLEJERO_OVERPASS_URL";
pub const NOMINATIM_URL_ENV: &str = "CALLEJERO_NOMINATIM_URL";
pub const USER_AGENT_ENV: &str = "CALLEJERO_USER_AGENT";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {name} URL '{value}': {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("Projected envelope is empty or inverted")]
    InvertedEnvelope,
    #[error("User agent must not be empty")]
    EmptyUserAgent,
}

/// Map zoom used for each kind of resolved geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevels {
    pub house: u8,
    pub street: u8,
    pub city: u8,
    pub region: u8,
    pub country: u8,
}

impl Default for ZoomLevels {
    fn default() -> Self {
        Self {
            house: 17,
            street: 16,
            city: 13,
            region: 10,
            country: 5,
        }
    }
}

/// Everything the resolver, the session and the HTTP client need to know.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub overpass_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    /// Per-request HTTP timeout. A timed out request counts as unavailable.
    pub request_timeout: Duration,
    /// Delay between consecutive requests of a bulk import.
    pub pacing_interval: Duration,
    /// Radius of the corner search around the approximate location.
    pub corner_radius_m: u32,
    /// Delay between the per-node reverse lookups of the corner search.
    pub reverse_lookup_delay: Duration,
    /// Radius used to find the ways crossing a clicked road.
    pub click_radius_m: u32,
    pub zoom: ZoomLevels,
    pub fit_padding_px: u32,
    pub projected_envelope: ProjectedEnvelope,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            pacing_interval: MIN_PACING,
            corner_radius_m: 250,
            reverse_lookup_delay: Duration::from_millis(1000),
            click_radius_m: 50,
            zoom: ZoomLevels::default(),
            fit_padding_px: 50,
            projected_envelope: ProjectedEnvelope::default(),
        }
    }
}

impl ResolverConfig {
    /// Defaults, with backend URLs and user agent overridden from the
    /// environment when set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(OVERPASS_URL_ENV) {
            self.overpass_url = url;
        }
        if let Some(url) = get(NOMINATIM_URL_ENV) {
            self.nominatim_url = url;
        }
        if let Some(agent) = get(USER_AGENT_ENV) {
            self.user_agent = agent;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_settings()?;
        if !self.projected_envelope.is_well_formed() {
            return Err(ConfigError::InvertedEnvelope);
        }
        Ok(())
    }

    /// Connection settings for [`crate::osm::HttpGeocodingClient`].
    pub fn http_settings(&self) -> Result<HttpSettings, ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        Ok(HttpSettings {
            overpass_url: parse_url("overpass", &self.overpass_url)?,
            nominatim_url: parse_url("nominatim", &self.nominatim_url)?,
            user_agent: self.user_agent.clone(),
            timeout: self.request_timeout,
        })
    }

    /// A street importer paced by [`Self::pacing_interval`].
    pub fn street_importer<'a, B: GeocodingBackend>(&self, backend: &'a B) -> StreetImporter<'a, B> {
        StreetImporter::new(backend).with_pacing(self.pacing_interval)
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() == "http" || url.scheme() == "https" {
        Ok(url)
    } else {
        Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        })
    }
}

/// Builder for [`ResolverConfig`] with the usual presets.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Public-service defaults: one request per second, one second between
    /// corner-search reverse lookups.
    pub fn polite() -> Self {
        Self::new()
    }

    /// For tests against scripted or local backends: no delay between
    /// reverse lookups and loopback URLs.
    pub fn testing() -> Self {
        let mut builder = Self::new();
        builder.config.overpass_url = "http://127.0.0.1:12345/api/interpreter".to_string();
        builder.config.nominatim_url = "http://127.0.0.1:12346".to_string();
        builder.config.reverse_lookup_delay = Duration::ZERO;
        builder.config.request_timeout = Duration::from_secs(5);
        builder
    }

    pub fn overpass_url(mut self, url: impl Into<String>) -> Self {
        self.config.overpass_url = url.into();
        self
    }

    pub fn nominatim_url(mut self, url: impl Into<String>) -> Self {
        self.config.nominatim_url = url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the bulk import pacing; never below one second.
    pub fn pacing_interval(mut self, interval: Duration) -> Self {
        self.config.pacing_interval = interval.max(MIN_PACING);
        self
    }

    /// Set the corner search radius, clamped to 150..=500 m.
    pub fn corner_radius_m(mut self, radius: u32) -> Self {
        self.config.corner_radius_m = radius.clamp(MIN_CORNER_RADIUS_M, MAX_CORNER_RADIUS_M);
        self
    }

    pub fn reverse_lookup_delay(mut self, delay: Duration) -> Self {
        self.config.reverse_lookup_delay = delay;
        self
    }

    pub fn click_radius_m(mut self, radius: u32) -> Self {
        self.config.click_radius_m = radius.max(1);
        self
    }

    pub fn zoom_levels(mut self, zoom: ZoomLevels) -> Self {
        self.config.zoom = zoom;
        self
    }

    pub fn fit_padding_px(mut self, padding: u32) -> Self {
        self.config.fit_padding_px = padding;
        self
    }

    pub fn projected_envelope(mut self, envelope: ProjectedEnvelope) -> Self {
        self.config.projected_envelope = envelope;
        self
    }

    pub fn build(self) -> ResolverConfig {
        self.config
    }
}
