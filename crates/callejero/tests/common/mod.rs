//! Scripted in-memory backend shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use callejero::{
    MapSession, ResolverConfigBuilder,
    osm::{
        AddressDetails, Coordinate, FreeTextHit, FreeTextQuery, GeocodeError, GeocodingBackend,
        LocalityListing, LocationDescriptor, NearbyWay, PlaceKind, Result, ReverseHit,
        StreetListing, StreetNode,
    },
};

pub fn setup_test_env() {
    let _ = callejero::init_logging(tracing::Level::WARN);
}

/// Backend answering from fixed tables. Anything not scripted is `NotFound`.
#[derive(Default)]
pub struct ScriptedBackend {
    /// Street name → way geometries.
    pub lines: HashMap<String, Vec<Vec<Coordinate>>>,
    /// Exact free-text query → hits.
    pub free_text: HashMap<String, Vec<FreeTextHit>>,
    /// Street name → topology nodes near any point.
    pub street_nodes: HashMap<String, Vec<StreetNode>>,
    pub reverse: Vec<ReverseHit>,
    pub highways: Vec<NearbyWay>,
    pub streets: Vec<StreetListing>,
    /// Street name → artificial latency of its structured query.
    pub line_delays: HashMap<String, Duration>,
    /// Every call fails as if the backend were down.
    pub unavailable: bool,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable {
            return Err(GeocodeError::Unavailable {
                backend: "scripted",
                reason: "HTTP 503".into(),
            });
        }
        Ok(())
    }

    pub fn with_line(mut self, street: &str, lines: Vec<Vec<Coordinate>>) -> Self {
        self.lines.insert(street.to_string(), lines);
        self
    }

    pub fn with_free_text(mut self, text: &str, hits: Vec<FreeTextHit>) -> Self {
        self.free_text.insert(text.to_string(), hits);
        self
    }

    pub fn with_street_nodes(mut self, street: &str, nodes: Vec<StreetNode>) -> Self {
        self.street_nodes.insert(street.to_string(), nodes);
        self
    }

    pub fn with_reverse(mut self, coordinate: Coordinate, road: &str) -> Self {
        self.reverse.push(ReverseHit {
            coordinate,
            display_name: road.to_string(),
            address: AddressDetails {
                country: Some("Uruguay".into()),
                state: Some("Montevideo".into()),
                city: Some("Montevideo".into()),
                road: Some(road.to_string()),
                ..AddressDetails::default()
            },
        });
        self
    }

    pub fn with_line_delay(mut self, street: &str, delay: Duration) -> Self {
        self.line_delays.insert(street.to_string(), delay);
        self
    }
}

impl GeocodingBackend for ScriptedBackend {
    async fn resolve_line(&self, descriptor: &LocationDescriptor) -> Result<Vec<Vec<Coordinate>>> {
        let street = descriptor.street().unwrap_or_default().to_string();
        self.record(format!("line:{street}"))?;
        if let Some(delay) = self.line_delays.get(&street) {
            tokio::time::sleep(*delay).await;
        }
        self.lines.get(&street).cloned().ok_or(GeocodeError::NotFound)
    }

    async fn resolve_free_text(&self, query: &FreeTextQuery) -> Result<Vec<FreeTextHit>> {
        self.record(format!("text:{}|{}", query.text, query.limit))?;
        self.free_text
            .get(&query.text)
            .cloned()
            .filter(|hits| !hits.is_empty())
            .ok_or(GeocodeError::NotFound)
    }

    async fn street_nodes_near(
        &self,
        _scope: &LocationDescriptor,
        street: &str,
        _near: Coordinate,
        radius_m: u32,
    ) -> Result<Vec<StreetNode>> {
        self.record(format!("nodes:{street}@{radius_m}"))?;
        self.street_nodes
            .get(street)
            .cloned()
            .ok_or(GeocodeError::NotFound)
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<ReverseHit> {
        self.record(format!("reverse:{coordinate}"))?;
        self.reverse
            .iter()
            .find(|hit| hit.coordinate == coordinate)
            .cloned()
            .ok_or(GeocodeError::NotFound)
    }

    async fn highways_near(&self, near: Coordinate, radius_m: u32) -> Result<Vec<NearbyWay>> {
        self.record(format!("highways:{near}@{radius_m}"))?;
        Ok(self.highways.clone())
    }

    async fn region_streets(&self, country: &str, region: &str) -> Result<Vec<StreetListing>> {
        self.record(format!("streets:{region}, {country}"))?;
        Ok(self.streets.clone())
    }

    async fn region_localities(&self, _: &str, _: &str) -> Result<Vec<LocalityListing>> {
        Ok(Vec::new())
    }
}

pub fn hit(lat: f64, lon: f64, kind: PlaceKind, name: &str) -> FreeTextHit {
    FreeTextHit {
        coordinate: Coordinate::new(lat, lon),
        kind,
        display_name: name.to_string(),
        address: AddressDetails::default(),
    }
}

pub fn node(id: i64, lat: f64, lon: f64) -> StreetNode {
    StreetNode {
        id,
        coordinate: Coordinate::new(lat, lon),
        tags: BTreeMap::new(),
    }
}

pub fn montevideo() -> LocationDescriptor {
    LocationDescriptor::new("Uruguay").with_region("Montevideo")
}

/// Two way segments of Avenida 18 de Julio.
pub fn dieciocho_lines() -> Vec<Vec<Coordinate>> {
    vec![
        vec![
            Coordinate::new(-34.9068, -56.2000),
            Coordinate::new(-34.9058, -56.1920),
        ],
        vec![
            Coordinate::new(-34.9058, -56.1920),
            Coordinate::new(-34.9030, -56.1800),
        ],
    ]
}

/// Rivera and 8 de Octubre meet at node 42.
pub const CORNER: Coordinate = Coordinate::new(-34.8935, -56.1640);
/// Where free text places "Rivera", close enough for the corner search.
pub const RIVERA_APPROX: Coordinate = Coordinate::new(-34.8940, -56.1630);

pub fn corner_backend() -> ScriptedBackend {
    ScriptedBackend::default()
        .with_free_text(
            "Rivera, Montevideo, Uruguay",
            vec![hit(RIVERA_APPROX.lat, RIVERA_APPROX.lon, PlaceKind::Way, "Rivera")],
        )
        .with_street_nodes(
            "Rivera",
            vec![
                node(41, -34.8938, -56.1633),
                node(42, CORNER.lat, CORNER.lon),
                node(43, -34.8950, -56.1610),
            ],
        )
        .with_reverse(Coordinate::new(-34.8938, -56.1633), "Rivera")
        .with_reverse(CORNER, "Rivera, 8 de Octubre")
        .with_reverse(Coordinate::new(-34.8950, -56.1610), "Rivera")
}

pub fn session(backend: ScriptedBackend) -> MapSession<ScriptedBackend> {
    MapSession::builder()
        .config(ResolverConfigBuilder::testing().build())
        .build_with_backend(Arc::new(backend))
        .expect("testing config is valid")
}
