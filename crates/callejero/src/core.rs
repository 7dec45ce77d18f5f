//! The map session: one logical writer to the scene.
//!
//! Every descriptor change goes through [`MapSession::begin`], which clears
//! the location layers and bumps the session generation. The returned
//! [`PendingResolution`] owns everything it needs and can be awaited anywhere;
//! its result is applied by [`MapSession::complete`] only if no newer
//! descriptor arrived meanwhile. Superseded results are dropped, never
//! applied. In-flight requests are not aborted.

use std::sync::Arc;

use ahash::AHashSet;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::ResolverConfig,
    error::Result,
    osm::{
        Coordinate, GeocodingBackend, HttpGeocodingClient, LocationDescriptor, NearbyWay,
        names_match,
    },
    resolve::{CenterHint, GeometryResolver, ResolveError, Resolution, ResolvedGeometry},
    scene::{NullRenderer, SceneGraph, SceneRenderer},
    transform::{MobileUnitPosition, UnitLocation, convert_positions},
};

/// Events the session publishes to its embedding application.
///
/// All methods default to doing nothing.
pub trait ResolutionListener: Send + Sync {
    /// A resolution was applied to the scene.
    fn on_resolved(&self, _geometry: &ResolvedGeometry, _center: &CenterHint) {}

    /// The current descriptor could not be resolved; the scene is empty.
    fn on_failed(&self, _descriptor: &LocationDescriptor, _error: &ResolveError) {}

    /// A map click was turned into a descriptor (feeds the input form).
    fn on_descriptor_inferred(&self, _descriptor: &LocationDescriptor) {}
}

/// What [`MapSession::complete`] did with a finished resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(ResolvedGeometry),
    /// Current descriptor failed; carries the user-facing advisory.
    Failed(ResolveError),
    /// A newer descriptor was issued meanwhile; nothing was touched.
    Superseded,
}

/// A resolution that has been started but not run.
#[derive(Debug)]
pub struct PendingResolution<B> {
    generation: u64,
    descriptor: LocationDescriptor,
    resolver: Arc<GeometryResolver<B>>,
}

impl<B: GeocodingBackend> PendingResolution<B> {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn descriptor(&self) -> &LocationDescriptor {
        &self.descriptor
    }

    pub async fn run(self) -> CompletedResolution {
        let outcome = self.resolver.resolve(&self.descriptor).await;
        CompletedResolution {
            generation: self.generation,
            descriptor: self.descriptor,
            outcome,
        }
    }
}

/// A finished resolution, tagged with the generation it was issued under.
#[derive(Debug, Clone)]
pub struct CompletedResolution {
    generation: u64,
    descriptor: LocationDescriptor,
    outcome: std::result::Result<Resolution, ResolveError>,
}

impl CompletedResolution {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn descriptor(&self) -> &LocationDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub const fn outcome(&self) -> &std::result::Result<Resolution, ResolveError> {
        &self.outcome
    }
}

pub struct MapSession<B, R = NullRenderer> {
    resolver: Arc<GeometryResolver<B>>,
    scene: SceneGraph<R>,
    config: ResolverConfig,
    generation: u64,
    current: Option<LocationDescriptor>,
    center: Option<CenterHint>,
    last_error: Option<ResolveError>,
    listeners: Vec<Arc<dyn ResolutionListener>>,
}

impl<B, R> std::fmt::Debug for MapSession<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("generation", &self.generation)
            .field("current", &self.current)
            .field("center", &self.center)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl MapSession<HttpGeocodingClient, NullRenderer> {
    #[must_use]
    pub fn builder() -> MapSessionBuilder<NullRenderer> {
        MapSessionBuilder::new()
    }
}

impl<B: GeocodingBackend, R: SceneRenderer> MapSession<B, R> {
    pub fn scene(&self) -> &SceneGraph<R> {
        &self.scene
    }

    /// Category layers are managed directly on the scene.
    pub fn scene_mut(&mut self) -> &mut SceneGraph<R> {
        &mut self.scene
    }

    pub fn resolver(&self) -> &GeometryResolver<B> {
        &self.resolver
    }

    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn current_descriptor(&self) -> Option<&LocationDescriptor> {
        self.current.as_ref()
    }

    /// Center and zoom of what the scene currently shows, for "center map"
    /// controls.
    pub const fn center_hint(&self) -> Option<&CenterHint> {
        self.center.as_ref()
    }

    /// Error of the last resolution of the current descriptor, if it failed.
    pub const fn last_error(&self) -> Option<&ResolveError> {
        self.last_error.as_ref()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ResolutionListener>) {
        self.listeners.push(listener);
    }

    /// Invalidate everything in flight and reset the per-resolution state.
    fn start_generation(&mut self, current: Option<LocationDescriptor>) -> u64 {
        self.generation += 1;
        self.scene.clear_all();
        self.center = None;
        self.last_error = None;
        self.current = current;
        self.generation
    }

    /// Start resolving `descriptor`: the location layers are cleared right
    /// away and every earlier in-flight resolution becomes stale.
    pub fn begin(&mut self, descriptor: LocationDescriptor) -> PendingResolution<B> {
        let generation = self.start_generation(Some(descriptor.clone()));
        debug!(generation, descriptor = %descriptor, "Descriptor changed");
        PendingResolution {
            generation,
            descriptor,
            resolver: Arc::clone(&self.resolver),
        }
    }

    /// Apply a finished resolution if it is still the current one.
    pub fn complete(&mut self, completed: CompletedResolution) -> ApplyOutcome {
        let current = self.generation;
        if completed.generation != current {
            debug!(
                stale = completed.generation,
                current, "Discarding superseded resolution"
            );
            return ApplyOutcome::Superseded;
        }

        match completed.outcome {
            Ok(resolution) => {
                self.apply(&resolution);
                for listener in &self.listeners {
                    listener.on_resolved(&resolution.geometry, &resolution.center);
                }
                ApplyOutcome::Applied(resolution.geometry)
            }
            Err(error) => {
                info!(
                    generation = current,
                    advisory = error.advisory(),
                    error = %error,
                    "Resolution failed, scene left empty"
                );
                for listener in &self.listeners {
                    listener.on_failed(&completed.descriptor, &error);
                }
                self.last_error = Some(error.clone());
                ApplyOutcome::Failed(error)
            }
        }
    }

    /// Begin, run and complete in one go.
    #[instrument(name = "Update descriptor", skip(self, descriptor), level = "debug")]
    pub async fn update(&mut self, descriptor: LocationDescriptor) -> ApplyOutcome {
        let pending = self.begin(descriptor);
        let completed = pending.run().await;
        self.complete(completed)
    }

    fn apply(&mut self, resolution: &Resolution) {
        match &resolution.geometry {
            ResolvedGeometry::Line(lines) => self.scene.replace_line(lines.clone()),
            ResolvedGeometry::Point(point) => self.scene.replace_point(point.coordinate),
            ResolvedGeometry::MultiPoint(points) => self.scene.replace_points(points.clone()),
        }
        self.center = Some(resolution.center);
        self.recenter();
    }

    /// Move the view back to the last applied center hint. Returns whether
    /// there was one.
    pub fn recenter(&mut self) -> bool {
        let Some(center) = self.center else {
            return false;
        };
        match center.fit {
            Some(bounds) => self.scene.fit_to(bounds, self.config.fit_padding_px),
            None => self.scene.center_on(center.coordinate, center.zoom),
        }
        true
    }

    /// Free-text candidate search shown as markers. Follows the same
    /// supersede rules as a descriptor change.
    pub async fn search(&mut self, text: &str, limit: u8) -> ApplyOutcome {
        let generation = self.start_generation(None);
        let outcome = self.resolver.search(text, limit).await;
        self.complete(CompletedResolution {
            generation,
            descriptor: LocationDescriptor::default(),
            outcome,
        })
    }

    /// Turn a map click into a descriptor.
    ///
    /// The clicked point is reverse geocoded; the ways crossing the clicked
    /// road nearby supply the cross-street. A marker is placed at the click,
    /// the inferred descriptor becomes current with a center hint on the
    /// click, and listeners are notified.
    /// `None` when the reverse lookup fails, in which case the scene is left
    /// as it was.
    #[instrument(name = "Infer from click", skip(self), level = "info")]
    pub async fn infer_from_click(&mut self, coordinate: Coordinate) -> Option<LocationDescriptor> {
        let resolver = Arc::clone(&self.resolver);
        let backend = resolver.backend();
        let hit = match backend.reverse(coordinate).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Reverse lookup of the click failed");
                return None;
            }
        };

        let mut descriptor = hit.address.to_descriptor();
        let roads = hit.address.road_names();
        if let Some(clicked) = roads.first() {
            let cross = match backend
                .highways_near(coordinate, self.config.click_radius_m)
                .await
            {
                Ok(ways) => crossing_way(clicked, &ways),
                Err(e) => {
                    warn!(error = %e, "Nearby ways lookup failed");
                    None
                }
            }
            .or_else(|| roads.get(1).map(ToString::to_string));

            if let Some(cross) = cross {
                descriptor = descriptor.with_cross_street(cross);
            }
        }
        info!(descriptor = %descriptor, "Descriptor inferred from click");

        self.start_generation(Some(descriptor.clone()));
        self.scene.replace_point(coordinate);
        self.center = Some(CenterHint {
            coordinate,
            zoom: self.config.zoom.house,
            fit: None,
        });
        for listener in &self.listeners {
            listener.on_descriptor_inferred(&descriptor);
        }
        Some(descriptor)
    }

    /// Convert one poll of mobile unit positions with the configured envelope.
    pub fn unit_locations(&self, positions: &[MobileUnitPosition]) -> Vec<UnitLocation> {
        convert_positions(positions, &self.config.projected_envelope)
    }
}

/// First way other than the clicked road that shares a node with it.
fn crossing_way(clicked: &str, ways: &[NearbyWay]) -> Option<String> {
    let (own, others): (Vec<_>, Vec<_>) = ways.iter().partition(|w| names_match(&w.name, clicked));
    let own_nodes: AHashSet<i64> = own.iter().flat_map(|w| w.nodes.iter().copied()).collect();
    others
        .into_iter()
        .find(|w| w.nodes.iter().any(|n| own_nodes.contains(n)))
        .map(|w| w.name.clone())
}

/// Builder for [`MapSession`].
pub struct MapSessionBuilder<R> {
    config: Option<ResolverConfig>,
    renderer: R,
    listeners: Vec<Arc<dyn ResolutionListener>>,
}

impl MapSessionBuilder<NullRenderer> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            renderer: NullRenderer,
            listeners: Vec::new(),
        }
    }
}

impl Default for MapSessionBuilder<NullRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SceneRenderer> MapSessionBuilder<R> {
    /// Use this configuration instead of [`ResolverConfig::from_env`].
    #[must_use]
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn renderer<R2: SceneRenderer>(self, renderer: R2) -> MapSessionBuilder<R2> {
        MapSessionBuilder {
            config: self.config,
            renderer,
            listeners: self.listeners,
        }
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn ResolutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build a session talking to the public backends over HTTP.
    pub fn build(self) -> Result<MapSession<HttpGeocodingClient, R>> {
        let config = self.config.clone().unwrap_or_else(ResolverConfig::from_env);
        config.validate()?;
        let client = HttpGeocodingClient::new(config.http_settings()?)?;
        self.config(config).build_with_backend(Arc::new(client))
    }

    /// Build a session over any backend.
    pub fn build_with_backend<B: GeocodingBackend>(self, backend: Arc<B>) -> Result<MapSession<B, R>> {
        let config = self.config.unwrap_or_else(ResolverConfig::from_env);
        config.validate()?;
        Ok(MapSession {
            resolver: Arc::new(GeometryResolver::new(backend, &config)),
            scene: SceneGraph::with_renderer(self.renderer),
            config,
            generation: 0,
            current: None,
            center: None,
            last_error: None,
            listeners: self.listeners,
        })
    }
}
