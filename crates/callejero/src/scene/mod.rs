//! Owned arena of named map layers.
//!
//! The scene knows nothing about any rendering library. Every mutation is
//! mirrored to a [`SceneRenderer`], which is the only place a concrete map
//! widget plugs in.
//!
//! Layer lifecycle:
//! - a layer is created lazily the first time something is written to it;
//! - the `street` and `marker` layers are emptied by [`SceneGraph::clear_all`]
//!   on every descriptor change;
//! - a `poi:<category>` layer survives location changes and is destroyed only
//!   by [`SceneGraph::remove_category_layer`].

use std::fmt;

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::osm::{Bounds, Coordinate};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerId {
    Street,
    Marker,
    Poi(String),
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Street => f.write_str("street"),
            Self::Marker => f.write_str("marker"),
            Self::Poi(category) => write!(f, "poi:{category}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// One way segment of a street centerline.
    Line(Vec<Coordinate>),
    Point(Coordinate),
    /// A labelled point of interest.
    Poi { label: String, coordinate: Coordinate },
}

impl Feature {
    fn coordinates(&self) -> &[Coordinate] {
        match self {
            Self::Line(line) => line,
            Self::Point(c) | Self::Poi { coordinate: c, .. } => std::slice::from_ref(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneLayer {
    id: LayerId,
    features: Vec<Feature>,
}

impl SceneLayer {
    #[must_use]
    pub const fn id(&self) -> &LayerId {
        &self.id
    }

    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coordinates(self.features.iter().flat_map(Feature::coordinates))
    }
}

/// The last viewport request issued to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Viewport {
    Fit { bounds: Bounds, padding_px: u32 },
    Center { coordinate: Coordinate, zoom: u8 },
}

/// Rendering boundary. Implementations redraw whatever the scene tells them
/// changed; the scene stays the single source of truth.
pub trait SceneRenderer {
    /// `layer` now holds exactly the given features (possibly none).
    fn layer_changed(&mut self, layer: &SceneLayer);

    /// `layer` was destroyed and must be removed from the map.
    fn layer_removed(&mut self, layer: &LayerId);

    fn viewport_changed(&mut self, viewport: &Viewport);
}

/// Renderer that draws nothing, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl SceneRenderer for NullRenderer {
    fn layer_changed(&mut self, _layer: &SceneLayer) {}

    fn layer_removed(&mut self, _layer: &LayerId) {}

    fn viewport_changed(&mut self, _viewport: &Viewport) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Slot(usize);

#[derive(Debug, Default)]
pub struct SceneGraph<R = NullRenderer> {
    slots: Vec<Option<SceneLayer>>,
    free: Vec<Slot>,
    index: AHashMap<LayerId, Slot>,
    viewport: Option<Viewport>,
    renderer: R,
}

impl SceneGraph<NullRenderer> {
    #[must_use]
    pub fn headless() -> Self {
        Self::with_renderer(NullRenderer)
    }
}

impl<R: SceneRenderer> SceneGraph<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: AHashMap::new(),
            viewport: None,
            renderer,
        }
    }

    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    pub const fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub fn layer(&self, id: &LayerId) -> Option<&SceneLayer> {
        let slot = self.index.get(id)?;
        self.slots.get(slot.0)?.as_ref()
    }

    /// Live layers in creation order of their slots.
    pub fn layers(&self) -> impl Iterator<Item = &SceneLayer> {
        self.slots.iter().flatten()
    }

    #[must_use]
    pub fn street_features(&self) -> &[Feature] {
        self.layer(&LayerId::Street)
            .map(SceneLayer::features)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn marker_features(&self) -> &[Feature] {
        self.layer(&LayerId::Marker)
            .map(SceneLayer::features)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_line(&self) -> bool {
        !self.street_features().is_empty()
    }

    #[must_use]
    pub fn has_point(&self) -> bool {
        !self.marker_features().is_empty()
    }

    #[must_use]
    pub const fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    fn slot_for(&mut self, id: &LayerId) -> Slot {
        if let Some(slot) = self.index.get(id) {
            return *slot;
        }
        let layer = SceneLayer {
            id: id.clone(),
            features: Vec::new(),
        };
        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot.0] = Some(layer);
            slot
        } else {
            self.slots.push(Some(layer));
            Slot(self.slots.len() - 1)
        };
        trace!(layer = %id, slot = slot.0, "Layer created");
        self.index.insert(id.clone(), slot);
        slot
    }

    fn write(&mut self, id: &LayerId, features: Vec<Feature>) {
        let slot = self.slot_for(id);
        if let Some(layer) = self.slots[slot.0].as_mut() {
            layer.features = features;
            self.renderer.layer_changed(layer);
        }
    }

    /// Empty an existing layer. Layers never written to stay uncreated.
    fn clear(&mut self, id: &LayerId) {
        let Some(slot) = self.index.get(id).copied() else {
            return;
        };
        if let Some(layer) = self.slots[slot.0].as_mut()
            && !layer.features.is_empty()
        {
            layer.features.clear();
            self.renderer.layer_changed(layer);
        }
    }

    /// Show a street centerline (one sequence per way segment). Any marker is
    /// removed: a line and a point are never shown together.
    pub fn replace_line(&mut self, lines: Vec<Vec<Coordinate>>) {
        self.clear(&LayerId::Marker);
        let features = lines
            .into_iter()
            .filter(|l| !l.is_empty())
            .map(Feature::Line)
            .collect();
        self.write(&LayerId::Street, features);
    }

    /// Show a single point marker, removing any street line.
    pub fn replace_point(&mut self, coordinate: Coordinate) {
        self.replace_points(vec![coordinate]);
    }

    /// Show several candidate markers at once, removing any street line.
    pub fn replace_points(&mut self, coordinates: Vec<Coordinate>) {
        self.clear(&LayerId::Street);
        let features = coordinates.into_iter().map(Feature::Point).collect();
        self.write(&LayerId::Marker, features);
    }

    /// Empty the location layers (street and marker). Category layers are
    /// left alone.
    pub fn clear_all(&mut self) {
        self.clear(&LayerId::Street);
        self.clear(&LayerId::Marker);
        debug!("Location layers cleared");
    }

    pub fn set_category_layer(&mut self, category: &str, features: Vec<Feature>) {
        debug!(category, features = features.len(), "Category layer set");
        self.write(&LayerId::Poi(category.to_string()), features);
    }

    /// Destroy a category layer. Returns whether it existed.
    pub fn remove_category_layer(&mut self, category: &str) -> bool {
        let id = LayerId::Poi(category.to_string());
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        self.slots[slot.0] = None;
        self.free.push(slot);
        self.renderer.layer_removed(&id);
        debug!(category, "Category layer removed");
        true
    }

    pub fn fit_to(&mut self, bounds: Bounds, padding_px: u32) {
        self.set_viewport(Viewport::Fit { bounds, padding_px });
    }

    pub fn center_on(&mut self, coordinate: Coordinate, zoom: u8) {
        self.set_viewport(Viewport::Center { coordinate, zoom });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.renderer.viewport_changed(&viewport);
        self.viewport = Some(viewport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every renderer call as a short string.
    #[derive(Debug, Default)]
    struct Recorder(Vec<String>);

    impl SceneRenderer for Recorder {
        fn layer_changed(&mut self, layer: &SceneLayer) {
            self.0.push(format!("{}={}", layer.id(), layer.features().len()));
        }

        fn layer_removed(&mut self, layer: &LayerId) {
            self.0.push(format!("-{layer}"));
        }

        fn viewport_changed(&mut self, viewport: &Viewport) {
            match viewport {
                Viewport::Fit { padding_px, .. } => self.0.push(format!("fit/{padding_px}")),
                Viewport::Center { zoom, .. } => self.0.push(format!("center/{zoom}")),
            }
        }
    }

    fn line() -> Vec<Coordinate> {
        vec![Coordinate::new(-34.906, -56.199), Coordinate::new(-34.905, -56.190)]
    }

    #[test]
    fn test_line_and_point_are_exclusive() {
        let mut scene = SceneGraph::headless();

        scene.replace_line(vec![line()]);
        assert!(scene.has_line());
        assert!(!scene.has_point());

        scene.replace_point(Coordinate::new(-34.9, -56.1));
        assert!(!scene.has_line());
        assert!(scene.has_point());

        scene.replace_line(vec![line(), line()]);
        assert_eq!(scene.street_features().len(), 2);
        assert!(!scene.has_point());
    }

    #[test]
    fn test_layers_created_lazily() {
        let mut scene = SceneGraph::with_renderer(Recorder::default());
        scene.clear_all();
        assert_eq!(scene.layers().count(), 0);
        assert!(scene.renderer().0.is_empty());

        scene.replace_point(Coordinate::new(-34.9, -56.1));
        assert_eq!(scene.layers().count(), 1);
        assert_eq!(scene.renderer().0, vec!["marker=1"]);
    }

    #[test]
    fn test_clear_all_keeps_category_layers() {
        let mut scene = SceneGraph::with_renderer(Recorder::default());
        scene.set_category_layer(
            "farmacias",
            vec![Feature::Poi {
                label: "Farmacia Pigalle".into(),
                coordinate: Coordinate::new(-34.91, -56.16),
            }],
        );
        scene.replace_line(vec![line()]);
        scene.clear_all();

        assert!(!scene.has_line());
        let poi = scene.layer(&LayerId::Poi("farmacias".into())).unwrap();
        assert_eq!(poi.features().len(), 1);
        assert_eq!(scene.renderer().0, vec!["poi:farmacias=1", "street=1", "street=0"]);
    }

    #[test]
    fn test_remove_category_layer_reuses_slot() {
        let mut scene = SceneGraph::with_renderer(Recorder::default());
        scene.set_category_layer("hospitales", Vec::new());
        assert!(scene.remove_category_layer("hospitales"));
        assert!(!scene.remove_category_layer("hospitales"));
        assert!(scene.layer(&LayerId::Poi("hospitales".into())).is_none());

        scene.set_category_layer("comisarias", Vec::new());
        assert_eq!(scene.slots.len(), 1, "freed slot is reused");
        assert!(scene.renderer().0.contains(&"-poi:hospitales".to_string()));
    }

    #[test]
    fn test_viewport_requests() {
        let mut scene = SceneGraph::with_renderer(Recorder::default());
        scene.replace_line(vec![line()]);
        let bounds = scene.layer(&LayerId::Street).unwrap().bounds().unwrap();
        scene.fit_to(bounds, 50);
        scene.center_on(Coordinate::new(-34.9, -56.1), 17);

        assert_eq!(scene.renderer().0[1..], ["fit/50", "center/17"]);
        assert!(matches!(scene.viewport(), Some(Viewport::Center { zoom: 17, .. })));
    }
}
