//! Integration tests for the map session.
//!
//! Covers scene consistency across descriptor changes, the discarding of
//! superseded resolutions, listeners, map clicks and unit positions.

mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use callejero::{
    ApplyOutcome, CenterHint, Coordinate, Feature, Hemisphere, LayerId, LocationDescriptor,
    MapSession, MobileUnitPosition, ResolutionListener, ResolveError, ResolvedGeometry,
    ResolverConfigBuilder, SceneLayer, SceneRenderer, Viewport,
    osm::{NearbyWay, PlaceKind},
};
use common::{ScriptedBackend, dieciocho_lines, hit, montevideo, session, setup_test_env};

fn dieciocho_backend() -> ScriptedBackend {
    ScriptedBackend::default()
        .with_line("18 de Julio", dieciocho_lines())
        .with_free_text(
            "18 de Julio #1234, Montevideo, Uruguay",
            vec![hit(-34.9061, -56.1912, PlaceKind::House, "1234, Avenida 18 de Julio")],
        )
}

/// Collects every event a session publishes.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ResolutionListener for EventLog {
    fn on_resolved(&self, geometry: &ResolvedGeometry, center: &CenterHint) {
        self.events
            .lock()
            .unwrap()
            .push(format!("resolved:{}@{}", geometry.kind(), center.zoom));
    }

    fn on_failed(&self, _descriptor: &LocationDescriptor, error: &ResolveError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed:{}", error.advisory()));
    }

    fn on_descriptor_inferred(&self, descriptor: &LocationDescriptor) {
        self.events.lock().unwrap().push(format!(
            "inferred:{}|{}",
            descriptor.street().unwrap_or_default(),
            descriptor.cross_street().unwrap_or_default()
        ));
    }
}

/// Renderer that writes down what it was asked to draw.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl SceneRenderer for Recorder {
    fn layer_changed(&mut self, layer: &SceneLayer) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("changed:{}:{}", layer.id(), layer.features().len()));
    }

    fn layer_removed(&mut self, layer: &LayerId) {
        self.calls.lock().unwrap().push(format!("removed:{layer}"));
    }

    fn viewport_changed(&mut self, viewport: &Viewport) {
        let kind = match viewport {
            Viewport::Fit { .. } => "fit",
            Viewport::Center { .. } => "center",
        };
        self.calls.lock().unwrap().push(format!("viewport:{kind}"));
    }
}

#[tokio::test]
async fn test_line_then_point_then_failure_workflow() {
    setup_test_env();
    let mut map = session(dieciocho_backend());
    let street = montevideo().with_street("18 de Julio");

    // Step 1: street only gives the centerline
    let outcome = map.update(street.clone()).await;
    assert!(matches!(outcome, ApplyOutcome::Applied(ResolvedGeometry::Line(_))));
    assert_eq!(map.scene().street_features().len(), 2);
    assert!(map.scene().has_line() && !map.scene().has_point());
    assert!(matches!(map.scene().viewport(), Some(Viewport::Fit { padding_px: 50, .. })));

    // Step 2: adding the house number switches to a single marker
    let outcome = map.update(street.clone().with_house_number("1234")).await;
    assert!(matches!(outcome, ApplyOutcome::Applied(ResolvedGeometry::Point(_))));
    assert!(!map.scene().has_line(), "The line must be gone once the point is shown");
    assert_eq!(
        map.scene().marker_features(),
        &[Feature::Point(Coordinate::new(-34.9061, -56.1912))]
    );
    assert!(matches!(
        map.scene().viewport(),
        Some(Viewport::Center { zoom: 17, .. })
    ));

    // Step 3: an unknown house number leaves the scene empty
    let outcome = map.update(street.with_house_number("99999")).await;
    let ApplyOutcome::Failed(error) = outcome else {
        panic!("Expected a failure, got {outcome:?}");
    };
    assert_eq!(error.advisory(), "no geometry found");
    assert!(!map.scene().has_line() && !map.scene().has_point());
    assert!(map.center_hint().is_none());
    assert_eq!(map.last_error(), Some(&error));
}

#[tokio::test]
async fn test_superseded_resolution_is_discarded() {
    setup_test_env();
    let mut map = session(dieciocho_backend());

    let first = map.begin(montevideo().with_street("18 de Julio"));
    let second = map.begin(montevideo().with_street("18 de Julio").with_house_number("1234"));
    assert!(first.generation() < second.generation());

    let second_done = second.run().await;
    assert!(matches!(
        map.complete(second_done),
        ApplyOutcome::Applied(ResolvedGeometry::Point(_))
    ));
    let scene_after_second: Vec<SceneLayer> = map.scene().layers().cloned().collect();

    let first_done = first.run().await;
    assert!(first_done.outcome().is_ok(), "The stale request itself succeeded");
    assert_eq!(map.complete(first_done), ApplyOutcome::Superseded);

    let scene_now: Vec<SceneLayer> = map.scene().layers().cloned().collect();
    assert_eq!(scene_now, scene_after_second, "A stale result must not touch the scene");
    assert!(!map.scene().has_line());
}

#[tokio::test(start_paused = true)]
async fn test_slow_stale_request_finishing_last_is_discarded() {
    setup_test_env();
    let backend = dieciocho_backend()
        .with_line("Colonia", vec![vec![Coordinate::new(-34.9050, -56.1880)]])
        .with_line_delay("Colonia", Duration::from_secs(5));
    let mut map = session(backend);

    let slow = map.begin(montevideo().with_street("Colonia"));
    let fast = map.begin(montevideo().with_street("18 de Julio"));

    let (slow_done, fast_done) = futures::join!(slow.run(), async {
        let done = fast.run().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        done
    });

    assert!(matches!(map.complete(fast_done), ApplyOutcome::Applied(_)));
    assert_eq!(map.complete(slow_done), ApplyOutcome::Superseded);
    assert_eq!(map.scene().street_features().len(), 2, "Still showing 18 de Julio");
    assert_eq!(map.current_descriptor().and_then(LocationDescriptor::street), Some("18 de Julio"));
}

#[tokio::test]
async fn test_category_layers_survive_descriptor_changes() {
    setup_test_env();
    let recorder = Recorder::default();
    let calls = Arc::clone(&recorder.calls);
    let mut map = MapSession::builder()
        .config(ResolverConfigBuilder::testing().build())
        .renderer(recorder)
        .build_with_backend(Arc::new(dieciocho_backend()))
        .expect("testing config is valid");

    map.scene_mut().set_category_layer(
        "hospitals",
        vec![Feature::Poi {
            label: "Hospital Maciel".into(),
            coordinate: Coordinate::new(-34.9070, -56.2120),
        }],
    );
    map.update(montevideo().with_street("18 de Julio")).await;
    map.update(montevideo().with_street("Calle Inexistente")).await;

    let hospitals = map
        .scene()
        .layer(&LayerId::Poi("hospitals".into()))
        .expect("Category layer should still exist");
    assert_eq!(hospitals.features().len(), 1);
    assert!(!map.scene().has_line());

    assert!(map.scene_mut().remove_category_layer("hospitals"));
    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.first().map(String::as_str), Some("changed:poi:hospitals:1"));
    assert!(calls.contains(&"changed:street:2".to_string()));
    assert!(calls.contains(&"changed:street:0".to_string()), "Line cleared on the second update");
    assert_eq!(calls.last().map(String::as_str), Some("removed:poi:hospitals"));
}

#[tokio::test]
async fn test_listeners_are_notified() {
    setup_test_env();
    let log = Arc::new(EventLog::default());
    let mut map = MapSession::builder()
        .config(ResolverConfigBuilder::testing().build())
        .listener(log.clone())
        .build_with_backend(Arc::new(dieciocho_backend()))
        .expect("testing config is valid");

    map.update(montevideo().with_street("18 de Julio")).await;
    map.update(LocationDescriptor::default()).await;

    let stale = map.begin(montevideo().with_street("18 de Julio"));
    map.begin(montevideo());
    let stale_done = stale.run().await;
    map.complete(stale_done);

    assert_eq!(
        log.events(),
        vec![
            "resolved:line@16".to_string(),
            "failed:enter a location to search".to_string(),
        ],
        "Superseded results are not announced"
    );
}

#[tokio::test]
async fn test_search_shows_candidates() {
    setup_test_env();
    let backend = ScriptedBackend::default().with_free_text(
        "farmacia",
        vec![
            hit(-34.9011, -56.1645, PlaceKind::Node, "Farmacia Centro"),
            hit(-34.9105, -56.1520, PlaceKind::Node, "Farmacia Cordón"),
            hit(-34.8870, -56.1590, PlaceKind::Node, "Farmacia La Blanqueada"),
        ],
    );
    let mut map = session(backend);
    map.update(montevideo().with_street("18 de Julio")).await;

    let outcome = map.search("  farmacia ", 3).await;
    let ApplyOutcome::Applied(ResolvedGeometry::MultiPoint(points)) = outcome else {
        panic!("Expected candidates, got {outcome:?}");
    };
    assert_eq!(points.len(), 3);
    assert_eq!(map.scene().marker_features().len(), 3);
    assert!(map.current_descriptor().is_none());

    let hint = map.center_hint().expect("Candidates are fitted");
    assert!(points.iter().all(|p| hint.fit.is_some_and(|b| b.contains(p))));
    assert!(map.resolver().backend().calls().contains(&"text:farmacia|3".to_string()));
}

#[tokio::test]
async fn test_search_after_failure_clears_last_error() {
    setup_test_env();
    let backend = ScriptedBackend::default().with_free_text(
        "farmacia",
        vec![
            hit(-34.9011, -56.1645, PlaceKind::Node, "Farmacia Centro"),
            hit(-34.9105, -56.1520, PlaceKind::Node, "Farmacia Cordón"),
        ],
    );
    let mut map = session(backend);

    let outcome = map.update(montevideo().with_street("Calle Inexistente")).await;
    assert!(matches!(outcome, ApplyOutcome::Failed(ResolveError::NoGeometry(_))));
    assert!(map.last_error().is_some());

    let outcome = map.search("farmacia", 2).await;
    assert!(matches!(outcome, ApplyOutcome::Applied(ResolvedGeometry::MultiPoint(_))));
    assert_eq!(map.last_error(), None, "The earlier failure no longer describes the scene");
}

#[tokio::test]
async fn test_recenter_uses_last_center_hint() {
    setup_test_env();
    let recorder = Recorder::default();
    let calls = Arc::clone(&recorder.calls);
    let mut map = MapSession::builder()
        .config(ResolverConfigBuilder::testing().build())
        .renderer(recorder)
        .build_with_backend(Arc::new(dieciocho_backend()))
        .expect("testing config is valid");

    assert!(!map.recenter(), "Nothing resolved yet");
    map.update(montevideo().with_street("18 de Julio").with_house_number("1234"))
        .await;
    assert!(map.recenter());

    let viewports = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("viewport:"))
        .count();
    assert_eq!(viewports, 2);
}

#[tokio::test]
async fn test_click_infers_street_and_cross_street() {
    setup_test_env();
    let click = Coordinate::new(-34.8936, -56.1642);
    let mut backend = ScriptedBackend::default().with_reverse(click, "Avenida General Rivera");
    backend.highways = vec![
        NearbyWay {
            id: 10,
            name: "Avenida General Rivera".into(),
            nodes: vec![1, 2, 3],
        },
        NearbyWay {
            id: 11,
            name: "Pasaje Sin Salida".into(),
            nodes: vec![8, 9],
        },
        NearbyWay {
            id: 12,
            name: "Avenida 8 de Octubre".into(),
            nodes: vec![3, 4],
        },
    ];

    let log = Arc::new(EventLog::default());
    let mut map = session(backend);
    map.add_listener(log.clone());
    map.update(montevideo().with_street("Calle Inexistente")).await;
    let before = map.generation();

    let descriptor = map.infer_from_click(click).await.expect("Click should resolve");
    assert_eq!(descriptor.street(), Some("Avenida General Rivera"));
    assert_eq!(descriptor.cross_street(), Some("Avenida 8 de Octubre"));
    assert_eq!(descriptor.city(), Some("Montevideo"));

    assert!(map.generation() > before, "A click supersedes pending resolutions");
    assert_eq!(map.scene().marker_features(), &[Feature::Point(click)]);
    assert_eq!(map.last_error(), None);
    assert_eq!(map.current_descriptor(), Some(&descriptor));
    assert_eq!(
        log.events().last().map(String::as_str),
        Some("inferred:Avenida General Rivera|Avenida 8 de Octubre")
    );
    assert!(
        map.resolver()
            .backend()
            .calls()
            .iter()
            .any(|call| call.ends_with("@50")),
        "Nearby ways are looked up with the click radius"
    );
}

#[tokio::test]
async fn test_click_replaces_center_hint_of_previous_street() {
    setup_test_env();
    let click = Coordinate::new(-34.8700, -56.1000);
    let recorder = Recorder::default();
    let calls = Arc::clone(&recorder.calls);
    let mut map = MapSession::builder()
        .config(ResolverConfigBuilder::testing().build())
        .renderer(recorder)
        .build_with_backend(Arc::new(
            dieciocho_backend().with_reverse(click, "Camino Carrasco"),
        ))
        .expect("testing config is valid");

    map.update(montevideo().with_street("18 de Julio")).await;
    assert!(map.center_hint().is_some_and(|hint| hint.fit.is_some()));

    let descriptor = map.infer_from_click(click).await.expect("Click should resolve");
    assert_eq!(descriptor.street(), Some("Camino Carrasco"));
    assert_eq!(map.current_descriptor(), Some(&descriptor));
    assert_eq!(
        map.center_hint(),
        Some(&CenterHint {
            coordinate: click,
            zoom: 17,
            fit: None,
        })
    );

    assert!(map.recenter());
    assert_eq!(
        calls.lock().unwrap().last().map(String::as_str),
        Some("viewport:center"),
        "Recentering goes to the click, not to the old street"
    );
}

#[tokio::test]
async fn test_click_on_nothing_leaves_scene_untouched() {
    setup_test_env();
    let mut map = session(dieciocho_backend());
    map.update(montevideo().with_street("18 de Julio")).await;
    let generation = map.generation();

    assert!(map.infer_from_click(Coordinate::new(0.0, 0.0)).await.is_none());
    assert_eq!(map.generation(), generation);
    assert!(map.scene().has_line());
}

#[test]
fn test_unit_positions_outside_envelope_are_dropped() {
    setup_test_env();
    let map = session(ScriptedBackend::default());
    let positions = vec![
        MobileUnitPosition {
            id: "movil-12".into(),
            easting: 574_000.0,
            northing: 6_137_000.0,
            zone: 21,
            hemisphere: Hemisphere::South,
        },
        MobileUnitPosition {
            id: "movil-99".into(),
            easting: 0.0,
            northing: 0.0,
            zone: 21,
            hemisphere: Hemisphere::South,
        },
    ];

    let locations = map.unit_locations(&positions);
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].id, "movil-12");
    assert!((locations[0].coordinate.lat + 34.9067).abs() < 0.001);
    assert!((locations[0].coordinate.lon + 56.1900).abs() < 0.001);
}
