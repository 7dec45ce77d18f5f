//! Integration tests for the corner search against a scripted topology.

mod common;

use std::{sync::Arc, time::Duration};

use callejero::{IntersectionResolver, osm::GeocodeError};
use common::{CORNER, RIVERA_APPROX, ScriptedBackend, corner_backend, montevideo, node, setup_test_env};

#[tokio::test]
async fn test_shared_node_is_the_corner() {
    setup_test_env();
    let resolver = IntersectionResolver::new(Arc::new(corner_backend()), 250, Duration::ZERO);

    let corner = resolver
        .find_corner(&montevideo(), "Rivera", "8 de Octubre", RIVERA_APPROX)
        .await
        .expect("Rivera and 8 de Octubre share node 42");

    assert_eq!(corner.node_id, 42);
    assert_eq!(corner.coordinate, CORNER);
    assert!(corner.distance_m <= 250.0);
}

#[tokio::test]
async fn test_cross_street_name_is_matched_loosely() {
    setup_test_env();
    let resolver = IntersectionResolver::new(Arc::new(corner_backend()), 250, Duration::ZERO);

    let corner = resolver
        .find_corner(&montevideo(), "Rivera", "  8 DE OCTUBRE ", RIVERA_APPROX)
        .await
        .expect("Case and spacing should not matter");
    assert_eq!(corner.node_id, 42);
}

#[tokio::test]
async fn test_no_shared_node_is_not_found() {
    setup_test_env();
    let resolver = IntersectionResolver::new(Arc::new(corner_backend()), 250, Duration::ZERO);

    let result = resolver
        .find_corner(&montevideo(), "Rivera", "Bulevar Artigas", RIVERA_APPROX)
        .await;
    assert_eq!(result, Err(GeocodeError::NotFound));

    let missing = resolver
        .find_corner(&montevideo(), "Calle Inexistente", "Rivera", RIVERA_APPROX)
        .await;
    assert_eq!(missing, Err(GeocodeError::NotFound), "No ways means no corner");
}

#[tokio::test]
async fn test_radius_is_never_widened() {
    setup_test_env();
    let backend = ScriptedBackend::default()
        .with_street_nodes("Rivera", vec![node(42, CORNER.lat, CORNER.lon)])
        .with_reverse(CORNER, "Rivera, 8 de Octubre");
    let backend = Arc::new(backend);
    let resolver = IntersectionResolver::new(Arc::clone(&backend), 50, Duration::ZERO);

    let result = resolver
        .find_corner(&montevideo(), "Rivera", "8 de Octubre", RIVERA_APPROX)
        .await;
    assert_eq!(result, Err(GeocodeError::NotFound));

    let calls = backend.calls();
    assert_eq!(calls, vec!["nodes:Rivera@50".to_string()], "One node query, no reverse lookups");
}

#[tokio::test(start_paused = true)]
async fn test_reverse_lookups_are_paced() {
    setup_test_env();
    let resolver = IntersectionResolver::new(Arc::new(corner_backend()), 250, Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let corner = resolver
        .find_corner(&montevideo(), "Rivera", "8 de Octubre", RIVERA_APPROX)
        .await
        .expect("Corner should resolve");

    assert_eq!(corner.node_id, 42);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "Second lookup waits one delay");
    assert!(elapsed < Duration::from_secs(2), "The farthest node is never looked up");
}

#[tokio::test]
async fn test_unavailable_reverse_lookup_is_reported() {
    setup_test_env();
    let backend = ScriptedBackend {
        unavailable: true,
        ..corner_backend()
    };
    let resolver = IntersectionResolver::new(Arc::new(backend), 250, Duration::ZERO);

    let result = resolver
        .find_corner(&montevideo(), "Rivera", "8 de Octubre", RIVERA_APPROX)
        .await;
    assert!(matches!(result, Err(GeocodeError::Unavailable { .. })));
}
