#![allow(dead_code)]

use rideshare_core::config::EngineConfig;
use rideshare_core::geo::Point;
use rideshare_core::routing::DistanceProvider;
use rideshare_core::store::{canonical_bytes, StateStore};
use rideshare_core::test_helpers::{driver, rider};
use rideshare_core::user::User;
use rideshare_core::MatchingEngine;

/// Driver heading east across town.
pub fn east_driver(id: &str, seats: u32, threshold: u32) -> User {
    driver(id, Point::new(12.95, 77.55), Point::new(12.95, 77.65), seats, threshold)
}

/// Rider whose trip lies on the driver's way, offset by `k` so riders are distinct.
pub fn on_the_way_rider(id: &str, k: u32) -> User {
    let offset = f64::from(k) * 0.001;
    rider(
        id,
        Point::new(12.95, 77.57 + offset),
        Point::new(12.95, 77.62 + offset),
    )
}

/// Write users straight into the store, bypassing the lifecycle API.
pub fn seed<S: StateStore>(store: &S, users: &[User]) {
    let writes = users
        .iter()
        .map(|u| (u.id.clone(), canonical_bytes(u).expect("encode user")))
        .collect();
    store.put_batch(writes).expect("seed store");
}

pub fn engine<S: StateStore>(
    store: S,
    provider: impl DistanceProvider + 'static,
) -> MatchingEngine<S> {
    MatchingEngine::new(store, Box::new(provider), EngineConfig::default()).expect("engine")
}

pub fn snapshot<S: StateStore>(store: &S) -> Vec<(String, Vec<u8>)> {
    store.scan_all().expect("scan")
}
