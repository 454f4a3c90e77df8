mod support;

use rideshare_core::error::MatchError;
use rideshare_core::geo::Point;
use rideshare_core::store::{JsonFileStateStore, MemoryStateStore, StateStore};
use rideshare_core::test_helpers::ScriptedDistanceProvider;
use rideshare_core::user::{RideRequest, Role};
use support::fixtures::{east_driver, engine, on_the_way_rider, seed};

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = JsonFileStateStore::open(&path);
    store.put("usr2", br#"{"b":1,"a":2}"#.to_vec()).unwrap();
    store.put("usr1", b"[1,2]".to_vec()).unwrap();

    let reopened = JsonFileStateStore::open(&path);
    let entries = reopened.scan_all().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "usr1");
    assert_eq!(entries[1].1, br#"{"a":2,"b":1}"#.to_vec());
    assert!(!dir.path().join("state.json.tmp").exists());
}

#[test]
fn file_store_delete_and_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStateStore::open(dir.path().join("nested").join("state.json"));
    store
        .put_batch(vec![
            ("a".to_string(), b"1".to_vec()),
            ("b".to_string(), b"2".to_vec()),
        ])
        .unwrap();
    store.delete("a").unwrap();
    store.delete("missing").unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = JsonFileStateStore::open(&path).scan_all().unwrap_err();
    assert!(err.to_string().contains("state.json"));
}

#[test]
fn epoch_over_file_store_matches_memory_store() {
    let d1 = east_driver("d1", 2, 20);
    let riders = [on_the_way_rider("r1", 0), on_the_way_rider("r2", 1)];
    let mut users = vec![d1];
    users.extend(riders);

    let dir = tempfile::tempdir().unwrap();
    let file_store = JsonFileStateStore::open(dir.path().join("state.json"));
    let memory_store = MemoryStateStore::new();
    seed(&file_store, &users);
    seed(&memory_store, &users);

    for store in [&file_store as &dyn StateStore, &memory_store as &dyn StateStore] {
        let engine = engine(store, ScriptedDistanceProvider::new().with_default(1000.0));
        engine.build_matrix().unwrap();
        engine.run_assignment("tx-file").unwrap();
    }
    assert_eq!(file_store.scan_all().unwrap(), memory_store.scan_all().unwrap());
}

#[test]
fn user_lifecycle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStateStore::open(dir.path().join("state.json"));
    let engine = engine(&store, ScriptedDistanceProvider::new());

    engine.create_user("usr1").unwrap();
    assert!(engine.user_exists("usr1").unwrap());
    assert!(!engine.user_exists("usr2").unwrap());

    let request = RideRequest::driver(Point::new(12.9, 77.5), Point::new(13.0, 77.6), 3, 25);
    let user = engine.request_ride("usr1", &request).unwrap();
    assert_eq!(user.role, Role::Driver);
    assert_eq!(user.token, 10);

    let stored = engine.read_user("usr1").unwrap();
    assert_eq!(stored, user);

    let invalid = RideRequest::rider(Point::new(120.0, 0.0), Point::new(0.0, 0.0));
    assert!(matches!(
        engine.request_ride("usr1", &invalid),
        Err(MatchError::Precondition(_))
    ));

    engine.delete_user("usr1").unwrap();
    assert!(matches!(engine.read_user("usr1"), Err(MatchError::UserNotFound(_))));
    assert!(matches!(engine.delete_user("usr1"), Err(MatchError::UserNotFound(_))));
}

#[test]
fn overview_reflects_committed_rides() {
    let store = MemoryStateStore::new();
    seed(&store, &[east_driver("d1", 2, 20), on_the_way_rider("r1", 0)]);
    let engine = engine(&store, ScriptedDistanceProvider::new().with_default(1000.0));
    engine.run_epoch("tx-overview").unwrap().expect("epoch ran");

    let overview = engine.overview().unwrap();
    assert_eq!(overview.total_users, 2);
    assert_eq!(overview.assigned_drivers, 1);
    assert_eq!(overview.assigned_riders, 1);
    assert_eq!(overview.active_rides.len(), 1);
    assert_eq!(overview.active_rides[0].seats_left, 1);
    assert_eq!(overview.total_tokens, 20);
}
