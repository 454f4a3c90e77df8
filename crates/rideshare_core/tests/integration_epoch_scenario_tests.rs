mod support;

use rideshare_core::error::MatchError;
use rideshare_core::routing::ProviderError;
use rideshare_core::store::MemoryStateStore;
use rideshare_core::test_helpers::ScriptedDistanceProvider;
use support::fixtures::{east_driver, engine, on_the_way_rider, seed, snapshot};

#[test]
fn single_eligible_rider_is_assigned() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let provider = ScriptedDistanceProvider::new()
        .direct(&d1, 1000.0)
        .detour(&d1, &r1, 1100.0);

    let store = MemoryStateStore::new();
    seed(&store, &[d1.clone(), r1.clone()]);
    let engine = engine(store, provider);

    let matrix = engine.build_matrix().expect("matrix");
    assert_eq!(matrix.eligible_pairs, 1);
    assert_eq!(engine.eligibility_matrix().unwrap().rows(), &[vec![1]]);

    let summary = engine.run_assignment("tx-A").expect("assignment");
    assert_eq!(summary.allocation.driver_of("r1"), Some("d1"));
    assert_eq!(summary.records_written, 2);

    let driver = engine.read_user("d1").unwrap();
    assert_eq!(driver.seats, 1);
    assert_eq!(driver.riders.len(), 1);
    assert_eq!(driver.riders[0].rider_id, "r1");
    assert_eq!(driver.riders[0].source, r1.source);
    assert_eq!(driver.token, 12);
    assert!(driver.assigned);

    let rider = engine.read_user("r1").unwrap();
    assert!(rider.assigned);
    assert_eq!(rider.token, 8);
    let driver_ref = rider.driver.expect("driver ref");
    assert_eq!(driver_ref.driver_id, "d1");
    assert_eq!(driver_ref.destination, r1.destination);
}

#[test]
fn full_driver_leaves_second_rider_unassigned() {
    let d1 = east_driver("d1", 1, 20);
    let r1 = on_the_way_rider("r1", 0);
    let r2 = on_the_way_rider("r2", 1);
    let provider = ScriptedDistanceProvider::new()
        .direct(&d1, 1000.0)
        .detour(&d1, &r1, 1100.0)
        .detour(&d1, &r2, 1100.0);

    let store = MemoryStateStore::new();
    seed(&store, &[d1, r1, r2]);
    let engine = engine(store, provider);

    engine.build_matrix().unwrap();
    assert_eq!(engine.eligibility_matrix().unwrap().offers(), vec![1, 1]);

    let summary = engine.run_assignment("tx-B").unwrap();
    assert_eq!(summary.allocation.matched_count(), 1);
    assert_eq!(summary.allocation.unmatched.len(), 1);
    assert_eq!(summary.allocation.remaining_seats["d1"], 0);

    let driver = engine.read_user("d1").unwrap();
    assert_eq!(driver.seats, 0);
    let assigned: Vec<bool> = ["r1", "r2"]
        .iter()
        .map(|id| engine.read_user(id).unwrap().assigned)
        .collect();
    assert_eq!(assigned.iter().filter(|a| **a).count(), 1);
}

#[test]
fn detour_over_budget_is_never_offered() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let provider = ScriptedDistanceProvider::new()
        .direct(&d1, 1000.0)
        .detour(&d1, &r1, 1300.0);

    let store = MemoryStateStore::new();
    seed(&store, &[d1, r1]);
    let engine = engine(store, provider);

    engine.build_matrix().unwrap();
    assert_eq!(engine.eligibility_matrix().unwrap().rows(), &[vec![0]]);

    let summary = engine.run_assignment("tx-C").unwrap();
    assert_eq!(summary.allocation.unmatched, vec!["r1".to_string()]);
    assert_eq!(summary.records_written, 0);
    assert!(!engine.read_user("r1").unwrap().assigned);
    assert_eq!(engine.read_user("d1").unwrap().seats, 2);
}

#[test]
fn direct_route_failure_aborts_without_writes() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let store = MemoryStateStore::new();
    seed(&store, &[d1.clone(), r1.clone()]);

    let healthy = ScriptedDistanceProvider::new()
        .direct(&d1, 1000.0)
        .detour(&d1, &r1, 1100.0);
    engine(&store, healthy).build_matrix().unwrap();
    let before = snapshot(&store);

    let failing = ScriptedDistanceProvider::new()
        .fail_direct(&d1, "OVER_QUERY_LIMIT")
        .detour(&d1, &r1, 1100.0);
    let err = engine(&store, failing).run_assignment("tx-D").unwrap_err();

    assert!(matches!(
        err,
        MatchError::Provider(ProviderError::Status(ref detail)) if detail == "OVER_QUERY_LIMIT"
    ));
    assert_eq!(snapshot(&store), before);
}

#[test]
fn matrix_build_failure_persists_nothing() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let store = MemoryStateStore::new();
    seed(&store, &[d1.clone(), r1]);
    let before = snapshot(&store);

    // Detour route is not scripted.
    let provider = ScriptedDistanceProvider::new().direct(&d1, 1000.0);
    let err = engine(&store, provider).build_matrix().unwrap_err();
    assert!(matches!(err, MatchError::Provider(ProviderError::Unscripted(_))));
    assert_eq!(snapshot(&store), before);
}

#[test]
fn stale_matrix_is_rejected() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let r2 = on_the_way_rider("r2", 1);
    let store = MemoryStateStore::new();
    seed(&store, &[d1.clone(), r1.clone()]);

    let provider = ScriptedDistanceProvider::new().with_default(1000.0);
    let engine = engine(&store, provider);
    engine.build_matrix().unwrap();

    // A new rider joins between the two epoch steps.
    seed(&store, &[r2]);
    let err = engine.run_assignment("tx-stale").unwrap_err();
    assert!(matches!(
        err,
        MatchError::StaleMatrix { rows: 1, cols: 1, drivers: 1, riders: 2 }
    ));
}

#[test]
fn committed_assignment_retires_the_matrix() {
    let d1 = east_driver("d1", 2, 20);
    let r1 = on_the_way_rider("r1", 0);
    let store = MemoryStateStore::new();
    seed(&store, &[d1, r1]);

    let engine = engine(&store, ScriptedDistanceProvider::new().with_default(1000.0));
    engine.build_matrix().unwrap();
    let first = engine.run_assignment("tx-1").unwrap();
    assert_eq!(first.allocation.driver_of("r1"), Some("d1"));
    assert!(matches!(engine.eligibility_matrix(), Err(MatchError::MatrixNotFound)));

    // A fresh pool of the same shape must not reuse the old matrix.
    seed(&store, &[east_driver("d9", 2, 20), on_the_way_rider("r9", 0)]);
    let before = snapshot(&store);
    assert!(matches!(engine.run_assignment("tx-2"), Err(MatchError::MatrixNotFound)));
    assert_eq!(snapshot(&store), before);
    assert!(!engine.read_user("r9").unwrap().assigned);

    engine.build_matrix().unwrap();
    let second = engine.run_assignment("tx-3").unwrap();
    assert_eq!(second.allocation.driver_of("r9"), Some("d9"));
}

#[test]
fn epoch_runs_only_once_enough_users_wait() {
    let provider = ScriptedDistanceProvider::new().with_default(1000.0);
    let engine = engine(MemoryStateStore::new(), provider);

    engine.create_user("d1").unwrap();
    assert!(engine.run_epoch("tx-early").unwrap().is_none());

    let d1 = east_driver("d1", 3, 10);
    let r1 = on_the_way_rider("r1", 0);
    engine.create_user("r1").unwrap();
    engine
        .request_ride(
            "d1",
            &rideshare_core::user::RideRequest::driver(d1.source, d1.destination, 3, 10),
        )
        .unwrap();
    engine
        .request_ride(
            "r1",
            &rideshare_core::user::RideRequest::rider(r1.source, r1.destination),
        )
        .unwrap();

    let summary = engine.run_epoch("tx-epoch").unwrap().expect("epoch ran");
    assert_eq!(summary.matrix.drivers, 1);
    assert_eq!(summary.assignment.allocation.driver_of("r1"), Some("d1"));
    assert_eq!(engine.count_unassigned().unwrap(), 0);
    assert!(!engine.should_trigger().unwrap());
}
