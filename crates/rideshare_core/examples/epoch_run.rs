//! Run one matching epoch over 20 drivers / 100 riders and print the load report.
//!
//! Run with: cargo run -p rideshare_core --example epoch_run

use rideshare_core::config::EngineConfig;
use rideshare_core::demand::{generate_users, DemandParams};
use rideshare_core::routing::HaversineDistanceProvider;
use rideshare_core::store::MemoryStateStore;
use rideshare_core::MatchingEngine;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    const NUM_DRIVERS: usize = 20;
    const NUM_RIDERS: usize = 100;

    let users = generate_users(
        &DemandParams::default()
            .with_seed(123)
            .with_counts(NUM_DRIVERS, NUM_RIDERS),
    );
    let engine = MatchingEngine::new(
        MemoryStateStore::new(),
        Box::new(HaversineDistanceProvider),
        EngineConfig::default(),
    )?;
    engine.import_users(&users)?;
    let Some(epoch) = engine.run_epoch("epoch-demo")? else {
        println!("Not enough users waiting.");
        return Ok(());
    };

    let report = &epoch.assignment.report;
    println!(
        "--- Epoch ({} drivers, {} riders, seed 123) ---",
        NUM_DRIVERS, NUM_RIDERS
    );
    println!("Eligible pairs: {}", epoch.matrix.eligible_pairs);
    println!(
        "Matched riders: {} / unmatched: {}",
        epoch.assignment.allocation.matched_count(),
        report.unmatched_riders
    );
    println!(
        "Filled seats: {} of {} (avg {:.2}/driver, std dev {:.2}, gini {:.3}, {:?})",
        report.total_filled_seats,
        report.total_offered_seats,
        report.average_filled,
        report.std_dev,
        report.gini,
        report.quality
    );
    for load in report.drivers.iter().filter(|l| l.filled_seats > 0) {
        println!(
            "  {}: {}/{} seats filled ({:+.2} from average)",
            load.driver_id, load.filled_seats, load.offered_seats, load.deviation
        );
    }
    Ok(())
}
