//! Load-balanced driver selection for a single rider.
//!
//! Eligible drivers are grouped into load tiers (number of riders already
//! carried) and visited from the lightest tier up. Each tier gets exactly one
//! deterministic random probe: if the drawn driver cannot absorb the rider
//! within its detour budget, the search moves on to the next tier rather than
//! trying the tier's other members.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::MatchResult;
use crate::matrix::max_detour_m;
use crate::random::{derive_index, DRIVER_SEED};
use crate::routing::{direct_distance_m, route_distance_m, DistanceProvider, RouteRequest};
use crate::user::User;

use super::types::DriverSlot;

/// Pick a driver for `new_rider` among `eligible` (indices into `slots`).
///
/// Returns `Ok(None)` when no tier yields a feasible driver. A failure while
/// computing a candidate's direct distance is returned as an error; a failure
/// of the waypoint route only disqualifies that candidate.
pub fn select_driver(
    provider: &dyn DistanceProvider,
    eligible: &[usize],
    slots: &[DriverSlot<'_>],
    new_rider: &User,
    transaction_id: &str,
) -> MatchResult<Option<usize>> {
    let mut tiers: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &idx in eligible {
        tiers.entry(slots[idx].load()).or_default().push(idx);
    }

    for (load, tier) in &tiers {
        if tier.is_empty() {
            continue;
        }

        let pick = derive_index(transaction_id, DRIVER_SEED, tier.len())?;
        let candidate = tier[pick];
        let slot = &slots[candidate];
        let driver = slot.driver;

        let shortest_m = direct_distance_m(provider, driver.source, driver.destination)?;

        let request = RouteRequest::via(
            driver.source,
            driver.destination,
            slot.waypoints_with(new_rider),
        );
        let route_m = match route_distance_m(provider, &request) {
            Ok(distance) => distance,
            Err(err) => {
                warn!(
                    driver = %driver.id,
                    rider = %new_rider.id,
                    load,
                    error = %err,
                    "route probe failed, skipping candidate"
                );
                continue;
            }
        };

        let max_m = max_detour_m(shortest_m, driver.threshold);
        debug!(
            driver = %driver.id,
            rider = %new_rider.id,
            load,
            tier_size = tier.len(),
            route_m,
            max_m,
            "probed candidate"
        );
        if route_m <= max_m {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}
