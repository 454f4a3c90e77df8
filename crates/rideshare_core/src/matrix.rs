//! Eligibility matrix: which driver can serve which rider within its detour budget.
//!
//! Row `i` is a driver, column `j` a rider. `ER[i][j] == 1` iff the shortest route
//! from the driver's source to its destination through the rider's pickup and
//! drop-off stays within `direct × (1 + threshold / 100)`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MatchResult;
use crate::routing::{direct_distance_m, route_distance_m, DistanceProvider, RouteRequest};
use crate::user::User;

/// Maximum route length a driver accepts, given its direct distance and threshold percentage.
pub fn max_detour_m(direct_m: f64, threshold_pct: u32) -> f64 {
    direct_m * (1.0 + f64::from(threshold_pct) / 100.0)
}

/// Dense 0/1 matrix, persisted as a JSON array of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibilityMatrix {
    rows: Vec<Vec<u8>>,
}

impl EligibilityMatrix {
    pub fn zeros(drivers: usize, riders: usize) -> Self {
        Self {
            rows: vec![vec![0; riders]; drivers],
        }
    }

    /// Build from explicit rows. Any non-zero entry counts as eligible.
    pub fn from_rows(rows: Vec<Vec<u8>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| u8::from(v != 0)).collect())
                .collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub fn driver_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count of the first row; `0` for a matrix without drivers.
    pub fn rider_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// True when every row has the same length.
    pub fn is_rectangular(&self) -> bool {
        let cols = self.rider_count();
        self.rows.iter().all(|row| row.len() == cols)
    }

    pub fn get(&self, driver: usize, rider: usize) -> bool {
        self.rows[driver][rider] == 1
    }

    pub fn set(&mut self, driver: usize, rider: usize, eligible: bool) {
        self.rows[driver][rider] = u8::from(eligible);
    }

    pub fn zero_row(&mut self, driver: usize) {
        self.rows[driver].iter_mut().for_each(|v| *v = 0);
    }

    pub fn zero_column(&mut self, rider: usize) {
        for row in &mut self.rows {
            row[rider] = 0;
        }
    }

    /// Offer count per rider: the column sums.
    pub fn offers(&self) -> Vec<usize> {
        let mut offers = vec![0usize; self.rider_count()];
        for row in &self.rows {
            for (j, &v) in row.iter().enumerate() {
                offers[j] += usize::from(v);
            }
        }
        offers
    }

    /// Total number of eligible (driver, rider) pairs.
    pub fn ones(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&v| usize::from(v)).sum::<usize>())
            .sum()
    }

    /// Drivers whose row has a 1 in the given rider's column, ascending.
    pub fn eligible_drivers(&self, rider: usize) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row[rider] == 1)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Compute the eligibility matrix for the given pool.
///
/// Costs one direct-route call per driver plus one waypoint call per
/// (driver, rider) pair. Any provider failure aborts the whole build.
pub fn build_eligibility_matrix(
    provider: &dyn DistanceProvider,
    drivers: &[User],
    riders: &[User],
) -> MatchResult<EligibilityMatrix> {
    let mut matrix = EligibilityMatrix::zeros(drivers.len(), riders.len());

    for (i, driver) in drivers.iter().enumerate() {
        let direct_m = direct_distance_m(provider, driver.source, driver.destination)?;
        let budget_m = max_detour_m(direct_m, driver.threshold);

        for (j, rider) in riders.iter().enumerate() {
            let request = RouteRequest::via(
                driver.source,
                driver.destination,
                vec![rider.source, rider.destination],
            );
            let detour_m = route_distance_m(provider, &request)?;
            let eligible = detour_m <= budget_m;
            matrix.set(i, j, eligible);
            debug!(
                driver = %driver.id,
                rider = %rider.id,
                direct_m,
                budget_m,
                detour_m,
                eligible,
                "eligibility checked"
            );
        }
    }

    info!(
        drivers = drivers.len(),
        riders = riders.len(),
        eligible_pairs = matrix.ones(),
        "eligibility matrix built"
    );
    Ok(matrix)
}
