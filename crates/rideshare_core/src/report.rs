//! Summaries derived from an allocation pass or from the stored users.
//!
//! [`LoadReport`] measures how evenly a pass spread riders over drivers;
//! [`UsersOverview`] is the dashboard-style view over every stored record.

use serde::Serialize;

use crate::geo::Point;
use crate::matching::Allocation;
use crate::user::{AssignedRider, Role, User};

/// Seat usage of one driver after a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverLoad {
    pub driver_id: String,
    /// Seats the driver offered when the pass started.
    pub offered_seats: u32,
    /// Riders assigned during the pass.
    pub filled_seats: u32,
    /// `filled_seats` minus the pass average.
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BalanceQuality {
    Excellent,
    Good,
    Fair,
}

impl BalanceQuality {
    /// Bucket by standard deviation of filled seats: below 1, below 2, otherwise.
    pub fn from_std_dev(std_dev: f64) -> Self {
        if std_dev < 1.0 {
            Self::Excellent
        } else if std_dev < 2.0 {
            Self::Good
        } else {
            Self::Fair
        }
    }
}

/// Distribution of filled seats across the drivers of one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub drivers: Vec<DriverLoad>,
    pub total_offered_seats: u32,
    pub total_filled_seats: u32,
    pub unmatched_riders: usize,
    pub average_filled: f64,
    /// Population variance.
    pub variance: f64,
    pub std_dev: f64,
    pub min_filled: u32,
    pub max_filled: u32,
    /// 0 for a perfectly even spread, approaching 1 as riders concentrate on few drivers.
    pub gini: f64,
    pub quality: BalanceQuality,
}

impl LoadReport {
    /// `drivers` is the pool the allocation ran over.
    pub fn from_allocation(drivers: &[User], allocation: &Allocation) -> Self {
        let filled: Vec<u32> = drivers
            .iter()
            .map(|d| allocation.assignments.get(&d.id).map_or(0, Vec::len) as u32)
            .collect();

        let n = filled.len();
        let total_filled: u32 = filled.iter().sum();
        let average = if n > 0 {
            f64::from(total_filled) / n as f64
        } else {
            0.0
        };
        let variance = if n > 0 {
            filled
                .iter()
                .map(|&f| (f64::from(f) - average).powi(2))
                .sum::<f64>()
                / n as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();

        Self {
            drivers: drivers
                .iter()
                .zip(&filled)
                .map(|(driver, &filled_seats)| DriverLoad {
                    driver_id: driver.id.clone(),
                    offered_seats: driver.seats,
                    filled_seats,
                    deviation: f64::from(filled_seats) - average,
                })
                .collect(),
            total_offered_seats: drivers.iter().map(|d| d.seats).sum(),
            total_filled_seats: total_filled,
            unmatched_riders: allocation.unmatched.len(),
            average_filled: average,
            variance,
            std_dev,
            min_filled: filled.iter().copied().min().unwrap_or(0),
            max_filled: filled.iter().copied().max().unwrap_or(0),
            gini: gini(&filled),
            quality: BalanceQuality::from_std_dev(std_dev),
        }
    }
}

fn gini(values: &[u32]) -> f64 {
    let total: u64 = values.iter().map(|&v| u64::from(v)).sum();
    if values.is_empty() || total == 0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len() as f64;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 + 1.0) * f64::from(v))
        .sum();
    2.0 * weighted / (n * total as f64) - (n + 1.0) / n
}

/// A committed ride group as shown in the overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRide {
    pub driver_id: String,
    pub source: Point,
    pub destination: Point,
    pub seats_left: u32,
    pub riders: Vec<AssignedRider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsersOverview {
    pub total_users: usize,
    pub drivers: usize,
    pub riders: usize,
    pub without_role: usize,
    pub assigned_drivers: usize,
    pub assigned_riders: usize,
    pub unassigned: usize,
    pub total_tokens: i64,
    pub active_rides: Vec<ActiveRide>,
}

impl UsersOverview {
    pub fn from_users(users: &[User]) -> Self {
        let mut overview = Self {
            total_users: users.len(),
            ..Self::default()
        };
        for user in users {
            overview.total_tokens += user.token;
            if !user.assigned {
                overview.unassigned += 1;
            }
            match user.role {
                Role::Driver => {
                    overview.drivers += 1;
                    if user.assigned {
                        overview.assigned_drivers += 1;
                        overview.active_rides.push(ActiveRide {
                            driver_id: user.id.clone(),
                            source: user.source,
                            destination: user.destination,
                            seats_left: user.seats,
                            riders: user.riders.clone(),
                        });
                    }
                }
                Role::Rider => {
                    overview.riders += 1;
                    if user.assigned {
                        overview.assigned_riders += 1;
                    }
                }
                Role::Unset => overview.without_role += 1,
            }
        }
        overview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(id: &str, seats: u32) -> User {
        let mut user = User::new(id, 10);
        user.role = Role::Driver;
        user.seats = seats;
        user
    }

    fn assigned(ids: &[&str]) -> Vec<AssignedRider> {
        ids.iter()
            .map(|id| AssignedRider {
                rider_id: id.to_string(),
                source: Point::default(),
                destination: Point::default(),
            })
            .collect()
    }

    #[test]
    fn even_spread_is_excellent() {
        let drivers = [driver("d1", 3), driver("d2", 3)];
        let mut allocation = Allocation::default();
        allocation.assignments.insert("d1".into(), assigned(&["r1"]));
        allocation.assignments.insert("d2".into(), assigned(&["r2"]));

        let report = LoadReport::from_allocation(&drivers, &allocation);
        assert_eq!(report.total_filled_seats, 2);
        assert_eq!(report.total_offered_seats, 6);
        assert_eq!(report.average_filled, 1.0);
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.gini, 0.0);
        assert_eq!(report.quality, BalanceQuality::Excellent);
    }

    #[test]
    fn skewed_spread_reports_deviation() {
        let drivers = [driver("d1", 5), driver("d2", 5)];
        let mut allocation = Allocation::default();
        allocation
            .assignments
            .insert("d1".into(), assigned(&["r1", "r2", "r3", "r4"]));
        allocation.assignments.insert("d2".into(), Vec::new());

        let report = LoadReport::from_allocation(&drivers, &allocation);
        assert_eq!(report.average_filled, 2.0);
        assert_eq!(report.variance, 4.0);
        assert_eq!(report.std_dev, 2.0);
        assert_eq!(report.quality, BalanceQuality::Fair);
        assert_eq!((report.min_filled, report.max_filled), (0, 4));
        assert_eq!(report.drivers[1].deviation, -2.0);
        assert!((report.gini - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_pool_is_all_zero() {
        let report = LoadReport::from_allocation(&[], &Allocation::default());
        assert_eq!(report.average_filled, 0.0);
        assert_eq!(report.max_filled, 0);
        assert_eq!(report.quality, BalanceQuality::Excellent);
    }

    #[test]
    fn overview_counts_roles_and_active_rides() {
        let mut d1 = driver("d1", 2);
        d1.assigned = true;
        d1.riders = assigned(&["r1"]);
        d1.token = 12;
        let mut r1 = User::new("r1", 8);
        r1.role = Role::Rider;
        r1.assigned = true;
        let fresh = User::new("u3", 10);

        let overview = UsersOverview::from_users(&[d1, r1, fresh]);
        assert_eq!(overview.total_users, 3);
        assert_eq!(overview.drivers, 1);
        assert_eq!(overview.riders, 1);
        assert_eq!(overview.without_role, 1);
        assert_eq!(overview.unassigned, 1);
        assert_eq!(overview.total_tokens, 30);
        assert_eq!(overview.active_rides.len(), 1);
        assert_eq!(overview.active_rides[0].seats_left, 2);
    }
}
