use std::collections::BTreeMap;

use serde::Serialize;

use crate::geo::Point;
use crate::user::{AssignedRider, User};

/// Allocation-pass view of a driver: its persisted record plus what this pass
/// has added to it so far.
#[derive(Debug, Clone)]
pub struct DriverSlot<'a> {
    pub driver: &'a User,
    /// Seats still free, including this pass's assignments.
    pub seats: u32,
    /// Riders assigned during this pass, in commit order.
    pub assigned: Vec<AssignedRider>,
}

impl<'a> DriverSlot<'a> {
    pub fn new(driver: &'a User) -> Self {
        Self {
            driver,
            seats: driver.seats,
            assigned: Vec::new(),
        }
    }

    /// Riders already carried: persisted ones plus this pass's.
    pub fn load(&self) -> usize {
        self.driver.riders.len() + self.assigned.len()
    }

    /// Pickup and drop-off of every carried rider in assignment order, then the new rider's.
    pub fn waypoints_with(&self, new_rider: &User) -> Vec<Point> {
        let mut waypoints = Vec::with_capacity(2 * (self.load() + 1));
        for rider in self.driver.riders.iter().chain(self.assigned.iter()) {
            waypoints.push(rider.source);
            waypoints.push(rider.destination);
        }
        waypoints.push(new_rider.source);
        waypoints.push(new_rider.destination);
        waypoints
    }
}

/// Lifecycle of one allocation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AllocationPhase {
    Initialized,
    Iterating,
    /// Terminal: every offer is exhausted and the result is final.
    Committed,
    /// Terminal: an unrecoverable error stopped the pass.
    Aborted,
}

/// What a single allocator iteration did. Indices refer to the input slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Matched { driver: usize, rider: usize },
    /// No driver could take the rider; it is out of this epoch.
    RiderDropped { rider: usize },
    /// The selected driver had no seat left; its row was cleared and the rider stays.
    DriverFull { driver: usize, rider: usize },
    Finished,
}

/// Result of an allocation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Allocation {
    /// Every pool driver mapped to the riders it received this pass (possibly none).
    pub assignments: BTreeMap<String, Vec<AssignedRider>>,
    /// Seats left per pool driver after the pass.
    pub remaining_seats: BTreeMap<String, u32>,
    /// Pool riders that did not get a driver, in pool order.
    pub unmatched: Vec<String>,
}

impl Allocation {
    pub fn matched_count(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }

    /// The driver a rider was assigned to, if any.
    pub fn driver_of(&self, rider_id: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(_, riders)| riders.iter().any(|r| r.rider_id == rider_id))
            .map(|(driver_id, _)| driver_id.as_str())
    }
}
