//! Iterative rider-to-driver allocation over an eligibility matrix.
//!
//! Each iteration takes the rider with the fewest remaining offers (ties broken
//! by a deterministic draw), asks the [`select_driver`] policy for a driver and
//! then shrinks the matrix: the served or unservable rider's column is cleared,
//! and a driver's row is cleared once its seats run out. Every iteration clears
//! at least one matrix entry, so the loop terminates.

use tracing::{debug, info};

use crate::error::{MatchError, MatchResult};
use crate::matrix::EligibilityMatrix;
use crate::random::{derive_index, RIDER_SEED};
use crate::routing::DistanceProvider;
use crate::user::{AssignedRider, User};

use super::selector::select_driver;
use super::types::{Allocation, AllocationPhase, DriverSlot, StepOutcome};

/// Stateful allocation pass. Owns its copy of the matrix for the whole pass.
pub struct Allocator<'a> {
    provider: &'a dyn DistanceProvider,
    transaction_id: &'a str,
    riders: &'a [User],
    slots: Vec<DriverSlot<'a>>,
    matrix: EligibilityMatrix,
    offers: Vec<usize>,
    phase: AllocationPhase,
    iterations: usize,
}

impl<'a> Allocator<'a> {
    /// Fails with [`MatchError::StaleMatrix`] when the matrix shape does not match the pool.
    pub fn new(
        provider: &'a dyn DistanceProvider,
        matrix: EligibilityMatrix,
        drivers: &'a [User],
        riders: &'a [User],
        transaction_id: &'a str,
    ) -> MatchResult<Self> {
        let shape_matches = matrix.is_rectangular()
            && matrix.driver_count() == drivers.len()
            && (drivers.is_empty() || matrix.rider_count() == riders.len());
        if !shape_matches {
            return Err(MatchError::StaleMatrix {
                rows: matrix.driver_count(),
                cols: matrix.rider_count(),
                drivers: drivers.len(),
                riders: riders.len(),
            });
        }

        let offers = if drivers.is_empty() {
            vec![0; riders.len()]
        } else {
            matrix.offers()
        };

        Ok(Self {
            provider,
            transaction_id,
            riders,
            slots: drivers.iter().map(DriverSlot::new).collect(),
            matrix,
            offers,
            phase: AllocationPhase::Initialized,
            iterations: 0,
        })
    }

    pub fn phase(&self) -> AllocationPhase {
        self.phase
    }

    pub fn matrix(&self) -> &EligibilityMatrix {
        &self.matrix
    }

    pub fn offers(&self) -> &[usize] {
        &self.offers
    }

    pub fn slots(&self) -> &[DriverSlot<'a>] {
        &self.slots
    }

    /// Run one iteration of the loop.
    pub fn step(&mut self) -> MatchResult<StepOutcome> {
        match self.phase {
            AllocationPhase::Committed => return Ok(StepOutcome::Finished),
            AllocationPhase::Aborted => {
                return Err(MatchError::Precondition(
                    "allocation pass was aborted".into(),
                ))
            }
            AllocationPhase::Initialized | AllocationPhase::Iterating => {}
        }

        let Some(min_offer) = self.offers.iter().copied().filter(|&o| o > 0).min() else {
            self.phase = AllocationPhase::Committed;
            return Ok(StepOutcome::Finished);
        };
        self.phase = AllocationPhase::Iterating;
        self.iterations += 1;

        let candidates: Vec<usize> = self
            .offers
            .iter()
            .enumerate()
            .filter(|(_, &o)| o == min_offer)
            .map(|(j, _)| j)
            .collect();
        let pick = match derive_index(self.transaction_id, RIDER_SEED, candidates.len()) {
            Ok(pick) => pick,
            Err(err) => return self.abort(err),
        };
        let rider = candidates[pick];
        let eligible = self.matrix.eligible_drivers(rider);

        let selected = match select_driver(
            self.provider,
            &eligible,
            &self.slots,
            &self.riders[rider],
            self.transaction_id,
        ) {
            Ok(selected) => selected,
            Err(err) => return self.abort(err),
        };

        let outcome = match selected {
            None => {
                self.matrix.zero_column(rider);
                StepOutcome::RiderDropped { rider }
            }
            Some(driver) if self.slots[driver].seats == 0 => {
                self.matrix.zero_row(driver);
                StepOutcome::DriverFull { driver, rider }
            }
            Some(driver) => {
                let slot = &mut self.slots[driver];
                slot.assigned
                    .push(AssignedRider::from_user(&self.riders[rider]));
                slot.seats -= 1;
                let full = slot.seats == 0;
                self.matrix.zero_column(rider);
                if full {
                    self.matrix.zero_row(driver);
                }
                StepOutcome::Matched { driver, rider }
            }
        };
        self.offers = self.matrix.offers();

        debug!(
            iteration = self.iterations,
            min_offer,
            candidates = candidates.len(),
            rider = %self.riders[rider].id,
            outcome = ?outcome,
            remaining_pairs = self.matrix.ones(),
            "allocation step"
        );
        Ok(outcome)
    }

    /// Iterate until every offer is exhausted.
    pub fn run(mut self) -> MatchResult<Allocation> {
        while self.step()? != StepOutcome::Finished {}
        let allocation = self.finish();
        info!(
            matched = allocation.matched_count(),
            unmatched = allocation.unmatched.len(),
            "allocation pass committed"
        );
        Ok(allocation)
    }

    fn abort<T>(&mut self, err: MatchError) -> MatchResult<T> {
        self.phase = AllocationPhase::Aborted;
        Err(err)
    }

    fn finish(self) -> Allocation {
        let mut allocation = Allocation::default();
        for slot in self.slots {
            allocation
                .remaining_seats
                .insert(slot.driver.id.clone(), slot.seats);
            allocation
                .assignments
                .insert(slot.driver.id.clone(), slot.assigned);
        }
        allocation.unmatched = self
            .riders
            .iter()
            .filter(|rider| allocation.driver_of(&rider.id).is_none())
            .map(|rider| rider.id.clone())
            .collect();
        allocation
    }
}

/// Run a complete allocation pass.
pub fn allocate(
    provider: &dyn DistanceProvider,
    matrix: EligibilityMatrix,
    drivers: &[User],
    riders: &[User],
    transaction_id: &str,
) -> MatchResult<Allocation> {
    Allocator::new(provider, matrix, drivers, riders, transaction_id)?.run()
}
