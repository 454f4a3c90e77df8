//! Engine façade: user lifecycle, the two epoch steps, and the commit of an allocation.
//!
//! An epoch is two separately triggered calls. [`MatchingEngine::build_matrix`]
//! snapshots the pool and persists its eligibility matrix;
//! [`MatchingEngine::run_assignment`] re-reads the same pool, allocates against
//! the persisted matrix, writes every touched record in one batch and then
//! retires the matrix. Neither call writes anything when it fails.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{MatchError, MatchResult};
use crate::matching::{allocate, Allocation};
use crate::matrix::{build_eligibility_matrix, EligibilityMatrix};
use crate::report::{LoadReport, UsersOverview};
use crate::routing::{build_distance_provider, DistanceProvider};
use crate::store::{canonical_bytes, StateStore};
use crate::user::{DriverRef, RideRequest, User};

/// Drivers and riders taking part in an epoch, in store key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochPool {
    pub drivers: Vec<User>,
    pub riders: Vec<User>,
}

impl EpochPool {
    /// Drivers that are unassigned with seats left; riders that are unassigned with tokens left.
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut pool = Self::default();
        for user in users {
            if user.assigned {
                continue;
            }
            if user.is_driver() && user.seats > 0 {
                pool.drivers.push(user);
            } else if user.is_rider() && user.token > 0 {
                pool.riders.push(user);
            }
        }
        pool
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixSummary {
    pub drivers: usize,
    pub riders: usize,
    pub eligible_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentSummary {
    pub transaction_id: String,
    pub allocation: Allocation,
    pub report: LoadReport,
    /// Records written by the commit.
    pub records_written: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub matrix: MatrixSummary,
    pub assignment: AssignmentSummary,
}

pub struct MatchingEngine<S: StateStore> {
    store: S,
    provider: Box<dyn DistanceProvider>,
    config: EngineConfig,
}

impl<S: StateStore> MatchingEngine<S> {
    pub fn new(
        store: S,
        provider: Box<dyn DistanceProvider>,
        config: EngineConfig,
    ) -> MatchResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            provider,
            config,
        })
    }

    /// Build the distance provider the config names.
    pub fn from_config(store: S, config: EngineConfig) -> MatchResult<Self> {
        let provider = build_distance_provider(&config.provider, config.route_cache_capacity)?;
        Self::new(store, provider, config)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn DistanceProvider {
        self.provider.as_ref()
    }

    // -----------------------------------------------------------------------
    // User lifecycle
    // -----------------------------------------------------------------------

    pub fn create_user(&self, id: &str) -> MatchResult<User> {
        self.check_user_key(id)?;
        if self.store.get(id)?.is_some() {
            return Err(MatchError::UserExists(id.to_string()));
        }
        let user = User::new(id, self.config.initial_token);
        self.store.put(id, canonical_bytes(&user)?)?;
        info!(user = id, token = user.token, "user created");
        Ok(user)
    }

    /// Replace the user's trip with a new request. The token balance carries over.
    pub fn request_ride(&self, id: &str, request: &RideRequest) -> MatchResult<User> {
        request.validate()?;
        let mut user = self.read_user(id)?;
        user.apply_ride_request(request);
        self.store.put(id, canonical_bytes(&user)?)?;
        info!(user = id, role = ?user.role, seats = user.seats, "ride requested");
        Ok(user)
    }

    pub fn read_user(&self, id: &str) -> MatchResult<User> {
        self.check_user_key(id)?;
        let bytes = self
            .store
            .get(id)?
            .ok_or_else(|| MatchError::UserNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn user_exists(&self, id: &str) -> MatchResult<bool> {
        if id == self.config.matrix_key {
            return Ok(false);
        }
        Ok(self.store.get(id)?.is_some())
    }

    pub fn delete_user(&self, id: &str) -> MatchResult<()> {
        if !self.user_exists(id)? {
            return Err(MatchError::UserNotFound(id.to_string()));
        }
        self.store.delete(id)?;
        info!(user = id, "user deleted");
        Ok(())
    }

    /// Write complete user records in one batch, replacing any with the same ID.
    pub fn import_users(&self, users: &[User]) -> MatchResult<usize> {
        let mut writes = Vec::with_capacity(users.len());
        for user in users {
            self.check_user_key(&user.id)?;
            writes.push((user.id.clone(), canonical_bytes(user)?));
        }
        let written = writes.len();
        self.store.put_batch(writes)?;
        info!(users = written, "users imported");
        Ok(written)
    }

    /// Every decodable user record, in key order.
    pub fn users(&self) -> MatchResult<Vec<User>> {
        let mut users = Vec::new();
        for (key, bytes) in self.store.scan_all()? {
            if key == self.config.matrix_key {
                continue;
            }
            match serde_json::from_slice::<User>(&bytes) {
                Ok(user) => users.push(user),
                Err(err) => warn!(key = %key, error = %err, "skipping undecodable record"),
            }
        }
        Ok(users)
    }

    pub fn count_unassigned(&self) -> MatchResult<usize> {
        Ok(self.users()?.iter().filter(|u| !u.assigned).count())
    }

    /// True once enough users are waiting for an epoch to be worth running.
    pub fn should_trigger(&self) -> MatchResult<bool> {
        Ok(self.count_unassigned()? >= self.config.min_users_for_assignment)
    }

    pub fn overview(&self) -> MatchResult<UsersOverview> {
        Ok(UsersOverview::from_users(&self.users()?))
    }

    fn check_user_key(&self, id: &str) -> MatchResult<()> {
        if id.trim().is_empty() {
            return Err(MatchError::Precondition("user id must not be empty".into()));
        }
        if id == self.config.matrix_key {
            return Err(MatchError::Precondition(format!(
                "user id {id:?} is reserved"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Epoch
    // -----------------------------------------------------------------------

    pub fn load_pool(&self) -> MatchResult<EpochPool> {
        Ok(EpochPool::from_users(self.users()?))
    }

    /// The persisted matrix of the current epoch.
    pub fn eligibility_matrix(&self) -> MatchResult<EligibilityMatrix> {
        let bytes = self
            .store
            .get(&self.config.matrix_key)?
            .ok_or(MatchError::MatrixNotFound)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Compute and persist the eligibility matrix for the current pool.
    pub fn build_matrix(&self) -> MatchResult<MatrixSummary> {
        let pool = self.load_pool()?;
        let matrix = build_eligibility_matrix(self.provider(), &pool.drivers, &pool.riders)?;
        self.store
            .put(&self.config.matrix_key, canonical_bytes(&matrix)?)?;

        let summary = MatrixSummary {
            drivers: matrix.driver_count(),
            riders: pool.riders.len(),
            eligible_pairs: matrix.ones(),
        };
        info!(
            drivers = summary.drivers,
            riders = summary.riders,
            eligible_pairs = summary.eligible_pairs,
            key = %self.config.matrix_key,
            "eligibility matrix persisted"
        );
        Ok(summary)
    }

    /// Allocate riders to drivers against the persisted matrix and commit the result.
    ///
    /// A completed pass consumes the matrix: it is removed from the store after
    /// the commit, so a further assignment fails with
    /// [`MatchError::MatrixNotFound`] until [`Self::build_matrix`] runs again.
    /// A failed pass leaves the store untouched.
    pub fn run_assignment(&self, transaction_id: &str) -> MatchResult<AssignmentSummary> {
        let pool = self.load_pool()?;
        let matrix = self.eligibility_matrix()?;
        info!(
            transaction_id,
            drivers = pool.drivers.len(),
            riders = pool.riders.len(),
            "assignment started"
        );

        let allocation = allocate(
            self.provider(),
            matrix,
            &pool.drivers,
            &pool.riders,
            transaction_id,
        )?;

        let writes = self.commit_writes(&pool, &allocation)?;
        let records_written = writes.len();
        if !writes.is_empty() {
            self.store.put_batch(writes)?;
        }
        // The committed pool no longer matches the matrix; the next epoch rebuilds it.
        self.store.delete(&self.config.matrix_key)?;

        let report = LoadReport::from_allocation(&pool.drivers, &allocation);
        info!(
            transaction_id,
            matched = allocation.matched_count(),
            unmatched = allocation.unmatched.len(),
            records_written,
            std_dev = report.std_dev,
            "assignment committed"
        );
        Ok(AssignmentSummary {
            transaction_id: transaction_id.to_string(),
            allocation,
            report,
            records_written,
        })
    }

    /// Build the matrix and assign, if enough users are waiting.
    pub fn run_epoch(&self, transaction_id: &str) -> MatchResult<Option<EpochSummary>> {
        if !self.should_trigger()? {
            info!(
                transaction_id,
                min_users = self.config.min_users_for_assignment,
                "not enough unassigned users, epoch skipped"
            );
            return Ok(None);
        }
        let matrix = self.build_matrix()?;
        let assignment = self.run_assignment(transaction_id)?;
        Ok(Some(EpochSummary { matrix, assignment }))
    }

    /// Updated records for every driver that received riders and every rider matched.
    fn commit_writes(
        &self,
        pool: &EpochPool,
        allocation: &Allocation,
    ) -> MatchResult<Vec<(String, Vec<u8>)>> {
        let reward = self.config.token_reward;
        let riders_by_id: HashMap<&str, &User> =
            pool.riders.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut updated: BTreeMap<String, User> = BTreeMap::new();

        for driver in &pool.drivers {
            let Some(new_riders) = allocation.assignments.get(&driver.id) else {
                continue;
            };
            if new_riders.is_empty() {
                continue;
            }

            let mut record = driver.clone();
            record.riders.extend(new_riders.iter().cloned());
            record.seats = allocation
                .remaining_seats
                .get(&driver.id)
                .copied()
                .unwrap_or(driver.seats);
            record.token += reward * new_riders.len() as i64;
            record.assigned = true;

            for assigned in new_riders {
                let rider = riders_by_id.get(assigned.rider_id.as_str()).ok_or_else(|| {
                    MatchError::Precondition(format!(
                        "allocated rider {} is not in the pool",
                        assigned.rider_id
                    ))
                })?;
                let mut rider_record = (*rider).clone();
                rider_record.token -= reward;
                rider_record.driver = Some(DriverRef {
                    driver_id: driver.id.clone(),
                    source: rider.source,
                    destination: rider.destination,
                });
                rider_record.assigned = true;
                updated.insert(rider_record.id.clone(), rider_record);
            }
            updated.insert(record.id.clone(), record);
        }

        updated
            .into_iter()
            .map(|(key, user)| -> MatchResult<(String, Vec<u8>)> {
                Ok((key, canonical_bytes(&user)?))
            })
            .collect()
    }
}
