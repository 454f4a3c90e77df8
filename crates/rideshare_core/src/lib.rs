//! Fair ride-pool matching engine.
//!
//! Drivers and riders are matched into ride groups once per epoch. The epoch
//! first computes an eligibility matrix (which driver can take which rider
//! within its detour budget), then allocates riders, rarest first, to the
//! least-loaded feasible driver. All randomness is derived from the epoch's
//! transaction identifier, so any node replaying the epoch reaches the same
//! result.
//!
//! Entry point: [`engine::MatchingEngine`] over any [`store::StateStore`] and
//! [`routing::DistanceProvider`].

pub mod config;
pub mod demand;
pub mod engine;
pub mod error;
pub mod geo;
pub mod matching;
pub mod matrix;
pub mod random;
pub mod report;
pub mod routing;
pub mod store;
pub mod user;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use engine::{AssignmentSummary, EpochPool, EpochSummary, MatchingEngine, MatrixSummary};
pub use error::{MatchError, MatchResult};
