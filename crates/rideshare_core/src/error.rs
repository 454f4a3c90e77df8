//! Engine-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::routing::ProviderError;
use crate::store::StoreError;

pub type MatchResult<T> = Result<T, MatchError>;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Distance provider failure on a call the algorithm cannot skip.
    #[error("distance provider: {0}")]
    Provider(#[from] ProviderError),

    /// State store failure; always aborts the epoch.
    #[error("state store: {0}")]
    State(#[from] StoreError),

    /// Malformed user input, rejected before it reaches the store.
    #[error("invalid input: {0}")]
    Precondition(String),

    #[error("record encoding: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("eligibility matrix not found")]
    MatrixNotFound,

    #[error(
        "eligibility matrix is {rows}x{cols} but the pool has {drivers} drivers and {riders} riders"
    )]
    StaleMatrix {
        rows: usize,
        cols: usize,
        drivers: usize,
        riders: usize,
    },

    /// A random draw was requested over zero candidates.
    #[error("cannot draw from an empty candidate set")]
    EmptyCandidateSet,

    #[error("user {0} already exists")]
    UserExists(String),

    #[error("user {0} does not exist")]
    UserNotFound(String),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}
