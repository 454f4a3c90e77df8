//! Engine configuration: JSON file with every field defaulted, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::DistanceProviderKind;

/// Store key of the persisted eligibility matrix.
pub const DEFAULT_MATRIX_KEY: &str = "ERMatrix";
pub const DEFAULT_TOKEN_REWARD: i64 = 2;
pub const DEFAULT_INITIAL_TOKEN: i64 = 10;
pub const DEFAULT_MIN_USERS_FOR_ASSIGNMENT: usize = 2;
pub const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 20_000;

pub const ENV_MIN_USERS: &str = "MIN_USERS_FOR_ASSIGNMENT";
pub const ENV_OSRM_ENDPOINT: &str = "RIDESHARE_OSRM_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matrix_key: String,
    /// Tokens a driver earns (and a rider pays) per match.
    pub token_reward: i64,
    /// Balance of a freshly created account.
    pub initial_token: i64,
    /// Unassigned user count at which an epoch is due.
    pub min_users_for_assignment: usize,
    /// LRU entries kept in front of remote distance providers.
    pub route_cache_capacity: usize,
    pub provider: DistanceProviderKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matrix_key: DEFAULT_MATRIX_KEY.to_string(),
            token_reward: DEFAULT_TOKEN_REWARD,
            initial_token: DEFAULT_INITIAL_TOKEN,
            min_users_for_assignment: DEFAULT_MIN_USERS_FOR_ASSIGNMENT,
            route_cache_capacity: DEFAULT_ROUTE_CACHE_CAPACITY,
            provider: DistanceProviderKind::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_MIN_USERS) {
            self.min_users_for_assignment =
                value.trim().parse().map_err(|_| ConfigError::Env {
                    name: ENV_MIN_USERS,
                    value: value.clone(),
                })?;
        }

        if let Some(endpoint) = lookup(ENV_OSRM_ENDPOINT).filter(|e| !e.trim().is_empty()) {
            self.provider = osrm_provider(endpoint)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matrix_key.trim().is_empty() {
            return Err(ConfigError::Invalid("matrix_key must not be empty".into()));
        }
        if self.token_reward <= 0 {
            return Err(ConfigError::Invalid(format!(
                "token_reward must be positive, got {}",
                self.token_reward
            )));
        }
        if self.route_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "route_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "osrm")]
fn osrm_provider(endpoint: String) -> Result<DistanceProviderKind, ConfigError> {
    Ok(DistanceProviderKind::Osrm { endpoint })
}

#[cfg(not(feature = "osrm"))]
fn osrm_provider(endpoint: String) -> Result<DistanceProviderKind, ConfigError> {
    Err(ConfigError::Env {
        name: ENV_OSRM_ENDPOINT,
        value: format!("{endpoint} (built without the `osrm` feature)"),
    })
}
