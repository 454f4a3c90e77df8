//! Test helpers: a scripted distance provider and user fixtures.
//!
//! Shared by unit tests, the integration tests under `tests/` and the benches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::geo::Point;
use crate::routing::{DistanceProvider, ProviderError, RouteRequest, RouteResponse};
use crate::user::{Role, User};

/// Answers route queries from a table keyed by [`RouteRequest::cache_key`].
///
/// Unknown requests fall back to `default_m` if set, otherwise fail with
/// [`ProviderError::Unscripted`]. Every call is counted, answered or not.
#[derive(Debug, Default)]
pub struct ScriptedDistanceProvider {
    routes: HashMap<String, Result<RouteResponse, ProviderError>>,
    default_m: Option<f64>,
    calls: AtomicUsize,
}

impl ScriptedDistanceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with a single leg of `distance_m`.
    pub fn with_default(mut self, distance_m: f64) -> Self {
        self.default_m = Some(distance_m);
        self
    }

    /// Direct route of `driver` (source to destination).
    pub fn direct(mut self, driver: &User, distance_m: f64) -> Self {
        let request = RouteRequest::direct(driver.source, driver.destination);
        self.routes
            .insert(request.cache_key(), Ok(RouteResponse::ok([distance_m])));
        self
    }

    /// Route of `driver` through `rider`'s pickup and drop-off.
    pub fn detour(mut self, driver: &User, rider: &User, distance_m: f64) -> Self {
        self.routes.insert(
            detour_request(driver, rider).cache_key(),
            Ok(RouteResponse::ok([distance_m])),
        );
        self
    }

    /// Arbitrary request with an arbitrary answer.
    pub fn respond(
        mut self,
        request: &RouteRequest,
        response: Result<RouteResponse, ProviderError>,
    ) -> Self {
        self.routes.insert(request.cache_key(), response);
        self
    }

    /// Make the direct route of `driver` come back with an error status.
    pub fn fail_direct(self, driver: &User, detail: &str) -> Self {
        let request = RouteRequest::direct(driver.source, driver.destination);
        self.respond(&request, Ok(RouteResponse::error(detail)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DistanceProvider for ScriptedDistanceProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.cache_key();
        match self.routes.get(&key) {
            Some(answer) => answer.clone(),
            None => match self.default_m {
                Some(distance_m) => Ok(RouteResponse::ok([distance_m])),
                None => Err(ProviderError::Unscripted(key)),
            },
        }
    }
}

/// The request the matrix builder issues for a (driver, rider) pair.
pub fn detour_request(driver: &User, rider: &User) -> RouteRequest {
    RouteRequest::via(
        driver.source,
        driver.destination,
        vec![rider.source, rider.destination],
    )
}

/// An unassigned driver with a 10-token balance.
pub fn driver(id: &str, source: Point, destination: Point, seats: u32, threshold: u32) -> User {
    let mut user = User::new(id, 10);
    user.role = Role::Driver;
    user.source = source;
    user.destination = destination;
    user.seats = seats;
    user.threshold = threshold;
    user
}

/// An unassigned rider with a 10-token balance.
pub fn rider(id: &str, source: Point, destination: Point) -> User {
    let mut user = User::new(id, 10);
    user.role = Role::Rider;
    user.source = source;
    user.destination = destination;
    user
}
