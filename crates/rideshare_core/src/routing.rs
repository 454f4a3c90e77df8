//! Pluggable distance providers: the routing backend the matcher asks for route lengths.
//!
//! Implementations, selectable via [`DistanceProviderKind`]:
//!
//! - **`HaversineDistanceProvider`**: great-circle legs, optional waypoint-order search. No I/O.
//! - **`OsrmDistanceProvider`** (feature `osrm`): calls an OSRM HTTP endpoint.
//!
//! Remote providers are wrapped in a [`CachedDistanceProvider`] by
//! [`build_distance_provider`]. The matcher only ever sees `&dyn DistanceProvider`.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{haversine_m, Point};

#[cfg(feature = "osrm")]
pub mod osrm;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A route query: origin to destination, optionally through waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: Point,
    pub destination: Point,
    pub waypoints: Vec<Point>,
    /// Let the provider reorder waypoints to minimise the route length.
    pub optimize_waypoints: bool,
}

impl RouteRequest {
    /// Direct route, no waypoints.
    pub fn direct(origin: Point, destination: Point) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
            optimize_waypoints: false,
        }
    }

    /// Route through `waypoints` in whatever order the provider finds shortest.
    pub fn via(origin: Point, destination: Point, waypoints: Vec<Point>) -> Self {
        Self {
            origin,
            destination,
            waypoints,
            optimize_waypoints: true,
        }
    }

    /// Stable textual key, e.g. `1,2;3.5,4|5,6.25|opt`.
    pub fn cache_key(&self) -> String {
        let mut key = format!("{};{}", self.origin.key(), self.destination.key());
        for waypoint in &self.waypoints {
            key.push('|');
            key.push_str(&waypoint.key());
        }
        if self.optimize_waypoints {
            key.push_str("|opt");
        }
        key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
}

/// Provider answer. A non-OK status, or an OK status without routes or legs,
/// means "no feasible route".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub status: RouteStatus,
    pub routes: Vec<Route>,
    pub error_detail: Option<String>,
}

impl RouteResponse {
    /// Successful single-route answer with the given leg lengths in metres.
    pub fn ok(leg_distances_m: impl IntoIterator<Item = f64>) -> Self {
        Self {
            status: RouteStatus::Ok,
            routes: vec![Route {
                legs: leg_distances_m
                    .into_iter()
                    .map(|distance_m| RouteLeg { distance_m })
                    .collect(),
            }],
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: RouteStatus::Error,
            routes: Vec::new(),
            error_detail: Some(detail.into()),
        }
    }

    /// Sum of the first route's legs, or `None` when there is no usable route.
    pub fn total_distance_m(&self) -> Option<f64> {
        if self.status != RouteStatus::Ok {
            return None;
        }
        let route = self.routes.first()?;
        if route.legs.is_empty() {
            return None;
        }
        Some(route.legs.iter().map(|leg| leg.distance_m).sum())
    }
}

/// Errors raised when a provider cannot answer, or answers without a usable route.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider returned an error status: {0}")]
    Status(String),
    #[error("no route or route legs in provider response")]
    NoRoute,
    #[error("no scripted route for {0}")]
    Unscripted(String),
}

/// Trait for routing backends. `Send + Sync` so a provider can be shared by reference.
pub trait DistanceProvider: Send + Sync {
    /// Answer a route query. `Err` means the provider could not be asked at all
    /// (network, decoding); API-level failures come back as [`RouteStatus::Error`].
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError>;
}

impl<T: DistanceProvider + ?Sized> DistanceProvider for Box<T> {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError> {
        (**self).route(request)
    }
}

/// Route length in metres, treating every kind of "no usable route" as an error.
pub fn route_distance_m(
    provider: &dyn DistanceProvider,
    request: &RouteRequest,
) -> Result<f64, ProviderError> {
    let response = provider.route(request)?;
    if response.status != RouteStatus::Ok {
        return Err(ProviderError::Status(
            response
                .error_detail
                .unwrap_or_else(|| "unspecified provider error".to_string()),
        ));
    }
    response.total_distance_m().ok_or(ProviderError::NoRoute)
}

/// Direct route length between two points in metres.
pub fn direct_distance_m(
    provider: &dyn DistanceProvider,
    origin: Point,
    destination: Point,
) -> Result<f64, ProviderError> {
    route_distance_m(provider, &RouteRequest::direct(origin, destination))
}

// ---------------------------------------------------------------------------
// Haversine provider (always available)
// ---------------------------------------------------------------------------

/// Largest waypoint count for which every visiting order is tried.
const MAX_EXHAUSTIVE_WAYPOINTS: usize = 8;

/// Straight-line legs between consecutive stops. With `optimize_waypoints` set,
/// the cheapest visiting order is searched exhaustively for small waypoint sets;
/// larger sets use a nearest-neighbour tour, or the given order when that is shorter.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaversineDistanceProvider;

impl DistanceProvider for HaversineDistanceProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError> {
        let given: Vec<usize> = (0..request.waypoints.len()).collect();
        let order = if !request.optimize_waypoints || request.waypoints.len() < 2 {
            given
        } else if request.waypoints.len() <= MAX_EXHAUSTIVE_WAYPOINTS {
            shortest_waypoint_order(request)
        } else {
            let greedy = nearest_neighbour_order(request);
            if tour_length_m(request, &greedy) < tour_length_m(request, &given) {
                greedy
            } else {
                given
            }
        };

        let mut stops = Vec::with_capacity(order.len() + 2);
        stops.push(request.origin);
        stops.extend(order.iter().map(|&idx| request.waypoints[idx]));
        stops.push(request.destination);

        Ok(RouteResponse::ok(
            stops.windows(2).map(|pair| haversine_m(pair[0], pair[1])),
        ))
    }
}

fn tour_length_m(request: &RouteRequest, order: &[usize]) -> f64 {
    let mut length = 0.0;
    let mut at = request.origin;
    for &idx in order {
        length += haversine_m(at, request.waypoints[idx]);
        at = request.waypoints[idx];
    }
    length + haversine_m(at, request.destination)
}

/// Greedy tour: from the origin, always go to the closest unvisited waypoint.
fn nearest_neighbour_order(request: &RouteRequest) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..request.waypoints.len()).collect();
    let mut order = Vec::with_capacity(remaining.len());
    let mut at = request.origin;
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_m = f64::INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let distance = haversine_m(at, request.waypoints[idx]);
            if distance < best_m {
                best = pos;
                best_m = distance;
            }
        }
        let next = remaining.remove(best);
        at = request.waypoints[next];
        order.push(next);
    }
    order
}

/// Depth-first search over waypoint permutations with a running-length bound.
fn shortest_waypoint_order(request: &RouteRequest) -> Vec<usize> {
    let n = request.waypoints.len();
    let from_origin: Vec<f64> = request
        .waypoints
        .iter()
        .map(|w| haversine_m(request.origin, *w))
        .collect();
    let to_destination: Vec<f64> = request
        .waypoints
        .iter()
        .map(|w| haversine_m(*w, request.destination))
        .collect();
    let between: Vec<Vec<f64>> = request
        .waypoints
        .iter()
        .map(|a| request.waypoints.iter().map(|b| haversine_m(*a, *b)).collect())
        .collect();

    struct Search<'a> {
        from_origin: &'a [f64],
        to_destination: &'a [f64],
        between: &'a [Vec<f64>],
        best_len: f64,
        best_order: Vec<usize>,
        current: Vec<usize>,
    }

    impl Search<'_> {
        fn visit(&mut self, used: u32, length: f64) {
            if length >= self.best_len {
                return;
            }
            let n = self.from_origin.len();
            if self.current.len() == n {
                let last = self.current[n - 1];
                let total = length + self.to_destination[last];
                if total < self.best_len {
                    self.best_len = total;
                    self.best_order = self.current.clone();
                }
                return;
            }
            for next in 0..n {
                if used & (1 << next) != 0 {
                    continue;
                }
                let step = match self.current.last() {
                    Some(&prev) => self.between[prev][next],
                    None => self.from_origin[next],
                };
                self.current.push(next);
                self.visit(used | (1 << next), length + step);
                self.current.pop();
            }
        }
    }

    let mut search = Search {
        from_origin: &from_origin,
        to_destination: &to_destination,
        between: &between,
        best_len: f64::INFINITY,
        best_order: (0..n).collect(),
        current: Vec::with_capacity(n),
    };
    search.visit(0, 0.0);
    search.best_order
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// LRU-cached wrapper around any [`DistanceProvider`].
///
/// Keyed by [`RouteRequest::cache_key`]. Only OK responses are cached, so a
/// transient provider error is retried on the next identical query.
pub struct CachedDistanceProvider {
    inner: Box<dyn DistanceProvider>,
    cache: Mutex<LruCache<String, RouteResponse>>,
}

impl CachedDistanceProvider {
    pub fn new(inner: Box<dyn DistanceProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl DistanceProvider for CachedDistanceProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError> {
        let key = request.cache_key();

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let response = self.inner.route(request)?;

        if response.status == RouteStatus::Ok {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(key, response.clone());
            }
        }

        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Which routing backend to use. Part of [`crate::config::EngineConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistanceProviderKind {
    #[default]
    Haversine,
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    #[cfg(feature = "osrm")]
    Osrm { endpoint: String },
}

/// Construct a boxed provider from its descriptor.
///
/// `Haversine` is returned uncached; remote providers are wrapped in a
/// [`CachedDistanceProvider`] of `cache_capacity` entries.
#[cfg_attr(not(feature = "osrm"), allow(unused_variables))]
pub fn build_distance_provider(
    kind: &DistanceProviderKind,
    cache_capacity: usize,
) -> Result<Box<dyn DistanceProvider>, ProviderError> {
    match kind {
        DistanceProviderKind::Haversine => Ok(Box::new(HaversineDistanceProvider)),

        #[cfg(feature = "osrm")]
        DistanceProviderKind::Osrm { endpoint } => {
            let inner = Box::new(osrm::OsrmDistanceProvider::new(endpoint)?);
            Ok(Box::new(CachedDistanceProvider::new(inner, cache_capacity)))
        }
    }
}
