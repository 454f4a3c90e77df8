//! OSRM-backed distance provider.
//!
//! Ordered requests go to `/route/v1/driving`; requests that allow waypoint
//! reordering go to `/trip/v1/driving` with the first and last coordinate pinned.

use std::time::Duration;

use reqwest::{blocking::Client, Url};
use serde::Deserialize;

use super::{DistanceProvider, ProviderError, Route, RouteLeg, RouteRequest, RouteResponse, RouteStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin blocking HTTP client for an OSRM endpoint.
#[derive(Debug, Clone)]
pub struct OsrmDistanceProvider {
    client: Client,
    endpoint: String,
}

impl OsrmDistanceProvider {
    /// Create a provider for the given endpoint (e.g. `http://localhost:5000`).
    pub fn new(endpoint: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Transport(format!("failed to build OSRM client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self, request: &RouteRequest) -> Result<Url, ProviderError> {
        let coords = std::iter::once(request.origin)
            .chain(request.waypoints.iter().copied())
            .chain(std::iter::once(request.destination))
            .map(|p| format!("{:.6},{:.6}", p.lng, p.lat))
            .collect::<Vec<_>>()
            .join(";");

        let use_trip = request.optimize_waypoints && request.waypoints.len() > 1;
        let service = if use_trip { "trip" } else { "route" };
        let base = format!("{}/{}/v1/driving/{}", self.endpoint, service, coords);
        let mut url = Url::parse(&base)
            .map_err(|err| ProviderError::Malformed(format!("failed to build OSRM URL: {err}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("overview", "false");
            if use_trip {
                query
                    .append_pair("source", "first")
                    .append_pair("destination", "last")
                    .append_pair("roundtrip", "false");
            }
        }
        Ok(url)
    }
}

/// Subset of the OSRM `route` / `trip` response we read.
#[derive(Debug, Deserialize)]
pub(crate) struct OsrmResponse {
    code: String,
    message: Option<String>,
    routes: Option<Vec<OsrmRoute>>,
    trips: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64, // metres
}

pub(crate) fn parse_osrm_response(resp: OsrmResponse) -> RouteResponse {
    if resp.code != "Ok" {
        return RouteResponse::error(match resp.message {
            Some(message) => format!("{}: {}", resp.code, message),
            None => resp.code,
        });
    }

    let routes = resp
        .routes
        .or(resp.trips)
        .unwrap_or_default()
        .into_iter()
        .map(|route| Route {
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    distance_m: leg.distance,
                })
                .collect(),
        })
        .collect();

    RouteResponse {
        status: RouteStatus::Ok,
        routes,
        error_detail: None,
    }
}

impl DistanceProvider for OsrmDistanceProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ProviderError> {
        let url = self.request_url(request)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let parsed: OsrmResponse = response
            .json()
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok(parse_osrm_response(parsed))
    }
}
