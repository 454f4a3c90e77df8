//! Synthetic demand: random drivers and riders inside a bounding box.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::Point;
use crate::user::{RideRequest, Role, User};

// Bengaluru
pub const DEFAULT_LAT_MIN: f64 = 12.85;
pub const DEFAULT_LAT_MAX: f64 = 13.10;
pub const DEFAULT_LNG_MIN: f64 = 77.45;
pub const DEFAULT_LNG_MAX: f64 = 77.75;

/// Parameters for generating a batch of users.
#[derive(Debug, Clone)]
pub struct DemandParams {
    pub num_drivers: usize,
    pub num_riders: usize,
    /// Random seed for reproducibility (optional; if None, uses entropy).
    pub seed: Option<u64>,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    /// Seats offered per driver, inclusive.
    pub min_seats: u32,
    pub max_seats: u32,
    /// Detour threshold per driver in percent, inclusive.
    pub min_threshold: u32,
    pub max_threshold: u32,
    pub initial_token: i64,
    /// IDs are `{id_prefix}{n}`, numbered from 1 with drivers first.
    pub id_prefix: String,
}

impl Default for DemandParams {
    fn default() -> Self {
        Self {
            num_drivers: 100,
            num_riders: 500,
            seed: None,
            lat_min: DEFAULT_LAT_MIN,
            lat_max: DEFAULT_LAT_MAX,
            lng_min: DEFAULT_LNG_MIN,
            lng_max: DEFAULT_LNG_MAX,
            min_seats: 3,
            max_seats: 5,
            min_threshold: 10,
            max_threshold: 50,
            initial_token: 10,
            id_prefix: "usr".to_string(),
        }
    }
}

impl DemandParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_counts(mut self, num_drivers: usize, num_riders: usize) -> Self {
        self.num_drivers = num_drivers;
        self.num_riders = num_riders;
        self
    }
}

fn random_point<R: Rng>(rng: &mut R, params: &DemandParams) -> Point {
    Point::new(
        rng.gen_range(params.lat_min..=params.lat_max),
        rng.gen_range(params.lng_min..=params.lng_max),
    )
}

/// Source and a distinct destination.
fn random_trip<R: Rng>(rng: &mut R, params: &DemandParams) -> (Point, Point) {
    let source = random_point(rng, params);
    let mut destination = random_point(rng, params);
    while destination == source {
        destination = random_point(rng, params);
    }
    (source, destination)
}

/// Generate drivers then riders, each with a pending ride request applied.
pub fn generate_users(params: &DemandParams) -> Vec<User> {
    let mut rng: StdRng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let total = params.num_drivers + params.num_riders;
    let mut users = Vec::with_capacity(total);
    for n in 1..=total {
        let role = if n <= params.num_drivers {
            Role::Driver
        } else {
            Role::Rider
        };
        let (source, destination) = random_trip(&mut rng, params);
        let request = match role {
            Role::Driver => RideRequest::driver(
                source,
                destination,
                rng.gen_range(params.min_seats..=params.max_seats),
                rng.gen_range(params.min_threshold..=params.max_threshold),
            ),
            Role::Rider | Role::Unset => RideRequest::rider(source, destination),
        };

        let mut user = User::new(format!("{}{n}", params.id_prefix), params.initial_token);
        user.apply_ride_request(&request);
        users.push(user);
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generation_is_reproducible() {
        let params = DemandParams::default().with_seed(7).with_counts(5, 20);
        assert_eq!(generate_users(&params), generate_users(&params));
    }

    #[test]
    fn drivers_come_first_with_bounded_attributes() {
        let params = DemandParams::default().with_seed(1).with_counts(10, 30);
        let users = generate_users(&params);
        assert_eq!(users.len(), 40);
        assert_eq!(users[0].id, "usr1");
        for driver in &users[..10] {
            assert!(driver.is_driver());
            assert!((3..=5).contains(&driver.seats));
            assert!((10..=50).contains(&driver.threshold));
        }
        for rider in &users[10..] {
            assert!(rider.is_rider());
            assert_eq!(rider.seats, 0);
            assert_eq!(rider.token, 10);
            assert_ne!(rider.source, rider.destination);
            assert!((DEFAULT_LAT_MIN..=DEFAULT_LAT_MAX).contains(&rider.source.lat));
        }
    }
}
