//! User records: drivers and riders as they are persisted in the state store.
//!
//! Field names serialize in the PascalCase form stored under each user key
//! (`ID`, `Source`, `Seats`, ...). The rider sub-record attached to a driver is
//! always an [`AssignedRider`]; there is no alternative shape.

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, MatchResult};
use crate::geo::Point;

/// Participant role. A freshly created account has no role until its first ride request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "driver")]
    Driver,
    #[serde(rename = "rider")]
    Rider,
}

/// A rider attached to a driver's ride group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedRider {
    #[serde(rename = "ID")]
    pub rider_id: String,
    #[serde(rename = "Source")]
    pub source: Point,
    #[serde(rename = "Destination")]
    pub destination: Point,
}

impl AssignedRider {
    pub fn from_user(rider: &User) -> Self {
        Self {
            rider_id: rider.id.clone(),
            source: rider.source,
            destination: rider.destination,
        }
    }
}

/// The driver a rider was matched with, together with the rider's own trip endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRef {
    #[serde(rename = "ID")]
    pub driver_id: String,
    #[serde(rename = "Source")]
    pub source: Point,
    #[serde(rename = "Destination")]
    pub destination: Point,
}

/// A driver or rider keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Role", default)]
    pub role: Role,
    #[serde(rename = "Source", default)]
    pub source: Point,
    #[serde(rename = "Destination", default)]
    pub destination: Point,
    /// Remaining capacity (drivers only).
    #[serde(rename = "Seats", default)]
    pub seats: u32,
    /// Allowed detour in percent of the direct route (drivers only).
    #[serde(rename = "Threshold", default)]
    pub threshold: u32,
    /// Token balance. Not clamped: a rider with too few tokens can go negative.
    #[serde(rename = "Token", default)]
    pub token: i64,
    #[serde(rename = "Riders", default)]
    pub riders: Vec<AssignedRider>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<DriverRef>,
    #[serde(rename = "Assigned", default)]
    pub assigned: bool,
}

impl User {
    /// A blank account with the given starting balance and no ride request.
    pub fn new(id: impl Into<String>, initial_token: i64) -> Self {
        Self {
            id: id.into(),
            role: Role::Unset,
            source: Point::default(),
            destination: Point::default(),
            seats: 0,
            threshold: 0,
            token: initial_token,
            riders: Vec::new(),
            driver: None,
            assigned: false,
        }
    }

    pub fn is_driver(&self) -> bool {
        self.role == Role::Driver
    }

    pub fn is_rider(&self) -> bool {
        self.role == Role::Rider
    }

    /// Overwrite the trip fields with a new ride request, keeping the token balance.
    pub fn apply_ride_request(&mut self, request: &RideRequest) {
        self.role = request.role;
        self.source = request.source;
        self.destination = request.destination;
        match request.role {
            Role::Driver => {
                self.seats = request.seats;
                self.threshold = request.threshold;
            }
            Role::Rider | Role::Unset => {
                self.seats = 0;
                self.threshold = 0;
            }
        }
        self.riders.clear();
        self.driver = None;
        self.assigned = false;
    }
}

/// Input of a ride request: who the user is this time and where they travel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub role: Role,
    pub source: Point,
    pub destination: Point,
    #[serde(default)]
    pub seats: u32,
    #[serde(default)]
    pub threshold: u32,
}

impl RideRequest {
    pub fn driver(source: Point, destination: Point, seats: u32, threshold: u32) -> Self {
        Self {
            role: Role::Driver,
            source,
            destination,
            seats,
            threshold,
        }
    }

    pub fn rider(source: Point, destination: Point) -> Self {
        Self {
            role: Role::Rider,
            source,
            destination,
            seats: 0,
            threshold: 0,
        }
    }

    pub fn validate(&self) -> MatchResult<()> {
        if self.role == Role::Unset {
            return Err(MatchError::Precondition("role must be driver or rider".into()));
        }
        if !self.source.is_valid() {
            return Err(MatchError::Precondition(format!(
                "invalid source coordinate {:?}",
                self.source
            )));
        }
        if !self.destination.is_valid() {
            return Err(MatchError::Precondition(format!(
                "invalid destination coordinate {:?}",
                self.destination
            )));
        }
        if self.role == Role::Driver && self.seats == 0 {
            return Err(MatchError::Precondition(
                "a driver must offer at least one seat".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_pascal_case_keys() {
        let user = User::new("usr1", 10);
        let json = serde_json::to_value(&user).expect("serialize");
        assert_eq!(json["ID"], "usr1");
        assert_eq!(json["Role"], "");
        assert_eq!(json["Token"], 10);
        assert_eq!(json["Driver"], serde_json::Value::Null);
        assert_eq!(json["Source"]["lat"], 0.0);
    }

    #[test]
    fn decodes_record_with_missing_optional_fields() {
        let raw = r#"{"ID":"d1","Role":"driver","Seats":3,"Threshold":20,
            "Source":{"lat":1.0,"lng":2.0},"Destination":{"lat":3.0,"lng":4.0}}"#;
        let user: User = serde_json::from_str(raw).expect("decode");
        assert!(user.is_driver());
        assert_eq!(user.seats, 3);
        assert!(user.riders.is_empty());
        assert!(!user.assigned);
    }

    #[test]
    fn negative_seats_do_not_decode() {
        let raw = r#"{"ID":"d1","Role":"driver","Seats":-1}"#;
        assert!(serde_json::from_str::<User>(raw).is_err());
    }

    #[test]
    fn ride_request_keeps_tokens_and_resets_assignment() {
        let mut user = User::new("usr1", 6);
        user.assigned = true;
        user.riders.push(AssignedRider {
            rider_id: "r0".into(),
            source: Point::default(),
            destination: Point::default(),
        });
        let request = RideRequest::rider(Point::new(1.0, 1.0), Point::new(2.0, 2.0));
        user.apply_ride_request(&request);
        assert_eq!(user.token, 6);
        assert!(user.riders.is_empty());
        assert!(!user.assigned);
        assert_eq!(user.seats, 0);
    }

    #[test]
    fn driver_request_without_seats_is_rejected() {
        let request = RideRequest::driver(Point::new(1.0, 1.0), Point::new(2.0, 2.0), 0, 10);
        assert!(matches!(request.validate(), Err(MatchError::Precondition(_))));
    }
}
