//! Vehicle profiles
//!
//! A profile turns an edge's profile attributes into a [`Factor`] (seconds
//! per meter plus allowed direction) and a [`Speed`]. A factor value of
//! zero means the edge cannot be used.

pub mod bicycle;
pub mod car;

pub use bicycle::BicycleProfile;
pub use car::CarProfile;

use crate::attributes::AttributeCollection;

/// Vehicle type names used to key restriction dbs
pub mod vehicle_type {
    /// Restrictions stored under this key apply to every vehicle
    pub const ALL: &str = "";
    pub const VEHICLE: &str = "vehicle";
    pub const PEDESTRIAN: &str = "pedestrian";
    pub const BICYCLE: &str = "bicycle";
    pub const MOTOR_VEHICLE: &str = "motor_vehicle";
    pub const MOPED: &str = "moped";
    pub const MOTORCYCLE: &str = "motorcycle";
    pub const MOTORCAR: &str = "motorcar";
    pub const GOODS: &str = "goods";
    pub const HGV: &str = "hgv";
    pub const TOURIST_BUS: &str = "tourist_bus";
    pub const OTHER: &str = "other";
}

/// Travel direction allowed on an edge, relative to its stored orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Both = 0,
    Forward = 1,
    Backward = 2,
}

/// Cost per meter and allowed direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factor {
    /// Seconds per meter; `<= 0` means not traversable
    pub value: f32,
    pub direction: Direction,
}

impl Factor {
    pub const NO_FACTOR: Factor = Factor {
        value: 0.0,
        direction: Direction::Both,
    };

    pub fn is_traversable(&self) -> bool {
        self.value > 0.0
    }
}

/// Speed in meters per second and allowed direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed {
    pub value: f32,
    pub direction: Direction,
}

impl Speed {
    pub const NO_SPEED: Speed = Speed {
        value: 0.0,
        direction: Direction::Both,
    };

    pub fn to_factor(self) -> Factor {
        if self.value > 0.0 {
            Factor {
                value: 1.0 / self.value,
                direction: self.direction,
            }
        } else {
            Factor::NO_FACTOR
        }
    }
}

pub trait Profile: Send + Sync {
    /// Name under which contracted graphs are published
    fn name(&self) -> &str;

    /// Vehicle types whose restrictions apply to this profile
    fn vehicle_types(&self) -> &[&'static str];

    fn speed(&self, attributes: &AttributeCollection) -> Speed;

    fn factor(&self, attributes: &AttributeCollection) -> Factor {
        self.speed(attributes).to_factor()
    }

    /// Whether a route may start or end on an edge with these attributes
    fn can_stop_on(&self, attributes: &AttributeCollection) -> bool {
        self.factor(attributes).is_traversable()
    }
}

pub(crate) fn kmh_to_ms(kmh: f32) -> f32 {
    kmh / 3.6
}

/// `no` and `private` deny access; `destination` is allowed
pub(crate) fn is_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private"))
}

/// Direction from a `oneway`-style value; `None` when the tag is absent
/// or unrecognized
pub(crate) fn oneway_direction(value: Option<&str>) -> Option<Direction> {
    match value? {
        "yes" | "1" | "true" => Some(Direction::Forward),
        "-1" | "reverse" => Some(Direction::Backward),
        "no" | "0" | "false" => Some(Direction::Both),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmh_to_ms() {
        assert!((kmh_to_ms(36.0) - 10.0).abs() < 1e-5);
        assert!((kmh_to_ms(90.0) - 25.0).abs() < 1e-5);
    }

    #[test]
    fn test_speed_to_factor() {
        let factor = Speed {
            value: 10.0,
            direction: Direction::Forward,
        }
        .to_factor();
        assert!((factor.value - 0.1).abs() < 1e-6);
        assert_eq!(factor.direction, Direction::Forward);
        assert_eq!(Speed::NO_SPEED.to_factor(), Factor::NO_FACTOR);
        assert!(!Factor::NO_FACTOR.is_traversable());
    }

    #[test]
    fn test_oneway_values() {
        assert_eq!(oneway_direction(Some("yes")), Some(Direction::Forward));
        assert_eq!(oneway_direction(Some("-1")), Some(Direction::Backward));
        assert_eq!(oneway_direction(Some("no")), Some(Direction::Both));
        assert_eq!(oneway_direction(Some("alternating")), None);
        assert_eq!(oneway_direction(None), None);
    }
}
