//! Car profile - access and speeds for automobile routing

use super::{is_denied, kmh_to_ms, oneway_direction, vehicle_type, Direction, Profile, Speed};
use crate::attributes::AttributeCollection;

pub struct CarProfile;

const VEHICLE_TYPES: &[&str] = &[
    vehicle_type::VEHICLE,
    vehicle_type::MOTOR_VEHICLE,
    vehicle_type::MOTORCAR,
];

/// Base speed in km/h; `None` when cars are not allowed by default
fn base_speed_kmh(highway: &str) -> Option<f32> {
    let kmh = match highway {
        "motorway" => 110.0,
        "motorway_link" => 60.0,
        "trunk" => 90.0,
        "trunk_link" => 50.0,
        "primary" => 70.0,
        "primary_link" => 40.0,
        "secondary" => 60.0,
        "secondary_link" => 40.0,
        "tertiary" => 50.0,
        "tertiary_link" => 30.0,
        "unclassified" => 50.0,
        "residential" => 30.0,
        "service" => 20.0,
        "living_street" => 10.0,
        _ => return None,
    };
    Some(kmh)
}

impl Profile for CarProfile {
    fn name(&self) -> &str {
        "car"
    }

    fn vehicle_types(&self) -> &[&'static str] {
        VEHICLE_TYPES
    }

    fn speed(&self, attributes: &AttributeCollection) -> Speed {
        let Some(highway) = attributes.get("highway") else {
            return Speed::NO_SPEED;
        };
        let Some(kmh) = base_speed_kmh(highway) else {
            return Speed::NO_SPEED;
        };

        if is_denied(attributes.get("motor_vehicle"))
            || is_denied(attributes.get("motorcar"))
            || is_denied(attributes.get("vehicle"))
            || is_denied(attributes.get("access"))
        {
            return Speed::NO_SPEED;
        }

        let motorway = highway == "motorway" || highway == "motorway_link";
        let roundabout = attributes.get("junction") == Some("roundabout");
        let direction = match oneway_direction(attributes.get("oneway")) {
            Some(direction) => direction,
            None if motorway || roundabout => Direction::Forward,
            None => Direction::Both,
        };

        // maxspeed only lowers the default
        let kmh = attributes
            .get("maxspeed")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|&v| v > 0.0)
            .map_or(kmh, |v| v.min(kmh));

        Speed {
            value: kmh_to_ms(kmh),
            direction,
        }
    }

    fn can_stop_on(&self, attributes: &AttributeCollection) -> bool {
        let motorway = matches!(attributes.get("highway"), Some("motorway") | Some("motorway_link"));
        !motorway && self.factor(attributes).is_traversable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(pairs: &[(&str, &str)]) -> Speed {
        CarProfile.speed(&AttributeCollection::from_pairs(pairs))
    }

    #[test]
    fn test_residential_both_ways() {
        let s = speed(&[("highway", "residential")]);
        assert!((s.value - kmh_to_ms(30.0)).abs() < 1e-5);
        assert_eq!(s.direction, Direction::Both);
    }

    #[test]
    fn test_motorway_is_oneway_by_default() {
        assert_eq!(speed(&[("highway", "motorway")]).direction, Direction::Forward);
        assert_eq!(
            speed(&[("highway", "motorway"), ("oneway", "no")]).direction,
            Direction::Both
        );
    }

    #[test]
    fn test_oneway_reverse() {
        let s = speed(&[("highway", "primary"), ("oneway", "-1")]);
        assert_eq!(s.direction, Direction::Backward);
    }

    #[test]
    fn test_access_denied() {
        assert_eq!(speed(&[("highway", "residential"), ("access", "private")]), Speed::NO_SPEED);
        assert_eq!(speed(&[("highway", "residential"), ("motor_vehicle", "no")]), Speed::NO_SPEED);
        assert_eq!(speed(&[("highway", "footway")]), Speed::NO_SPEED);
        assert_eq!(speed(&[("name", "Grote Markt")]), Speed::NO_SPEED);
        assert!(speed(&[("highway", "residential"), ("access", "destination")]).value > 0.0);
    }

    #[test]
    fn test_maxspeed_lowers_default() {
        let s = speed(&[("highway", "primary"), ("maxspeed", "50")]);
        assert!((s.value - kmh_to_ms(50.0)).abs() < 1e-5);
        let s = speed(&[("highway", "residential"), ("maxspeed", "90")]);
        assert!((s.value - kmh_to_ms(30.0)).abs() < 1e-5);
    }

    #[test]
    fn test_cannot_stop_on_motorway() {
        let motorway = AttributeCollection::from_pairs(&[("highway", "motorway")]);
        let primary = AttributeCollection::from_pairs(&[("highway", "primary")]);
        assert!(!CarProfile.can_stop_on(&motorway));
        assert!(CarProfile.can_stop_on(&primary));
    }
}
