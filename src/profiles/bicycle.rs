//! Bicycle profile, balanced variant
//!
//! Speeds come from the highway type, then a preference multiplier moves
//! cyclists off busy roads and onto cycle infrastructure.

use super::{is_denied, kmh_to_ms, oneway_direction, vehicle_type, Direction, Profile, Speed};
use crate::attributes::AttributeCollection;

pub struct BicycleProfile;

const VEHICLE_TYPES: &[&str] = &[vehicle_type::VEHICLE, vehicle_type::BICYCLE];

fn base_speed_kmh(highway: &str) -> Option<f32> {
    let kmh = match highway {
        "cycleway" => 20.0,
        "path" | "footway" | "pedestrian" => 15.0,
        "residential" | "unclassified" | "tertiary" | "tertiary_link" | "secondary"
        | "secondary_link" | "primary" | "primary_link" | "trunk_link" | "road" => 18.0,
        "service" | "living_street" => 15.0,
        "track" => 12.0,
        "steps" => 5.0,
        _ => return None,
    };
    Some(kmh)
}

/// Preference multiplier applied on top of the base speed
fn balanced_multiplier(highway: &str, attributes: &AttributeCollection) -> f32 {
    match highway {
        "trunk_link" | "primary" | "primary_link" | "secondary" | "secondary_link" => 0.8,
        "tertiary" | "tertiary_link" => 0.9,
        "path" | "cycleway" => 1.2,
        "footway" | "pedestrian" | "steps" => 1.1,
        _ if attributes.contains_key("cycleway") => 1.2,
        _ => 1.0,
    }
}

fn bicycle_allowed(value: Option<&str>) -> bool {
    matches!(value, Some("yes") | Some("designated") | Some("permissive"))
}

impl Profile for BicycleProfile {
    fn name(&self) -> &str {
        "bicycle"
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

        let bicycle = attributes.get("bicycle");
        let explicit = bicycle_allowed(bicycle);
        if matches!(bicycle, Some("no") | Some("dismount") | Some("use_sidepath")) {
            return Speed::NO_SPEED;
        }
        // pedestrian areas and steps need an explicit bicycle tag
        if matches!(highway, "pedestrian" | "steps") && !explicit {
            return Speed::NO_SPEED;
        }
        if !explicit && (is_denied(attributes.get("vehicle")) || is_denied(attributes.get("access"))) {
            return Speed::NO_SPEED;
        }

        let opposite_lane = attributes
            .get("cycleway")
            .is_some_and(|v| v.starts_with("opposite"));
        let direction = match oneway_direction(attributes.get("oneway:bicycle")) {
            Some(direction) => direction,
            None if opposite_lane => Direction::Both,
            None => oneway_direction(attributes.get("oneway")).unwrap_or(Direction::Both),
        };

        Speed {
            value: kmh_to_ms(kmh) * balanced_multiplier(highway, attributes),
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(pairs: &[(&str, &str)]) -> Speed {
        BicycleProfile.speed(&AttributeCollection::from_pairs(pairs))
    }

    #[test]
    fn test_cycleway_preferred() {
        let cycleway = speed(&[("highway", "cycleway")]);
        let primary = speed(&[("highway", "primary")]);
        assert!((cycleway.value - kmh_to_ms(20.0) * 1.2).abs() < 1e-5);
        assert!((primary.value - kmh_to_ms(18.0) * 0.8).abs() < 1e-5);
        assert!(cycleway.to_factor().value < primary.to_factor().value);
    }

    #[test]
    fn test_oneway_exception_for_bicycles() {
        assert_eq!(
            speed(&[("highway", "residential"), ("oneway", "yes")]).direction,
            Direction::Forward
        );
        assert_eq!(
            speed(&[("highway", "residential"), ("oneway", "yes"), ("oneway:bicycle", "no")]).direction,
            Direction::Both
        );
        assert_eq!(
            speed(&[("highway", "residential"), ("oneway", "yes"), ("cycleway", "opposite_lane")]).direction,
            Direction::Both
        );
    }

    #[test]
    fn test_bicycle_yes_overrides_access_no() {
        assert_eq!(speed(&[("highway", "residential"), ("access", "no")]), Speed::NO_SPEED);
        assert!(speed(&[("highway", "residential"), ("access", "no"), ("bicycle", "yes")]).value > 0.0);
    }

    #[test]
    fn test_pedestrian_needs_bicycle_yes() {
        assert_eq!(speed(&[("highway", "pedestrian")]), Speed::NO_SPEED);
        assert!(speed(&[("highway", "pedestrian"), ("bicycle", "yes")]).value > 0.0);
    }

    #[test]
    fn test_motorway_and_trunk_denied() {
        assert_eq!(speed(&[("highway", "motorway")]), Speed::NO_SPEED);
        assert_eq!(speed(&[("highway", "trunk")]), Speed::NO_SPEED);
        assert_eq!(speed(&[("highway", "cycleway"), ("bicycle", "no")]), Speed::NO_SPEED);
    }
}
