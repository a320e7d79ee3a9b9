// Geographic calculations for site selection and coverage checks.

use crate::types::Station;

/// Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default search radius when the operator does not supply one
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Allowed operator range for the search radius
pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 10.0;

/// Slack applied to the radius comparison so coincident points survive
/// floating-point noise (radius 0 must still match the station itself).
const DISTANCE_TOLERANCE_KM: f64 = 1e-9;

/// Haversine distance between two points in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push `a` a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * a.min(1.0).sqrt().asin()
}

pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation<'a> {
    pub station: &'a Station,
    pub distance_km: f64,
}

/// All stations within `radius_km` of the target, closest first.
///
/// Distances are computed for the whole table in one pass before filtering.
/// The sort is stable, so stations at equal distance keep their input order.
/// An empty table yields an empty result.
pub fn find_nearby<'a>(
    target_lat: f64,
    target_lon: f64,
    stations: &'a [Station],
    radius_km: f64,
) -> Vec<NearbyStation<'a>> {
    nearby_indices(target_lat, target_lon, stations, radius_km)
        .into_iter()
        .map(|(i, distance_km)| NearbyStation {
            station: &stations[i],
            distance_km,
        })
        .collect()
}

/// Same as [`find_nearby`], as `(index into stations, distance)` pairs.
pub fn nearby_indices(
    target_lat: f64,
    target_lon: f64,
    stations: &[Station],
    radius_km: f64,
) -> Vec<(usize, f64)> {
    let distances: Vec<f64> = stations
        .iter()
        .map(|s| haversine_km(target_lat, target_lon, s.latitude, s.longitude))
        .collect();

    let mut nearby: Vec<(usize, f64)> = distances
        .into_iter()
        .enumerate()
        .filter(|(_, d)| *d <= radius_km + DISTANCE_TOLERANCE_KM)
        .collect();

    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
    nearby
}

/// Categorical filter used on the site-selection view. Unset fields match
/// everything; set fields require an exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StationFilter {
    pub city: Option<String>,
    pub area_type: Option<String>,
    pub project_type: Option<String>,
}

impl StationFilter {
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.area_type.is_none() && self.project_type.is_none()
    }

    pub fn matches(&self, station: &Station) -> bool {
        fn field_matches(want: &Option<String>, have: &Option<String>) -> bool {
            match want {
                None => true,
                Some(w) => have.as_deref() == Some(w.as_str()),
            }
        }
        field_matches(&self.city, &station.city)
            && field_matches(&self.area_type, &station.area_type)
            && field_matches(&self.project_type, &station.project_type)
    }

    pub fn apply<'a>(&self, stations: &'a [Station]) -> Vec<&'a Station> {
        stations.iter().filter(|s| self.matches(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn station(id: &str, lat: f64, lon: f64) -> Station {
        Station {
            station_id: id.to_string(),
            name: format!("Station {}", id),
            latitude: lat,
            longitude: lon,
            ac_count: 2,
            dc_count: 0,
            installation_date: None,
            installation_date_unparseable: false,
            city: None,
            area_type: None,
            project_type: None,
        }
    }

    #[test]
    fn test_haversine_taipei_kaohsiung() {
        // Taipei Main Station to Kaohsiung Main Station is roughly 297 km.
        let d = haversine_km(25.0478, 121.5170, 22.6394, 120.3022);
        assert!((d - 297.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn test_haversine_same_point() {
        assert_abs_diff_eq!(haversine_km(25.0, 121.0, 25.0, 121.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_haversine_antipodal_is_half_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert_abs_diff_eq!(d, std::f64::consts::PI * EARTH_RADIUS_KM, epsilon = 1e-6);
    }

    #[test]
    fn test_radius_selects_and_orders() {
        let stations = vec![station("B", 25.01, 121.0), station("A", 25.0, 121.0)];

        let one_km = find_nearby(25.0, 121.0, &stations, 1.0);
        assert_eq!(one_km.len(), 1);
        assert_eq!(one_km[0].station.station_id, "A");
        assert_abs_diff_eq!(one_km[0].distance_km, 0.0, epsilon = 1e-9);

        let two_km = find_nearby(25.0, 121.0, &stations, 2.0);
        let ids: Vec<&str> = two_km.iter().map(|n| n.station.station_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!((two_km[1].distance_km - 1.112).abs() < 0.01);
    }

    #[test]
    fn test_empty_table() {
        assert!(find_nearby(25.0, 121.0, &[], 5.0).is_empty());
    }

    #[test]
    fn test_zero_radius_keeps_coincident_only() {
        let stations = vec![station("A", 25.0, 121.0), station("B", 25.0001, 121.0)];
        let hits = find_nearby(25.0, 121.0, &stations, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].station.station_id, "A");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let stations = vec![
            station("north", 25.5, 121.0),
            station("twin-1", 25.0, 121.5),
            station("twin-2", 25.0, 121.5),
        ];
        let hits = find_nearby(25.0, 121.0, &stations, 100.0);
        let ids: Vec<&str> = hits.iter().map(|n| n.station.station_id.as_str()).collect();
        assert_eq!(ids, vec!["twin-1", "twin-2", "north"]);
    }

    #[test]
    fn test_filter_matches_exactly() {
        let mut a = station("A", 25.0, 121.0);
        a.city = Some("Taipei".into());
        a.area_type = Some("Urban".into());
        let mut b = station("B", 24.0, 120.0);
        b.city = Some("Taichung".into());
        let stations = vec![a, b];

        let filter = StationFilter {
            city: Some("Taipei".into()),
            ..Default::default()
        };
        let hits = filter.apply(&stations);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].station_id, "A");

        assert!(StationFilter::default().is_empty());
        assert_eq!(StationFilter::default().apply(&stations).len(), 2);
    }

    fn arb_stations() -> impl Strategy<Value = Vec<Station>> {
        prop::collection::vec((-60.0f64..60.0, -170.0f64..170.0), 0..30).prop_map(|pts| {
            pts.into_iter()
                .enumerate()
                .map(|(i, (lat, lon))| station(&i.to_string(), lat, lon))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_station_at_target_is_found(
            lat in -89.0f64..89.0,
            lon in -179.0f64..179.0,
            mut others in arb_stations(),
            radius in 0.0f64..10.0,
        ) {
            others.push(station("target", lat, lon));
            let hits = find_nearby(lat, lon, &others, radius);
            let hit = hits.iter().find(|n| n.station.station_id == "target");
            prop_assert!(hit.is_some());
            prop_assert!(hit.unwrap().distance_km.abs() < 1e-9);
        }

        #[test]
        fn prop_sorted_and_within_radius(
            lat in -60.0f64..60.0,
            lon in -170.0f64..170.0,
            stations in arb_stations(),
            radius in 0.1f64..5000.0,
        ) {
            let hits = find_nearby(lat, lon, &stations, radius);
            for pair in hits.windows(2) {
                prop_assert!(pair[0].distance_km <= pair[1].distance_km);
            }
            for hit in &hits {
                prop_assert!(hit.distance_km <= radius + 1e-9);
            }
        }

        #[test]
        fn prop_doubling_radius_is_superset(
            lat in -60.0f64..60.0,
            lon in -170.0f64..170.0,
            stations in arb_stations(),
            radius in 0.1f64..5000.0,
        ) {
            let small = find_nearby(lat, lon, &stations, radius);
            let large = find_nearby(lat, lon, &stations, radius * 2.0);
            for hit in &small {
                prop_assert!(large.iter().any(|l| l.station.station_id == hit.station.station_id));
            }
        }
    }
}
