//! Display-only estimates shown in courier and customer notifications.

use crate::config::Config;
use crate::geo::{distance_between, GeoPoint};
use crate::hub::events::ArrivalWindow;

const FALLBACK_ARRIVAL: ArrivalWindow = ArrivalWindow {
    earliest_minutes: 30,
    latest_minutes: 45,
};
const ARRIVAL_WINDOW_SPREAD_MINUTES: u32 = 10;
const MIN_ARRIVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct Estimator {
    min_earnings: f64,
    rate_per_km: f64,
    speed_kmh: f64,
}

impl Estimator {
    pub fn new(min_earnings: f64, rate_per_km: f64, speed_kmh: f64) -> Self {
        Self {
            min_earnings,
            rate_per_km,
            speed_kmh,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.min_courier_earnings,
            config.courier_rate_per_km,
            config.courier_speed_kmh,
        )
    }

    /// Trip length times the per-km rate, never below the configured floor.
    pub fn earnings(&self, restaurant: Option<&GeoPoint>, delivery: Option<&GeoPoint>) -> f64 {
        match distance_between(restaurant, delivery) {
            Some(km) => (km * self.rate_per_km).max(self.min_earnings),
            None => self.min_earnings,
        }
    }

    pub fn arrival_window(
        &self,
        driver: Option<&GeoPoint>,
        restaurant: Option<&GeoPoint>,
        delivery: Option<&GeoPoint>,
    ) -> ArrivalWindow {
        let (Some(to_restaurant), Some(to_customer)) = (
            distance_between(driver, restaurant),
            distance_between(restaurant, delivery),
        ) else {
            return FALLBACK_ARRIVAL;
        };

        let minutes = ((to_restaurant + to_customer) / self.speed_kmh * 60.0).ceil();
        let earliest = (minutes as u32).max(MIN_ARRIVAL_MINUTES);

        ArrivalWindow {
            earliest_minutes: earliest,
            latest_minutes: earliest + ARRIVAL_WINDOW_SPREAD_MINUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Estimator;
    use crate::geo::GeoPoint;

    fn estimator() -> Estimator {
        Estimator::new(50.0, 10.0, 30.0)
    }

    #[test]
    fn short_trip_pays_the_floor() {
        let restaurant = GeoPoint::new(9.031, 38.741);
        let delivery = GeoPoint::new(9.032, 38.742);
        assert_eq!(estimator().earnings(Some(&restaurant), Some(&delivery)), 50.0);
    }

    #[test]
    fn long_trip_pays_per_km() {
        let restaurant = GeoPoint::new(9.03, 38.74);
        let delivery = GeoPoint::new(9.05, 38.80);
        let earnings = estimator().earnings(Some(&restaurant), Some(&delivery));
        assert!(earnings > 50.0);
        assert!((earnings - 69.54).abs() < 0.1);
    }

    #[test]
    fn missing_coordinates_use_fallbacks() {
        let here = GeoPoint::new(9.03, 38.74);
        assert_eq!(estimator().earnings(None, Some(&here)), 50.0);

        let window = estimator().arrival_window(None, Some(&here), Some(&here));
        assert_eq!(window.earliest_minutes, 30);
        assert_eq!(window.latest_minutes, 45);
    }

    #[test]
    fn arrival_window_tracks_distance() {
        let driver = GeoPoint::new(9.05, 38.80);
        let restaurant = GeoPoint::new(9.03, 38.74);
        let delivery = GeoPoint::new(9.03, 38.74);

        let window = estimator().arrival_window(Some(&driver), Some(&restaurant), Some(&delivery));
        // ~6.95 km at 30 km/h
        assert_eq!(window.earliest_minutes, 14);
        assert_eq!(window.latest_minutes, 24);
    }
}
