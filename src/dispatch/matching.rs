use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{distance_between, GeoPoint};
use crate::models::driver::Driver;
use crate::observability::metrics::Metrics;
use crate::store::DriverStore;

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        driver: Driver,
        /// `None` when either side had no usable coordinate.
        distance_km: Option<f64>,
    },
    NoCandidate,
}

/// Index of the nearest candidate to `pickup`.
///
/// Candidates without a location rank at +inf, so they are only chosen when
/// nobody located is eligible. An unusable pickup puts everyone at +inf, which
/// degrades to "first available". Ties keep the earliest candidate.
pub fn nearest_candidate(candidates: &[Driver], pickup: Option<&GeoPoint>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (index, driver) in candidates.iter().enumerate() {
        let distance = distance_between(pickup, driver.location.as_ref()).unwrap_or(f64::INFINITY);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }

    best.map(|(index, _)| index)
}

pub struct MatchingService {
    drivers: Arc<dyn DriverStore>,
    metrics: Metrics,
}

impl MatchingService {
    pub fn new(drivers: Arc<dyn DriverStore>, metrics: Metrics) -> Self {
        Self { drivers, metrics }
    }

    /// Read-only selection of the best candidate for `pickup`.
    pub async fn find_driver_for(&self, pickup: Option<GeoPoint>) -> Result<MatchOutcome, AppError> {
        let candidates = self.drivers.list_available().await?;

        Ok(match nearest_candidate(&candidates, pickup.as_ref()) {
            Some(index) => {
                let driver = candidates[index].clone();
                let distance_km = distance_between(pickup.as_ref(), driver.location.as_ref());
                MatchOutcome::Matched {
                    driver,
                    distance_km,
                }
            }
            None => MatchOutcome::NoCandidate,
        })
    }

    /// Selects the nearest candidate and atomically flips it to unavailable.
    ///
    /// A lost conditional claim drops that candidate and retries against the
    /// rest of the pool. `exclude` removes drivers up front (e.g. one who just
    /// rejected the offer).
    pub async fn claim_driver_for(
        &self,
        pickup: Option<GeoPoint>,
        exclude: &[Uuid],
    ) -> Result<MatchOutcome, AppError> {
        let mut candidates = self.drivers.list_available().await?;
        candidates.retain(|driver| !exclude.contains(&driver.id));

        while let Some(index) = nearest_candidate(&candidates, pickup.as_ref()) {
            let mut driver = candidates.remove(index);

            if self.drivers.claim(driver.id).await? {
                driver.is_available = false;
                let distance_km = distance_between(pickup.as_ref(), driver.location.as_ref());
                self.metrics
                    .matching_outcomes_total
                    .with_label_values(&["matched"])
                    .inc();
                info!(driver_id = %driver.id, distance_km = ?distance_km, "driver claimed");
                return Ok(MatchOutcome::Matched {
                    driver,
                    distance_km,
                });
            }

            self.metrics
                .matching_outcomes_total
                .with_label_values(&["lost_race"])
                .inc();
            debug!(driver_id = %driver.id, "driver taken concurrently; trying next candidate");
        }

        self.metrics
            .matching_outcomes_total
            .with_label_values(&["no_candidate"])
            .inc();
        Ok(MatchOutcome::NoCandidate)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{nearest_candidate, MatchOutcome, MatchingService};
    use crate::geo::GeoPoint;
    use crate::models::driver::{Availability, Driver};
    use crate::observability::metrics::Metrics;
    use crate::store::memory::InMemoryDriverStore;
    use crate::store::DriverStore;

    fn driver(seed: u128, location: Option<GeoPoint>) -> Driver {
        let mut driver = Driver::register(Uuid::from_u128(seed), format!("driver-{seed}"), String::new());
        driver.id = Uuid::from_u128(seed);
        driver.is_approved = true;
        driver.set_availability(Availability::AVAILABLE);
        driver.location = location;
        driver
    }

    #[test]
    fn picks_the_nearest_located_driver() {
        let d1 = driver(1, Some(GeoPoint::new(9.03, 38.74)));
        let d2 = driver(2, Some(GeoPoint::new(9.05, 38.80)));
        let pickup = GeoPoint::new(9.031, 38.741);

        assert_eq!(nearest_candidate(&[d2.clone(), d1.clone()], Some(&pickup)), Some(1));
        assert_eq!(nearest_candidate(&[d1, d2], Some(&pickup)), Some(0));
    }

    #[test]
    fn unlocated_driver_loses_to_located_but_remains_eligible() {
        let pickup = GeoPoint::new(9.031, 38.741);
        let unlocated = driver(1, None);
        let far = driver(2, Some(GeoPoint::new(12.0, 40.0)));

        assert_eq!(
            nearest_candidate(&[unlocated.clone(), far], Some(&pickup)),
            Some(1)
        );
        assert_eq!(nearest_candidate(&[unlocated], Some(&pickup)), Some(0));
    }

    #[test]
    fn missing_or_invalid_pickup_falls_back_to_first_available() {
        let d1 = driver(1, Some(GeoPoint::new(9.05, 38.80)));
        let d2 = driver(2, Some(GeoPoint::new(9.03, 38.74)));
        let bogus = GeoPoint::new(f64::NAN, 200.0);

        assert_eq!(nearest_candidate(&[d1.clone(), d2.clone()], None), Some(0));
        assert_eq!(nearest_candidate(&[d1, d2], Some(&bogus)), Some(0));
    }

    #[test]
    fn ties_keep_first_seen_candidate() {
        let here = GeoPoint::new(9.03, 38.74);
        let candidates = [driver(5, Some(here)), driver(3, Some(here))];
        assert_eq!(nearest_candidate(&candidates, Some(&here)), Some(0));
    }

    #[test]
    fn empty_pool_has_no_candidate() {
        assert_eq!(nearest_candidate(&[], None), None);
    }

    #[tokio::test]
    async fn claim_marks_driver_unavailable() {
        let store = Arc::new(InMemoryDriverStore::new());
        store.insert(driver(1, Some(GeoPoint::new(9.03, 38.74)))).await.unwrap();
        let service = MatchingService::new(store.clone(), Metrics::new());

        let outcome = service
            .claim_driver_for(Some(GeoPoint::new(9.031, 38.741)), &[])
            .await
            .unwrap();

        let MatchOutcome::Matched { driver, distance_km } = outcome else {
            panic!("expected a match");
        };
        assert_eq!(driver.id, Uuid::from_u128(1));
        assert!(distance_km.unwrap() < 1.0);

        let stored = store.get(driver.id).await.unwrap().unwrap();
        assert!(!stored.is_available);
        assert!(matches!(
            service.claim_driver_for(None, &[]).await.unwrap(),
            MatchOutcome::NoCandidate
        ));
    }

    #[tokio::test]
    async fn excluded_driver_is_skipped() {
        let store = Arc::new(InMemoryDriverStore::new());
        store.insert(driver(1, Some(GeoPoint::new(9.03, 38.74)))).await.unwrap();
        store.insert(driver(2, Some(GeoPoint::new(9.05, 38.80)))).await.unwrap();
        let service = MatchingService::new(store, Metrics::new());

        let outcome = service
            .claim_driver_for(Some(GeoPoint::new(9.031, 38.741)), &[Uuid::from_u128(1)])
            .await
            .unwrap();

        match outcome {
            MatchOutcome::Matched { driver, .. } => assert_eq!(driver.id, Uuid::from_u128(2)),
            MatchOutcome::NoCandidate => panic!("expected driver 2"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_assign_a_single_driver_once() {
        let store = Arc::new(InMemoryDriverStore::new());
        store.insert(driver(1, Some(GeoPoint::new(9.03, 38.74)))).await.unwrap();
        let service = Arc::new(MatchingService::new(store, Metrics::new()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .claim_driver_for(Some(GeoPoint::new(9.031, 38.741)), &[])
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut matched = 0;
        let mut no_candidate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                MatchOutcome::Matched { .. } => matched += 1,
                MatchOutcome::NoCandidate => no_candidate += 1,
            }
        }

        assert_eq!(matched, 1);
        assert_eq!(no_candidate, 15);
    }

    #[tokio::test]
    async fn find_does_not_claim() {
        let store = Arc::new(InMemoryDriverStore::new());
        store.insert(driver(1, None)).await.unwrap();
        let service = MatchingService::new(store.clone(), Metrics::new());

        assert!(matches!(
            service.find_driver_for(None).await.unwrap(),
            MatchOutcome::Matched { distance_km: None, .. }
        ));
        let stored = store.get(Uuid::from_u128(1)).await.unwrap().unwrap();
        assert!(stored.is_available);
    }
}
