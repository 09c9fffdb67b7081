//! Periodic sweep that demotes drivers who stopped pinging.
//!
//! Clients that vanish without going offline (killed app, lost network) are
//! flipped to offline once `lastOnline` falls behind the inactivity cutoff,
//! so matching never picks them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::hub::events::{DriverStatusChanged, Event};
use crate::hub::{ConnectionHub, Role, Target};
use crate::models::driver::{Availability, Driver};
use crate::observability::metrics::Metrics;
use crate::store::{DriverStore, OrderStore};

pub struct DriverStatusMonitor {
    drivers: Arc<dyn DriverStore>,
    orders: Arc<dyn OrderStore>,
    hub: Arc<ConnectionHub>,
    inactivity_cutoff: chrono::Duration,
    interval: Duration,
    metrics: Metrics,
}

impl DriverStatusMonitor {
    pub fn new(
        drivers: Arc<dyn DriverStore>,
        orders: Arc<dyn OrderStore>,
        hub: Arc<ConnectionHub>,
        inactivity_cutoff: chrono::Duration,
        interval: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            drivers,
            orders,
            hub,
            inactivity_cutoff,
            interval,
            metrics,
        }
    }

    /// One pass over all drivers. Returns the ids that were demoted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let cutoff = now - self.inactivity_cutoff;
        let drivers = self.drivers.list().await?;
        let mut reaped = Vec::new();

        for driver in drivers
            .iter()
            .filter(|driver| driver.is_online && driver.last_online < cutoff)
        {
            match self.drivers.reap_if_stale(driver.id, cutoff).await {
                Ok(Some(driver)) => {
                    info!(
                        driver_id = %driver.id,
                        last_online = %driver.last_online,
                        "driver marked offline after inactivity"
                    );
                    self.metrics.drivers_reaped_total.inc();
                    self.publish_status(&driver);
                    reaped.push(driver.id);
                }
                Ok(None) => {
                    debug!(driver_id = %driver.id, "driver refreshed before reap");
                }
                Err(err) => {
                    warn!(driver_id = %driver.id, error = %err, "failed to reap driver");
                }
            }
        }

        Ok(reaped)
    }

    /// Bumps `lastOnline` so an active driver is not reaped.
    pub async fn refresh(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.drivers.touch_last_online(driver_id).await
    }

    /// Location ping from the courier app. Also counts as activity.
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
    ) -> Result<Driver, AppError> {
        if !location.is_valid() {
            return Err(AppError::BadRequest(format!(
                "invalid coordinate ({}, {})",
                location.lat, location.lng
            )));
        }

        self.drivers.update_location(driver_id, location).await?;
        self.refresh(driver_id).await
    }

    /// Explicit "go online" / "go offline" from the courier app.
    ///
    /// Going online only makes an offline driver available. A driver still
    /// holding an unfinished order (e.g. reaped mid-delivery) comes back busy.
    pub async fn set_online(&self, driver_id: Uuid, online: bool) -> Result<Driver, AppError> {
        let driver = self
            .drivers
            .get(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if online && !driver.is_approved {
            return Err(AppError::Conflict(format!(
                "driver {driver_id} is not approved"
            )));
        }

        let (next, expected) = if online {
            let next = match self.orders.active_for_driver(driver_id).await? {
                Some(order) => {
                    debug!(
                        driver_id = %driver_id,
                        order_id = %order.id,
                        "driver returns with an open order"
                    );
                    Availability::BUSY
                }
                None => Availability::AVAILABLE,
            };
            (next, Availability::OFFLINE)
        } else {
            (Availability::OFFLINE, driver.availability())
        };

        let changed = driver.availability() != next
            && self
                .drivers
                .set_availability(driver_id, next, Some(expected))
                .await?;

        let driver = if online {
            self.refresh(driver_id).await?
        } else {
            self.drivers
                .get(driver_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?
        };

        if changed {
            info!(driver_id = %driver_id, online, "driver availability changed");
            self.publish_status(&driver);
        }

        Ok(driver)
    }

    /// Ticks every `interval` until `shutdown` flips to `true` or its sender drops.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; the first sweep waits a full period
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            cutoff_minutes = self.inactivity_cutoff.num_minutes(),
            "driver status monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(reaped) if !reaped.is_empty() => {
                            info!(count = reaped.len(), "inactive drivers reaped");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "driver status sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("driver status monitor stopped");
    }

    fn publish_status(&self, driver: &Driver) {
        let delivered = self.hub.publish(
            Target::Role(Role::Superadmin),
            Event::DriverStatusChanged(DriverStatusChanged {
                driver_id: driver.id,
                is_online: driver.is_online,
                is_available: driver.is_available,
            }),
        );
        if delivered == 0 {
            debug!(driver_id = %driver.id, "no operator connected for driver status change");
        }
    }
}
