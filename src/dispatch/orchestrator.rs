use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::effects::{self, ready_for_pickup, restaurant_name, SideEffect};
use crate::dispatch::estimate::Estimator;
use crate::dispatch::locks::OrderLocks;
use crate::dispatch::matching::{MatchOutcome, MatchingService};
use crate::error::AppError;
use crate::hub::events::{
    DriverAssigned, Event, NewAvailableOrder, NewOrderNotification, OrderOffer, OrderStatusUpdated,
};
use crate::hub::{ConnectionHub, Role, Target};
use crate::models::driver::Availability;
use crate::models::order::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::models::restaurant::Restaurant;
use crate::observability::metrics::Metrics;
use crate::store::{DriverStore, OrderStore, RestaurantStore};

/// Drives orders through the status machine and fans out the consequences.
///
/// Every mutation of an order goes through a per-order lock, so two requests
/// for the same order never interleave while different orders run in parallel.
pub struct Dispatcher {
    orders: Arc<dyn OrderStore>,
    drivers: Arc<dyn DriverStore>,
    restaurants: Arc<dyn RestaurantStore>,
    matching: Arc<MatchingService>,
    hub: Arc<ConnectionHub>,
    estimator: Estimator,
    metrics: Metrics,
    locks: OrderLocks,
}

impl Dispatcher {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        drivers: Arc<dyn DriverStore>,
        restaurants: Arc<dyn RestaurantStore>,
        matching: Arc<MatchingService>,
        hub: Arc<ConnectionHub>,
        estimator: Estimator,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            drivers,
            restaurants,
            matching,
            hub,
            estimator,
            metrics,
            locks: OrderLocks::new(),
        }
    }

    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order, AppError> {
        if new_order.delivery_address.trim().is_empty() {
            return Err(AppError::BadRequest(
                "delivery_address cannot be empty".to_string(),
            ));
        }
        if self.restaurants.get(new_order.restaurant_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "restaurant {} not found",
                new_order.restaurant_id
            )));
        }

        let order = self.orders.insert(new_order).await?;
        info!(order_id = %order.id, order_number = order.order_number, "order created");

        self.notify(
            Target::Restaurant(order.restaurant_id),
            Event::OrderStatusUpdated(OrderStatusUpdated {
                order_id: order.id,
                order_number: order.order_number,
                status: order.status,
                driver_id: None,
                message: Some("New order received".to_string()),
            }),
        );

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    pub async fn available_orders(&self) -> Result<Vec<Order>, AppError> {
        self.orders.list_available_for_driver().await
    }

    /// Moves `order_id` to `requested` and runs the effects of the new state.
    ///
    /// Only the status write can fail the call; effect failures are logged.
    pub async fn transition(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<Order, AppError> {
        let start = Instant::now();

        let result = {
            let _guard = self.locks.acquire(order_id).await;
            match self.get_order(order_id).await {
                Ok(order) => self.apply_transition(order, requested).await,
                Err(err) => Err(err),
            }
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::InvalidTransition { .. }) => "invalid",
            Err(AppError::NotFound(_)) => "not_found",
            Err(AppError::Conflict(_)) => "conflict",
            Err(_) => "error",
        };
        self.metrics
            .transitions_total
            .with_label_values(&[requested.as_str(), outcome])
            .inc();
        self.metrics
            .transition_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    /// A driver accepts an offer, or self-assigns an order from the broadcast pool.
    ///
    /// Accepting an order that is already `ready_for_pickup` confirms the
    /// assignment by moving it to `driver_assigned`.
    pub async fn accept_order(&self, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;

        if self.drivers.get(driver_id).await?.is_none() {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        }

        if order.status.is_terminal()
            || matches!(
                order.status,
                OrderStatus::PickedUp | OrderStatus::AwaitingAdminIntervention
            )
        {
            return Err(AppError::Conflict(format!(
                "order {order_id} can no longer be accepted ({})",
                order.status
            )));
        }

        match order.driver_id {
            Some(current) if current == driver_id => {
                debug!(order_id = %order_id, driver_id = %driver_id, "order already held by driver");
            }
            Some(_) => {
                return Err(AppError::Conflict(format!(
                    "order {order_id} is assigned to another driver"
                )));
            }
            None => {
                if !order.status.is_open_for_drivers() {
                    return Err(AppError::Conflict(format!(
                        "order {order_id} is not open for drivers ({})",
                        order.status
                    )));
                }
                if !self.drivers.claim(driver_id).await? {
                    return Err(AppError::Conflict(format!(
                        "driver {driver_id} is not available"
                    )));
                }

                order = match self
                    .orders
                    .update(order_id, OrderPatch::driver(Some(driver_id)))
                    .await
                {
                    Ok(order) => order,
                    Err(err) => {
                        self.release_driver_logged(driver_id).await;
                        return Err(err);
                    }
                };

                info!(order_id = %order_id, driver_id = %driver_id, "driver self-assigned order");
                self.notify(
                    Target::Restaurant(order.restaurant_id),
                    Event::OrderStatusUpdated(OrderStatusUpdated {
                        order_id,
                        order_number: order.order_number,
                        status: order.status,
                        driver_id: Some(driver_id),
                        message: Some("A driver accepted the order".to_string()),
                    }),
                );
            }
        }

        if order.status == OrderStatus::ReadyForPickup {
            return self.apply_transition(order, OrderStatus::DriverAssigned).await;
        }

        Ok(order)
    }

    /// A driver declines an offer. Late rejections for orders the driver no
    /// longer holds are accepted as no-ops.
    pub async fn reject_offer(&self, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.get_order(order_id).await?;

        if order.driver_id != Some(driver_id) {
            debug!(order_id = %order_id, driver_id = %driver_id, "stale rejection ignored");
            return Ok(order);
        }
        if !order.status.is_open_for_drivers() {
            return Err(AppError::Conflict(format!(
                "order {order_id} was already accepted ({})",
                order.status
            )));
        }

        let mut order = self.orders.update(order_id, OrderPatch::driver(None)).await?;
        info!(order_id = %order_id, driver_id = %driver_id, "driver rejected offer");

        self.release_driver_logged(driver_id).await;

        let restaurant = self.lookup_restaurant(order.restaurant_id).await;
        if let Err(err) = self
            .assign_driver(&mut order, restaurant.as_ref(), &[driver_id])
            .await
        {
            warn!(order_id = %order_id, error = %err, "re-matching after rejection failed");
        }

        Ok(order)
    }

    async fn apply_transition(
        &self,
        order: Order,
        requested: OrderStatus,
    ) -> Result<Order, AppError> {
        let previous = order.status;

        if !previous.can_transition_to(requested) {
            return Err(AppError::InvalidTransition {
                from: previous,
                to: requested,
            });
        }
        if requested == OrderStatus::DriverAssigned && order.driver_id.is_none() {
            return Err(AppError::Conflict(format!(
                "order {} has no driver to confirm",
                order.id
            )));
        }

        let mut order = self
            .orders
            .update_status(order.id, previous, requested)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!("order {} was modified concurrently", order.id))
            })?;

        info!(
            order_id = %order.id,
            from = previous.as_str(),
            to = requested.as_str(),
            "order transitioned"
        );

        let restaurant = self.lookup_restaurant(order.restaurant_id).await;
        let planned = effects::plan(&order, restaurant.as_ref(), &self.estimator);
        self.run_effects(&mut order, restaurant.as_ref(), planned).await;

        Ok(order)
    }

    async fn run_effects(
        &self,
        order: &mut Order,
        restaurant: Option<&Restaurant>,
        planned: Vec<SideEffect>,
    ) {
        for effect in planned {
            let label = effect.label();
            if let Err(err) = self.run_effect(order, restaurant, effect).await {
                warn!(order_id = %order.id, effect = label, error = %err, "side effect failed");
            }
        }
    }

    async fn run_effect(
        &self,
        order: &mut Order,
        restaurant: Option<&Restaurant>,
        effect: SideEffect,
    ) -> Result<(), AppError> {
        match effect {
            SideEffect::Notify { target, event } => {
                self.notify(target, event);
                Ok(())
            }
            SideEffect::AssignDriver => self.assign_driver(order, restaurant, &[]).await,
            SideEffect::AnnounceDriver { driver_id } => {
                self.announce_driver(order, restaurant, driver_id).await
            }
            SideEffect::RecordDelivery {
                driver_id,
                earnings,
            } => {
                self.drivers.record_delivery(driver_id, earnings).await?;
                Ok(())
            }
            SideEffect::ReleaseDriver { driver_id } => {
                self.release_driver(driver_id).await?;
                Ok(())
            }
        }
    }

    async fn assign_driver(
        &self,
        order: &mut Order,
        restaurant: Option<&Restaurant>,
        exclude: &[Uuid],
    ) -> Result<(), AppError> {
        if order.driver_id.is_some() {
            return Ok(());
        }

        let pickup = restaurant.and_then(|restaurant| restaurant.location);

        match self.matching.claim_driver_for(pickup, exclude).await? {
            MatchOutcome::Matched {
                driver,
                distance_km,
            } => {
                *order = match self
                    .orders
                    .update(order.id, OrderPatch::driver(Some(driver.id)))
                    .await
                {
                    Ok(updated) => updated,
                    Err(err) => {
                        self.release_driver_logged(driver.id).await;
                        return Err(err);
                    }
                };

                info!(order_id = %order.id, driver_id = %driver.id, "driver assigned to order");
                self.notify(
                    Target::Driver(driver.id),
                    Event::NewOrderNotification(NewOrderNotification {
                        driver_id: driver.id,
                        order: self.offer(order, restaurant, distance_km),
                    }),
                );
                if order.status == OrderStatus::ReadyForPickup {
                    self.notify(
                        Target::Driver(driver.id),
                        ready_for_pickup(order, driver.id, restaurant),
                    );
                }
            }
            MatchOutcome::NoCandidate => {
                info!(order_id = %order.id, "no driver available; broadcasting to pool");
                self.notify(
                    Target::Role(Role::Driver),
                    Event::NewAvailableOrder(NewAvailableOrder {
                        order_id: order.id,
                        order: self.offer(order, restaurant, None),
                    }),
                );
            }
        }

        Ok(())
    }

    async fn announce_driver(
        &self,
        order: &Order,
        restaurant: Option<&Restaurant>,
        driver_id: Uuid,
    ) -> Result<(), AppError> {
        let driver = self
            .drivers
            .get(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        let estimated_arrival = self.estimator.arrival_window(
            driver.location.as_ref(),
            restaurant.and_then(|restaurant| restaurant.location.as_ref()),
            order.delivery_location.as_ref(),
        );

        self.notify(
            Target::User(order.customer_id),
            Event::DriverAssigned(DriverAssigned {
                order_id: order.id,
                driver_id,
                driver_name: driver.name,
                driver_phone: driver.phone,
                estimated_arrival,
            }),
        );
        Ok(())
    }

    /// Puts a busy driver back into the pool. Drivers who went offline
    /// meanwhile are left offline.
    async fn release_driver(&self, driver_id: Uuid) -> Result<bool, AppError> {
        let released = self
            .drivers
            .set_availability(driver_id, Availability::AVAILABLE, Some(Availability::BUSY))
            .await?;

        if released {
            info!(driver_id = %driver_id, "driver released");
        } else {
            debug!(driver_id = %driver_id, "driver was not busy; availability untouched");
        }
        Ok(released)
    }

    async fn release_driver_logged(&self, driver_id: Uuid) {
        if let Err(err) = self.release_driver(driver_id).await {
            warn!(driver_id = %driver_id, error = %err, "failed to release driver");
        }
    }

    async fn lookup_restaurant(&self, restaurant_id: Uuid) -> Option<Restaurant> {
        match self.restaurants.get(restaurant_id).await {
            Ok(Some(restaurant)) => Some(restaurant),
            Ok(None) => {
                warn!(restaurant_id = %restaurant_id, "restaurant not found for order");
                None
            }
            Err(err) => {
                warn!(restaurant_id = %restaurant_id, error = %err, "restaurant lookup failed");
                None
            }
        }
    }

    fn offer(
        &self,
        order: &Order,
        restaurant: Option<&Restaurant>,
        distance_km: Option<f64>,
    ) -> OrderOffer {
        let pickup = restaurant.and_then(|restaurant| restaurant.location.as_ref());

        OrderOffer {
            order_id: order.id,
            order_number: order.order_number,
            restaurant_name: restaurant_name(restaurant),
            restaurant_address: restaurant
                .map(|restaurant| restaurant.address.clone())
                .unwrap_or_default(),
            delivery_address: order.delivery_address.clone(),
            total_amount: order.total_amount,
            estimated_earnings: self
                .estimator
                .earnings(pickup, order.delivery_location.as_ref()),
            distance_km,
        }
    }

    /// Best-effort publish. Zero recipients is logged, never surfaced.
    fn notify(&self, target: Target, event: Event) -> usize {
        let name = event.name();
        let delivered = self.hub.publish(target, event);

        let outcome = if delivered > 0 {
            "delivered"
        } else {
            debug!(room = %target, event = name, "no live connection; notification dropped");
            "undelivered"
        };
        self.metrics
            .notifications_total
            .with_label_values(&[name, outcome])
            .inc();

        delivered
    }
}
