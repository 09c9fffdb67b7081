//! Post-commit side effects of a status transition.
//!
//! Planning is pure: given the committed order it lists independent effects.
//! The dispatcher runs them one by one and a failing effect never affects
//! its siblings or the already-committed transition.

use uuid::Uuid;

use crate::dispatch::estimate::Estimator;
use crate::hub::events::{Event, OrderMessage, OrderReadyForPickup, OrderStatusUpdated};
use crate::hub::{Role, Target};
use crate::models::order::{Order, OrderStatus};
use crate::models::restaurant::Restaurant;

pub const KITCHEN_STARTED_MESSAGE: &str = "The kitchen has started preparing your order";
pub const ON_THE_WAY_MESSAGE: &str = "Your order is on the way";
pub const DELIVERED_MESSAGE: &str = "Your order has been delivered. Enjoy your meal!";
pub const CANCELLED_MESSAGE: &str = "Your order has been cancelled";
pub const INTERVENTION_MESSAGE: &str = "Order requires operator intervention";

const UNKNOWN_RESTAURANT: &str = "restaurant";

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Notify { target: Target, event: Event },
    /// Match and claim a courier, or broadcast to the pool when nobody is free.
    AssignDriver,
    /// Tell the customer who is coming, looked up at execution time.
    AnnounceDriver { driver_id: Uuid },
    RecordDelivery { driver_id: Uuid, earnings: f64 },
    ReleaseDriver { driver_id: Uuid },
}

impl SideEffect {
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::Notify { event, .. } => event.name(),
            SideEffect::AssignDriver => "assign_driver",
            SideEffect::AnnounceDriver { .. } => "announce_driver",
            SideEffect::RecordDelivery { .. } => "record_delivery",
            SideEffect::ReleaseDriver { .. } => "release_driver",
        }
    }
}

pub fn restaurant_name(restaurant: Option<&Restaurant>) -> String {
    restaurant
        .map(|restaurant| restaurant.name.clone())
        .unwrap_or_else(|| UNKNOWN_RESTAURANT.to_string())
}

fn status_update(order: &Order, message: Option<&str>) -> Event {
    Event::OrderStatusUpdated(OrderStatusUpdated {
        order_id: order.id,
        order_number: order.order_number,
        status: order.status,
        driver_id: order.driver_id,
        message: message.map(str::to_string),
    })
}

pub fn ready_for_pickup(order: &Order, driver_id: Uuid, restaurant: Option<&Restaurant>) -> Event {
    Event::OrderReadyForPickup(OrderReadyForPickup {
        driver_id,
        order_id: order.id,
        order_number: order.order_number,
        restaurant_name: restaurant_name(restaurant),
    })
}

fn notify(target: Target, event: Event) -> SideEffect {
    SideEffect::Notify { target, event }
}

fn order_message(order: &Order, message: &str) -> OrderMessage {
    OrderMessage {
        order_id: order.id,
        message: message.to_string(),
    }
}

/// Effects for an order that has just entered `order.status`.
pub fn plan(order: &Order, restaurant: Option<&Restaurant>, estimator: &Estimator) -> Vec<SideEffect> {
    let customer = Target::User(order.customer_id);
    let mut effects = vec![notify(
        Target::Restaurant(order.restaurant_id),
        status_update(order, None),
    )];

    match order.status {
        OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing => {
            effects.push(notify(customer, status_update(order, None)));
        }
        OrderStatus::InPreparation => {
            effects.push(notify(
                customer,
                status_update(order, Some(KITCHEN_STARTED_MESSAGE)),
            ));
            if order.driver_id.is_none() {
                effects.push(SideEffect::AssignDriver);
            }
        }
        OrderStatus::ReadyForPickup => match order.driver_id {
            Some(driver_id) => effects.push(notify(
                Target::Driver(driver_id),
                ready_for_pickup(order, driver_id, restaurant),
            )),
            None => effects.push(SideEffect::AssignDriver),
        },
        OrderStatus::DriverAssigned => {
            if let Some(driver_id) = order.driver_id {
                effects.push(SideEffect::AnnounceDriver { driver_id });
            }
        }
        OrderStatus::PickedUp => {
            effects.push(notify(
                customer,
                Event::OrderPickedUp(order_message(order, ON_THE_WAY_MESSAGE)),
            ));
        }
        OrderStatus::Delivered => {
            effects.push(notify(
                customer,
                Event::OrderDelivered(order_message(order, DELIVERED_MESSAGE)),
            ));
            if let Some(driver_id) = order.driver_id {
                let earnings = estimator.earnings(
                    restaurant.and_then(|restaurant| restaurant.location.as_ref()),
                    order.delivery_location.as_ref(),
                );
                effects.push(SideEffect::RecordDelivery {
                    driver_id,
                    earnings,
                });
                effects.push(SideEffect::ReleaseDriver { driver_id });
            }
        }
        OrderStatus::Cancelled => {
            if let Some(driver_id) = order.driver_id {
                effects.push(SideEffect::ReleaseDriver { driver_id });
                effects.push(notify(
                    Target::Driver(driver_id),
                    status_update(order, Some(CANCELLED_MESSAGE)),
                ));
            }
            effects.push(notify(customer, status_update(order, Some(CANCELLED_MESSAGE))));
        }
        OrderStatus::AwaitingAdminIntervention => {
            effects.push(notify(
                Target::Role(Role::Superadmin),
                status_update(order, Some(INTERVENTION_MESSAGE)),
            ));
        }
    }

    effects
}
