use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    InPreparation,
    ReadyForPickup,
    DriverAssigned,
    PickedUp,
    Delivered,
    Cancelled,
    AwaitingAdminIntervention,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::InPreparation,
        OrderStatus::ReadyForPickup,
        OrderStatus::DriverAssigned,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::AwaitingAdminIntervention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::InPreparation => "in_preparation",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::DriverAssigned => "driver_assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::AwaitingAdminIntervention => "awaiting_admin_intervention",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses in which an unassigned order is offered to the driver pool.
    pub fn is_open_for_drivers(&self) -> bool {
        matches!(self, OrderStatus::InPreparation | OrderStatus::ReadyForPickup)
    }

    /// The allowed-edges table of the dispatch state machine.
    ///
    /// `AwaitingAdminIntervention` has no automatic exit; its outgoing edges
    /// are the operator's manual resolutions back into the flow.
    pub fn successors(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[InPreparation, AwaitingAdminIntervention, Cancelled],
            InPreparation => &[ReadyForPickup, AwaitingAdminIntervention, Cancelled],
            ReadyForPickup => &[DriverAssigned, Cancelled],
            DriverAssigned => &[PickedUp, Cancelled],
            PickedUp => &[Delivered, Cancelled],
            AwaitingAdminIntervention => &[Preparing, InPreparation, ReadyForPickup, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: u64,
    pub status: OrderStatus,
    pub restaurant_id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub total_amount: f64,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
    pub delivery_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when an order is placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub restaurant_id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
    pub delivery_location: Option<GeoPoint>,
}

impl NewOrder {
    pub fn total_amount(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.unit_price * f64::from(item.quantity))
            .sum()
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub driver_id: Option<Option<Uuid>>,
    pub delivery_address: Option<String>,
    pub delivery_location: Option<Option<GeoPoint>>,
}

impl OrderPatch {
    pub fn driver(driver_id: Option<Uuid>) -> Self {
        Self {
            driver_id: Some(driver_id),
            ..Self::default()
        }
    }

    pub fn apply(self, order: &mut Order) {
        if let Some(driver_id) = self.driver_id {
            order.driver_id = driver_id;
        }
        if let Some(address) = self.delivery_address {
            order.delivery_address = address;
        }
        if let Some(location) = self.delivery_location {
            order.delivery_location = location;
        }
        order.updated_at = Utc::now();
    }
}
