//! Event catalogue pushed to dashboards and apps.
//!
//! On the wire every event is `{"event": "<name>", "payload": {...}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Event {
    NewOrderNotification(NewOrderNotification),
    NewAvailableOrder(NewAvailableOrder),
    OrderReadyForPickup(OrderReadyForPickup),
    DriverAssigned(DriverAssigned),
    OrderPickedUp(OrderMessage),
    OrderDelivered(OrderMessage),
    OrderStatusUpdated(OrderStatusUpdated),
    DriverStatusChanged(DriverStatusChanged),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewOrderNotification(_) => "new_order_notification",
            Event::NewAvailableOrder(_) => "new_available_order",
            Event::OrderReadyForPickup(_) => "order_ready_for_pickup",
            Event::DriverAssigned(_) => "driver_assigned",
            Event::OrderPickedUp(_) => "order_picked_up",
            Event::OrderDelivered(_) => "order_delivered",
            Event::OrderStatusUpdated(_) => "order_status_updated",
            Event::DriverStatusChanged(_) => "driver_status_changed",
        }
    }
}

/// What a courier sees when an order is offered to them or to the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderOffer {
    pub order_id: Uuid,
    pub order_number: u64,
    pub restaurant_name: String,
    pub restaurant_address: String,
    pub delivery_address: String,
    pub total_amount: f64,
    pub estimated_earnings: f64,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrderNotification {
    pub driver_id: Uuid,
    pub order: OrderOffer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAvailableOrder {
    pub order_id: Uuid,
    pub order: OrderOffer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReadyForPickup {
    pub driver_id: Uuid,
    pub order_id: Uuid,
    pub order_number: u64,
    pub restaurant_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ArrivalWindow {
    pub earliest_minutes: u32,
    pub latest_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverAssigned {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub estimated_arrival: ArrivalWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderMessage {
    pub order_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusUpdated {
    pub order_id: Uuid,
    pub order_number: u64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverStatusChanged {
    pub driver_id: Uuid,
    pub is_online: bool,
    pub is_available: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{DriverStatusChanged, Event};

    #[test]
    fn wire_shape_is_tagged_with_event_name() {
        let driver_id = Uuid::from_u128(3);
        let event = Event::DriverStatusChanged(DriverStatusChanged {
            driver_id,
            is_online: false,
            is_available: false,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(
            value["payload"],
            json!({
                "driver_id": driver_id,
                "is_online": false,
                "is_available": false
            })
        );
    }
}
