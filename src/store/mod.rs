//! Persistence contracts consumed by the dispatch core.
//!
//! Implementations must make every conditional write atomic with respect to
//! the check it performs; the dispatcher relies on that to avoid double
//! assignment.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Availability, Driver};
use crate::models::order::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::models::restaurant::Restaurant;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new `pending` order with the next sequential order number.
    async fn insert(&self, order: NewOrder) -> Result<Order, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, AppError>;

    /// Sets `next` only if the stored status is still `expected`.
    /// Returns `None` when the precondition failed.
    async fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, AppError>;

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, AppError>;

    /// Unassigned orders currently offered to the driver pool.
    async fn list_available_for_driver(&self) -> Result<Vec<Order>, AppError>;

    /// A non-terminal order currently held by `driver_id`, if any.
    async fn active_for_driver(&self, driver_id: Uuid) -> Result<Option<Order>, AppError>;
}

#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn insert(&self, driver: Driver) -> Result<Driver, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Driver>, AppError>;

    async fn list(&self) -> Result<Vec<Driver>, AppError>;

    /// Approved, online and available drivers in registration order.
    async fn list_available(&self) -> Result<Vec<Driver>, AppError>;

    /// Writes `next` if the stored pair equals `expected` (or unconditionally
    /// when `expected` is `None`). Returns whether the write applied.
    async fn set_availability(
        &self,
        id: Uuid,
        next: Availability,
        expected: Option<Availability>,
    ) -> Result<bool, AppError>;

    /// `isAvailable = false where id = X and isOnline and isAvailable`.
    async fn claim(&self, id: Uuid) -> Result<bool, AppError> {
        self.set_availability(id, Availability::BUSY, Some(Availability::AVAILABLE))
            .await
    }

    /// `isOnline = false, isAvailable = false where id = X and isOnline and
    /// lastOnline < cutoff`. Returns the updated driver when it applied.
    async fn reap_if_stale(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Driver>, AppError>;

    async fn touch_last_online(&self, id: Uuid) -> Result<Driver, AppError>;

    async fn update_location(&self, id: Uuid, location: GeoPoint) -> Result<Driver, AppError>;

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<Driver, AppError>;

    async fn record_delivery(&self, id: Uuid, earnings: f64) -> Result<Driver, AppError>;
}

#[async_trait]
pub trait RestaurantStore: Send + Sync {
    async fn insert(&self, restaurant: Restaurant) -> Result<Restaurant, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Restaurant>, AppError>;
}
