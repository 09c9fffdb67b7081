use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Availability, Driver};
use crate::models::order::{NewOrder, Order, OrderPatch, OrderStatus};
use crate::models::restaurant::Restaurant;
use crate::store::{DriverStore, OrderStore, RestaurantStore};

fn order_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

fn driver_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("driver {id} not found"))
}

pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    next_number: AtomicU64,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            next_number: AtomicU64::new(1),
        }
    }

}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, AppError> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            order_number: self.next_number.fetch_add(1, Ordering::SeqCst),
            status: OrderStatus::Pending,
            restaurant_id: order.restaurant_id,
            customer_id: order.customer_id,
            driver_id: None,
            total_amount: order.total_amount(),
            items: order.items,
            delivery_address: order.delivery_address,
            delivery_location: order.delivery_location,
            created_at: now,
            updated_at: now,
        };

        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, AppError> {
        let mut order = self.orders.get_mut(&id).ok_or_else(|| order_not_found(id))?;

        if order.status != expected {
            return Ok(None);
        }

        order.status = next;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&id).ok_or_else(|| order_not_found(id))?;
        patch.apply(&mut *order);
        Ok(order.clone())
    }

    async fn list_available_for_driver(&self) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.driver_id.is_none() && entry.status.is_open_for_drivers())
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by_key(|order| order.order_number);
        Ok(orders)
    }

    async fn active_for_driver(&self, driver_id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| entry.driver_id == Some(driver_id) && !entry.status.is_terminal())
            .min_by_key(|entry| entry.order_number)
            .map(|entry| entry.value().clone()))
    }
}

#[derive(Default)]
pub struct InMemoryDriverStore {
    drivers: DashMap<Uuid, Driver>,
}

impl InMemoryDriverStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<Driver, AppError>
    where
        F: FnOnce(&mut Driver),
    {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        f(&mut *driver);
        Ok(driver.clone())
    }
}

#[async_trait]
impl DriverStore for InMemoryDriverStore {
    async fn insert(&self, driver: Driver) -> Result<Driver, AppError> {
        if !driver.availability().is_consistent() {
            return Err(AppError::BadRequest(
                "a driver cannot be available while offline".to_string(),
            ));
        }

        self.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Driver>, AppError> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        drivers.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        Ok(drivers)
    }

    async fn list_available(&self) -> Result<Vec<Driver>, AppError> {
        let mut drivers = self.list().await?;
        drivers.retain(Driver::is_dispatchable);
        Ok(drivers)
    }

    async fn set_availability(
        &self,
        id: Uuid,
        next: Availability,
        expected: Option<Availability>,
    ) -> Result<bool, AppError> {
        if !next.is_consistent() {
            return Err(AppError::BadRequest(
                "a driver cannot be available while offline".to_string(),
            ));
        }

        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        if let Some(expected) = expected {
            if driver.availability() != expected {
                return Ok(false);
            }
        }

        driver.set_availability(next);
        Ok(true)
    }

    async fn claim(&self, id: Uuid) -> Result<bool, AppError> {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        if !driver.is_dispatchable() {
            return Ok(false);
        }

        driver.set_availability(Availability::BUSY);
        Ok(true)
    }

    async fn reap_if_stale(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Driver>, AppError> {
        let mut driver = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;

        if !driver.is_online || driver.last_online >= cutoff {
            return Ok(None);
        }

        driver.set_availability(Availability::OFFLINE);
        Ok(Some(driver.clone()))
    }

    async fn touch_last_online(&self, id: Uuid) -> Result<Driver, AppError> {
        self.modify(id, |driver| driver.last_online = Utc::now())
    }

    async fn update_location(&self, id: Uuid, location: GeoPoint) -> Result<Driver, AppError> {
        self.modify(id, |driver| driver.location = Some(location))
    }

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<Driver, AppError> {
        self.modify(id, |driver| driver.is_approved = approved)
    }

    async fn record_delivery(&self, id: Uuid, earnings: f64) -> Result<Driver, AppError> {
        self.modify(id, |driver| {
            driver.total_deliveries += 1;
            driver.total_earnings += earnings;
        })
    }
}

#[derive(Default)]
pub struct InMemoryRestaurantStore {
    restaurants: DashMap<Uuid, Restaurant>,
}

impl InMemoryRestaurantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RestaurantStore for InMemoryRestaurantStore {
    async fn insert(&self, restaurant: Restaurant) -> Result<Restaurant, AppError> {
        self.restaurants.insert(restaurant.id, restaurant.clone());
        Ok(restaurant)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Restaurant>, AppError> {
        Ok(self.restaurants.get(&id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{InMemoryDriverStore, InMemoryOrderStore};
    use crate::models::driver::{Availability, Driver};
    use crate::models::order::{NewOrder, OrderPatch, OrderStatus};
    use crate::store::{DriverStore, OrderStore};

    fn approved_online_driver() -> Driver {
        let mut driver = Driver::register(Uuid::new_v4(), "Abebe".to_string(), "+251900".to_string());
        driver.is_approved = true;
        driver.set_availability(Availability::AVAILABLE);
        driver
    }

    fn new_order() -> NewOrder {
        NewOrder {
            restaurant_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            items: Vec::new(),
            delivery_address: "Bole".to_string(),
            delivery_location: None,
        }
    }

    #[tokio::test]
    async fn order_numbers_are_sequential() {
        let store = InMemoryOrderStore::new();
        let first = store.insert(new_order()).await.unwrap();
        let second = store.insert(new_order()).await.unwrap();

        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(second.order_number, first.order_number + 1);
    }

    #[tokio::test]
    async fn conditional_status_update_rejects_stale_expectation() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(new_order()).await.unwrap();

        let applied = store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert!(applied.is_some());

        let stale = store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(stale.is_none());

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn active_order_lookup_skips_finished_orders() {
        let store = InMemoryOrderStore::new();
        let driver_id = Uuid::new_v4();
        let done = store.insert(new_order()).await.unwrap();
        let open = store.insert(new_order()).await.unwrap();

        assert!(store.active_for_driver(driver_id).await.unwrap().is_none());

        store.update(done.id, OrderPatch::driver(Some(driver_id))).await.unwrap();
        store
            .update_status(done.id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(store.active_for_driver(driver_id).await.unwrap().is_none());

        store.update(open.id, OrderPatch::driver(Some(driver_id))).await.unwrap();
        let active = store.active_for_driver(driver_id).await.unwrap().unwrap();
        assert_eq!(active.id, open.id);
    }

    #[tokio::test]
    async fn claim_succeeds_only_once() {
        let store = InMemoryDriverStore::new();
        let driver = store.insert(approved_online_driver()).await.unwrap();

        assert!(store.claim(driver.id).await.unwrap());
        assert!(!store.claim(driver.id).await.unwrap());

        let stored = store.get(driver.id).await.unwrap().unwrap();
        assert!(stored.is_online);
        assert!(!stored.is_available);
    }

    #[tokio::test]
    async fn unapproved_driver_is_never_listed_or_claimed() {
        let store = InMemoryDriverStore::new();
        let mut driver = approved_online_driver();
        driver.is_approved = false;
        let driver = store.insert(driver).await.unwrap();

        assert!(store.list_available().await.unwrap().is_empty());
        assert!(!store.claim(driver.id).await.unwrap());
    }

    #[tokio::test]
    async fn available_while_offline_is_rejected() {
        let store = InMemoryDriverStore::new();
        let driver = store.insert(approved_online_driver()).await.unwrap();

        let inconsistent = Availability {
            is_online: false,
            is_available: true,
        };
        assert!(store.set_availability(driver.id, inconsistent, None).await.is_err());
    }

    #[tokio::test]
    async fn missing_driver_is_not_found() {
        let store = InMemoryDriverStore::new();
        assert!(store.claim(Uuid::new_v4()).await.is_err());
        assert!(store.touch_last_online(Uuid::new_v4()).await.is_err());
    }
}
