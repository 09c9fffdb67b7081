use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::estimate::Estimator;
use crate::dispatch::{Dispatcher, MatchingService};
use crate::hub::ConnectionHub;
use crate::monitor::DriverStatusMonitor;
use crate::observability::metrics::Metrics;
use crate::store::memory::{InMemoryDriverStore, InMemoryOrderStore, InMemoryRestaurantStore};
use crate::store::{DriverStore, OrderStore, RestaurantStore};

pub struct AppState {
    pub config: Config,
    pub orders: Arc<dyn OrderStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub restaurants: Arc<dyn RestaurantStore>,
    pub hub: Arc<ConnectionHub>,
    pub matching: Arc<MatchingService>,
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<DriverStatusMonitor>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
        orders: Arc<dyn OrderStore>,
        drivers: Arc<dyn DriverStore>,
        restaurants: Arc<dyn RestaurantStore>,
    ) -> Self {
        let metrics = Metrics::new();
        let hub = Arc::new(ConnectionHub::new(
            config.connection_buffer_size,
            metrics.clone(),
        ));
        let matching = Arc::new(MatchingService::new(drivers.clone(), metrics.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            orders.clone(),
            drivers.clone(),
            restaurants.clone(),
            matching.clone(),
            hub.clone(),
            Estimator::from_config(&config),
            metrics.clone(),
        ));
        let monitor = Arc::new(DriverStatusMonitor::new(
            drivers.clone(),
            orders.clone(),
            hub.clone(),
            config.inactivity_cutoff(),
            config.monitor_interval(),
            metrics.clone(),
        ));

        Self {
            config,
            orders,
            drivers,
            restaurants,
            hub,
            matching,
            dispatcher,
            monitor,
            metrics,
        }
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryDriverStore::new()),
            Arc::new(InMemoryRestaurantStore::new()),
        )
    }
}
