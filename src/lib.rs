pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod hub;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod state;
pub mod store;
