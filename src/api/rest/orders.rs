use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/available", get(list_available_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", post(transition_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/reject", post(reject_order))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct DriverActionRequest {
    pub driver_id: Uuid,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    let order = state.dispatcher.create_order(payload).await?;
    Ok(Json(order))
}

async fn list_available_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.dispatcher.available_orders().await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.dispatcher.get_order(id).await?))
}

async fn transition_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.dispatcher.transition(id, payload.status).await?;
    Ok(Json(order))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.dispatcher.accept_order(id, payload.driver_id).await?;
    Ok(Json(order))
}

async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.dispatcher.reject_offer(id, payload.driver_id).await?;
    Ok(Json(order))
}
