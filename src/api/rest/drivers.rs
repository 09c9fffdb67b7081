use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::Driver;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/drivers/:id/online", patch(update_driver_online))
        .route("/drivers/:id/approval", patch(update_driver_approval))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub account_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateOnlineRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct UpdateApprovalRequest {
    pub approved: bool,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        if !location.is_valid() {
            return Err(AppError::BadRequest("invalid location".to_string()));
        }
    }

    let mut driver = Driver::register(
        payload.account_id.unwrap_or_else(Uuid::new_v4),
        payload.name,
        payload.phone,
    );
    driver.location = payload.location;

    let driver = state.drivers.insert(driver).await?;
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.drivers.list().await?))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    Ok(Json(driver))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.monitor.update_location(id, payload.location).await?;
    Ok(Json(driver))
}

async fn update_driver_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOnlineRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.monitor.set_online(id, payload.online).await?;
    Ok(Json(driver))
}

async fn update_driver_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateApprovalRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.drivers.set_approved(id, payload.approved).await?;
    Ok(Json(driver))
}
