use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::restaurant::Restaurant;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/restaurants", post(create_restaurant))
        .route("/restaurants/:id", get(get_restaurant))
}

#[derive(Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub address: String,
    pub location: Option<GeoPoint>,
}

async fn create_restaurant(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRestaurantRequest>,
) -> Result<Json<Restaurant>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        if !location.is_valid() {
            return Err(AppError::BadRequest("invalid location".to_string()));
        }
    }

    let restaurant = Restaurant {
        id: Uuid::new_v4(),
        name: payload.name,
        address: payload.address,
        location: payload.location,
    };

    Ok(Json(state.restaurants.insert(restaurant).await?))
}

async fn get_restaurant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Restaurant>, AppError> {
    let restaurant = state
        .restaurants
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("restaurant {} not found", id)))?;

    Ok(Json(restaurant))
}
