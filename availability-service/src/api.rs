use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ledger;
use crate::models::Room;
use crate::schema::rooms;
use shared::dates::StayRange;

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub price_per_night: i64,
    pub total_stock: i32,
}

#[derive(Debug, Serialize)]
pub struct DayAvailability {
    pub booked: i32,
    pub available: i32,
}

/// Feed for the calendar day badges: one entry per date that has at
/// least one booking. Absent dates are fully available.
#[derive(Debug, Serialize)]
pub struct RoomAvailabilityResponse {
    pub room_id: Uuid,
    pub total_stock: i32,
    pub dates: BTreeMap<NaiveDate, DayAvailability>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub room_id: Uuid,
    pub name: String,
    pub image_url: String,
    pub price_per_night: i64,
    pub available: i32,
    pub is_available: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/:id/availability", get(room_availability))
        .route("/search", get(search))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: "Internal server error".to_string() }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message.into() }))
}

pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let all_rooms = rooms::table
        .load::<Room>(&mut conn)
        .await
        .map_err(internal_error)?;

    Ok(Json(
        all_rooms
            .into_iter()
            .map(|room| RoomSummary {
                id: room.id,
                name: room.name,
                image_url: room.image_url,
                price_per_night: room.price_per_night,
                total_stock: room.total_stock,
            })
            .collect(),
    ))
}

pub async fn room_availability(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomAvailabilityResponse>, ApiError> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let room = ledger::load_room(&mut conn, room_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: "Room not found".to_string() }),
            )
        })?;

    let booked = ledger::load_booked_by_date(&mut conn, room_id)
        .await
        .map_err(internal_error)?;

    let dates = booked
        .into_iter()
        .map(|(date, count)| {
            (
                date,
                DayAvailability {
                    booked: count,
                    available: (room.total_stock - count).max(0),
                },
            )
        })
        .collect();

    Ok(Json(RoomAvailabilityResponse {
        room_id,
        total_stock: room.total_stock,
        dates,
    }))
}

/// Availability across all room types for a stay. Each room gets one
/// figure derived from its peak booked count over the range, the
/// conservative approximation the booking widgets expect.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let range = StayRange::new(query.check_in, query.check_out)
        .map_err(|e| bad_request(e.to_string()))?;
    let requested = query.rooms.unwrap_or(1);
    if requested < 1 {
        return Err(bad_request("rooms must be at least 1"));
    }

    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let all_rooms = rooms::table
        .load::<Room>(&mut conn)
        .await
        .map_err(internal_error)?;

    let mut results = Vec::with_capacity(all_rooms.len());
    for room in all_rooms {
        let booked = ledger::load_booked_by_date(&mut conn, room.id)
            .await
            .map_err(internal_error)?;
        let available = (room.total_stock - ledger::peak_booked(&booked, &range)).max(0);

        results.push(SearchResult {
            room_id: room.id,
            name: room.name,
            image_url: room.image_url,
            price_per_night: room.price_per_night,
            available,
            is_available: available >= requested,
        });
    }

    Ok(Json(results))
}

pub async fn health_check() -> &'static str {
    "OK"
}
