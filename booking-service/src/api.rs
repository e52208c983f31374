use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use num_traits::ToPrimitive;
use rdkafka::producer::FutureProducer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::SagaManager;
use crate::models::Booking;
use crate::schema::bookings;
use shared::booking_id::BookingIdGenerator;
use shared::dates::StayRange;
use shared::pricing::{self, Quote};
use shared::{BookingData, SagaTransaction};

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub producer: FutureProducer,
    pub id_gen: Arc<dyn BookingIdGenerator>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub guest_id: String,
    pub guest_name: String,
    pub guest_phone: String,
    pub room_id: Uuid,
    pub room_name: String,
    pub room_image: String,
    pub price_per_night: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub rooms_count: i32,
    pub payment_method: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub saga_id: Uuid,
    pub status: String,
    pub quote: Quote,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: String,
    pub guest_id: String,
    pub guest_name: String,
    pub guest_phone: String,
    pub room_id: Uuid,
    pub room_name: String,
    pub room_image: String,
    pub price_per_night: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_nights: i32,
    pub adults: i32,
    pub children: i32,
    pub rooms_count: i32,
    pub payment_method: String,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub payment_status: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            base_amount: booking.base_amount.to_i64().unwrap_or(0),
            tax_amount: booking.tax_amount.to_i64().unwrap_or(0),
            total_amount: booking.total_amount.to_i64().unwrap_or(0),
            booking_id: booking.booking_id,
            guest_id: booking.guest_id,
            guest_name: booking.guest_name,
            guest_phone: booking.guest_phone,
            room_id: booking.room_id,
            room_name: booking.room_name,
            room_image: booking.room_image,
            price_per_night: booking.price_per_night,
            check_in: booking.check_in,
            check_out: booking.check_out,
            total_nights: booking.total_nights,
            adults: booking.adults,
            children: booking.children,
            rooms_count: booking.rooms_count,
            payment_method: booking.payment_method,
            payment_status: booking.payment_status,
            status: booking.status,
            created_at: booking.created_at,
            cancelled_at: booking.cancelled_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub guest_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelBookingResponse {
    pub booking_id: String,
    pub saga_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
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

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Validates the stay, prices it, and starts the booking saga. The
/// room snapshot (name, image, tariff) travels with the request and is
/// frozen onto the booking; later price changes do not touch it.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<CreateBookingResponse>, ApiError> {
    let range = StayRange::new(request.check_in, request.check_out)
        .map_err(|e| bad_request(e.to_string()))?;
    if request.rooms_count < 1 {
        return Err(bad_request("rooms_count must be at least 1"));
    }
    if request.adults < 1 {
        return Err(bad_request("at least one adult is required"));
    }
    if request.children < 0 {
        return Err(bad_request("children cannot be negative"));
    }
    if request.price_per_night < 0 {
        return Err(bad_request("price_per_night cannot be negative"));
    }

    let quote = pricing::quote(request.price_per_night, request.rooms_count, range.nights());
    let booking_id = state.id_gen.generate();

    let booking_data = BookingData {
        booking_id: booking_id.clone(),
        guest_id: request.guest_id,
        guest_name: request.guest_name,
        guest_phone: request.guest_phone,
        room_id: request.room_id,
        room_name: request.room_name,
        room_image: request.room_image,
        price_per_night: request.price_per_night,
        check_in: request.check_in,
        check_out: request.check_out,
        total_nights: range.nights() as i32,
        adults: request.adults,
        children: request.children,
        rooms_count: request.rooms_count,
        payment_method: request.payment_method,
        base_amount: quote.base_amount,
        tax_amount: quote.tax_amount,
        total_amount: quote.total_amount,
    };

    let saga = SagaTransaction::booking(booking_data);
    let saga_id = saga.id;

    let saga_manager = SagaManager::new(state.pool, state.producer);

    match saga_manager.start_saga(saga).await {
        Ok(_) => {
            tracing::info!("Started saga {} for booking {}", saga_id, booking_id);
            Ok(Json(CreateBookingResponse {
                booking_id,
                saga_id,
                status: "started".to_string(),
                quote,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to start saga: {}", e);
            Err(internal_error(e))
        }
    }
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let booking = bookings::table
        .filter(bookings::booking_id.eq(&booking_id))
        .first::<Booking>(&mut conn)
        .await
        .optional()
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: "Booking not found".to_string() }),
            )
        })?;

    Ok(Json(booking.into()))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let guest_bookings = bookings::table
        .filter(bookings::guest_id.eq(&query.guest_id))
        .order(bookings::created_at.desc())
        .load::<Booking>(&mut conn)
        .await
        .map_err(internal_error)?;

    Ok(Json(guest_bookings.into_iter().map(Into::into).collect()))
}

/// Starts the cancellation saga for a confirmed booking: the ledger
/// gives the nights back, the payment is refunded, then the row flips
/// to cancelled. The released range and units come from the booking as
/// recorded, not from the caller.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<CancelBookingResponse>, ApiError> {
    let mut conn = state.pool.get().await.map_err(internal_error)?;

    let booking = bookings::table
        .filter(bookings::booking_id.eq(&booking_id))
        .first::<Booking>(&mut conn)
        .await
        .optional()
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: "Booking not found".to_string() }),
            )
        })?;

    if booking.status != "confirmed" {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Booking is {}, only confirmed bookings can be cancelled", booking.status),
            }),
        ));
    }

    let saga = SagaTransaction::cancellation(booking.booking_data());
    let saga_id = saga.id;

    let saga_manager = SagaManager::new(state.pool.clone(), state.producer);

    match saga_manager.start_saga(saga).await {
        Ok(_) => {
            tracing::info!("Started cancellation saga {} for booking {}", saga_id, booking_id);
            Ok(Json(CancelBookingResponse {
                booking_id,
                saga_id,
                status: "cancellation-started".to_string(),
            }))
        }
        Err(e) => {
            tracing::error!("Failed to start cancellation saga: {}", e);
            Err(internal_error(e))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
