use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use shared::*;

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bookings)]
pub struct Booking {
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
    pub base_amount: bigdecimal::BigDecimal,
    pub tax_amount: bigdecimal::BigDecimal,
    pub total_amount: bigdecimal::BigDecimal,
    pub payment_status: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
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
    pub base_amount: bigdecimal::BigDecimal,
    pub tax_amount: bigdecimal::BigDecimal,
    pub total_amount: bigdecimal::BigDecimal,
    pub payment_status: String,
    pub status: String,
}

impl NewBooking {
    pub fn from_data(data: &BookingData) -> Self {
        Self {
            booking_id: data.booking_id.clone(),
            guest_id: data.guest_id.clone(),
            guest_name: data.guest_name.clone(),
            guest_phone: data.guest_phone.clone(),
            room_id: data.room_id,
            room_name: data.room_name.clone(),
            room_image: data.room_image.clone(),
            price_per_night: data.price_per_night,
            check_in: data.check_in,
            check_out: data.check_out,
            total_nights: data.total_nights,
            adults: data.adults,
            children: data.children,
            rooms_count: data.rooms_count,
            payment_method: data.payment_method.clone(),
            base_amount: bigdecimal::BigDecimal::from(data.base_amount),
            tax_amount: bigdecimal::BigDecimal::from(data.tax_amount),
            total_amount: bigdecimal::BigDecimal::from(data.total_amount),
            payment_status: "pending".to_string(),
            status: "pending".to_string(),
        }
    }
}

impl Booking {
    /// Rebuilds the saga payload from the stored row, so cancellation
    /// releases exactly the range and units recorded at creation time.
    pub fn booking_data(&self) -> BookingData {
        BookingData {
            booking_id: self.booking_id.clone(),
            guest_id: self.guest_id.clone(),
            guest_name: self.guest_name.clone(),
            guest_phone: self.guest_phone.clone(),
            room_id: self.room_id,
            room_name: self.room_name.clone(),
            room_image: self.room_image.clone(),
            price_per_night: self.price_per_night,
            check_in: self.check_in,
            check_out: self.check_out,
            total_nights: self.total_nights,
            adults: self.adults,
            children: self.children,
            rooms_count: self.rooms_count,
            payment_method: self.payment_method.clone(),
            base_amount: self.base_amount.to_i64().unwrap_or(0),
            tax_amount: self.tax_amount.to_i64().unwrap_or(0),
            total_amount: self.total_amount.to_i64().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::saga_transactions)]
pub struct DbSagaTransaction {
    pub id: Uuid,
    pub steps: serde_json::Value,
    pub current_step: i32,
    pub status: String,
    pub context: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::processed_commands)]
pub struct ProcessedCommand {
    pub idempotency_key: String,
    pub command_id: Uuid,
    pub result: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<SagaTransaction> for DbSagaTransaction {
    fn from(saga: SagaTransaction) -> Self {
        Self {
            id: saga.id,
            steps: serde_json::to_value(saga.steps).unwrap(),
            current_step: saga.current_step as i32,
            status: format!("{:?}", saga.status),
            context: serde_json::to_value(saga.context).unwrap(),
            created_at: Some(saga.created_at),
            updated_at: Some(saga.updated_at),
        }
    }
}

impl TryFrom<DbSagaTransaction> for SagaTransaction {
    type Error = anyhow::Error;

    fn try_from(db_saga: DbSagaTransaction) -> Result<Self, Self::Error> {
        let steps: Vec<SagaStep> = serde_json::from_value(db_saga.steps)?;
        let status = match db_saga.status.as_str() {
            "Started" => SagaStatus::Started,
            "InProgress" => SagaStatus::InProgress,
            "Completed" => SagaStatus::Completed,
            "Compensating" => SagaStatus::Compensating,
            "Compensated" => SagaStatus::Compensated,
            "Failed" => SagaStatus::Failed,
            _ => SagaStatus::Failed,
        };
        let context = serde_json::from_value(db_saga.context)?;

        Ok(Self {
            id: db_saga.id,
            steps,
            current_step: db_saga.current_step as usize,
            status,
            context,
            created_at: db_saga.created_at.unwrap_or_else(|| Utc::now()),
            updated_at: db_saga.updated_at.unwrap_or_else(|| Utc::now()),
        })
    }
}
