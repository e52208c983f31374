use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A room type: a category of physical rooms sharing a tariff and a
/// stock count, not a single unit.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::rooms)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub price_per_night: i64,
    pub total_stock: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reservations)]
pub struct Reservation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms_count: i32,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms_count: i32,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::processed_commands)]
pub struct ProcessedCommand {
    pub idempotency_key: String,
    pub command_id: Uuid,
    pub result: Option<serde_json::Value>,
    pub processed_at: Option<DateTime<Utc>>,
}
