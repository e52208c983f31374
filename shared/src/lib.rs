pub mod booking_id;
pub mod dates;
pub mod pricing;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub saga_id: Uuid,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandType {
    CreateBooking,
    ProcessPayment,
    ReserveRooms,
    ConfirmBooking,
    RefundPayment,
    ReleaseRooms,
    CancelBooking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub id: Uuid,
    pub command_id: Uuid,
    pub saga_id: Uuid,
    pub status: CommandStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandStatus {
    Success,
    Failed,
    Compensated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStep {
    pub command_type: CommandType,
    pub compensation_type: Option<CommandType>,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaTransaction {
    pub id: Uuid,
    pub steps: Vec<SagaStep>,
    pub current_step: usize,
    pub status: SagaStatus,
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SagaStatus {
    Started,
    InProgress,
    Completed,
    Compensating,
    Compensated,
    Failed,
}

/// Everything the booking saga needs to carry between services: guest,
/// stay, denormalized room snapshot, and the computed amounts. Amounts
/// are integer rupees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingData {
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub booking_id: String,
    pub amount: i64,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationData {
    pub room_id: Uuid,
    pub booking_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl SagaTransaction {
    /// Forward flow for a new booking: persist it, take payment, claim
    /// the nights on the ledger, then confirm. Each step before the
    /// final one has a compensation.
    pub fn booking(booking_data: BookingData) -> Self {
        let steps = vec![
            SagaStep {
                command_type: CommandType::CreateBooking,
                compensation_type: Some(CommandType::CancelBooking),
                service_name: "booking-service".to_string(),
            },
            SagaStep {
                command_type: CommandType::ProcessPayment,
                compensation_type: Some(CommandType::RefundPayment),
                service_name: "payment-service".to_string(),
            },
            SagaStep {
                command_type: CommandType::ReserveRooms,
                compensation_type: Some(CommandType::ReleaseRooms),
                service_name: "availability-service".to_string(),
            },
            SagaStep {
                command_type: CommandType::ConfirmBooking,
                compensation_type: None,
                service_name: "booking-service".to_string(),
            },
        ];

        Self::with_steps(steps, booking_data)
    }

    /// Guest-initiated cancellation of a confirmed booking: give the
    /// nights back to the ledger, refund, then mark the booking
    /// cancelled. Runs forward only; there is nothing to compensate.
    pub fn cancellation(booking_data: BookingData) -> Self {
        let steps = vec![
            SagaStep {
                command_type: CommandType::ReleaseRooms,
                compensation_type: None,
                service_name: "availability-service".to_string(),
            },
            SagaStep {
                command_type: CommandType::RefundPayment,
                compensation_type: None,
                service_name: "payment-service".to_string(),
            },
            SagaStep {
                command_type: CommandType::CancelBooking,
                compensation_type: None,
                service_name: "booking-service".to_string(),
            },
        ];

        Self::with_steps(steps, booking_data)
    }

    fn with_steps(steps: Vec<SagaStep>, booking_data: BookingData) -> Self {
        let mut context = HashMap::new();
        context.insert("booking_data".to_string(), serde_json::to_value(booking_data).unwrap());

        Self {
            id: Uuid::new_v4(),
            steps,
            current_step: 0,
            status: SagaStatus::Started,
            context,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn next_step(&mut self) -> Option<&SagaStep> {
        if self.current_step < self.steps.len() {
            Some(&self.steps[self.current_step])
        } else {
            None
        }
    }

    pub fn advance_step(&mut self) {
        if self.current_step < self.steps.len() {
            self.current_step += 1;
            self.updated_at = Utc::now();
        }
    }

    pub fn get_compensation_steps(&self) -> Vec<&SagaStep> {
        self.steps[0..self.current_step]
            .iter()
            .rev()
            .filter(|step| step.compensation_type.is_some())
            .collect()
    }
}

impl Command {
    pub fn new(saga_id: Uuid, command_type: CommandType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            saga_id,
            command_type,
            payload,
            idempotency_key: format!("{}_{}", saga_id, Uuid::new_v4()),
            created_at: Utc::now(),
        }
    }
}

impl CommandReply {
    pub fn success(command_id: Uuid, saga_id: Uuid, result: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_id,
            saga_id,
            status: CommandStatus::Success,
            result,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(command_id: Uuid, saga_id: Uuid, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_id,
            saga_id,
            status: CommandStatus::Failed,
            result: None,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}

impl BookingData {
    pub fn payment(&self) -> PaymentData {
        PaymentData {
            booking_id: self.booking_id.clone(),
            amount: self.total_amount,
            payment_method: self.payment_method.clone(),
        }
    }

    pub fn reservation(&self) -> ReservationData {
        ReservationData {
            room_id: self.room_id,
            booking_id: self.booking_id.clone(),
            check_in: self.check_in,
            check_out: self.check_out,
            rooms_count: self.rooms_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_booking() -> BookingData {
        BookingData {
            booking_id: "BK-TEST01".to_string(),
            guest_id: "guest-1".to_string(),
            guest_name: "Asha Rao".to_string(),
            guest_phone: "+91 98765 43210".to_string(),
            room_id: Uuid::new_v4(),
            room_name: "Deluxe Room".to_string(),
            room_image: "/rooms/deluxe.jpg".to_string(),
            price_per_night: 4500,
            check_in: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            total_nights: 2,
            adults: 2,
            children: 0,
            rooms_count: 1,
            payment_method: "card".to_string(),
            base_amount: 9000,
            tax_amount: 1080,
            total_amount: 10080,
        }
    }

    #[test]
    fn booking_saga_confirms_last_and_compensates_in_reverse() {
        let mut saga = SagaTransaction::booking(sample_booking());
        assert_eq!(saga.steps.len(), 4);
        assert!(saga.steps[3].compensation_type.is_none());

        // After payment and reservation ran, compensation must release
        // rooms before refunding, then cancel the booking row.
        saga.current_step = 3;
        let comps: Vec<_> = saga
            .get_compensation_steps()
            .iter()
            .map(|s| s.service_name.clone())
            .collect();
        assert_eq!(comps, vec!["availability-service", "payment-service", "booking-service"]);
    }

    #[test]
    fn cancellation_saga_has_no_compensations() {
        let mut saga = SagaTransaction::cancellation(sample_booking());
        saga.current_step = saga.steps.len();
        assert!(saga.get_compensation_steps().is_empty());
    }
}
