use anyhow::Result;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use shared::*;
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

pub struct CommandHandler {
    pool: DbPool,
    producer: FutureProducer,
    reply_topic: String,
}

impl CommandHandler {
    pub fn new(pool: DbPool, producer: FutureProducer, reply_topic: String) -> Self {
        Self { pool, producer, reply_topic }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(payload) = m.payload_view::<str>() {
                        match payload {
                            Ok(json_str) => {
                                if let Ok(command) = serde_json::from_str::<Command>(json_str) {
                                    if let Err(e) = self.handle_command(command).await {
                                        error!("Error handling command: {}", e);
                                    }
                                }
                            }
                            Err(e) => error!("Error parsing payload: {}", e),
                        }
                    }
                    if let Err(e) = consumer.commit_message(&m, rdkafka::consumer::CommitMode::Async) {
                        error!("Error committing message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving message: {}", e),
            }
        }
    }

    async fn handle_command(&self, command: Command) -> Result<()> {
        let mut conn = self.pool.get().await?;

        if let Some(existing) = self.check_idempotency(&mut conn, &command.idempotency_key).await? {
            info!("Command already processed, returning cached result");
            let reply = CommandReply {
                id: Uuid::new_v4(),
                command_id: command.id,
                saga_id: command.saga_id,
                status: CommandStatus::Success,
                result: existing.result,
                error: None,
                created_at: chrono::Utc::now(),
            };
            self.send_reply(reply).await?;
            return Ok(());
        }

        let reply = match command.command_type {
            CommandType::CreateBooking => self.handle_create_booking(&mut conn, &command).await?,
            CommandType::ConfirmBooking => self.handle_confirm_booking(&mut conn, &command).await?,
            CommandType::CancelBooking => self.handle_cancel_booking(&mut conn, &command).await?,
            _ => {
                warn!("Unsupported command type: {:?}", command.command_type);
                CommandReply::failed(
                    command.id,
                    command.saga_id,
                    "Unsupported command type".to_string(),
                )
            }
        };

        self.store_processed_command(&mut conn, &command, &reply).await?;
        self.send_reply(reply).await?;

        Ok(())
    }

    /// Inserts the pending booking row and its outbox event in one
    /// transaction. A booking-ID collision fails the insert and with it
    /// the step, which compensates the saga instead of overwriting an
    /// existing booking.
    async fn handle_create_booking(&self, conn: &mut AsyncPgConnection, command: &Command) -> Result<CommandReply> {
        let booking_data: BookingData = serde_json::from_value(command.payload.clone())?;

        let new_booking = NewBooking::from_data(&booking_data);

        let booking_data_clone = booking_data.clone();
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(bookings::table)
                    .values(&new_booking)
                    .execute(conn)
                    .await?;

                let outbox_event = NewOutboxEvent {
                    id: Uuid::new_v4(),
                    aggregate_id: booking_data_clone.booking_id.clone(),
                    event_type: "BookingCreated".to_string(),
                    event_data: serde_json::to_value(&booking_data_clone)?,
                };

                diesel::insert_into(outbox_events::table)
                    .values(&outbox_event)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        }).await?;

        Ok(CommandReply::success(
            command.id,
            command.saga_id,
            Some(serde_json::to_value(&booking_data)?),
        ))
    }

    async fn handle_confirm_booking(&self, conn: &mut AsyncPgConnection, command: &Command) -> Result<CommandReply> {
        let booking_data: BookingData = serde_json::from_value(command.payload.clone())?;

        diesel::update(bookings::table.filter(bookings::booking_id.eq(&booking_data.booking_id)))
            .set((
                bookings::status.eq("confirmed"),
                bookings::payment_status.eq("paid"),
            ))
            .execute(conn)
            .await?;

        info!("Booking {} confirmed", booking_data.booking_id);

        Ok(CommandReply::success(
            command.id,
            command.saga_id,
            Some(serde_json::to_value(&booking_data)?),
        ))
    }

    async fn handle_cancel_booking(&self, conn: &mut AsyncPgConnection, command: &Command) -> Result<CommandReply> {
        let booking_data: BookingData = serde_json::from_value(command.payload.clone())?;

        let booking_data_clone = booking_data.clone();
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::update(bookings::table.filter(bookings::booking_id.eq(&booking_data_clone.booking_id)))
                    .set((
                        bookings::status.eq("cancelled"),
                        bookings::cancelled_at.eq(Some(chrono::Utc::now())),
                    ))
                    .execute(conn)
                    .await?;

                let outbox_event = NewOutboxEvent {
                    id: Uuid::new_v4(),
                    aggregate_id: booking_data_clone.booking_id.clone(),
                    event_type: "BookingCancelled".to_string(),
                    event_data: serde_json::to_value(&booking_data_clone)?,
                };

                diesel::insert_into(outbox_events::table)
                    .values(&outbox_event)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        }).await?;

        info!("Booking {} cancelled", booking_data.booking_id);

        Ok(CommandReply::success(
            command.id,
            command.saga_id,
            Some(serde_json::to_value(&booking_data)?),
        ))
    }

    async fn check_idempotency(&self, conn: &mut AsyncPgConnection, key: &str) -> Result<Option<ProcessedCommand>> {
        let result = processed_commands::table
            .filter(processed_commands::idempotency_key.eq(key))
            .first::<ProcessedCommand>(conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn store_processed_command(&self, conn: &mut AsyncPgConnection, command: &Command, reply: &CommandReply) -> Result<()> {
        let processed_command = ProcessedCommand {
            idempotency_key: command.idempotency_key.clone(),
            command_id: command.id,
            result: reply.result.clone(),
            processed_at: Some(chrono::Utc::now()),
        };

        diesel::insert_into(processed_commands::table)
            .values(&processed_command)
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn send_reply(&self, reply: CommandReply) -> Result<()> {
        let json = serde_json::to_string(&reply)?;
        let key = reply.saga_id.to_string();
        let record = FutureRecord::to(&self.reply_topic)
            .payload(&json)
            .key(&key);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to send reply: {}", e))?;

        Ok(())
    }
}

pub struct SagaManager {
    pool: DbPool,
    producer: FutureProducer,
}

impl SagaManager {
    pub fn new(pool: DbPool, producer: FutureProducer) -> Self {
        Self { pool, producer }
    }

    pub async fn run_reply_handler(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(payload) = m.payload_view::<str>() {
                        match payload {
                            Ok(json_str) => {
                                if let Ok(reply) = serde_json::from_str::<CommandReply>(json_str) {
                                    if let Err(e) = self.handle_reply(reply).await {
                                        error!("Error handling reply: {}", e);
                                    }
                                }
                            }
                            Err(e) => error!("Error parsing reply payload: {}", e),
                        }
                    }
                    if let Err(e) = consumer.commit_message(&m, rdkafka::consumer::CommitMode::Async) {
                        error!("Error committing reply message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving reply message: {}", e),
            }
        }
    }

    async fn handle_reply(&self, reply: CommandReply) -> Result<()> {
        let mut conn = self.pool.get().await?;

        // Load the saga from database
        let saga_data = saga_transactions::table
            .filter(saga_transactions::id.eq(reply.saga_id))
            .first::<crate::models::DbSagaTransaction>(&mut conn)
            .await?;

        let mut saga = SagaTransaction::try_from(saga_data)?;

        match reply.status {
            CommandStatus::Success => {
                info!("Command {} succeeded for saga {}", reply.command_id, reply.saga_id);

                // Check if we're in compensation mode
                if saga.status == shared::SagaStatus::Compensating {
                    // Move to next compensation step
                    if let Some(compensation_index_val) = saga.context.get("compensation_index") {
                        let compensation_index: usize = serde_json::from_value(compensation_index_val.clone())?;
                        saga.context.insert("compensation_index".to_string(), serde_json::to_value(compensation_index + 1)?);

                        // Process next compensation step
                        self.process_next_compensation(&mut saga).await?;
                    } else {
                        // No compensation tracking, mark as completed
                        saga.status = shared::SagaStatus::Compensated;
                        info!("Saga {} compensation completed successfully", saga.id);
                    }
                } else {
                    // Normal forward flow
                    saga.advance_step();

                    // Try to process next step
                    if let Some(step) = saga.next_step().cloned() {
                        let command = self.create_command_for_step(&saga, &step)?;
                        self.send_command(&command, &step.service_name).await?;
                        info!("Sent command {} to {} for saga {}", command.id, step.service_name, saga.id);
                    } else {
                        // Saga completed successfully
                        saga.status = shared::SagaStatus::Completed;
                        info!("Saga {} completed successfully", saga.id);
                    }
                }
            }
            CommandStatus::Failed => {
                error!("Command {} failed for saga {}: {:?}", reply.command_id, reply.saga_id, reply.error);
                saga.status = shared::SagaStatus::Compensating;
                // Start compensation process
                self.start_compensation(&mut saga).await?;
            }
            CommandStatus::Compensated => {
                info!("Command {} compensated for saga {}", reply.command_id, reply.saga_id);
                // Continue compensation if needed
                self.continue_compensation(&mut saga).await?;
            }
        }

        // Update saga in database
        let updated_saga = crate::models::DbSagaTransaction::from(saga);
        diesel::update(saga_transactions::table.filter(saga_transactions::id.eq(reply.saga_id)))
            .set(&updated_saga)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn start_compensation(&self, saga: &mut SagaTransaction) -> Result<()> {
        let compensation_steps = saga.get_compensation_steps();

        // Convert to owned values to store in context
        let owned_steps: Vec<SagaStep> = compensation_steps.into_iter().cloned().collect();

        // Store all compensation commands to process them in sequence
        saga.context.insert("compensation_steps".to_string(), serde_json::to_value(&owned_steps)?);
        saga.context.insert("compensation_index".to_string(), serde_json::to_value(0)?);

        // Start with the first compensation step
        self.process_next_compensation(saga).await?;

        Ok(())
    }

    async fn process_next_compensation(&self, saga: &mut SagaTransaction) -> Result<()> {
        let compensation_steps: Vec<SagaStep> = serde_json::from_value(
            saga.context.get("compensation_steps").unwrap().clone()
        )?;
        let compensation_index: usize = serde_json::from_value(
            saga.context.get("compensation_index").unwrap().clone()
        )?;

        if let Some(step) = compensation_steps.get(compensation_index) {
            if let Some(compensation_type) = &step.compensation_type {
                let booking_data: BookingData = serde_json::from_value(
                    saga.context.get("booking_data").unwrap().clone()
                )?;
                let payload = payload_for(compensation_type, &booking_data)?;

                let compensation_command = Command::new(
                    saga.id,
                    compensation_type.clone(),
                    payload,
                );
                self.send_command(&compensation_command, &step.service_name).await?;
                info!("Started compensation step {} for saga {}", compensation_index, saga.id);
            }
        } else {
            // No more compensation steps
            saga.status = shared::SagaStatus::Compensated;
            info!("All compensations completed for saga {}", saga.id);
        }
        Ok(())
    }

    async fn continue_compensation(&self, saga: &mut SagaTransaction) -> Result<()> {
        let compensation_steps = saga.get_compensation_steps();
        // This is a simplified compensation flow
        // In a real implementation, you'd track which compensations have been completed
        if compensation_steps.is_empty() {
            saga.status = shared::SagaStatus::Compensated;
            info!("Compensation completed for saga {}", saga.id);
        }
        Ok(())
    }

    pub async fn start_saga(&self, mut saga: SagaTransaction) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let db_saga = DbSagaTransaction::from(saga.clone());
        diesel::insert_into(saga_transactions::table)
            .values(&db_saga)
            .execute(&mut conn)
            .await?;

        let step_option = {
            let saga_ref = &mut saga;
            saga_ref.next_step().cloned()
        };

        if let Some(step) = step_option {
            let command = self.create_command_for_step(&saga, &step)?;
            self.send_command(&command, &step.service_name).await?;
        }

        Ok(())
    }

    fn create_command_for_step(&self, saga: &SagaTransaction, step: &SagaStep) -> Result<Command> {
        let booking_data: BookingData = serde_json::from_value(
            saga.context.get("booking_data").unwrap().clone()
        )?;
        let payload = payload_for(&step.command_type, &booking_data)?;

        Ok(Command::new(saga.id, step.command_type.clone(), payload))
    }

    async fn send_command(&self, command: &Command, service_name: &str) -> Result<()> {
        let topic = format!("{}-commands", service_name);
        let json = serde_json::to_string(command)?;
        let key = command.saga_id.to_string();
        let record = FutureRecord::to(&topic)
            .payload(&json)
            .key(&key);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to send command: {}", e))?;

        Ok(())
    }
}

/// Every command a saga can issue is a projection of its booking data:
/// the payment services see amounts, the ledger sees the stay, the
/// booking steps see the whole thing.
fn payload_for(command_type: &CommandType, booking_data: &BookingData) -> Result<serde_json::Value> {
    let payload = match command_type {
        CommandType::CreateBooking
        | CommandType::ConfirmBooking
        | CommandType::CancelBooking => serde_json::to_value(booking_data)?,
        CommandType::ProcessPayment | CommandType::RefundPayment => {
            serde_json::to_value(booking_data.payment())?
        }
        CommandType::ReserveRooms | CommandType::ReleaseRooms => {
            serde_json::to_value(booking_data.reservation())?
        }
    };
    Ok(payload)
}
