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

use crate::ledger;
use crate::models::*;
use crate::schema::*;
use shared::dates::StayRange;
use shared::*;

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
            CommandType::ReserveRooms => self.handle_reserve_rooms(&mut conn, &command).await?,
            CommandType::ReleaseRooms => self.handle_release_rooms(&mut conn, &command).await?,
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

    /// Capacity check, then one transaction that increments every night
    /// of the stay and records the reservation. The check reads a
    /// snapshot taken before the writes; two racing commands for the
    /// last unit can both pass it.
    async fn handle_reserve_rooms(
        &self,
        conn: &mut AsyncPgConnection,
        command: &Command,
    ) -> Result<CommandReply> {
        let reservation_data: ReservationData = serde_json::from_value(command.payload.clone())?;

        let existing_reservation = reservations::table
            .filter(reservations::booking_id.eq(&reservation_data.booking_id))
            .filter(reservations::room_id.eq(reservation_data.room_id))
            .first::<Reservation>(conn)
            .await
            .optional()?;

        if let Some(reservation) = existing_reservation {
            if reservation.status == "reserved" {
                return Ok(CommandReply::success(
                    command.id,
                    command.saga_id,
                    Some(serde_json::to_value(&reservation)?),
                ));
            }
        }

        let range = match StayRange::new(reservation_data.check_in, reservation_data.check_out) {
            Ok(range) => range,
            Err(e) => {
                return Ok(CommandReply::failed(command.id, command.saga_id, e.to_string()));
            }
        };

        let room = match ledger::load_room(conn, reservation_data.room_id).await? {
            Some(room) => room,
            None => {
                return Ok(CommandReply::failed(
                    command.id,
                    command.saga_id,
                    "Room not found".to_string(),
                ));
            }
        };

        let booked = ledger::load_booked_by_date(conn, reservation_data.room_id).await?;
        if let Err(insufficient) =
            ledger::check_range(&booked, room.total_stock, &range, reservation_data.rooms_count)
        {
            return Ok(CommandReply::failed(
                command.id,
                command.saga_id,
                insufficient.to_string(),
            ));
        }

        let data = reservation_data.clone();
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                ledger::reserve(conn, data.room_id, &range, data.rooms_count).await?;

                let new_reservation = NewReservation {
                    id: Uuid::new_v4(),
                    room_id: data.room_id,
                    booking_id: data.booking_id.clone(),
                    check_in: data.check_in,
                    check_out: data.check_out,
                    rooms_count: data.rooms_count,
                    status: "reserved".to_string(),
                };

                diesel::insert_into(reservations::table)
                    .values(&new_reservation)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await?;

        info!(
            "Reserved {} unit(s) of room {} for booking {}",
            reservation_data.rooms_count, reservation_data.room_id, reservation_data.booking_id
        );

        Ok(CommandReply::success(
            command.id,
            command.saga_id,
            Some(serde_json::json!({
                "reserved": true,
                "rooms_count": reservation_data.rooms_count,
            })),
        ))
    }

    /// Gives the nights back using the range and units recorded when the
    /// reservation was made, not whatever the command carries. At most
    /// once per booking; a second release finds no "reserved" row and
    /// does nothing.
    async fn handle_release_rooms(
        &self,
        conn: &mut AsyncPgConnection,
        command: &Command,
    ) -> Result<CommandReply> {
        let reservation_data: ReservationData = serde_json::from_value(command.payload.clone())?;

        let reservation = reservations::table
            .filter(reservations::booking_id.eq(&reservation_data.booking_id))
            .filter(reservations::room_id.eq(reservation_data.room_id))
            .first::<Reservation>(conn)
            .await
            .optional()?;

        if let Some(reservation) = reservation {
            if reservation.status == "reserved" {
                let range = StayRange::new(reservation.check_in, reservation.check_out)?;
                let reservation_id = reservation.id;
                let room_id = reservation.room_id;
                let units = reservation.rooms_count;

                conn.transaction::<_, anyhow::Error, _>(|conn| {
                    Box::pin(async move {
                        ledger::release(conn, room_id, &range, units).await?;

                        diesel::update(
                            reservations::table.filter(reservations::id.eq(reservation_id)),
                        )
                        .set(reservations::status.eq("released"))
                        .execute(conn)
                        .await?;

                        Ok(())
                    })
                })
                .await?;

                info!("Released reservation for booking {}", reservation_data.booking_id);
            }
        }

        Ok(CommandReply::success(
            command.id,
            command.saga_id,
            Some(serde_json::json!({"released": true})),
        ))
    }

    async fn check_idempotency(
        &self,
        conn: &mut AsyncPgConnection,
        key: &str,
    ) -> Result<Option<ProcessedCommand>> {
        let result = processed_commands::table
            .filter(processed_commands::idempotency_key.eq(key))
            .first::<ProcessedCommand>(conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn store_processed_command(
        &self,
        conn: &mut AsyncPgConnection,
        command: &Command,
        reply: &CommandReply,
    ) -> Result<()> {
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
