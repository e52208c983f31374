diesel::table! {
    bookings (booking_id) {
        booking_id -> Varchar,
        guest_id -> Varchar,
        guest_name -> Varchar,
        guest_phone -> Varchar,
        room_id -> Uuid,
        room_name -> Varchar,
        room_image -> Varchar,
        price_per_night -> Int8,
        check_in -> Date,
        check_out -> Date,
        total_nights -> Int4,
        adults -> Int4,
        children -> Int4,
        rooms_count -> Int4,
        payment_method -> Varchar,
        base_amount -> Numeric,
        tax_amount -> Numeric,
        total_amount -> Numeric,
        payment_status -> Varchar,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
        cancelled_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Varchar,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Nullable<Bool>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    processed_commands (idempotency_key) {
        idempotency_key -> Varchar,
        command_id -> Uuid,
        result -> Nullable<Jsonb>,
        processed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    saga_transactions (id) {
        id -> Uuid,
        steps -> Jsonb,
        current_step -> Int4,
        status -> Varchar,
        context -> Jsonb,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    bookings,
    outbox_events,
    processed_commands,
    saga_transactions,
);
