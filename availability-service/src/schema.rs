diesel::table! {
    rooms (id) {
        id -> Uuid,
        name -> Varchar,
        image_url -> Varchar,
        price_per_night -> Int8,
        total_stock -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    availability (room_id, date) {
        room_id -> Uuid,
        date -> Date,
        booked_count -> Int4,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        room_id -> Uuid,
        booking_id -> Varchar,
        check_in -> Date,
        check_out -> Date,
        rooms_count -> Int4,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
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

diesel::allow_tables_to_appear_in_same_query!(
    rooms,
    availability,
    reservations,
    processed_commands,
);
