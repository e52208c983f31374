//! The availability ledger: per-(room, date) booked counts against a
//! fixed per-room stock.
//!
//! Reads pull the whole per-room map into memory and decide there, the
//! same shape the booking widgets use; writes are per-date merge-upserts
//! with an increment. An absent row always reads as zero, resolved once
//! at the load boundary instead of null checks at every call site.

use anyhow::Result;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::models::Room;
use crate::schema::{availability, rooms};
use shared::dates::StayRange;

/// Booked counts keyed by calendar day. Dates with no bookings are
/// simply absent.
pub type BookedByDate = BTreeMap<NaiveDate, i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientCapacity {
    pub date: NaiveDate,
    pub available: i32,
    pub requested: i32,
}

impl fmt::Display for InsufficientCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "only {} room(s) available on {}, requested {}",
            self.available, self.date, self.requested
        )
    }
}

impl std::error::Error for InsufficientCapacity {}

/// `max(0, stock - booked)` for a single night.
pub fn available_on(booked: &BookedByDate, total_stock: i32, date: NaiveDate) -> i32 {
    let count = booked.get(&date).copied().unwrap_or(0);
    (total_stock - count).max(0)
}

/// Walks every night of the stay in ascending order and fails on the
/// first one without enough headroom. The checkout day is not a night
/// and is never examined.
pub fn check_range(
    booked: &BookedByDate,
    total_stock: i32,
    range: &StayRange,
    requested: i32,
) -> Result<(), InsufficientCapacity> {
    for date in range.dates() {
        let available = available_on(booked, total_stock, date);
        if available < requested {
            return Err(InsufficientCapacity { date, available, requested });
        }
    }
    Ok(())
}

/// Highest booked count over the stay. The cross-room search derives
/// one availability figure per room from this peak, a worst-case
/// approximation that can under-report when occupancy fluctuates night
/// to night.
pub fn peak_booked(booked: &BookedByDate, range: &StayRange) -> i32 {
    range
        .dates()
        .map(|date| booked.get(&date).copied().unwrap_or(0))
        .max()
        .unwrap_or(0)
}

/// In-memory mirror of [`reserve`]. Not idempotent: applying twice
/// reserves twice.
pub fn apply_reserve(booked: &mut BookedByDate, range: &StayRange, units: i32) {
    for date in range.dates() {
        *booked.entry(date).or_insert(0) += units;
    }
}

/// In-memory mirror of [`release`]. Floored at zero so an over-release
/// never drives a count negative.
pub fn apply_release(booked: &mut BookedByDate, range: &StayRange, units: i32) {
    for date in range.dates() {
        if let Some(count) = booked.get_mut(&date) {
            *count = (*count - units).max(0);
        }
    }
}

pub async fn load_room(conn: &mut AsyncPgConnection, room_id: Uuid) -> Result<Option<Room>> {
    let room = rooms::table
        .filter(rooms::id.eq(room_id))
        .first::<Room>(conn)
        .await
        .optional()?;
    Ok(room)
}

pub async fn load_booked_by_date(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
) -> Result<BookedByDate> {
    let rows: Vec<(NaiveDate, i32)> = availability::table
        .filter(availability::room_id.eq(room_id))
        .select((availability::date, availability::booked_count))
        .load(conn)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Increments `booked_count` by `units` for every night of the stay,
/// creating absent rows at zero first. One statement per date; callers
/// wrap the loop in a transaction so the stay is claimed all or
/// nothing.
pub async fn reserve(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    range: &StayRange,
    units: i32,
) -> Result<()> {
    for date in range.dates() {
        diesel::insert_into(availability::table)
            .values((
                availability::room_id.eq(room_id),
                availability::date.eq(date),
                availability::booked_count.eq(units),
            ))
            .on_conflict((availability::room_id, availability::date))
            .do_update()
            .set(availability::booked_count.eq(availability::booked_count + units))
            .execute(conn)
            .await?;
    }
    Ok(())
}

/// Mirror of [`reserve`]: decrements each night by `units`, floored at
/// zero. Dates without a row have nothing to give back and are skipped.
pub async fn release(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    range: &StayRange,
    units: i32,
) -> Result<()> {
    for date in range.dates() {
        let current: Option<i32> = availability::table
            .filter(availability::room_id.eq(room_id))
            .filter(availability::date.eq(date))
            .select(availability::booked_count)
            .first(conn)
            .await
            .optional()?;

        if let Some(current) = current {
            diesel::update(
                availability::table
                    .filter(availability::room_id.eq(room_id))
                    .filter(availability::date.eq(date)),
            )
            .set(availability::booked_count.eq((current - units).max(0)))
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn range(check_in: u32, check_out: u32) -> StayRange {
        StayRange::new(d(check_in), d(check_out)).unwrap()
    }

    #[test]
    fn fresh_room_has_full_stock_everywhere() {
        let booked = BookedByDate::new();
        assert_eq!(available_on(&booked, 10, d(1)), 10);
        assert_eq!(available_on(&booked, 10, d(28)), 10);
        assert!(check_range(&booked, 10, &range(1, 5), 10).is_ok());
    }

    #[test]
    fn availability_never_negative() {
        let mut booked = BookedByDate::new();
        booked.insert(d(1), 14);
        assert_eq!(available_on(&booked, 10, d(1)), 0);
    }

    #[test]
    fn check_reports_earliest_insufficient_date() {
        let mut booked = BookedByDate::new();
        booked.insert(d(2), 9);
        booked.insert(d(3), 10);

        let err = check_range(&booked, 10, &range(1, 5), 2).unwrap_err();
        assert_eq!(err.date, d(2));
        assert_eq!(err.available, 1);
        assert_eq!(err.requested, 2);
    }

    #[test]
    fn checkout_day_full_does_not_block() {
        let mut booked = BookedByDate::new();
        booked.insert(d(3), 10);
        assert!(check_range(&booked, 10, &range(1, 3), 1).is_ok());
    }

    #[test]
    fn reserve_release_round_trip() {
        let mut booked = BookedByDate::new();
        booked.insert(d(1), 3);
        booked.insert(d(4), 7);
        let before = booked.clone();

        apply_reserve(&mut booked, &range(1, 3), 2);
        assert_eq!(booked.get(&d(1)), Some(&5));
        assert_eq!(booked.get(&d(2)), Some(&2));
        assert_eq!(booked.get(&d(4)), Some(&7));

        apply_release(&mut booked, &range(1, 3), 2);
        assert_eq!(booked.get(&d(1)), before.get(&d(1)));
        assert_eq!(booked.get(&d(2)).copied().unwrap_or(0), 0);
        assert_eq!(booked.get(&d(4)), before.get(&d(4)));
    }

    #[test]
    fn reserve_touches_exactly_the_nights() {
        let mut booked = BookedByDate::new();
        apply_reserve(&mut booked, &range(1, 3), 1);
        let touched: Vec<_> = booked.keys().copied().collect();
        assert_eq!(touched, vec![d(1), d(2)]);
    }

    #[test]
    fn over_release_floors_at_zero() {
        let mut booked = BookedByDate::new();
        booked.insert(d(1), 1);
        apply_release(&mut booked, &range(1, 2), 3);
        assert_eq!(booked.get(&d(1)), Some(&0));
        apply_release(&mut booked, &range(1, 2), 3);
        assert_eq!(booked.get(&d(1)), Some(&0));
    }

    #[test]
    fn concurrent_reserves_can_oversell() {
        // Two callers check the same stale snapshot of the last free
        // room, both pass, both commit. The ledger admits the oversell;
        // there is no conditional write.
        let stock = 10;
        let mut booked = BookedByDate::new();
        booked.insert(d(1), 9);
        let night = range(1, 2);

        let snapshot = booked.clone();
        assert!(check_range(&snapshot, stock, &night, 1).is_ok());
        assert!(check_range(&snapshot, stock, &night, 1).is_ok());

        apply_reserve(&mut booked, &night, 1);
        apply_reserve(&mut booked, &night, 1);
        assert_eq!(booked.get(&d(1)), Some(&(stock + 1)));
    }

    #[test]
    fn search_uses_peak_booked() {
        // Occupancy fluctuates: nights at 8 and 2 booked. A 2-unit
        // request would clear every night individually, but the peak
        // figure reports only 2 available for the whole range.
        let mut booked = BookedByDate::new();
        booked.insert(d(1), 8);
        booked.insert(d(2), 2);
        let stay = range(1, 3);

        assert!(check_range(&booked, 10, &stay, 2).is_ok());
        assert_eq!(peak_booked(&booked, &stay), 8);
        assert_eq!((10 - peak_booked(&booked, &stay)).max(0), 2);
    }
}
