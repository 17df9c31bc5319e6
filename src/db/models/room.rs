//! Room catalog models.
//!
//! A room's availability is never stored. It is derived at read time from
//! the booking ledger: a room is unavailable on a date iff some pending or
//! approved booking covers that date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub id: String,
    pub room_type: String,
    pub price_cents: i64,
    pub description: String,
    pub max_guests: i64,
    pub image_url: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Room plus its derived availability flag
#[derive(Debug, Clone, Serialize)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub is_available: bool,
}

impl RoomResponse {
    pub fn new(room: Room, is_available: bool) -> Self {
        Self { room, is_available }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_type: String,
    pub price_cents: i64,
    #[serde(default)]
    pub description: String,
    pub max_guests: i64,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub room_type: Option<String>,
    pub price_cents: Option<i64>,
    pub description: Option<String>,
    pub max_guests: Option<i64>,
    pub image_url: Option<String>,
}

/// True if the inclusive [check_in, check_out] range covers the given date
pub fn booking_covers_date(check_in: NaiveDate, check_out: NaiveDate, date: NaiveDate) -> bool {
    check_in <= date && date <= check_out
}

/// True if two inclusive date ranges share at least one day
pub fn date_ranges_overlap(
    a_in: NaiveDate,
    a_out: NaiveDate,
    b_in: NaiveDate,
    b_out: NaiveDate,
) -> bool {
    a_in <= b_out && b_in <= a_out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_covers_date_boundaries() {
        let check_in = d("2024-01-10");
        let check_out = d("2024-01-15");
        assert!(booking_covers_date(check_in, check_out, d("2024-01-10")));
        assert!(booking_covers_date(check_in, check_out, d("2024-01-12")));
        assert!(booking_covers_date(check_in, check_out, d("2024-01-15")));
        assert!(!booking_covers_date(check_in, check_out, d("2024-01-09")));
        assert!(!booking_covers_date(check_in, check_out, d("2024-01-16")));
    }

    #[test]
    fn test_overlap_symmetry() {
        let cases = [
            ("2024-01-01", "2024-01-05", "2024-01-05", "2024-01-10", true),
            ("2024-01-01", "2024-01-05", "2024-01-06", "2024-01-10", false),
            ("2024-01-01", "2024-01-31", "2024-01-10", "2024-01-12", true),
            ("2024-02-01", "2024-02-03", "2024-01-01", "2024-01-31", false),
        ];
        for (a_in, a_out, b_in, b_out, expected) in cases {
            assert_eq!(
                date_ranges_overlap(d(a_in), d(a_out), d(b_in), d(b_out)),
                expected
            );
            assert_eq!(
                date_ranges_overlap(d(b_in), d(b_out), d(a_in), d(a_out)),
                expected
            );
        }
    }
}
