//! Booking ledger models and the status state machine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::room::Room;
use super::service::Service;

/// Booking lifecycle states.
///
/// Every booking starts as `Pending`. Admins move it to `Approved` or
/// `Rejected`; the owning user (or an admin) can move a pending or
/// approved booking to `Canceled`. `Canceled` and `Rejected` are terminal:
/// no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Canceled,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Canceled => "canceled",
            BookingStatus::Rejected => "rejected",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Canceled | BookingStatus::Rejected)
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        match (self, next) {
            (BookingStatus::Pending, BookingStatus::Approved) => true,
            (BookingStatus::Pending, BookingStatus::Rejected) => true,
            (BookingStatus::Pending, BookingStatus::Canceled) => true,
            (BookingStatus::Approved, BookingStatus::Canceled) => true,
            _ => false,
        }
    }

    /// Statuses that block a room: a pending or approved booking holds its
    /// dates, a canceled or rejected one does not
    pub fn blocks_room(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: BookingStatus,
    /// Frozen at creation: room price plus attached service prices.
    /// Later catalog price changes never alter this.
    pub total_price_cents: i64,
    pub created_at: String,
}

/// Booking plus resolved room and service detail, as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub room: Room,
    pub services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default)]
    pub service_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_transitions_from_pending() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Approved));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Rejected));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Canceled));
    }

    #[test]
    fn test_approved_can_only_cancel() {
        assert!(BookingStatus::Approved.can_transition_to(BookingStatus::Canceled));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Rejected));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [BookingStatus::Canceled, BookingStatus::Rejected] {
            assert!(terminal.is_terminal());
            for next in [
                BookingStatus::Pending,
                BookingStatus::Approved,
                BookingStatus::Canceled,
                BookingStatus::Rejected,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cancel_of_canceled_is_not_a_transition() {
        // Re-canceling is rejected rather than treated as a no-op
        assert!(!BookingStatus::Canceled.can_transition_to(BookingStatus::Canceled));
    }

    #[test]
    fn test_blocking_statuses() {
        assert!(BookingStatus::Pending.blocks_room());
        assert!(BookingStatus::Approved.blocks_room());
        assert!(!BookingStatus::Canceled.blocks_room());
        assert!(!BookingStatus::Rejected.blocks_room());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&BookingStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
    }
}
