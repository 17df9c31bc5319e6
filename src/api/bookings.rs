//! Booking ledger endpoints and the booking lifecycle policy.
//!
//! Creation runs entirely inside one transaction: date validation, room
//! resolution, the range-overlap availability check, service resolution,
//! and the insert all see the same snapshot, so two concurrent requests
//! for overlapping dates cannot both commit.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{AdminUser, AuthUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::validate_uuid;
use crate::db::{
    Booking, BookingDetail, BookingStatus, CreateBookingRequest, DbPool, Room, Service, User,
};
use crate::AppState;

/// Resolve the room and service detail for a booking
async fn load_booking_detail(pool: &DbPool, booking: Booking) -> Result<BookingDetail, ApiError> {
    let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
        .bind(&booking.room_id)
        .fetch_one(pool)
        .await?;

    let services = sqlx::query_as::<_, Service>(
        r#"
        SELECT s.* FROM services s
        JOIN booking_services bs ON bs.service_id = s.id
        WHERE bs.booking_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(&booking.id)
    .fetch_all(pool)
    .await?;

    Ok(BookingDetail {
        booking,
        room,
        services,
    })
}

/// Create a booking for a user.
///
/// The whole sequence runs in one transaction; nothing is persisted unless
/// every step passes.
pub async fn create_booking_for_user(
    pool: &DbPool,
    user_id: &str,
    req: &CreateBookingRequest,
) -> Result<Booking, ApiError> {
    if req.check_in >= req.check_out {
        return Err(ApiError::validation_field(
            "check_in",
            "Check-out date must be after check-in date",
        ));
    }

    let mut tx = pool.begin().await?;

    let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
        .bind(&req.room_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    // Availability over the requested range: any pending or approved
    // booking sharing a day with [check_in, check_out] blocks the room
    let overlapping: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM bookings
        WHERE room_id = ?
          AND status IN ('pending', 'approved')
          AND check_in <= ? AND check_out >= ?
        "#,
    )
    .bind(&room.id)
    .bind(req.check_out)
    .bind(req.check_in)
    .fetch_one(&mut *tx)
    .await?;

    if overlapping.0 > 0 {
        return Err(ApiError::conflict(
            "Room is not available for the selected dates",
        ));
    }

    let mut services = Vec::new();
    let mut invalid_ids = Vec::new();
    for service_id in &req.service_ids {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
            .bind(service_id)
            .fetch_optional(&mut *tx)
            .await?;
        match service {
            Some(s) => services.push(s),
            None => invalid_ids.push(service_id.clone()),
        }
    }
    if !invalid_ids.is_empty() {
        return Err(ApiError::validation_field(
            "service_ids",
            format!("Invalid service IDs: {}", invalid_ids.join(", ")),
        ));
    }

    // Frozen at creation: later catalog price changes never touch this
    let total_price_cents: i64 =
        room.price_cents + services.iter().map(|s| s.price_cents).sum::<i64>();

    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO bookings (id, user_id, room_id, check_in, check_out, status, total_price_cents, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(&room.id)
    .bind(req.check_in)
    .bind(req.check_out)
    .bind(BookingStatus::Pending)
    .bind(total_price_cents)
    .bind(&created_at)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        // A concurrent create can commit between our availability check and
        // this first write; sqlite then refuses the stale snapshot with a
        // busy error. To the caller that race is a lost availability check.
        if is_write_conflict(&err) {
            return Err(ApiError::conflict(
                "Room is not available for the selected dates",
            ));
        }
        return Err(err.into());
    }

    for service in &services {
        sqlx::query("INSERT INTO booking_services (booking_id, service_id) VALUES (?, ?)")
            .bind(&id)
            .bind(&service.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        booking_id = %id,
        room_id = %room.id,
        user_id = %user_id,
        total_price_cents,
        "Created booking"
    );

    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    Ok(booking)
}

/// True for sqlite busy/snapshot errors: another writer committed after
/// this transaction took its read snapshot
fn is_write_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.message().contains("database is locked"))
}

async fn fetch_booking(pool: &DbPool, id: &str) -> Result<Booking, ApiError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

/// Move a booking to `next`, enforcing the lifecycle state machine.
/// Only the status field is mutated.
pub async fn transition_booking(
    pool: &DbPool,
    id: &str,
    next: BookingStatus,
) -> Result<Booking, ApiError> {
    let booking = fetch_booking(pool, id).await?;

    if !booking.status.can_transition_to(next) {
        return Err(ApiError::conflict(format!(
            "Cannot move a {} booking to {}",
            booking.status, next
        )));
    }

    // Guard on the current status so a concurrent transition loses cleanly
    let result = sqlx::query("UPDATE bookings SET status = ? WHERE id = ? AND status = ?")
        .bind(next)
        .bind(id)
        .bind(booking.status)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(format!(
            "Booking status changed concurrently; cannot move to {}",
            next
        )));
    }

    tracing::info!(booking_id = %id, from = %booking.status, to = %next, "Booking status changed");

    fetch_booking(pool, id).await
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingDetail>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_uuid(&req.room_id, "room_id") {
        errors.add("room_id", e);
    }
    for service_id in &req.service_ids {
        if let Err(e) = validate_uuid(service_id, "service_id") {
            errors.add("service_ids", e);
        }
    }
    errors.finish()?;

    let booking = create_booking_for_user(&state.db, &user.id, &req).await?;
    let detail = load_booking_detail(&state.db, booking).await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// The caller's own bookings, newest first
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<BookingDetail>>, ApiError> {
    let bookings = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let mut details = Vec::with_capacity(bookings.len());
    for booking in bookings {
        details.push(load_booking_detail(&state.db, booking).await?);
    }

    Ok(Json(details))
}

/// Cancel a booking. Only the owner or an admin may cancel.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    if let Err(e) = validate_uuid(&id, "booking_id") {
        return Err(ApiError::validation_field("booking_id", e));
    }

    let booking = fetch_booking(&state.db, &id).await?;
    if booking.user_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("You can only cancel your own bookings"));
    }

    let booking = transition_booking(&state.db, &id, BookingStatus::Canceled).await?;

    Ok(Json(booking))
}

/// All bookings in the ledger, newest first (admin)
pub async fn admin_list_bookings(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<BookingDetail>>, ApiError> {
    let bookings =
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;

    let mut details = Vec::with_capacity(bookings.len());
    for booking in bookings {
        details.push(load_booking_detail(&state.db, booking).await?);
    }

    Ok(Json(details))
}

/// Shared body of the approve and reject endpoints
async fn admin_review_booking(
    state: Arc<AppState>,
    admin: User,
    id: String,
    next: BookingStatus,
) -> Result<Json<Booking>, ApiError> {
    if let Err(e) = validate_uuid(&id, "booking_id") {
        return Err(ApiError::validation_field("booking_id", e));
    }

    let booking = transition_booking(&state.db, &id, next).await?;

    tracing::info!(booking_id = %id, admin = %admin.id, status = %next, "Booking reviewed");

    // Best-effort owner notification; the transition is already committed
    let owner: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&booking.user_id)
        .fetch_optional(&state.db)
        .await?;
    let room: Option<Room> = sqlx::query_as("SELECT * FROM rooms WHERE id = ?")
        .bind(&booking.room_id)
        .fetch_optional(&state.db)
        .await?;
    if let (Some(owner), Some(room)) = (owner, room) {
        let email = state.email.clone();
        let check_in = booking.check_in.to_string();
        let check_out = booking.check_out.to_string();
        tokio::spawn(async move {
            if let Err(e) = email
                .send_booking_status_email(
                    &owner.email,
                    &owner.name,
                    &room.room_type,
                    &check_in,
                    &check_out,
                    next,
                )
                .await
            {
                tracing::error!(user_id = %owner.id, error = %e, "Failed to send booking status email");
            }
        });
    }

    Ok(Json(booking))
}

pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    admin_review_booking(state, admin, id, BookingStatus::Approved).await
}

pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    admin_review_booking(state, admin, id, BookingStatus::Rejected).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::db::date_ranges_overlap;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn seed_user(pool: &DbPool, id: &str) {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
            VALUES (?, 'Guest', ?, NULL, 'x', 'user', datetime('now'), datetime('now'))
            "#,
        )
        .bind(id)
        .bind(format!("{}@example.com", id))
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_room(pool: &DbPool, price_cents: i64) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO rooms (id, room_type, price_cents, description, max_guests, image_url, created_at, updated_at)
            VALUES (?, 'double', ?, '', 2, 'https://cdn.example.com/r.jpg', datetime('now'), datetime('now'))
            "#,
        )
        .bind(&id)
        .bind(price_cents)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn seed_service(pool: &DbPool, name: &str, price_cents: i64) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO services (id, name, price_cents, description, created_at, updated_at)
            VALUES (?, ?, ?, NULL, datetime('now'), datetime('now'))
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(price_cents)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn booking_count(pool: &DbPool) -> i64 {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(pool)
            .await
            .unwrap();
        count.0
    }

    #[tokio::test]
    async fn test_create_booking_computes_total_price() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;
        let breakfast = seed_service(&pool, "Breakfast", 2_000).await;
        let spa = seed_service(&pool, "Spa", 1_500).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![breakfast, spa],
        };
        let booking = create_booking_for_user(&pool, "u1", &req).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price_cents, 13_500);

        let detail = load_booking_detail(&pool, booking).await.unwrap();
        assert_eq!(detail.services.len(), 2);
    }

    #[tokio::test]
    async fn test_inverted_dates_fail_validation_and_persist_nothing() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-01-10"),
            check_out: d("2024-01-05"),
            service_ids: vec![],
        };
        let err = create_booking_for_user(&pool, "u1", &req).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(booking_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_equal_dates_fail_validation() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-01-10"),
            check_out: d("2024-01-10"),
            service_ids: vec![],
        };
        let err = create_booking_for_user(&pool, "u1", &req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;

        let req = CreateBookingRequest {
            room_id: Uuid::new_v4().to_string(),
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![],
        };
        let err = create_booking_for_user(&pool, "u1", &req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_overlapping_booking_conflicts_and_persists_nothing() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        seed_user(&pool, "u2").await;
        let room_id = seed_room(&pool, 10_000).await;

        let first = CreateBookingRequest {
            room_id: room_id.clone(),
            check_in: d("2024-06-01"),
            check_out: d("2024-06-10"),
            service_ids: vec![],
        };
        create_booking_for_user(&pool, "u1", &first).await.unwrap();

        // Overlaps on 2024-06-10; the SQL check implements this predicate
        let second = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-10"),
            check_out: d("2024-06-15"),
            service_ids: vec![],
        };
        assert!(date_ranges_overlap(
            first.check_in,
            first.check_out,
            second.check_in,
            second.check_out
        ));
        let err = create_booking_for_user(&pool, "u2", &second).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(booking_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_adjacent_dates_do_not_conflict() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let first = CreateBookingRequest {
            room_id: room_id.clone(),
            check_in: d("2024-06-01"),
            check_out: d("2024-06-10"),
            service_ids: vec![],
        };
        create_booking_for_user(&pool, "u1", &first).await.unwrap();

        let second = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-11"),
            check_out: d("2024-06-15"),
            service_ids: vec![],
        };
        assert!(!date_ranges_overlap(
            first.check_in,
            first.check_out,
            second.check_in,
            second.check_out
        ));
        assert!(create_booking_for_user(&pool, "u1", &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_creates_allow_only_one() {
        // Needs a file-backed WAL pool: each create runs on its own
        // connection, as in production
        let dir = std::env::temp_dir().join(format!("lodgr-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let pool = crate::db::init(&dir).await.unwrap();

        seed_user(&pool, "u1").await;
        seed_user(&pool, "u2").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-01"),
            check_out: d("2024-06-10"),
            service_ids: vec![],
        };
        let (a, b) = tokio::join!(
            create_booking_for_user(&pool, "u1", &req),
            create_booking_for_user(&pool, "u2", &req),
        );

        let (winner, loser) = match (a, b) {
            (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
            (Ok(_), Ok(_)) => panic!("both overlapping bookings committed"),
            (Err(a), Err(b)) => panic!("no booking committed: {}, {}", a, b),
        };

        assert_eq!(winner.status, BookingStatus::Pending);
        assert_eq!(loser.code(), ErrorCode::Conflict);
        assert_eq!(booking_count(&pool).await, 1);

        pool.close().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_canceled_booking_frees_the_room() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id: room_id.clone(),
            check_in: d("2024-06-01"),
            check_out: d("2024-06-10"),
            service_ids: vec![],
        };
        let booking = create_booking_for_user(&pool, "u1", &req).await.unwrap();
        transition_booking(&pool, &booking.id, BookingStatus::Canceled)
            .await
            .unwrap();

        // Same dates are bookable again
        assert!(create_booking_for_user(&pool, "u1", &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_service_ids_are_named() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;
        let bogus = Uuid::new_v4().to_string();

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![bogus.clone()],
        };
        let err = create_booking_for_user(&pool, "u1", &req).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.to_string().contains(&bogus));
        assert_eq!(booking_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_total_price_is_frozen_after_creation() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id: room_id.clone(),
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![],
        };
        let booking = create_booking_for_user(&pool, "u1", &req).await.unwrap();

        sqlx::query("UPDATE rooms SET price_cents = 99999 WHERE id = ?")
            .bind(&room_id)
            .execute(&pool)
            .await
            .unwrap();

        let after = fetch_booking(&pool, &booking.id).await.unwrap();
        assert_eq!(after.total_price_cents, 10_000);
    }

    #[tokio::test]
    async fn test_transition_mutates_only_status() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![],
        };
        let before = create_booking_for_user(&pool, "u1", &req).await.unwrap();
        let after = transition_booking(&pool, &before.id, BookingStatus::Approved)
            .await
            .unwrap();

        assert_eq!(after.status, BookingStatus::Approved);
        assert_eq!(after.id, before.id);
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.room_id, before.room_id);
        assert_eq!(after.check_in, before.check_in);
        assert_eq!(after.check_out, before.check_out);
        assert_eq!(after.total_price_cents, before.total_price_cents);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_further_transitions() {
        let pool = crate::db::init_test_pool().await;
        seed_user(&pool, "u1").await;
        let room_id = seed_room(&pool, 10_000).await;

        let req = CreateBookingRequest {
            room_id,
            check_in: d("2024-06-01"),
            check_out: d("2024-06-05"),
            service_ids: vec![],
        };
        let booking = create_booking_for_user(&pool, "u1", &req).await.unwrap();

        transition_booking(&pool, &booking.id, BookingStatus::Canceled)
            .await
            .unwrap();

        // Cancel of an already-canceled booking is rejected
        let err = transition_booking(&pool, &booking.id, BookingStatus::Canceled)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        // So is approving it
        let err = transition_booking(&pool, &booking.id, BookingStatus::Approved)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }
}
