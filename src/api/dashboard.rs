//! Admin dashboard: aggregate counts over users, rooms, and the ledger.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::auth::AdminUser;
use super::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub users: i64,
    pub rooms: i64,
    /// Rooms with no pending or approved booking covering today
    pub available_rooms: i64,
    pub bookings: BookingCounts,
}

#[derive(Debug, Serialize)]
pub struct BookingCounts {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub canceled: i64,
    pub rejected: i64,
}

async fn count(pool: &crate::db::DbPool, sql: &str) -> Result<i64, ApiError> {
    let row: (i64,) = sqlx::query_as(sql).fetch_one(pool).await?;
    Ok(row.0)
}

async fn count_by_status(pool: &crate::db::DbPool, status: &str) -> Result<i64, ApiError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE status = ?")
        .bind(status)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let users = count(&state.db, "SELECT COUNT(*) FROM users").await?;
    let rooms = count(&state.db, "SELECT COUNT(*) FROM rooms").await?;

    let today = Utc::now().date_naive();
    let available: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM rooms r
        WHERE NOT EXISTS (
            SELECT 1 FROM bookings b
            WHERE b.room_id = r.id
              AND b.status IN ('pending', 'approved')
              AND b.check_in <= ? AND b.check_out >= ?
        )
        "#,
    )
    .bind(today)
    .bind(today)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DashboardResponse {
        users,
        rooms,
        available_rooms: available.0,
        bookings: BookingCounts {
            total: count(&state.db, "SELECT COUNT(*) FROM bookings").await?,
            pending: count_by_status(&state.db, "pending").await?,
            approved: count_by_status(&state.db, "approved").await?,
            canceled: count_by_status(&state.db, "canceled").await?,
            rejected: count_by_status(&state.db, "rejected").await?,
        },
    }))
}
