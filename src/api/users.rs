//! Profile endpoints for the authenticated user.

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_name, validate_phone};
use crate::db::{UpdateProfileRequest, User, UserResponse};
use crate::AppState;

pub async fn get_profile(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Update name and phone. Email and role are not mutable through this path.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    errors.finish()?;

    let name = req.name.unwrap_or(user.name);
    let phone = req.phone.or(user.phone);
    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE users SET name = ?, phone = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&phone)
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let updated = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(UserResponse::from(updated)))
}
