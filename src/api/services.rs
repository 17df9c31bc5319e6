//! Service catalog endpoints: add-ons bookable alongside a room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AdminUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_price_cents, validate_service_name, validate_uuid};
use crate::db::{CreateServiceRequest, Service, UpdateServiceRequest};
use crate::AppState;

fn validate_create_request(req: &CreateServiceRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_service_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_price_cents(req.price_cents) {
        errors.add("price_cents", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateServiceRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_service_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(price_cents) = req.price_cents {
        if let Err(e) = validate_price_cents(price_cents) {
            errors.add("price_cents", e);
        }
    }

    errors.finish()
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Service>>, ApiError> {
    let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(services))
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    validate_create_request(&req)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO services (id, name, price_cents, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.name)
    .bind(req.price_cents)
    .bind(&req.description)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(service_id = %id, admin = %admin.id, "Created service");

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateServiceRequest>,
) -> Result<Json<Service>, ApiError> {
    if let Err(e) = validate_uuid(&id, "service_id") {
        return Err(ApiError::validation_field("service_id", e));
    }
    validate_update_request(&req)?;

    let existing = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    let name = req.name.unwrap_or(existing.name);
    let price_cents = req.price_cents.unwrap_or(existing.price_cents);
    let description = req.description.or(existing.description);
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE services SET name = ?, price_cents = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(price_cents)
    .bind(&description)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(service_id = %id, admin = %admin.id, "Updated service");

    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_uuid(&id, "service_id") {
        return Err(ApiError::validation_field("service_id", e));
    }

    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Service not found"));
    }

    tracing::info!(service_id = %id, admin = %admin.id, "Deleted service");

    Ok(StatusCode::NO_CONTENT)
}
