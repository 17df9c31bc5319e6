pub mod auth;
mod bookings;
mod dashboard;
mod error;
mod rooms;
mod services;
mod users;
mod validation;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/password/reset", post(auth::request_password_reset))
        .route(
            "/auth/password/reset/confirm/:uid/:token",
            post(auth::confirm_password_reset),
        );

    // Catalog routes: listing is public, writes are gated by the
    // AdminUser extractor inside the handlers
    let catalog_routes = Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/:id",
            get(rooms::get_room)
                .patch(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/:id",
            patch(services::update_service).delete(services::delete_service),
        );

    // Booking routes (authenticated via the AuthUser extractor)
    let booking_routes = Router::new()
        .route("/bookings/create", post(bookings::create_booking))
        .route("/bookings/my-bookings", get(bookings::my_bookings))
        .route(
            "/bookings/cancel/:id",
            patch(bookings::cancel_booking).delete(bookings::cancel_booking),
        )
        .route("/user", get(users::get_profile).put(users::update_profile));

    // Admin routes
    let admin_routes = Router::new()
        .route("/bookings", get(bookings::admin_list_bookings))
        .route("/bookings/approve/:id", patch(bookings::approve_booking))
        .route("/bookings/reject/:id", patch(bookings::reject_booking))
        .route("/dashboard", get(dashboard::get_dashboard));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(catalog_routes)
        .merge(booking_routes)
        .nest("/admin", admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
