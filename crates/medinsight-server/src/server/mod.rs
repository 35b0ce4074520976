//! HTTP API for `MedInsight`.

pub mod access_routes;
pub mod auth_routes;
pub mod error;
pub mod extract;
pub mod otp_routes;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use extract::AuthUser;
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(auth_routes::login))
        .route("/api/login/verify", post(auth_routes::verify_login))
        .route("/api/logout", post(auth_routes::logout))
        .route("/api/me", get(auth_routes::me))
        .route("/api/otp/send", post(otp_routes::send))
        .route("/api/otp/verify", post(otp_routes::verify))
        .route("/api/otp/resend", post(otp_routes::resend))
        .route("/api/otp/status", get(otp_routes::status))
        .route(
            "/api/access-requests",
            get(access_routes::list).post(access_routes::request),
        )
        .route("/api/access-requests/mine", get(access_routes::mine))
        .route(
            "/api/access-requests/{id}/approve",
            post(access_routes::approve),
        )
        .route("/api/access-requests/{id}/reject", post(access_routes::reject))
        .route("/api/patients/{id}/access", post(access_routes::redeem))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
