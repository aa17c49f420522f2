use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/refresh", post(handlers::refresh))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
