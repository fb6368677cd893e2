use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Shared by every handler: session state to report on and the trigger channel to feed.
#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<RwLock<AppState>>,
    pub trigger: Sender<u8>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/session", get(handlers::get_session))
        .route("/api/latest", get(handlers::get_latest))
        .route("/api/trigger", post(handlers::post_trigger))
        .with_state(state)
}
