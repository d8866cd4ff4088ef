pub mod auth;
pub mod chat;
pub mod commands;
pub mod config;
pub mod messages;
pub mod prompts;
pub mod stream;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full API router. Every route requires a shape-valid bearer
/// public key (spec §6); the signed-overrides endpoints additionally
/// verify a per-request signature inside their own handlers.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/stream/:public_key", get(stream::stream))
        .route("/commands", get(commands::list_commands))
        .route("/config", get(config::get_config).post(config::post_config))
        .route("/prompts", get(prompts::get_prompts).post(prompts::post_prompts))
        .route("/messages", get(messages::get_messages))
        .route_layer(middleware::from_fn_with_state(state, auth::require_bearer))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
