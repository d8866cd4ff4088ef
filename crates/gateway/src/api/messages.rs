//! `GET /messages?limit=N` — recent persisted conversation history for the
//! bearer's owner key (spec §4.8).

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::auth::PublicKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn get_messages(State(state): State<AppState>, Extension(PublicKey(owner_key)): Extension<PublicKey>, Query(query): Query<MessagesQuery>) -> impl IntoResponse {
    Json(serde_json::json!({"messages": state.store.get_history(&owner_key, query.limit)}))
}
