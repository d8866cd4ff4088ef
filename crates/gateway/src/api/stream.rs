//! `GET /stream/{public_key}` — a persistent per-owner SSE stream of
//! `command.result` events (spec §4.8, §5).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::auth::PublicKey;
use crate::queues::OwnerQueues;
use crate::state::AppState;

pub async fn stream(State(state): State<AppState>, Extension(PublicKey(bearer)): Extension<PublicKey>, Path(public_key): Path<String>) -> impl IntoResponse {
    if !bearer.eq_ignore_ascii_case(&public_key) {
        return (
            axum::http::StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({"error": "bearer does not match requested stream owner"})),
        )
            .into_response();
    }

    let (id, rx) = state.owner_queues.register(public_key.clone());
    Sse::new(make_sse_stream(rx, state.owner_queues.clone(), public_key, id))
        .keep_alive(KeepAlive::new().text("keepalive"))
        .into_response()
}

fn make_sse_stream(mut rx: mpsc::UnboundedReceiver<serde_json::Value>, owner_queues: Arc<OwnerQueues>, owner_key: String, id: Uuid) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield Ok(Event::default().event("command_result").data(item.to_string()));
        }
        owner_queues.unregister(&owner_key, id);
    }
}
