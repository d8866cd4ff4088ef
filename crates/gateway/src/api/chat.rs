//! `POST /chat` — creates a run, publishes it to `runs.new`, and streams
//! the run's `ui.events` back as SSE until `run_finished` (spec §4.8, §4.1).

use std::convert::Infallible;

use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::Stream;
use nx_bus::Topic;
use nx_domain::models::{Message as BusMessage, MessageContent, Role, Run};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::auth::PublicKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub client_timestamp_utc: Option<String>,
    #[serde(default)]
    pub client_timezone_offset: Option<i64>,
}

pub async fn chat(State(state): State<AppState>, Extension(PublicKey(owner_key)): Extension<PublicKey>, Json(body): Json<ChatRequest>) -> impl IntoResponse {
    let mut run = Run::new(owner_key.clone());
    run.history.push(BusMessage::new(run.id.clone(), owner_key.clone(), Role::Human, MessageContent::Text(body.user_input)));
    if let Some(ts) = body.client_timestamp_utc {
        run.metadata.insert("client_timestamp_utc".into(), serde_json::json!(ts));
    }
    if let Some(offset) = body.client_timezone_offset {
        run.metadata.insert("client_timezone_offset".into(), serde_json::json!(offset));
    }

    let rx = state.run_queues.register(run.id.clone());

    let envelope = BusMessage::new(run.id.clone(), owner_key, Role::System, MessageContent::Run(Box::new(run)));
    state.bus.publish(Topic::RunsNew, serde_json::to_value(&envelope).unwrap_or(serde_json::Value::Null));

    Sse::new(make_sse_stream(rx)).keep_alive(KeepAlive::new().text("keepalive"))
}

fn make_sse_stream(mut rx: mpsc::UnboundedReceiver<serde_json::Value>) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(item) = rx.recv().await {
            let event_type = item.get("event").and_then(|v| v.as_str()).unwrap_or("error").to_string();
            let payload = item.get("payload").cloned().unwrap_or(serde_json::Value::Null);
            yield Ok(Event::default().event(event_type).data(payload.to_string()));
        }
    }
}
