//! `GET /commands` — enumerates the gateway's signed-command surface
//! (spec §4.8). The set is fixed at compile time; there is no dynamic
//! command registry in scope.

use axum::response::Json;

pub async fn list_commands() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "commands": [
            {
                "name": "config",
                "description": "View or modify per-user configuration overrides",
                "requiresSignature": true,
                "getEndpoint": "/config",
                "postEndpoint": "/config",
            },
            {
                "name": "prompts",
                "description": "View or modify per-user prompt overrides",
                "requiresSignature": true,
                "getEndpoint": "/prompts",
                "postEndpoint": "/prompts",
            },
            {
                "name": "messages",
                "description": "Fetch recent conversation history",
                "requiresSignature": false,
                "getEndpoint": "/messages",
            },
        ]
    }))
}
