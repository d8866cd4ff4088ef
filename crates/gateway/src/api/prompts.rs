//! `GET/POST /prompts` — per-user prompt overrides (spec §4.8, §6). Mirrors
//! `api::config`, writing to `prompt_overrides` instead of `config_overrides`.

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::api::auth::{authorize_signed_overrides, PublicKey, SignedOverridesRequest};
use crate::state::AppState;

pub async fn get_prompts(State(state): State<AppState>, Extension(PublicKey(owner_key)): Extension<PublicKey>) -> impl IntoResponse {
    Json(state.identity.get_effective_profile(&owner_key, &state.config))
}

pub async fn post_prompts(State(state): State<AppState>, Extension(PublicKey(bearer)): Extension<PublicKey>, Json(body): Json<SignedOverridesRequest>) -> impl IntoResponse {
    if let Err(e) = authorize_signed_overrides(&bearer, &body) {
        return (StatusCode::FORBIDDEN, Json(serde_json::json!({"error": e.to_string()}))).into_response();
    }
    state.identity.update_user_prompts(&bearer, body.overrides);
    (StatusCode::OK, Json(serde_json::json!({"status": "success", "message": "prompts updated"}))).into_response()
}
