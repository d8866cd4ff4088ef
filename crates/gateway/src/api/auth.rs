//! Bearer public-key extraction and ECDSA secp256k1 / Keccak-256 signature
//! verification (spec §6 "Auth").
//!
//! Every request carries `Authorization: Bearer <public_key>` — the raw
//! claimed owner key, `0x` + 40 hex chars, no shared secret. Mutating
//! endpoints (`POST /config`, `POST /prompts`) additionally require a
//! signature proving possession of that key's private half.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Deserialize;
use sha3::{Digest, Keccak256};

use crate::state::AppState;

/// The bearer public key, validated for shape and inserted into request
/// extensions by [`require_bearer`].
#[derive(Debug, Clone)]
pub struct PublicKey(pub String);

fn is_valid_public_key(key: &str) -> bool {
    key.len() == 42 && key.starts_with("0x") && key[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Extracts and shape-validates the bearer public key. A missing or
/// malformed bearer is a 401 — the gateway's only unauthenticated-visitor
/// defense (spec §7).
pub async fn require_bearer(State(_state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let bearer = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if !is_valid_public_key(bearer) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"error": "missing or malformed bearer public key"})),
        )
            .into_response();
    }

    req.extensions_mut().insert(PublicKey(bearer.to_string()));
    next.run(req).await
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("public key mismatch: expected {expected}, recovered {recovered}")]
    Mismatch { expected: String, recovered: String },
}

/// Verifies `signature_hex` (65-byte r||s||v) over Keccak-256(`payload`)
/// and checks the recovered address matches `expected_public_key`
/// case-insensitively. `v` may be given as 0/1 or Ethereum-style 27/28.
pub fn verify_signature(payload: &str, signature_hex: &str, expected_public_key: &str) -> Result<(), SignatureError> {
    let sig_bytes = hex::decode(signature_hex.trim_start_matches("0x")).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if sig_bytes.len() != 65 {
        return Err(SignatureError::Malformed(format!("expected 65 bytes (r||s||v), got {}", sig_bytes.len())));
    }

    let mut v = sig_bytes[64];
    if v >= 27 {
        v -= 27;
    }
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| SignatureError::Malformed(format!("invalid recovery id {v}")))?;
    let signature = Signature::from_slice(&sig_bytes[..64]).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let digest: [u8; 32] = Keccak256::digest(payload.as_bytes()).into();

    let verifying_key =
        VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let recovered_address = to_ethereum_address(&verifying_key);

    if !recovered_address.eq_ignore_ascii_case(expected_public_key) {
        return Err(SignatureError::Mismatch {
            expected: expected_public_key.to_string(),
            recovered: recovered_address,
        });
    }
    Ok(())
}

/// Ethereum-style address: Keccak-256 of the 64-byte uncompressed public
/// key (X||Y, no `0x04` tag), last 20 bytes, `0x`-prefixed hex.
fn to_ethereum_address(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let hash = Keccak256::digest(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Body shape shared by `POST /config` and `POST /prompts`: a flat
/// overrides map plus the signature proving the bearer owns `publicKey`.
#[derive(Debug, Deserialize)]
pub struct SignedOverridesRequest {
    pub overrides: HashMap<String, serde_json::Value>,
    pub auth: SignedAuth,
}

#[derive(Debug, Deserialize)]
pub struct SignedAuth {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("bearer does not match auth.publicKey")]
    BearerMismatch,
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Authorizes a signed-overrides body: the bearer must equal
/// `auth.publicKey`, and `auth.signature` must verify over the
/// JSON-serialized `overrides` map, recovering to that same key.
pub fn authorize_signed_overrides(bearer: &str, request: &SignedOverridesRequest) -> Result<(), AuthorizationError> {
    if !bearer.eq_ignore_ascii_case(&request.auth.public_key) {
        return Err(AuthorizationError::BearerMismatch);
    }
    let payload = serde_json::to_string(&request.overrides).unwrap_or_default();
    verify_signature(&payload, &request.auth.signature, &request.auth.public_key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn signed(payload: &str, signing_key: &SigningKey) -> String {
        let digest: [u8; 32] = Keccak256::digest(payload.as_bytes()).into();
        let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn valid_signature_recovers_matching_address() {
        let signing_key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let address = to_ethereum_address(signing_key.verifying_key());
        let payload = r#"{"theme":"dark"}"#;
        let signature_hex = signed(payload, &signing_key);

        assert!(verify_signature(payload, &signature_hex, &address).is_ok());
    }

    #[test]
    fn wrong_expected_key_is_rejected() {
        let signing_key = SigningKey::from_slice(&[0x22; 32]).unwrap();
        let payload = "hello";
        let signature_hex = signed(payload, &signing_key);

        let err = verify_signature(payload, &signature_hex, "0x0000000000000000000000000000000000dead").unwrap_err();
        assert!(matches!(err, SignatureError::Mismatch { .. }));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signing_key = SigningKey::from_slice(&[0x33; 32]).unwrap();
        let address = to_ethereum_address(signing_key.verifying_key());
        let signature_hex = signed("original", &signing_key);

        assert!(verify_signature("tampered", &signature_hex, &address).is_err());
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(verify_signature("x", "0xdead", "0xabc").is_err());
    }

    #[test]
    fn rejects_public_key_without_0x_prefix() {
        assert!(!is_valid_public_key("abcdef0000000000000000000000000000000000"));
    }

    #[test]
    fn rejects_public_key_of_wrong_length() {
        assert!(!is_valid_public_key("0x1234"));
    }
}
