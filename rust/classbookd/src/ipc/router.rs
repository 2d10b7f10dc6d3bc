use serde_json::Value;

use super::error::{codes, err};
use super::handlers;
use super::types::{AppState, Request};

type Family = fn(&mut AppState, &Request) -> Option<Value>;

/// Handler families in dispatch order; the first one that claims the method
/// answers it.
const FAMILIES: &[Family] = &[
    handlers::core::try_handle,
    handlers::classes::try_handle,
    handlers::students::try_handle,
    handlers::calendar::try_handle,
    handlers::schedule::try_handle,
    handlers::attendance::try_handle,
    handlers::journal::try_handle,
    handlers::grades::try_handle,
    handlers::setup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    for family in FAMILIES {
        if let Some(resp) = family(state, &req) {
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        codes::NOT_IMPLEMENTED,
        format!("unknown method: {}", req.method),
        None,
    )
}
