use crate::db;
use crate::ipc::error::{codes, ok};
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn health(state: &AppState) -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "dbFile": db::DB_FILE_NAME,
    })
}

/// Opens (creating if needed) the workspace database and makes it current.
/// A failed open leaves any previously selected workspace in place.
fn workspace_select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    let conn = db::open_db(&path).map_err(|e| {
        tracing::error!(path = %path.display(), error = ?e, "failed to open workspace");
        HandlerErr::new(codes::DB_OPEN_FAILED, format!("{e:?}"))
    })?;
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "health" => Some(ok(&req.id, health(state))),
        "workspace.select" => Some(match workspace_select(state, &req.params) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
