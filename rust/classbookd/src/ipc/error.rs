//! Response envelopes and the error codes clients can rely on.

use serde_json::{json, Value};

pub mod codes {
    pub const BAD_PARAMS: &str = "bad_params";
    pub const NO_WORKSPACE: &str = "no_workspace";
    pub const NOT_FOUND: &str = "not_found";
    pub const DB_OPEN_FAILED: &str = "db_open_failed";
    pub const DB_QUERY_FAILED: &str = "db_query_failed";
    pub const DB_UPDATE_FAILED: &str = "db_update_failed";
    pub const IDENTITY_CONFLICT: &str = "identity_conflict";
    pub const PERSISTENCE_FAILED: &str = "persistence_failed";
    pub const NOT_IMPLEMENTED: &str = "not_implemented";
}

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}
