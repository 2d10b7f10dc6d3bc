use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn classes_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.active = 1),
               (SELECT COUNT(*) FROM schedule_slots ss WHERE ss.class_id = c.id)
             FROM classes c
             ORDER BY c.name, c.id",
        )
        .map_err(HandlerErr::query_failed)?;
    let classes = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "activeStudentCount": r.get::<_, i64>(2)?,
                "slotCount": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query_failed)?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name) VALUES(?, ?)",
        (&class_id, &name),
    )
    .map_err(|e| HandlerErr::update_failed(e, "classes"))?;

    tracing::info!(%class_id, %name, "class created");
    Ok(json!({ "classId": class_id, "name": name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        // Listing before a workspace is open is not an error; there is nothing yet.
        "classes.list" if state.db.is_none() => Some(ok(&req.id, json!({ "classes": [] }))),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        "classes.create" => Some(with_conn(state, req, classes_create)),
        _ => None,
    }
}
