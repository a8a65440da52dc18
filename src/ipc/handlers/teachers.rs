use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::ScheduleStore;
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn list(state: &AppState, _params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let teachers = state.store()?.teachers()?;

    let mut remark_counts: HashMap<String, i64> = HashMap::new();
    if let Some(conn) = &state.db {
        let mut stmt =
            conn.prepare("SELECT teacher_id, COUNT(*) FROM remarks GROUP BY teacher_id")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        remark_counts = rows.into_iter().collect();
    }

    let teachers_json: Vec<serde_json::Value> = teachers
        .iter()
        .map(|t| {
            let mut v = json!({
                "id": t.id,
                "name": t.name,
                "subject": t.subject,
            });
            if let Some(count) = remark_counts.get(&t.id) {
                v["remarkCount"] = json!(count);
            }
            v
        })
        .collect();
    Ok(json!({ "teachers": teachers_json }))
}

fn create(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let name = required_str(params, "name")?;
    let subject = optional_str(params, "subject");

    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, name, subject) VALUES(?, ?, ?)",
        (&teacher_id, &name, &subject),
    )?;
    Ok(json!({ "teacherId": teacher_id, "name": name }))
}

fn update(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let teacher_id = required_str(params, "teacherId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("teacher"));
    }

    if let Some(name) = optional_str(params, "name") {
        conn.execute(
            "UPDATE teachers SET name = ? WHERE id = ?",
            (&name, &teacher_id),
        )?;
    }
    if let Some(subject) = optional_str(params, "subject") {
        conn.execute(
            "UPDATE teachers SET subject = ? WHERE id = ?",
            (&subject, &teacher_id),
        )?;
    }
    Ok(json!({ "teacherId": teacher_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let teacher_id = required_str(params, "teacherId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("teacher"));
    }

    let tx = conn.unchecked_transaction()?;
    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    // NOTE: override payloads may still name this teacher as a substitute;
    // those rows are date-scoped history and are left in place.
    let result: Result<(), rusqlite::Error> = (|| {
        tx.execute("DELETE FROM base_schedule WHERE teacher_id = ?", [&teacher_id])?;
        tx.execute("DELETE FROM attendance WHERE teacher_id = ?", [&teacher_id])?;
        tx.execute("DELETE FROM remarks WHERE teacher_id = ?", [&teacher_id])?;
        tx.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id])?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            tx.commit()?;
            Ok(json!({ "deleted": true }))
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e.into())
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "teachers.list" => list(state, &req.params),
        "teachers.create" => create(state, &req.params),
        "teachers.update" => update(state, &req.params),
        "teachers.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
