use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{optional_str, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn list(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let conn = state.conn()?;

    let mut sql = String::from(
        "SELECT e.id, e.class_id, c.name, e.date, e.subject, e.note
         FROM exams e JOIN classes c ON c.id = e.class_id
         WHERE 1 = 1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(class_id) = optional_str(params, "classId") {
        sql.push_str(" AND e.class_id = ?");
        args.push(Value::Text(class_id));
    }
    if let Some(from) = optional_str(params, "from") {
        sql.push_str(" AND e.date >= ?");
        args.push(Value::Text(model::canonical_date(&from)?));
    }
    if let Some(to) = optional_str(params, "to") {
        sql.push_str(" AND e.date <= ?");
        args.push(Value::Text(model::canonical_date(&to)?));
    }
    sql.push_str(" ORDER BY e.date, c.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args), |r| {
            Ok(json!({
                "examId": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "className": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "subject": r.get::<_, String>(4)?,
                "note": r.get::<_, Option<String>>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "exams": rows }))
}

fn schedule(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let subject = required_str(params, "subject")?;
    let note = optional_str(params, "note");

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("class"));
    }

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, class_id, date, subject, note) VALUES(?, ?, ?, ?, ?)",
        (&exam_id, &class_id, &date, &subject, &note),
    )?;
    Ok(json!({ "examId": exam_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let exam_id = required_str(params, "examId")?;

    let removed = conn.execute("DELETE FROM exams WHERE id = ?", [&exam_id])?;
    if removed == 0 {
        return Err(ScheduleError::NotFound("exam"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "exams.list" => list(state, &req.params),
        "exams.schedule" => schedule(state, &req.params),
        "exams.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
