use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{optional_str, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn list(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let conn = state.conn()?;

    let rows = match optional_str(params, "teacherId") {
        Some(teacher_id) => {
            let mut stmt = conn.prepare(
                "SELECT id, teacher_id, date, remark, author_role
                 FROM remarks WHERE teacher_id = ? ORDER BY date DESC",
            )?;
            let rows = stmt
                .query_map([&teacher_id], row_to_json)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, teacher_id, date, remark, author_role
                 FROM remarks ORDER BY date DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_json)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(json!({ "remarks": rows }))
}

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "remarkId": r.get::<_, String>(0)?,
        "teacherId": r.get::<_, String>(1)?,
        "date": r.get::<_, String>(2)?,
        "remark": r.get::<_, String>(3)?,
        "authorRole": r.get::<_, String>(4)?,
    }))
}

fn add(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let role = state.require_login()?;
    let conn = state.conn()?;
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let remark = required_str(params, "remark")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("teacher"));
    }

    let remark_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO remarks(id, teacher_id, date, remark, author_role)
         VALUES(?, ?, ?, ?, ?)",
        (&remark_id, &teacher_id, &date, &remark, role.as_str()),
    )?;
    Ok(json!({ "remarkId": remark_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let remark_id = required_str(params, "remarkId")?;

    let removed = conn.execute("DELETE FROM remarks WHERE id = ?", [&remark_id])?;
    if removed == 0 {
        return Err(ScheduleError::NotFound("remark"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "remarks.list" => list(state, &req.params),
        "remarks.add" => add(state, &req.params),
        "remarks.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
