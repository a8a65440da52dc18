use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{required_date, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn list(state: &AppState, _params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let conn = state.conn()?;
    let mut stmt = conn.prepare(
        "SELECT id, date, title, minutes, attendees FROM meetings ORDER BY date DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let attendees_raw: Option<String> = r.get(4)?;
            Ok(json!({
                "meetingId": r.get::<_, String>(0)?,
                "date": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "minutes": r.get::<_, String>(3)?,
                "attendees": attendees_raw
                    .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                    .unwrap_or(serde_json::Value::Null),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "meetings": rows }))
}

fn log(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let conn = state.conn()?;
    let date = required_date(params, "date")?;
    let title = required_str(params, "title")?;
    let minutes = required_str(params, "minutes")?;
    let attendees = match params.get("attendees") {
        None | Some(serde_json::Value::Null) => None,
        Some(v @ serde_json::Value::Array(_)) => Some(serde_json::to_string(v)?),
        Some(_) => {
            return Err(ScheduleError::validation(
                "attendees must be an array of names",
            ));
        }
    };

    let meeting_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO meetings(id, date, title, minutes, attendees)
         VALUES(?, ?, ?, ?, ?)",
        (&meeting_id, &date, &title, &minutes, &attendees),
    )?;
    Ok(json!({ "meetingId": meeting_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let meeting_id = required_str(params, "meetingId")?;

    let removed = conn.execute("DELETE FROM meetings WHERE id = ?", [&meeting_id])?;
    if removed == 0 {
        return Err(ScheduleError::NotFound("meeting"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "meetings.list" => list(state, &req.params),
        "meetings.log" => log(state, &req.params),
        "meetings.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
