use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{assignable_period, day_for_date, required_date, required_day, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::BaseScheduleEntry;
use crate::resolve;
use crate::store::ScheduleStore;
use crate::suggest::{RotationSuggester, SuggestionProvider};
use serde_json::json;

fn base(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let day = required_day(params, "day")?;
    let cells = state.store()?.base_schedule(&day)?;
    Ok(json!({
        "day": day,
        "entries": serde_json::to_value(&cells)?,
    }))
}

fn save_base(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let store = state.writable_store()?;
    let day = required_day(params, "day")?;
    let class_id = required_str(params, "classId")?;
    let period = assignable_period(params, "periodIndex")?;

    let entry_value = params.get("entry").cloned().unwrap_or(serde_json::Value::Null);
    if entry_value.is_null() {
        store.save_base_entry(&day, &class_id, period, None)?;
        return Ok(json!({ "deleted": true }));
    }

    let entry: BaseScheduleEntry = serde_json::from_value(entry_value)
        .map_err(|e| ScheduleError::validation(format!("bad entry payload: {}", e)))?;
    if !store.classes()?.iter().any(|c| c.id == class_id) {
        return Err(ScheduleError::NotFound("class"));
    }
    if !store.teachers()?.iter().any(|t| t.id == entry.teacher_id) {
        return Err(ScheduleError::NotFound("teacher"));
    }

    store.save_base_entry(&day, &class_id, period, Some(&entry))?;
    Ok(json!({ "saved": true }))
}

fn effective(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let date = required_date(params, "date")?;
    let day = day_for_date(params, &date)?;
    let entries = resolve::resolve(&state.store()?, &date, &day)?;
    Ok(json!({
        "date": date,
        "dayName": day,
        "entries": serde_json::to_value(&entries)?,
    }))
}

/// Polling variant of `timetable.effective`: carries the client's refresh
/// sequence number so an out-of-order poll is flagged stale instead of
/// being answered with data the client must not apply.
fn poll(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let date = required_date(params, "date")?;
    let day = day_for_date(params, &date)?;
    let seq = params
        .get("seq")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ScheduleError::validation("missing seq"))?;

    if !state.poll_cursor.admit(seq) {
        return Ok(json!({ "seq": seq, "stale": true }));
    }
    let entries = resolve::resolve(&state.store()?, &date, &day)?;
    Ok(json!({
        "seq": seq,
        "stale": false,
        "date": date,
        "dayName": day,
        "entries": serde_json::to_value(&entries)?,
    }))
}

fn suggest(state: &AppState, _params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let store = state.store()?;
    let proposals = RotationSuggester.suggest_base_schedule(&store.teachers()?, &store.classes()?);
    Ok(json!({
        "advisory": true,
        "proposals": serde_json::to_value(&proposals)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "timetable.base" => base(state, &req.params),
        "timetable.saveBase" => save_base(state, &req.params),
        "timetable.effective" => effective(state, &req.params),
        "timetable.poll" => poll(state, &req.params),
        "timetable.suggest" => suggest(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
