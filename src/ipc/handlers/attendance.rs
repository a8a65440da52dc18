use crate::availability::{self, TeacherStatus};
use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{any_period, day_for_date, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, AttendanceStatus};
use crate::store::ScheduleStore;
use crate::substitution;
use serde_json::json;

fn day(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let date = required_date(params, "date")?;
    let marks = state.store()?.attendance_for(&date)?;
    let marks_json: serde_json::Map<String, serde_json::Value> = marks
        .into_iter()
        .map(|(teacher_id, status)| (teacher_id, json!(status.as_str())))
        .collect();
    Ok(json!({ "date": date, "marks": marks_json }))
}

fn mark(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let store = state.writable_store()?;
    let date = required_date(params, "date")?;
    let teacher_id = required_str(params, "teacherId")?;
    let status = AttendanceStatus::parse(&required_str(params, "status")?).ok_or_else(|| {
        ScheduleError::validation(
            "status must be present, absent, half_day_before or half_day_after",
        )
    })?;

    if !store.teachers()?.iter().any(|t| t.id == teacher_id) {
        return Err(ScheduleError::NotFound("teacher"));
    }
    store.mark_attendance(&date, &teacher_id, status)?;

    // A leave mark is what kicks off substitution; tell the caller how many
    // base periods it touches so the UI can offer the workflow.
    let mut affected = 0usize;
    if status.is_leave() {
        let day = model::day_name_for(&date)?;
        if model::is_school_day(&day) {
            affected = substitution::affected_periods(&store, &teacher_id, &day, status)?.len();
        }
    }
    Ok(json!({
        "date": date,
        "teacherId": teacher_id,
        "status": status.as_str(),
        "affectedPeriods": affected,
    }))
}

fn status(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let date = required_date(params, "date")?;
    let day = day_for_date(params, &date)?;
    let teacher_id = required_str(params, "teacherId")?;
    let period = any_period(params, "periodIndex")?;

    let status = availability::status(&state.store()?, &teacher_id, &date, &day, period)?;
    let mut result = json!({
        "teacherId": teacher_id,
        "date": date,
        "periodIndex": period,
        "status": status.label(),
    });
    if let TeacherStatus::Busy { class_name } = &status {
        result["className"] = json!(class_name);
    }
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "attendance.day" => day(state, &req.params),
        "attendance.mark" => mark(state, &req.params),
        "availability.status" => status(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
