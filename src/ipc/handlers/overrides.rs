use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{assignable_period, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::DailyOverride;
use crate::store::ScheduleStore;
use serde_json::json;

fn list(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let date = required_date(params, "date")?;
    let cells = state.store()?.overrides_for(&date)?;
    Ok(json!({
        "date": date,
        "overrides": serde_json::to_value(&cells)?,
    }))
}

fn validate_payload(
    store: &dyn ScheduleStore,
    class_id: &str,
    ov: &DailyOverride,
) -> ScheduleResult<()> {
    match ov {
        DailyOverride::Substitution { sub_teacher_id, .. } => {
            if !store.teachers()?.iter().any(|t| &t.id == sub_teacher_id) {
                return Err(ScheduleError::NotFound("substitute teacher"));
            }
        }
        DailyOverride::Vacant { .. } => {}
        DailyOverride::Merged {
            merged_class_ids, ..
        } => {
            if merged_class_ids.is_empty() {
                return Err(ScheduleError::validation(
                    "merged override must name at least one class",
                ));
            }
            if merged_class_ids.iter().any(|id| id == class_id) {
                return Err(ScheduleError::validation(
                    "cannot merge a class into itself",
                ));
            }
            let classes = store.classes()?;
            for id in merged_class_ids {
                if !classes.iter().any(|c| &c.id == id) {
                    return Err(ScheduleError::NotFound("merge target class"));
                }
            }
        }
    }
    Ok(())
}

fn save(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let store = state.writable_store()?;
    let date = required_date(params, "date")?;
    let class_id = required_str(params, "classId")?;
    let period = assignable_period(params, "periodIndex")?;

    let payload = params
        .get("override")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    if payload.is_null() {
        store.save_override(&date, &class_id, period, None)?;
        return Ok(json!({ "deleted": true }));
    }

    let ov: DailyOverride = serde_json::from_value(payload)
        .map_err(|e| ScheduleError::validation(format!("bad override payload: {}", e)))?;
    if !store.classes()?.iter().any(|c| c.id == class_id) {
        return Err(ScheduleError::NotFound("class"));
    }
    validate_payload(&store, &class_id, &ov)?;

    store.save_override(&date, &class_id, period, Some(&ov))?;
    tracing::debug!(date = %date, class_id = %class_id, period, kind = ?ov.kind(), "override saved");
    Ok(json!({ "saved": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "overrides.list" => list(state, &req.params),
        "overrides.save" => save(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
